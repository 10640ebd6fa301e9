//! Session Storage - The single persisted session slot
//!
//! A slot holds one raw JSON record. Decoding and validation happen in the
//! session store, so a slot can hold anything, including garbage.

use libris_core::{storage_error, LibrisResult, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// A single external key-value slot
pub trait SessionSlot: Send + Sync {
    /// Raw contents, or `None` if the slot is empty
    fn read(&self) -> LibrisResult<Option<String>>;

    /// Replace the contents
    fn write(&self, raw: &str) -> LibrisResult<()>;

    /// Empty the slot; clearing an empty slot is not an error
    fn clear(&self) -> LibrisResult<()>;
}

/// Slot kept in process memory
#[derive(Debug, Default)]
pub struct MemorySlot {
    value: Mutex<Option<String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LibrisResult<std::sync::MutexGuard<'_, Option<String>>> {
        self.value
            .lock()
            .map_err(|_| storage_error!("Session slot lock poisoned", "memory_slot"))
    }
}

impl SessionSlot for MemorySlot {
    fn read(&self) -> LibrisResult<Option<String>> {
        Ok(self.lock()?.clone())
    }

    fn write(&self, raw: &str) -> LibrisResult<()> {
        *self.lock()? = Some(raw.to_string());
        Ok(())
    }

    fn clear(&self) -> LibrisResult<()> {
        *self.lock()? = None;
        Ok(())
    }
}

/// Slot stored as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Create a file slot, creating the directory if needed
    pub fn new<P: AsRef<Path>>(dir: P, key: &str) -> LibrisResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let path = dir.join(format!("{}.json", key));
        info!("Session slot at: {}", path.display());

        Ok(Self { path })
    }

    /// Create the slot described by the storage configuration
    pub fn from_config(config: &StorageConfig) -> LibrisResult<Self> {
        Self::new(config.resolved_session_dir(), &config.session_key)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionSlot for FileSlot {
    fn read(&self) -> LibrisResult<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error!(
                format!("Failed to read session slot {}", self.path.display()),
                "file_slot",
                e
            )),
        }
    }

    fn write(&self, raw: &str) -> LibrisResult<()> {
        // Write then rename so a crash never leaves a half-written record.
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, raw)?;
        std::fs::rename(&staging, &self.path)?;

        debug!("Saved session slot {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> LibrisResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Cleared session slot {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_slot_holds_one_value() {
        let slot = MemorySlot::new();
        assert_eq!(slot.read().unwrap(), None);

        slot.write("first").unwrap();
        slot.write("second").unwrap();
        assert_eq!(slot.read().unwrap().as_deref(), Some("second"));

        slot.clear().unwrap();
        slot.clear().unwrap();
        assert_eq!(slot.read().unwrap(), None);
    }

    #[test]
    fn file_slot_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let slot = FileSlot::new(dir.path().join("nested"), "library_session").unwrap();
        assert_eq!(slot.read().unwrap(), None);
        slot.write("{\"k\":1}").unwrap();
        assert!(slot.path().ends_with("library_session.json"));

        let reopened = FileSlot::new(dir.path().join("nested"), "library_session").unwrap();
        assert_eq!(reopened.read().unwrap().as_deref(), Some("{\"k\":1}"));

        reopened.clear().unwrap();
        assert_eq!(slot.read().unwrap(), None);
        assert!(slot.clear().is_ok());
    }
}
