//! Configuration management
//!
//! Session lifetimes, the expiry warning threshold and the poll interval are
//! policy, so they live here rather than as constants in the session code.

use crate::error::{ErrorContext, LibrisError, LibrisResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for any configured session lifetime.
const MAX_TTL_SECS: u64 = 365 * 24 * 3600;

/// Top-level configuration, usually read from `libris.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrisConfig {
    pub session: SessionPolicy,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
    pub gate: GateConfig,
    pub logging: LoggingConfig,
}

/// Session lifetime policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Lifetime of a session created without "remember me"
    pub short_ttl_secs: u64,
    /// Lifetime of a session created with "remember me"
    pub long_ttl_secs: u64,
    /// Remaining time at which the session is reported as expiring
    pub warning_threshold_secs: u64,
    /// Period of the background expiry check
    pub poll_interval_secs: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            short_ttl_secs: 8 * 3600,
            long_ttl_secs: 7 * 24 * 3600,
            warning_threshold_secs: 5 * 60,
            poll_interval_secs: 60,
        }
    }
}

impl SessionPolicy {
    /// TTL to apply for the given "remember me" choice
    pub fn ttl(&self, remember_me: bool) -> chrono::Duration {
        let secs = if remember_me {
            self.long_ttl_secs
        } else {
            self.short_ttl_secs
        };
        chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
    }

    pub fn warning_threshold(&self) -> Duration {
        Duration::from_secs(self.warning_threshold_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Password hashing cost parameters (argon2id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        // argon2 crate defaults (OWASP minimums)
        Self {
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

/// Where the persisted session slot lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key (file stem) of the single session slot
    pub session_key: String,
    /// Directory holding the slot; defaults to the platform data directory
    pub session_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_key: "library_session".to_string(),
            session_dir: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the directory that holds the session slot
    pub fn resolved_session_dir(&self) -> PathBuf {
        self.session_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("libris")
        })
    }
}

/// Authentication gate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Destination for unauthenticated visitors
    pub login_path: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
        }
    }
}

impl LibrisConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> LibrisResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LibrisError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> LibrisResult<Self> {
        let config: LibrisConfig = toml::from_str(content).map_err(|e| LibrisError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> LibrisResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| LibrisError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| LibrisError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> LibrisResult<()> {
        let session = &self.session;

        if session.short_ttl_secs == 0 {
            return Err(invalid(
                "session.short_ttl_secs must be greater than 0",
                "Set session.short_ttl_secs to a positive number of seconds",
            ));
        }

        if session.long_ttl_secs <= session.short_ttl_secs {
            return Err(invalid(
                "session.long_ttl_secs must be longer than session.short_ttl_secs",
                "\"Remember me\" sessions should last materially longer, e.g. days vs. hours",
            ));
        }

        if session.long_ttl_secs > MAX_TTL_SECS {
            return Err(invalid(
                "session.long_ttl_secs must not exceed one year",
                "Lower session.long_ttl_secs",
            ));
        }

        if session.warning_threshold_secs >= session.short_ttl_secs {
            return Err(invalid(
                "session.warning_threshold_secs must be shorter than session.short_ttl_secs",
                "A threshold of 5 to 10 minutes is typical",
            ));
        }

        if session.poll_interval_secs == 0 {
            return Err(invalid(
                "session.poll_interval_secs must be greater than 0",
                "A poll interval of about a minute is typical",
            ));
        }

        let security = &self.security;
        if security.argon2_memory_kib == 0
            || security.argon2_iterations == 0
            || security.argon2_parallelism == 0
        {
            return Err(invalid(
                "security.argon2_* cost parameters must be greater than 0",
                "Remove the [security] section to use the defaults",
            ));
        }

        if self.storage.session_key.trim().is_empty() {
            return Err(invalid(
                "storage.session_key must not be empty",
                "Set storage.session_key, e.g. \"library_session\"",
            ));
        }

        if !self.gate.login_path.starts_with('/') {
            return Err(invalid(
                "gate.login_path must be an absolute path",
                "Set gate.login_path, e.g. \"/login\"",
            ));
        }

        Ok(())
    }
}

fn invalid(message: &str, suggestion: &str) -> LibrisError {
    LibrisError::Config {
        message: message.to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LibrisConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.session.ttl(true) > config.session.ttl(false));
        assert_eq!(config.session.ttl(false), chrono::Duration::hours(8));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = LibrisConfig::from_toml_str(
            r#"
            [session]
            warning_threshold_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.session.warning_threshold_secs, 600);
        assert_eq!(config.session.short_ttl_secs, 8 * 3600);
        assert_eq!(config.gate.login_path, "/login");
    }

    #[test]
    fn rejects_remember_me_not_longer_than_short_ttl() {
        let mut config = LibrisConfig::default();
        config.session.long_ttl_secs = config.session.short_ttl_secs;

        match config.validate() {
            Err(LibrisError::Config { message, context, .. }) => {
                assert!(message.contains("long_ttl_secs"));
                assert_eq!(context.operation.as_deref(), Some("validate"));
                assert!(!context.recovery_suggestions.is_empty());
            }
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_warning_threshold_beyond_ttl() {
        let mut config = LibrisConfig::default();
        config.session.warning_threshold_secs = config.session.short_ttl_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut config = LibrisConfig::default();
        config.session.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
