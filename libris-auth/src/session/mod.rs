//! Session Management Module
//!
//! Session issuance and persistence in a single slot, plus the monitor that
//! ends a session when it expires.

pub mod monitor;
pub mod storage;
pub mod store;
pub mod types;

pub use monitor::{SessionMonitor, TimerHandle};
pub use storage::{FileSlot, MemorySlot, SessionSlot};
pub use store::SessionStore;
pub use types::*;
