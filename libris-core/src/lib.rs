//! Libris Core - Shared foundation for the library back office
//!
//! This crate holds the pieces every other libris crate builds on: the time
//! source, the unified error type, configuration and logging.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use logging::*;

// Re-export commonly used external types
pub use chrono;
pub use tracing;
