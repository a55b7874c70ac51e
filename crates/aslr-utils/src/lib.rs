//! # get_aslr utilities
//!
//! Shared logging and configuration helpers for the `get_aslr` workspace.
//!
//! Logging is built on `tracing`. Every record is written to standard error,
//! leaving standard output to the tool's single result line.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    LogFormat, LogLevel, LoggingConfig, LoggingError, LoggingGuard, console_subscriber, init_logging, init_logging_with,
};
pub use tracing::{debug, error, info, trace, warn};
