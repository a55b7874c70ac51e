//! # Types
//!
//! Platform-agnostic types shared by the locator, the slide calculator and the CLI.
//!
//! These types keep pids, addresses and slides apart at the type level, so a
//! slide can never be passed where a load address is expected.

pub mod address;
pub mod process;

// Re-export all public types
pub use address::{Address, Slide};
pub use process::{ParsePidError, ProcessId, ProcessSelector};
