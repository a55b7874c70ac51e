//! # Error Types
//!
//! Errors raised while locating a process's main image and computing its slide.
//!
//! We use `thiserror` to derive `Error` implementations and messages.

use thiserror::Error;

use crate::types::{Address, ProcessId};

/// Main error type for introspection operations
///
/// ## Error Categories
///
/// 1. **Process errors**: ProcessNotFound, NoSuchProcessName
/// 2. **Permission errors**: PermissionDenied
/// 3. **Image errors**: ImageNotFound, InvalidImage, SlideUnderflow
/// 4. **Input errors**: InvalidArgument
/// 5. **Platform errors**: Unsupported, MachError (macOS-specific)
/// 6. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum AslrError
{
    /// The process with the given PID doesn't exist or has exited
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),

    /// No running process carries the requested name
    #[error("No running process named {0:?}")]
    NoSuchProcessName(String),

    /// Insufficient permissions to inspect the target process
    ///
    /// On macOS, `task_for_pid()` needs root or the
    /// `com.apple.security.cs.debugger` entitlement, and hardened-runtime
    /// targets refuse it regardless.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid argument passed to an introspection function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No region of the process holds a 64-bit `MH_EXECUTE` header
    #[error("No main executable image found in process {0}")]
    ImageNotFound(u32),

    /// The bytes at the image address are not a usable 64-bit Mach-O header
    #[error("Invalid Mach-O image: {0}")]
    InvalidImage(String),

    /// The image is mapped below its preferred `__TEXT` address
    #[error("Image at {load} is below its preferred address {preferred}")]
    SlideUnderflow
    {
        /// Runtime address of the header
        load: Address,
        /// Link-time `__TEXT` address
        preferred: Address,
    },

    /// The current platform has no native introspection backend
    #[error("Unsupported platform: {0}")]
    Unsupported(&'static str),

    /// macOS-specific Mach API error
    #[cfg(target_os = "macos")]
    #[error("Mach API error: {0}")]
    MachError(#[from] crate::platform::macos::error::MachError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AslrError
{
    /// Shorthand for a [`AslrError::ProcessNotFound`] from a typed PID
    pub fn process_not_found(pid: ProcessId) -> Self
    {
        AslrError::ProcessNotFound(pid.0)
    }
}

/// Convenience type alias for `Result<T, AslrError>`
///
/// ```rust
/// use aslr_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, AslrError>;
