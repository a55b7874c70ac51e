//! # macOS Mach API Errors
//!
//! Mach APIs return `kern_return_t` codes. This module turns the ones we meet
//! into a Rust error type with descriptive messages.

use mach2::kern_return::{
    kern_return_t, KERN_FAILURE, KERN_INVALID_ADDRESS, KERN_INVALID_ARGUMENT, KERN_NO_SPACE, KERN_PROTECTION_FAILURE,
};
use thiserror::Error;

/// Mach kernel API error
///
/// ## References
///
/// - [kern_return_t documentation](https://developer.apple.com/documentation/kernel/kern_return_t)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachError
{
    /// `KERN_PROTECTION_FAILURE` (2)
    ///
    /// Blocked by the security policy: not root, no debugger entitlement, SIP
    /// or a hardened-runtime target.
    #[error("KERN_PROTECTION_FAILURE: Permission denied")]
    ProtectionFailure,

    /// `KERN_INVALID_ARGUMENT` (4)
    #[error("KERN_INVALID_ARGUMENT: Invalid PID or argument")]
    InvalidArgument,

    /// `KERN_INVALID_ADDRESS` (1)
    ///
    /// The address is not mapped in the target task.
    #[error("KERN_INVALID_ADDRESS: Address not mapped")]
    InvalidAddress,

    /// `KERN_NO_SPACE` (3)
    #[error("KERN_NO_SPACE: No region at or above the address")]
    NoSpace,

    /// `KERN_FAILURE` (5)
    ///
    /// `task_for_pid()` answers this both for missing processes and, on some
    /// releases, for permission problems. `TaskPort::for_pid` tells the two apart.
    #[error("KERN_FAILURE: Process not found")]
    ProcessNotFound,

    /// Any other code, preserved so it can be looked up
    #[error("Unknown Mach error: {0}")]
    Unknown(i32),
}

impl MachError
{
    /// Turn a return code into `Ok(())` or the matching error.
    ///
    /// ```rust,no_run
    /// use aslr_core::platform::macos::error::MachError;
    /// use mach2::kern_return::{KERN_INVALID_ADDRESS, KERN_SUCCESS};
    ///
    /// assert!(MachError::check(KERN_SUCCESS).is_ok());
    /// assert_eq!(MachError::check(KERN_INVALID_ADDRESS), Err(MachError::InvalidAddress));
    /// ```
    pub fn check(code: kern_return_t) -> Result<(), MachError>
    {
        if code == mach2::kern_return::KERN_SUCCESS {
            Ok(())
        } else {
            Err(MachError::from(code))
        }
    }
}

impl From<kern_return_t> for MachError
{
    fn from(code: kern_return_t) -> Self
    {
        match code {
            KERN_PROTECTION_FAILURE => MachError::ProtectionFailure,
            KERN_INVALID_ARGUMENT => MachError::InvalidArgument,
            KERN_INVALID_ADDRESS => MachError::InvalidAddress,
            KERN_NO_SPACE => MachError::NoSpace,
            KERN_FAILURE => MachError::ProcessNotFound,
            _ => MachError::Unknown(code),
        }
    }
}
