//! Privilege check.
//!
//! Inspecting another process's memory needs root (or a debugger
//! entitlement). The CLI only warns when it is not elevated; the real check
//! happens when the kernel answers `task_for_pid()`.

/// Whether the effective user is root
pub fn is_elevated() -> bool
{
    effective_uid() == 0
}

/// Effective user id of the calling process
#[cfg(unix)]
#[allow(unsafe_code)] // geteuid() has no preconditions
pub fn effective_uid() -> u32
{
    unsafe { libc::geteuid() }
}

/// Effective user id of the calling process
///
/// There are no uids off Unix; report an unprivileged user.
#[cfg(not(unix))]
pub fn effective_uid() -> u32
{
    u32::MAX
}
