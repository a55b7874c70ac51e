//! # macOS Mach API FFI Declarations
//!
//! `extern "C"` declarations for the Mach calls we bind ourselves rather than
//! through `mach2`. Everything here is wrapped in a safe API elsewhere.

use libc::{c_int, kern_return_t, mach_port_t};

#[link(name = "c", kind = "dylib")]
extern "C" {
    /// Get a send right to the task port of the process with the given PID
    ///
    /// Requires root or the `com.apple.security.cs.debugger` entitlement, and
    /// fails for hardened-runtime targets without `get-task-allow`.
    ///
    /// ## Returns
    ///
    /// - `KERN_SUCCESS` (0) on success, with `*task` set
    /// - `KERN_PROTECTION_FAILURE` if permission is denied
    /// - `KERN_FAILURE` if the process does not exist (or, on some releases, if permission is denied)
    ///
    /// ## Safety
    ///
    /// `task` must be valid for writes. The returned right must be released
    /// with `mach_port_deallocate()`.
    ///
    /// `task_for_pid` is not publicly documented; see `osfmk/kern/task.c` in the
    /// [XNU sources](https://github.com/apple-oss-distributions/xnu).
    pub fn task_for_pid(target_task: mach_port_t, pid: c_int, task: *mut mach_port_t) -> kern_return_t;
}
