//! # Task Ports
//!
//! Owned send rights to another process's Mach task port.

use mach2::kern_return::KERN_SUCCESS;
use mach2::mach_port::mach_port_deallocate;
use mach2::port::{mach_port_t, MACH_PORT_NULL};
use mach2::traps::mach_task_self;
use tracing::{debug, trace};

use crate::error::{AslrError, Result};
use crate::platform::macos::error::MachError;
use crate::platform::macos::ffi;
use crate::types::ProcessId;

/// Send right to a task port, released on drop
///
/// ## Example
///
/// ```rust,no_run
/// use aslr_core::platform::macos::TaskPort;
/// use aslr_core::types::ProcessId;
///
/// let task = TaskPort::for_pid(ProcessId(12345))?;
/// println!("task port {} for pid {}", task.raw(), task.pid());
/// # Ok::<(), aslr_core::error::AslrError>(())
/// ```
#[derive(Debug)]
pub struct TaskPort
{
    port: mach_port_t,
    pid: ProcessId,
}

impl TaskPort
{
    /// Acquire the task port of `pid`
    ///
    /// ## Errors
    ///
    /// - `ProcessNotFound`: the PID does not name a live process
    /// - `PermissionDenied`: the process exists but `task_for_pid()` refused
    /// - `MachError`: any other `task_for_pid()` failure
    #[allow(unsafe_code)] // task_for_pid() and kill() are plain FFI calls
    pub fn for_pid(pid: ProcessId) -> Result<Self>
    {
        let raw_pid = pid.as_raw().ok_or_else(|| AslrError::process_not_found(pid))?;

        let mut port: mach_port_t = MACH_PORT_NULL;
        let result = unsafe { ffi::task_for_pid(mach_task_self(), raw_pid, &mut port) };

        if result != KERN_SUCCESS {
            debug!(%pid, code = result, "task_for_pid failed");
            return Err(match MachError::from(result) {
                MachError::ProtectionFailure => AslrError::PermissionDenied(format!(
                    "task_for_pid() refused access to process {pid}. Try running as root."
                )),
                // KERN_FAILURE is ambiguous; kill(pid, 0) tells whether the process exists.
                MachError::ProcessNotFound => {
                    if unsafe { libc::kill(raw_pid, 0) } == 0 {
                        AslrError::PermissionDenied(format!(
                            "task_for_pid() failed with KERN_FAILURE, but process {pid} exists. This usually means \
                             insufficient permissions or a hardened-runtime target."
                        ))
                    } else {
                        AslrError::process_not_found(pid)
                    }
                }
                other => AslrError::MachError(other),
            });
        }

        trace!(%pid, port, "acquired task port");
        Ok(Self { port, pid })
    }

    /// Raw port name, valid for as long as `self` lives
    pub fn raw(&self) -> mach_port_t
    {
        self.port
    }

    /// PID the port was acquired for
    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }
}

impl Drop for TaskPort
{
    #[allow(unsafe_code)] // releases the right acquired in for_pid()
    fn drop(&mut self)
    {
        if self.port != MACH_PORT_NULL {
            // Best effort - nothing useful to do if the right is already gone
            let _ = unsafe { mach_port_deallocate(mach_task_self(), self.port) };
        }
    }
}
