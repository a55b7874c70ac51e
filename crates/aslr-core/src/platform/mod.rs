//! # Platform-Specific Implementations
//!
//! Native implementations of [`ImageLocator`], [`SlideCalculator`] and [`ProcessMemory`].
//!
//! - **macOS**: Mach task ports (`task_for_pid`, `mach_vm_region_recurse`, `mach_vm_read_overwrite`)
//! - **everything else**: [`unsupported::UnsupportedInspector`], which fails every request
//!
//! [`ImageLocator`]: crate::inspector::ImageLocator
//! [`SlideCalculator`]: crate::inspector::SlideCalculator
//! [`ProcessMemory`]: crate::memory::ProcessMemory

#[cfg(target_os = "macos")]
pub mod macos;
pub mod unsupported;

use tracing::debug;

use crate::error::{AslrError, Result};
use crate::types::{ProcessId, ProcessSelector};

/// Inspector backed by this platform's native APIs
#[cfg(target_os = "macos")]
pub type NativeInspector = macos::MachInspector;

/// Inspector backed by this platform's native APIs
#[cfg(not(target_os = "macos"))]
pub type NativeInspector = unsupported::UnsupportedInspector;

/// Create the native inspector for this platform
pub fn native_inspector() -> NativeInspector
{
    NativeInspector::default()
}

/// Memory access backed by this platform's native APIs
#[cfg(target_os = "macos")]
pub type NativeMemory = macos::TaskMemory;

/// Memory access backed by this platform's native APIs
#[cfg(not(target_os = "macos"))]
pub type NativeMemory = unsupported::UnsupportedInspector;

/// Open the memory of `pid` for reading and patching.
///
/// ## Errors
///
/// On macOS, fails like [`macos::TaskPort::for_pid`]. Elsewhere always
/// returns `Unsupported`.
#[cfg(target_os = "macos")]
pub fn native_memory(pid: ProcessId) -> Result<NativeMemory>
{
    macos::TaskMemory::attach(pid)
}

/// Open the memory of `pid` for reading and patching.
///
/// ## Errors
///
/// Always returns `Unsupported`: there is no memory backend here.
#[cfg(not(target_os = "macos"))]
pub fn native_memory(_pid: ProcessId) -> Result<NativeMemory>
{
    Err(AslrError::Unsupported(std::env::consts::OS))
}

/// Find the oldest running process with the given name (case-insensitive, exact).
///
/// ## Errors
///
/// Returns `NoSuchProcessName` when nothing matches, or an `Io` error if the
/// process table cannot be listed.
#[cfg(target_os = "macos")]
pub fn find_process_by_name(name: &str) -> Result<ProcessId>
{
    crate::process::pick_oldest(macos::process::running_processes()?, name)
        .ok_or_else(|| AslrError::NoSuchProcessName(name.to_string()))
}

/// Find the oldest running process with the given name.
///
/// ## Errors
///
/// Always returns `Unsupported`: there is no process table backend here.
#[cfg(not(target_os = "macos"))]
pub fn find_process_by_name(_name: &str) -> Result<ProcessId>
{
    Err(AslrError::Unsupported(std::env::consts::OS))
}

/// Turn a selector into a concrete PID.
///
/// ## Errors
///
/// Propagates [`find_process_by_name`] failures for [`ProcessSelector::Name`].
pub fn resolve_selector(selector: &ProcessSelector) -> Result<ProcessId>
{
    let pid = match selector {
        ProcessSelector::Pid(pid) => *pid,
        ProcessSelector::Current => ProcessId::current(),
        ProcessSelector::Name(name) => find_process_by_name(name)?,
    };
    debug!(%selector, %pid, "resolved process");
    Ok(pid)
}
