//! # macOS Introspection Backend
//!
//! Locates the main executable of a process and computes its slide through
//! Mach APIs.
//!
//! On macOS a process is a Mach **task**. Holding a send right to its task port
//! (from `task_for_pid()`) lets us walk its address space and copy memory out
//! of it, which is all the slide computation needs.
//!
//! ## Key Mach APIs Used
//!
//! - `task_for_pid()`: Get a Mach port to a process (declared in [`ffi`])
//! - `mach_vm_region_recurse()`: Walk the address space (from `mach2`)
//! - `mach_vm_read_overwrite()`: Copy memory out of the task (from `mach2`)
//! - `mach_vm_write()` / `mach_vm_protect()`: Patch memory in the task (from `mach2`)
//! - `mach_port_deallocate()`: Release the task port (from `mach2`)
//!
//! Process names and start times come from `libproc`.
//!
//! ## References
//!
//! - [Apple Mach Kernel Programming](https://developer.apple.com/library/archive/documentation/Darwin/Conceptual/KernelProgramming/Mach/Mach.html)
//! - [XNU Kernel Source](https://github.com/apple-oss-distributions/xnu)

pub mod error;
pub mod ffi;
pub mod inspector;
pub mod memory;
pub mod process;
pub mod task;

pub use inspector::MachInspector;
pub use memory::TaskMemory;
pub use task::TaskPort;
