//! # aslr-core
//!
//! Process introspection primitives behind `get_aslr`.
//!
//! This crate answers two questions about a running process:
//! - Where is its main executable image mapped? ([`ImageLocator`])
//! - How far did ASLR slide that image from its preferred address? ([`SlideCalculator`])
//!
//! Both are traits so the CLI can be driven by fakes in tests;
//! [`platform::native_inspector`] returns the real implementation.
//!
//! [`memory`] adds reading, writing and verified patching of another
//! process's memory through the same kind of seam ([`ProcessMemory`]).
//!
//! ## Platform Support
//!
//! - **macOS**: Uses Mach APIs (`task_for_pid`, `mach_vm_region_recurse`, `mach_vm_read_overwrite`)
//! - **Other platforms**: the native inspector reports [`AslrError::Unsupported`]
//!
//! ## Why unsafe code is needed
//!
//! Reading another task's memory means calling Mach APIs directly. Those calls
//! are wrapped in safe functions in [`platform::macos`]; nothing unsafe leaks
//! out of this crate's public API.

#![allow(unsafe_code)] // Required for Mach and libc calls

pub mod error;
pub mod inspector;
pub mod macho;
pub mod memory;
pub mod platform;
pub mod prelude;
pub mod privileges;
pub mod process;
pub mod types;

pub use error::{AslrError, Result};
pub use inspector::{locate_slide, ImageLocator, LookupFailure, SlideCalculator, SlideReport};
pub use memory::{AddressRange, PatchError, ProcessMemory, Protection};
pub use platform::{native_inspector, native_memory, NativeInspector, NativeMemory};
// Re-export commonly used types
pub use types::{Address, ProcessId, ProcessSelector, Slide};
