//! Common module for library exports

pub use crate::error::{AslrError, Result};
pub use crate::inspector::{locate_slide, ImageLocator, LookupFailure, SlideCalculator, SlideReport};
pub use crate::macho::MachImage;
pub use crate::memory::{patch, read_at, AddressRange, PatchError, ProcessMemory, Protection};
pub use crate::platform::{native_inspector, native_memory, resolve_selector, NativeInspector, NativeMemory};
pub use crate::types::{Address, ProcessId, ProcessSelector, Slide};
