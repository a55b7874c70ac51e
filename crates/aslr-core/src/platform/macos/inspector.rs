//! Mach-backed [`ImageLocator`] and [`SlideCalculator`].

use tracing::{debug, trace};

use crate::error::{AslrError, Result};
use crate::inspector::{ImageLocator, SlideCalculator};
use crate::macho::{self, MachImage, MachKind, MACH_HEADER_64_SIZE};
use crate::platform::macos::memory::{self, read_exact, Region};
use crate::platform::macos::task::TaskPort;
use crate::types::{Address, ProcessId, Slide};

/// Inspector that reads the target's memory through its task port
///
/// Every call acquires its own task port and releases it before returning.
///
/// ## Example
///
/// ```rust,no_run
/// use aslr_core::inspector::locate_slide;
/// use aslr_core::platform::macos::MachInspector;
/// use aslr_core::types::ProcessId;
///
/// let inspector = MachInspector::new();
/// let report = locate_slide(ProcessId(12345), &inspector, &inspector).map_err(|f| f.into_error())?;
/// println!("{}", report.slide);
/// # Ok::<(), aslr_core::error::AslrError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MachInspector;

impl MachInspector
{
    /// Create an inspector
    pub fn new() -> Self
    {
        Self
    }

    /// Read and parse the Mach-O header at `address`.
    ///
    /// ## Errors
    ///
    /// Returns `MachError` for unreadable memory and `InvalidImage` when the
    /// bytes are not a 64-bit Mach-O header.
    pub fn read_image(task: &TaskPort, address: Address) -> Result<MachImage>
    {
        let header = read_exact(task, address, MACH_HEADER_64_SIZE)?;
        let span = macho::header_span(&header)?;
        let bytes = read_exact(task, address, span)?;
        MachImage::parse(&bytes)
    }

    /// Whether `region` starts with a 64-bit main-executable header.
    fn holds_main_binary(task: &TaskPort, region: &Region) -> bool
    {
        if !region.is_readable() || region.size() < MACH_HEADER_64_SIZE as u64 {
            return false;
        }

        let Ok(magic) = read_exact(task, region.start, 4) else {
            return false;
        };
        if macho::mach_kind(&magic) != Some(MachKind::Image64) {
            return false;
        }

        match Self::read_image(task, region.start) {
            Ok(image) => image.is_executable(),
            Err(err) => {
                trace!(start = %region.start, %err, "skipping unparseable header");
                false
            }
        }
    }
}

impl ImageLocator for MachInspector
{
    /// Walk the address space from the bottom up and return the first region
    /// that starts with an `MH_EXECUTE` header.
    fn find_main_binary(&self, pid: ProcessId) -> Result<Address>
    {
        let task = TaskPort::for_pid(pid)?;
        let regions = memory::regions(&task)?;
        debug!(%pid, regions = regions.len(), page_size = memory::page_size(), "scanning for main binary");

        regions
            .iter()
            .find(|region| Self::holds_main_binary(&task, region))
            .map(|region| {
                debug!(start = %region.start, size = region.size(), perms = %region.permissions(), tag = region.user_tag, "main binary region");
                region.start
            })
            .ok_or(AslrError::ImageNotFound(pid.0))
    }
}

impl SlideCalculator for MachInspector
{
    fn compute_slide(&self, image: Address, pid: ProcessId) -> Result<Slide>
    {
        let task = TaskPort::for_pid(pid)?;
        let parsed = Self::read_image(&task, image)?;
        debug!(
            %pid,
            base = %image,
            image_size = parsed.image_size(),
            segments = parsed.segments().len(),
            "parsed main binary header"
        );
        parsed.slide_for(image)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::inspector::locate_slide;

    #[test]
    fn test_own_process()
    {
        let inspector = MachInspector::new();
        match locate_slide(ProcessId::current(), &inspector, &inspector) {
            Ok(report) => {
                // Our own header is mapped where the report says
                assert!(report.image_address.value() >= report.slide.value());
            }
            Err(failure) => {
                // No task_for_pid() rights in this environment
                let err = failure.into_error();
                assert!(matches!(
                    err,
                    AslrError::PermissionDenied(_) | AslrError::MachError(_) | AslrError::ProcessNotFound(_)
                ));
            }
        }
    }
}
