//! Stand-in inspector for platforms without a native backend.

use crate::error::{AslrError, Result};
use crate::inspector::{ImageLocator, SlideCalculator};
use crate::memory::{AddressRange, ProcessMemory, Protection};
use crate::types::{Address, ProcessId, Slide};

/// Inspector that fails every request with [`AslrError::Unsupported`]
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedInspector;

impl ImageLocator for UnsupportedInspector
{
    fn find_main_binary(&self, _pid: ProcessId) -> Result<Address>
    {
        Err(AslrError::Unsupported(std::env::consts::OS))
    }
}

impl SlideCalculator for UnsupportedInspector
{
    fn compute_slide(&self, _image: Address, _pid: ProcessId) -> Result<Slide>
    {
        Err(AslrError::Unsupported(std::env::consts::OS))
    }
}

impl ProcessMemory for UnsupportedInspector
{
    fn read(&self, _range: AddressRange) -> Result<Vec<u8>>
    {
        Err(AslrError::Unsupported(std::env::consts::OS))
    }

    fn write(&self, _address: Address, _bytes: &[u8]) -> Result<()>
    {
        Err(AslrError::Unsupported(std::env::consts::OS))
    }

    fn protect(&self, _range: AddressRange, _protection: Protection) -> Result<()>
    {
        Err(AslrError::Unsupported(std::env::consts::OS))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_every_request_fails()
    {
        let inspector = UnsupportedInspector;
        assert!(matches!(
            inspector.find_main_binary(ProcessId(1)),
            Err(AslrError::Unsupported(_))
        ));
        assert!(matches!(
            inspector.compute_slide(Address::ZERO, ProcessId(1)),
            Err(AslrError::Unsupported(_))
        ));
        assert!(matches!(
            crate::memory::patch(&inspector, Address::ZERO, &[0], &[1]),
            Err(crate::memory::PatchError::Access(AslrError::Unsupported(_)))
        ));
    }
}
