//! # Collaborator Traits
//!
//! The two questions `get_aslr` asks of the operating system, expressed as
//! traits so that callers can swap the native backend for fakes:
//!
//! - [`ImageLocator`]: where is the main executable mapped?
//! - [`SlideCalculator`]: how far did ASLR move it?
//!
//! [`locate_slide`] runs both in sequence and keeps track of which step failed.

use tracing::{debug, instrument};

use crate::error::{AslrError, Result};
use crate::types::{Address, ProcessId, Slide};

/// Finds the main binary image of a process
pub trait ImageLocator
{
    /// Return the runtime address of the main executable's Mach-O header.
    ///
    /// ## Errors
    ///
    /// Implementations return an error when the process cannot be inspected or
    /// no main image is found.
    fn find_main_binary(&self, pid: ProcessId) -> Result<Address>;
}

/// Computes the ASLR slide of an image loaded in a process
pub trait SlideCalculator
{
    /// Return the slide of the image whose header sits at `image`.
    ///
    /// ## Errors
    ///
    /// Implementations return an error when the header cannot be read or parsed.
    fn compute_slide(&self, image: Address, pid: ProcessId) -> Result<Slide>;
}

impl<T: ImageLocator + ?Sized> ImageLocator for &T
{
    fn find_main_binary(&self, pid: ProcessId) -> Result<Address>
    {
        (**self).find_main_binary(pid)
    }
}

impl<T: ImageLocator + ?Sized> ImageLocator for Box<T>
{
    fn find_main_binary(&self, pid: ProcessId) -> Result<Address>
    {
        (**self).find_main_binary(pid)
    }
}

impl<T: SlideCalculator + ?Sized> SlideCalculator for &T
{
    fn compute_slide(&self, image: Address, pid: ProcessId) -> Result<Slide>
    {
        (**self).compute_slide(image, pid)
    }
}

impl<T: SlideCalculator + ?Sized> SlideCalculator for Box<T>
{
    fn compute_slide(&self, image: Address, pid: ProcessId) -> Result<Slide>
    {
        (**self).compute_slide(image, pid)
    }
}

/// Outcome of a successful lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideReport
{
    /// Inspected process
    pub pid: ProcessId,
    /// Runtime address of the main image's header
    pub image_address: Address,
    /// ASLR slide of the main image
    pub slide: Slide,
}

/// Which of the two steps failed
#[derive(Debug)]
pub enum LookupFailure
{
    /// [`ImageLocator::find_main_binary`] failed
    Image(AslrError),
    /// [`SlideCalculator::compute_slide`] failed for the image at the given address
    Slide(Address, AslrError),
}

impl LookupFailure
{
    /// The underlying error, whichever step produced it
    pub fn into_error(self) -> AslrError
    {
        match self {
            LookupFailure::Image(err) | LookupFailure::Slide(_, err) => err,
        }
    }
}

/// Locate the main image of `pid` and compute its slide.
///
/// Each collaborator is called exactly once; there are no retries.
///
/// ## Errors
///
/// Returns [`LookupFailure::Image`] if the locator fails, in which case the
/// calculator is never called, and [`LookupFailure::Slide`] if the calculator fails.
#[instrument(level = "debug", skip(locator, calculator))]
pub fn locate_slide<L, C>(pid: ProcessId, locator: &L, calculator: &C) -> std::result::Result<SlideReport, LookupFailure>
where
    L: ImageLocator + ?Sized,
    C: SlideCalculator + ?Sized,
{
    let image_address = locator.find_main_binary(pid).map_err(LookupFailure::Image)?;
    debug!(%image_address, "found main binary header");

    let slide = calculator
        .compute_slide(image_address, pid)
        .map_err(|err| LookupFailure::Slide(image_address, err))?;
    debug!(%slide, "computed slide");

    Ok(SlideReport {
        pid,
        image_address,
        slide,
    })
}

#[cfg(test)]
mod tests
{
    use std::cell::Cell;

    use super::*;

    struct FixedLocator(Option<u64>);

    impl ImageLocator for FixedLocator
    {
        fn find_main_binary(&self, pid: ProcessId) -> Result<Address>
        {
            self.0.map(Address::new).ok_or(AslrError::ImageNotFound(pid.0))
        }
    }

    struct CountingCalculator
    {
        calls: Cell<usize>,
        slide: Option<u64>,
    }

    impl SlideCalculator for CountingCalculator
    {
        fn compute_slide(&self, _image: Address, _pid: ProcessId) -> Result<Slide>
        {
            self.calls.set(self.calls.get() + 1);
            self.slide
                .map(Slide::new)
                .ok_or_else(|| AslrError::InvalidImage("bad magic".to_string()))
        }
    }

    #[test]
    fn test_locate_slide_success()
    {
        let calculator = CountingCalculator {
            calls: Cell::new(0),
            slide: Some(0x4000),
        };
        let report = locate_slide(ProcessId(7), &FixedLocator(Some(0x1_0000_4000)), &calculator).unwrap();
        assert_eq!(report.pid, ProcessId(7));
        assert_eq!(report.image_address, Address::new(0x1_0000_4000));
        assert_eq!(report.slide, Slide::new(0x4000));
        assert_eq!(calculator.calls.get(), 1);
    }

    #[test]
    fn test_locator_failure_skips_calculator()
    {
        let calculator = CountingCalculator {
            calls: Cell::new(0),
            slide: Some(0),
        };
        let failure = locate_slide(ProcessId(7), &FixedLocator(None), &calculator).unwrap_err();
        assert!(matches!(failure, LookupFailure::Image(AslrError::ImageNotFound(7))));
        assert_eq!(calculator.calls.get(), 0);
    }

    #[test]
    fn test_calculator_failure_keeps_address()
    {
        let calculator = CountingCalculator {
            calls: Cell::new(0),
            slide: None,
        };
        let failure = locate_slide(ProcessId(7), &FixedLocator(Some(0x2000)), &calculator).unwrap_err();
        match failure {
            LookupFailure::Slide(address, AslrError::InvalidImage(_)) => assert_eq!(address, Address::new(0x2000)),
            other => panic!("unexpected failure: {other:?}"),
        }
    }

    #[test]
    fn test_boxed_collaborators()
    {
        let locator: Box<dyn ImageLocator> = Box::new(FixedLocator(Some(0x1000)));
        let calculator: Box<dyn SlideCalculator> = Box::new(CountingCalculator {
            calls: Cell::new(0),
            slide: Some(0x10),
        });
        let report = locate_slide(ProcessId(1), &locator, &calculator).unwrap();
        assert_eq!(report.slide, Slide::new(0x10));
    }
}
