//! Memory address and slide types.

use std::fmt;

/// Strongly typed memory address in the target process
///
/// This wrapper around `u64` keeps addresses apart from sizes, counts and
/// slides.
///
/// ## Example
///
/// ```rust
/// use aslr_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr.checked_add(0x100).unwrap();
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// ```rust
    /// use aslr_core::types::Address;
    ///
    /// const DEFAULT_BASE: Address = Address::new(0x1_0000_0000);
    /// assert_eq!(DEFAULT_BASE.value(), 0x1_0000_0000);
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use aslr_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Parse a hexadecimal address, with or without a `0x` prefix.
    ///
    /// ```rust
    /// use aslr_core::types::Address;
    ///
    /// assert_eq!(Address::from_hex("0x1F40"), Some(Address::new(0x1f40)));
    /// assert_eq!(Address::from_hex("1f40"), Some(Address::new(0x1f40)));
    /// assert_eq!(Address::from_hex("0xZZ"), None);
    /// ```
    pub fn from_hex(s: &str) -> Option<Self>
    {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(digits, 16).ok().map(Address)
    }

    /// Distance from `preferred` up to this address, if this address is not below it.
    ///
    /// This is the slide of an image whose preferred base is `preferred` and
    /// which was found loaded at `self`.
    ///
    /// ```rust
    /// use aslr_core::types::{Address, Slide};
    ///
    /// let loaded = Address::new(0x1_0a2b_c000);
    /// assert_eq!(loaded.slide_from(Address::new(0x1_0000_0000)), Some(Slide::new(0xa2b_c000)));
    /// assert_eq!(Address::ZERO.slide_from(loaded), None);
    /// ```
    pub fn slide_from(self, preferred: Address) -> Option<Slide>
    {
        self.0.checked_sub(preferred.0).map(Slide)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// ASLR slide of an image
///
/// The offset between where an image was linked to run and where the kernel
/// actually mapped it. Displays as unpadded lowercase hex with a `0x` prefix,
/// which is exactly what `get_aslr` prints.
///
/// ```rust
/// use aslr_core::types::Slide;
///
/// assert_eq!(Slide::new(0x1_0000_0000).to_string(), "0x100000000");
/// assert_eq!(Slide::ZERO.to_string(), "0x0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Slide(u64);

impl Slide
{
    /// No slide: the image sits at its preferred address.
    pub const ZERO: Self = Slide(0);

    /// Create a slide from a raw offset
    pub const fn new(value: u64) -> Self
    {
        Slide(value)
    }

    /// Get the raw offset
    pub const fn value(self) -> u64
    {
        self.0
    }
}

impl From<u64> for Slide
{
    fn from(value: u64) -> Self
    {
        Slide(value)
    }
}

impl From<Slide> for u64
{
    fn from(slide: Slide) -> Self
    {
        slide.0
    }
}

impl fmt::Display for Slide
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for Slide
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
