//! # Process Memory Access
//!
//! Reading, writing and patching the memory of another process.
//!
//! [`ProcessMemory`] is the platform seam: the macOS backend implements it
//! over a task port ([`crate::platform::macos::memory::TaskMemory`]). The
//! helpers in this module ([`read_at`], [`patch`], [`patch_hex`]) only talk to
//! the trait, so they can be driven by an in-memory fake.
//!
//! ## Patching
//!
//! A patch replaces a known byte sequence with another of the same length:
//!
//! 1. The range is made readable, writable and executable.
//! 2. The current bytes are read. If they already equal the replacement the
//!    patch is refused as [`PatchError::AlreadyPatched`]; if they differ from
//!    the expected bytes it is refused as [`PatchError::MemoryNotExpected`].
//! 3. The replacement is written and read back. A mismatch is
//!    [`PatchError::MemoryNotPatched`].

use std::fmt;
use std::ops::BitOr;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::{AslrError, Result};
use crate::types::Address;

/// VM protection bits (`VM_PROT_*`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Protection(i32);

impl Protection
{
    /// No access (`VM_PROT_NONE`)
    pub const NONE: Self = Protection(0);
    /// Readable (`VM_PROT_READ`)
    pub const READ: Self = Protection(1);
    /// Writable (`VM_PROT_WRITE`)
    pub const WRITE: Self = Protection(2);
    /// Executable (`VM_PROT_EXECUTE`)
    pub const EXECUTE: Self = Protection(4);
    /// Read, write and execute
    pub const ALL: Self = Protection(7);

    /// Wrap raw `vm_prot_t` bits
    pub const fn from_bits(bits: i32) -> Self
    {
        Protection(bits)
    }

    /// Raw `vm_prot_t` bits
    pub const fn bits(self) -> i32
    {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Protection) -> bool
    {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Protection
{
    type Output = Protection;

    fn bitor(self, rhs: Self) -> Self::Output
    {
        Protection(self.0 | rhs.0)
    }
}

impl fmt::Display for Protection
{
    /// `rwx` notation, e.g. `r-x`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for (bit, ch) in [(Self::READ, 'r'), (Self::WRITE, 'w'), (Self::EXECUTE, 'x')] {
            write!(f, "{}", if self.contains(bit) { ch } else { '-' })?;
        }
        Ok(())
    }
}

/// A contiguous range of addresses in the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange
{
    /// First address
    pub start: Address,
    /// Length in bytes
    pub size: u64,
}

impl AddressRange
{
    /// Range of `size` bytes starting at `start`
    pub const fn new(start: Address, size: u64) -> Self
    {
        Self { start, size }
    }

    /// Range covering `start..=end`.
    ///
    /// Returns `None` unless `end` is above `start`.
    ///
    /// ```rust
    /// use aslr_core::memory::AddressRange;
    /// use aslr_core::types::Address;
    ///
    /// let range = AddressRange::from_bounds(Address::new(0x1000), Address::new(0x100f)).unwrap();
    /// assert_eq!(range.size, 0x10);
    /// assert!(AddressRange::from_bounds(Address::new(0x1000), Address::new(0x1000)).is_none());
    /// ```
    pub fn from_bounds(start: Address, end: Address) -> Option<Self>
    {
        if end <= start {
            return None;
        }
        Some(Self::new(start, end.value() - start.value() + 1))
    }

    /// One past the last address, or `None` if the range wraps
    pub fn end(&self) -> Option<Address>
    {
        self.start.checked_add(self.size)
    }

    /// Length as a buffer size.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidArgument` if the range wraps the address space or does
    /// not fit in memory on this host.
    pub fn len(&self) -> Result<usize>
    {
        if self.end().is_none() {
            return Err(AslrError::InvalidArgument(format!(
                "range of {:#x} bytes at {} wraps the address space",
                self.size, self.start
            )));
        }
        usize::try_from(self.size)
            .map_err(|_| AslrError::InvalidArgument(format!("range of {:#x} bytes is too large", self.size)))
    }

    /// Whether the range holds no bytes
    pub fn is_empty(&self) -> bool
    {
        self.size == 0
    }
}

impl fmt::Display for AddressRange
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}+{:#x}", self.start, self.size)
    }
}

/// Read and write access to another process's memory
pub trait ProcessMemory
{
    /// Read every byte of `range`.
    ///
    /// ## Errors
    ///
    /// Implementations fail when any part of the range is unreadable.
    fn read(&self, range: AddressRange) -> Result<Vec<u8>>;

    /// Write `bytes` starting at `address`.
    ///
    /// ## Errors
    ///
    /// Implementations fail when the destination is not writable.
    fn write(&self, address: Address, bytes: &[u8]) -> Result<()>;

    /// Set the current protection of `range`.
    ///
    /// ## Errors
    ///
    /// Implementations fail when the protection exceeds what the region allows.
    fn protect(&self, range: AddressRange, protection: Protection) -> Result<()>;
}

impl<T: ProcessMemory + ?Sized> ProcessMemory for &T
{
    fn read(&self, range: AddressRange) -> Result<Vec<u8>>
    {
        (**self).read(range)
    }

    fn write(&self, address: Address, bytes: &[u8]) -> Result<()>
    {
        (**self).write(address, bytes)
    }

    fn protect(&self, range: AddressRange, protection: Protection) -> Result<()>
    {
        (**self).protect(range, protection)
    }
}

/// Why a patch was refused or failed
#[derive(Error, Debug)]
pub enum PatchError
{
    /// Expected and replacement bytes differ in length
    #[error("Expected memory ({expected} bytes) and patched memory ({patched} bytes) should have the same size")]
    SizeMismatch
    {
        /// Length of the expected bytes
        expected: usize,
        /// Length of the replacement bytes
        patched: usize,
    },

    /// The memory already holds the replacement bytes
    #[error("Memory already patched")]
    AlreadyPatched,

    /// The memory holds neither the expected nor the replacement bytes
    #[error(
        "Memory differs from the expected bytes. Original: {} vs. Expected: {}",
        format_hex(.original),
        format_hex(.expected)
    )]
    MemoryNotExpected
    {
        /// Bytes found in memory
        original: Vec<u8>,
        /// Bytes the caller expected
        expected: Vec<u8>,
    },

    /// The write went through but reading back shows different bytes
    #[error("Memory not patched: {}", format_hex(.0))]
    MemoryNotPatched(Vec<u8>),

    /// Reading, writing or reprotecting the memory failed
    #[error(transparent)]
    Access(#[from] AslrError),
}

/// Render bytes as `0x` followed by uppercase hex digits.
///
/// ```rust
/// use aslr_core::memory::format_hex;
///
/// assert_eq!(format_hex(&[0x90, 0xc3]), "0x90C3");
/// ```
pub fn format_hex(bytes: &[u8]) -> String
{
    format!("0x{}", hex::encode_upper(bytes))
}

/// Parse a hex byte string such as `"0x90C3"` or `"90 c3"`.
///
/// An optional `0x` prefix and any whitespace are ignored.
///
/// ## Errors
///
/// Returns `InvalidArgument` for an empty string, an odd number of digits or
/// a character that is not a hex digit.
pub fn parse_hex_bytes(input: &str) -> Result<Vec<u8>>
{
    let trimmed = input.trim();
    let digits: String = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .split_whitespace()
        .collect();

    if digits.is_empty() {
        return Err(AslrError::InvalidArgument(format!(
            "Invalid hexadecimal input string: {input:?}"
        )));
    }

    hex::decode(&digits)
        .map_err(|err| AslrError::InvalidArgument(format!("Invalid hexadecimal input string: {input:?} ({err})")))
}

/// Parse a hexadecimal address, with or without `0x`.
///
/// ## Errors
///
/// Returns `InvalidArgument` if `input` is not a hex number that fits in 64 bits.
pub fn parse_hex_address(input: &str) -> Result<Address>
{
    Address::from_hex(input).ok_or_else(|| AslrError::InvalidArgument(format!("Invalid hexadecimal address: {input:?}")))
}

/// Read `size` bytes at `base + offset`.
///
/// This is how offsets taken from a binary on disk are read out of a running
/// copy: `base` is the runtime address of its header.
///
/// ## Errors
///
/// Returns `InvalidArgument` if `base + offset` overflows, otherwise whatever
/// the read returns.
pub fn read_at<M>(memory: &M, base: Address, offset: u64, size: u64) -> Result<Vec<u8>>
where
    M: ProcessMemory + ?Sized,
{
    let start = base
        .checked_add(offset)
        .ok_or_else(|| AslrError::InvalidArgument(format!("offset {offset:#x} from {base} overflows")))?;
    debug!(%start, size, "reading memory");
    memory.read(AddressRange::new(start, size))
}

/// Replace `expected` with `patched` at `address`.
///
/// See the [module documentation](self) for the exact sequence of checks.
///
/// ## Errors
///
/// - [`PatchError::SizeMismatch`] before anything is touched
/// - [`PatchError::AlreadyPatched`] / [`PatchError::MemoryNotExpected`] after the first read
/// - [`PatchError::MemoryNotPatched`] when the read-back differs
/// - [`PatchError::Access`] for failed reads, writes or protection changes
pub fn patch<M>(memory: &M, address: Address, expected: &[u8], patched: &[u8]) -> std::result::Result<(), PatchError>
where
    M: ProcessMemory + ?Sized,
{
    if expected.len() != patched.len() {
        return Err(PatchError::SizeMismatch {
            expected: expected.len(),
            patched: patched.len(),
        });
    }

    let range = AddressRange::new(address, patched.len() as u64);
    memory.protect(range, Protection::ALL)?;

    let original = memory.read(range)?;
    if original == patched {
        return Err(PatchError::AlreadyPatched);
    }
    if original != expected {
        return Err(PatchError::MemoryNotExpected {
            original,
            expected: expected.to_vec(),
        });
    }

    memory.write(address, patched)?;

    let written = memory.read(range)?;
    if written != patched {
        return Err(PatchError::MemoryNotPatched(written));
    }

    info!(%range, from = %format_hex(expected), to = %format_hex(patched), "memory patched");
    Ok(())
}

/// [`patch`] with both byte strings given in hex.
///
/// ## Errors
///
/// [`PatchError::Access`] wrapping `InvalidArgument` for malformed hex, then
/// everything [`patch`] returns.
pub fn patch_hex<M>(memory: &M, address: Address, expected: &str, patched: &str) -> std::result::Result<(), PatchError>
where
    M: ProcessMemory + ?Sized,
{
    let expected = parse_hex_bytes(expected)?;
    let patched = parse_hex_bytes(patched)?;
    patch(memory, address, &expected, &patched)
}

#[cfg(test)]
mod tests
{
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Flat memory starting at `base`; optionally drops every write
    struct FakeMemory
    {
        base: u64,
        bytes: RefCell<Vec<u8>>,
        protections: RefCell<Vec<(AddressRange, Protection)>>,
        writes: Cell<usize>,
        ignore_writes: bool,
    }

    impl FakeMemory
    {
        fn new(base: u64, bytes: &[u8]) -> Self
        {
            Self {
                base,
                bytes: RefCell::new(bytes.to_vec()),
                protections: RefCell::new(Vec::new()),
                writes: Cell::new(0),
                ignore_writes: false,
            }
        }

        fn offset(&self, address: Address, len: usize) -> Result<usize>
        {
            let offset = address
                .value()
                .checked_sub(self.base)
                .and_then(|offset| usize::try_from(offset).ok())
                .filter(|offset| offset + len <= self.bytes.borrow().len())
                .ok_or_else(|| AslrError::InvalidArgument(format!("{address} is not mapped")))?;
            Ok(offset)
        }
    }

    impl ProcessMemory for FakeMemory
    {
        fn read(&self, range: AddressRange) -> Result<Vec<u8>>
        {
            let len = range.len()?;
            let offset = self.offset(range.start, len)?;
            Ok(self.bytes.borrow()[offset..offset + len].to_vec())
        }

        fn write(&self, address: Address, bytes: &[u8]) -> Result<()>
        {
            let offset = self.offset(address, bytes.len())?;
            self.writes.set(self.writes.get() + 1);
            if !self.ignore_writes {
                self.bytes.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
            Ok(())
        }

        fn protect(&self, range: AddressRange, protection: Protection) -> Result<()>
        {
            self.protections.borrow_mut().push((range, protection));
            Ok(())
        }
    }

    const BASE: u64 = 0x1_0000_0000;

    #[test]
    fn test_protection_display()
    {
        assert_eq!(Protection::ALL.to_string(), "rwx");
        assert_eq!((Protection::READ | Protection::EXECUTE).to_string(), "r-x");
        assert_eq!(Protection::NONE.to_string(), "---");
        assert!(Protection::ALL.contains(Protection::WRITE));
        assert!(!Protection::READ.contains(Protection::WRITE));
    }

    #[test]
    fn test_range_len_rejects_wrap()
    {
        let range = AddressRange::new(Address::new(u64::MAX), 2);
        assert!(range.end().is_none());
        assert!(matches!(range.len(), Err(AslrError::InvalidArgument(_))));
        assert!(AddressRange::new(Address::new(0x10), 0).is_empty());
    }

    #[test]
    fn test_parse_hex_bytes()
    {
        assert_eq!(parse_hex_bytes("0x90C3").unwrap(), vec![0x90, 0xc3]);
        assert_eq!(parse_hex_bytes("de ad be ef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(parse_hex_bytes(""), Err(AslrError::InvalidArgument(_))));
        assert!(matches!(parse_hex_bytes("0x"), Err(AslrError::InvalidArgument(_))));
        assert!(matches!(parse_hex_bytes("abc"), Err(AslrError::InvalidArgument(_))));
        assert!(matches!(parse_hex_bytes("zz"), Err(AslrError::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_hex_address()
    {
        assert_eq!(parse_hex_address("0x3f00").unwrap(), Address::new(0x3f00));
        assert!(matches!(parse_hex_address("main"), Err(AslrError::InvalidArgument(_))));
    }

    #[test]
    fn test_read_at_offset()
    {
        let memory = FakeMemory::new(BASE, &[0, 1, 2, 3, 4, 5, 6, 7]);
        let bytes = read_at(&memory, Address::new(BASE), 2, 3).unwrap();
        assert_eq!(bytes, vec![2, 3, 4]);

        let err = read_at(&memory, Address::new(u64::MAX), 1, 1).unwrap_err();
        assert!(matches!(err, AslrError::InvalidArgument(_)));
    }

    #[test]
    fn test_patch_replaces_expected_bytes()
    {
        let memory = FakeMemory::new(BASE, &[0x55, 0x48, 0x89, 0xe5]);
        patch(&memory, Address::new(BASE + 1), &[0x48, 0x89], &[0x90, 0x90]).unwrap();

        assert_eq!(*memory.bytes.borrow(), vec![0x55, 0x90, 0x90, 0xe5]);
        assert_eq!(
            *memory.protections.borrow(),
            vec![(AddressRange::new(Address::new(BASE + 1), 2), Protection::ALL)]
        );
    }

    #[test]
    fn test_patch_size_mismatch_touches_nothing()
    {
        let memory = FakeMemory::new(BASE, &[0x48, 0x89]);
        let err = patch(&memory, Address::new(BASE), &[0x48, 0x89], &[0x90]).unwrap_err();

        assert!(matches!(err, PatchError::SizeMismatch { expected: 2, patched: 1 }));
        assert!(memory.protections.borrow().is_empty());
        assert_eq!(memory.writes.get(), 0);
    }

    #[test]
    fn test_patch_already_patched()
    {
        let memory = FakeMemory::new(BASE, &[0x90, 0x90]);
        let err = patch(&memory, Address::new(BASE), &[0x48, 0x89], &[0x90, 0x90]).unwrap_err();

        assert!(matches!(err, PatchError::AlreadyPatched));
        assert_eq!(memory.writes.get(), 0);
    }

    #[test]
    fn test_patch_unexpected_original()
    {
        let memory = FakeMemory::new(BASE, &[0xcc, 0xcc]);
        let err = patch(&memory, Address::new(BASE), &[0x48, 0x89], &[0x90, 0x90]).unwrap_err();

        match &err {
            PatchError::MemoryNotExpected { original, expected } => {
                assert_eq!(original, &vec![0xcc, 0xcc]);
                assert_eq!(expected, &vec![0x48, 0x89]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Memory differs from the expected bytes. Original: 0xCCCC vs. Expected: 0x4889"
        );
        assert_eq!(memory.writes.get(), 0);
    }

    #[test]
    fn test_patch_verifies_read_back()
    {
        let mut memory = FakeMemory::new(BASE, &[0x48, 0x89]);
        memory.ignore_writes = true;
        let err = patch(&memory, Address::new(BASE), &[0x48, 0x89], &[0x90, 0x90]).unwrap_err();

        assert!(matches!(&err, PatchError::MemoryNotPatched(found) if found == &vec![0x48, 0x89]));
        assert_eq!(err.to_string(), "Memory not patched: 0x4889");
        assert_eq!(memory.writes.get(), 1);
    }

    #[test]
    fn test_patch_unmapped_address()
    {
        let memory = FakeMemory::new(BASE, &[0x48, 0x89]);
        let err = patch(&memory, Address::new(0x10), &[0x48], &[0x90]).unwrap_err();
        assert!(matches!(err, PatchError::Access(AslrError::InvalidArgument(_))));
    }

    #[test]
    fn test_patch_hex()
    {
        let memory = FakeMemory::new(BASE, &[0x74, 0x05]);
        patch_hex(&memory, Address::new(BASE), "0x7405", "0xEB05").unwrap();
        assert_eq!(*memory.bytes.borrow(), vec![0xeb, 0x05]);

        let err = patch_hex(&memory, Address::new(BASE), "0xnothex", "0x9090").unwrap_err();
        assert!(matches!(err, PatchError::Access(AslrError::InvalidArgument(_))));
    }
}
