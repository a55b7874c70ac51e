//! # Mach-O Header Model
//!
//! Parses the header and load commands of a 64-bit Mach-O image from bytes
//! copied out of a target process, using the `object` crate's Mach-O
//! definitions.
//!
//! Only what the slide computation needs is kept: the file type, the CPU type
//! and the `LC_SEGMENT_64` commands. The slide of an image is the distance
//! between the address its header was found at and the `vmaddr` of its
//! `__TEXT` segment.

use std::mem;

use object::macho::{self, MachHeader64, SegmentCommand64};
use object::read::macho::MachHeader as _;
use object::Endianness;
use smallvec::SmallVec;

use crate::error::{AslrError, Result};
use crate::types::{Address, Slide};

/// Size of a `mach_header_64`
pub const MACH_HEADER_64_SIZE: usize = mem::size_of::<MachHeader64<Endianness>>();

/// Upper bound on `sizeofcmds` accepted from a remote header.
pub const MAX_LOAD_COMMANDS_SIZE: usize = 1 << 20;

/// Name of the segment holding the Mach-O header and code.
pub const TEXT_SEGMENT: &str = "__TEXT";

/// Name of the unmapped guard segment at the bottom of an executable.
pub const PAGEZERO_SEGMENT: &str = "__PAGEZERO";

/// Layout of a Mach-O image, as far as the header can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachKind
{
    /// 64-bit header (`MH_MAGIC_64`, either byte order)
    Image64,
    /// 32-bit header (`MH_MAGIC`, either byte order)
    Image32,
}

/// Classify the first four bytes of a buffer as a Mach-O magic number.
///
/// ```rust
/// use aslr_core::macho::{mach_kind, MachKind};
///
/// assert_eq!(mach_kind(&[0xcf, 0xfa, 0xed, 0xfe]), Some(MachKind::Image64));
/// assert_eq!(mach_kind(b"\x7fELF"), None);
/// ```
pub fn mach_kind(bytes: &[u8]) -> Option<MachKind>
{
    let magic = u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?);
    match magic {
        macho::MH_MAGIC_64 | macho::MH_CIGAM_64 => Some(MachKind::Image64),
        macho::MH_MAGIC | macho::MH_CIGAM => Some(MachKind::Image32),
        _ => None,
    }
}

/// Total number of bytes (header plus load commands) needed to parse the
/// image whose header starts `bytes`.
///
/// Only the first [`MACH_HEADER_64_SIZE`] bytes are inspected.
///
/// ## Errors
///
/// Returns `InvalidImage` if the header is not a 64-bit Mach-O header or
/// claims more than [`MAX_LOAD_COMMANDS_SIZE`] bytes of load commands.
pub fn header_span(bytes: &[u8]) -> Result<usize>
{
    let (header, endian) = parse_header(bytes)?;
    let sizeofcmds = header.sizeofcmds(endian) as usize;
    if sizeofcmds > MAX_LOAD_COMMANDS_SIZE {
        return Err(AslrError::InvalidImage(format!(
            "load commands claim {sizeofcmds} bytes, limit is {MAX_LOAD_COMMANDS_SIZE}"
        )));
    }
    Ok(MACH_HEADER_64_SIZE + sizeofcmds)
}

fn parse_header(bytes: &[u8]) -> Result<(&MachHeader64<Endianness>, Endianness)>
{
    match mach_kind(bytes) {
        Some(MachKind::Image64) => {}
        Some(MachKind::Image32) => {
            return Err(AslrError::InvalidImage("32-bit images are not supported".to_string()));
        }
        None => return Err(AslrError::InvalidImage("missing Mach-O magic".to_string())),
    }

    if bytes.len() < MACH_HEADER_64_SIZE {
        return Err(AslrError::InvalidImage(format!(
            "header needs {MACH_HEADER_64_SIZE} bytes, got {}",
            bytes.len()
        )));
    }

    let header = MachHeader64::<Endianness>::parse(bytes, 0)
        .map_err(|err| AslrError::InvalidImage(format!("failed to parse header: {err}")))?;
    let endian = header
        .endian()
        .map_err(|err| AslrError::InvalidImage(format!("failed to read byte order: {err}")))?;
    Ok((header, endian))
}

/// One `LC_SEGMENT_64` load command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment
{
    /// Segment name, e.g. `__TEXT`
    pub name: String,
    /// Link-time virtual address
    pub vmaddr: Address,
    /// Size in memory
    pub vmsize: u64,
    /// Offset of the segment's contents in the file
    pub fileoff: u64,
    /// Size of the segment's contents in the file
    pub filesize: u64,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
}

impl Segment
{
    fn from_command(command: &SegmentCommand64<Endianness>, endian: Endianness) -> Self
    {
        let raw_name = &command.segname;
        let len = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        Self {
            name: String::from_utf8_lossy(&raw_name[..len]).into_owned(),
            vmaddr: Address::new(command.vmaddr.get(endian)),
            vmsize: command.vmsize.get(endian),
            fileoff: command.fileoff.get(endian),
            filesize: command.filesize.get(endian),
            maxprot: command.maxprot.get(endian),
            initprot: command.initprot.get(endian),
        }
    }
}

/// Parsed header of a 64-bit Mach-O image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachImage
{
    filetype: u32,
    cputype: u32,
    segments: SmallVec<[Segment; 8]>,
}

impl MachImage
{
    /// Parse a header and its load commands.
    ///
    /// `bytes` must start at the header and hold at least [`header_span`] bytes.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidImage` for a missing or 32-bit magic, a short buffer, or
    /// malformed load commands.
    pub fn parse(bytes: &[u8]) -> Result<Self>
    {
        let span = header_span(bytes)?;
        if bytes.len() < span {
            return Err(AslrError::InvalidImage(format!(
                "load commands truncated: need {span} bytes, got {}",
                bytes.len()
            )));
        }

        let (header, endian) = parse_header(bytes)?;
        let mut commands = header
            .load_commands(endian, bytes, 0)
            .map_err(|err| AslrError::InvalidImage(format!("failed to read load commands: {err}")))?;

        let mut segments = SmallVec::new();
        while let Some(command) = commands
            .next()
            .map_err(|err| AslrError::InvalidImage(format!("malformed load command: {err}")))?
        {
            if let Some((segment, _sections)) = command
                .segment_64()
                .map_err(|err| AslrError::InvalidImage(format!("malformed LC_SEGMENT_64: {err}")))?
            {
                segments.push(Segment::from_command(segment, endian));
            }
        }

        Ok(Self {
            filetype: header.filetype(endian),
            cputype: header.cputype(endian),
            segments,
        })
    }

    /// `MH_*` file type of the image
    pub fn filetype(&self) -> u32
    {
        self.filetype
    }

    /// `CPU_TYPE_*` of the image
    pub fn cputype(&self) -> u32
    {
        self.cputype
    }

    /// Whether this is a main executable (`MH_EXECUTE`) rather than a dylib or bundle
    pub fn is_executable(&self) -> bool
    {
        self.filetype == macho::MH_EXECUTE
    }

    /// All `LC_SEGMENT_64` commands, in load-command order
    pub fn segments(&self) -> &[Segment]
    {
        &self.segments
    }

    /// Look up a segment by name
    pub fn segment(&self, name: &str) -> Option<&Segment>
    {
        self.segments.iter().find(|segment| segment.name == name)
    }

    /// Preferred (link-time) address of the `__TEXT` segment
    ///
    /// ## Errors
    ///
    /// Returns `InvalidImage` if the image has no `__TEXT` segment.
    pub fn text_vmaddr(&self) -> Result<Address>
    {
        self.segment(TEXT_SEGMENT)
            .map(|segment| segment.vmaddr)
            .ok_or_else(|| AslrError::InvalidImage(format!("missing {TEXT_SEGMENT} segment")))
    }

    /// Slide of this image given the address its header was found at
    ///
    /// ## Errors
    ///
    /// Returns `InvalidImage` if there is no `__TEXT` segment and
    /// `SlideUnderflow` if `load_address` is below the preferred address.
    pub fn slide_for(&self, load_address: Address) -> Result<Slide>
    {
        let preferred = self.text_vmaddr()?;
        load_address.slide_from(preferred).ok_or(AslrError::SlideUnderflow {
            load: load_address,
            preferred,
        })
    }

    /// Bytes of address space the image occupies, excluding `__PAGEZERO`
    pub fn image_size(&self) -> u64
    {
        self.segments
            .iter()
            .filter(|segment| segment.name != PAGEZERO_SEGMENT)
            .fold(0u64, |total, segment| total.saturating_add(segment.vmsize))
    }
}
