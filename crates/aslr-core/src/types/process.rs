//! Process identifiers and the ways a user can name a process.

use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;

use thiserror::Error;

/// Process identifier (PID)
///
/// A PID is the number the kernel assigns to each running process. On macOS
/// and Linux it fits in 32 bits.
///
/// ## Parsing
///
/// `ProcessId` parses the way `strtol(s, NULL, 0)` reads numbers: a `0x`/`0X`
/// prefix selects hexadecimal, a leading `0` selects octal, anything else is
/// decimal. Unlike `strtol`, trailing garbage, negative values and values that
/// do not fit in 32 bits are rejected rather than silently truncated.
///
/// ```rust
/// use aslr_core::types::ProcessId;
///
/// assert_eq!("123".parse::<ProcessId>().unwrap(), ProcessId(123));
/// assert_eq!("0x7B".parse::<ProcessId>().unwrap(), ProcessId(123));
/// assert_eq!("0173".parse::<ProcessId>().unwrap(), ProcessId(123));
/// assert!("12abc".parse::<ProcessId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// PID of the calling process
    pub fn current() -> Self
    {
        ProcessId(std::process::id())
    }

    /// The PID as the signed type libc and Mach calls expect
    ///
    /// Returns `None` when the value does not fit in a `pid_t`.
    pub fn as_raw(self) -> Option<i32>
    {
        i32::try_from(self.0).ok()
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Why a string is not a valid process identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsePidError
{
    /// Nothing but whitespace
    #[error("process identifier is empty")]
    Empty,

    /// A leading minus sign
    #[error("process identifier {0:?} is negative")]
    Negative(String),

    /// The value does not fit in 32 bits
    #[error("process identifier {0:?} is out of range")]
    OutOfRange(String),

    /// A character that is not a digit of the selected base
    #[error("process identifier {0:?} is not a number")]
    InvalidDigit(String),
}

impl FromStr for ProcessId
{
    type Err = ParsePidError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParsePidError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(ParsePidError::Negative(trimmed.to_string()));
        }
        let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);

        let (digits, radix) = if let Some(hex) = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
            (hex, 16)
        } else if unsigned.len() > 1 && unsigned.starts_with('0') {
            (&unsigned[1..], 8)
        } else {
            (unsigned, 10)
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(ParsePidError::InvalidDigit(trimmed.to_string()));
        }

        u32::from_str_radix(digits, radix)
            .map(ProcessId)
            .map_err(|err| match err.kind() {
                IntErrorKind::PosOverflow => ParsePidError::OutOfRange(trimmed.to_string()),
                _ => ParsePidError::InvalidDigit(trimmed.to_string()),
            })
    }
}

/// How the user picked the target process
///
/// The single CLI argument is either a number, the literal `-` for the tool's
/// own process, or a process name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessSelector
{
    /// A numeric process identifier
    Pid(ProcessId),
    /// The calling process itself (`-`)
    Current,
    /// A process name, matched case-insensitively against running processes
    Name(String),
}

impl ProcessSelector
{
    /// Classify and parse a raw argument.
    ///
    /// `-` alone is the current process. Anything that parses as a
    /// [`ProcessId`] is a PID; anything that is not a number at all (such as
    /// `Safari` or `1Password`) is a process name.
    ///
    /// ## Errors
    ///
    /// Returns the [`ParsePidError`] for an empty argument and for numbers that
    /// are negative or do not fit in 32 bits.
    ///
    /// ```rust
    /// use aslr_core::types::{ProcessId, ProcessSelector};
    ///
    /// assert_eq!(ProcessSelector::parse("0x7b").unwrap(), ProcessSelector::Pid(ProcessId(123)));
    /// assert_eq!(ProcessSelector::parse("-").unwrap(), ProcessSelector::Current);
    /// assert_eq!(ProcessSelector::parse("Finder").unwrap(), ProcessSelector::Name("Finder".into()));
    /// assert_eq!(ProcessSelector::parse("1Password").unwrap(), ProcessSelector::Name("1Password".into()));
    /// assert!(ProcessSelector::parse("-5").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ParsePidError>
    {
        let trimmed = raw.trim();
        if trimmed == "-" {
            return Ok(ProcessSelector::Current);
        }

        match trimmed.parse::<ProcessId>() {
            Ok(pid) => Ok(ProcessSelector::Pid(pid)),
            Err(ParsePidError::InvalidDigit(_)) => Ok(ProcessSelector::Name(trimmed.to_string())),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Display for ProcessSelector
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ProcessSelector::Pid(pid) => write!(f, "pid {pid}"),
            ProcessSelector::Current => write!(f, "current process"),
            ProcessSelector::Name(name) => write!(f, "process named {name:?}"),
        }
    }
}
