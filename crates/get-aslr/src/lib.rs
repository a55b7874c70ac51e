//! # get_aslr
//!
//! Command-line front-end that prints the ASLR slide of a process's main
//! executable.
//!
//! The [`Driver`] owns no platform knowledge. It parses the single argument,
//! hands the resulting PID to an [`ImageLocator`] and a [`SlideCalculator`],
//! and turns the outcome into text and an exit status:
//!
//! | outcome | stdout | stderr | status |
//! |---|---|---|---|
//! | success | `0x<slide>` | advisory when not root | 0 |
//! | bad argument count | | `Usage: get_aslr <pid>` | 1 |
//! | bad or unknown selector | | advisory when not root, `Usage: get_aslr <pid>` | 1 |
//! | locator failed | | `Failed to find address of header: …` | 1 |
//! | calculator failed | | `Failed to find ASLR slide: …` | 1 |

use std::ffi::OsString;
use std::io::Write;

use aslr_core::{locate_slide, Address, AslrError, ImageLocator, LookupFailure, ProcessId, ProcessSelector, SlideCalculator, SlideReport};
use clap::error::ErrorKind;
use clap::Parser;
use thiserror::Error;
use tracing::debug;

/// Usage line printed for any argument error
pub const USAGE: &str = "Usage: get_aslr <pid>";

/// Printed to stderr when the tool runs without root privileges
pub const ROOT_ADVISORY: &str = "If you see any errors, you should probably run this as root.";

/// Exit status for a printed slide (or `--help` / `--version`)
pub const EXIT_SUCCESS: u8 = 0;

/// Exit status for every failure
pub const EXIT_FAILURE: u8 = 1;

/// Print the ASLR slide of a running process's main executable.
#[derive(Parser, Debug)]
#[command(name = "get_aslr")]
#[command(version)]
#[command(about = "Print the ASLR slide of a running process's main executable", long_about = None)]
pub struct Cli
{
    /// Process ID (decimal, 0x-prefixed hex or 0-prefixed octal), a process name, or `-` for this process
    #[arg(allow_negative_numbers = true)]
    pub pid: String,
}

/// Everything that stops the driver from printing a slide
#[derive(Error, Debug)]
pub enum DriverError
{
    /// Wrong argument count, or an argument that names no process
    ///
    /// The optional detail explains what was wrong with the argument.
    #[error("Usage: get_aslr <pid>")]
    Usage(Option<String>),

    /// The image locator could not find the main binary
    #[error("Failed to find address of header: {0}")]
    ImageLookup(#[source] AslrError),

    /// The slide calculator failed for the image it was given
    #[error("Failed to find ASLR slide: {source}")]
    SlideComputation
    {
        /// Header address the calculator was asked about
        image: Address,
        /// Why it failed
        #[source]
        source: AslrError,
    },
}

impl DriverError
{
    /// Exit status for this error
    #[must_use]
    pub fn exit_code(&self) -> u8
    {
        EXIT_FAILURE
    }

    /// Write the user-facing diagnostic.
    ///
    /// ## Errors
    ///
    /// Returns any error raised while writing to `out`.
    pub fn report(&self, out: &mut impl Write) -> std::io::Result<()>
    {
        writeln!(out, "{self}")?;
        if let DriverError::Usage(Some(detail)) = self {
            writeln!(out, "{detail}")?;
        }
        Ok(())
    }
}

impl From<LookupFailure> for DriverError
{
    fn from(failure: LookupFailure) -> Self
    {
        match failure {
            LookupFailure::Image(err) => DriverError::ImageLookup(err),
            LookupFailure::Slide(image, source) => DriverError::SlideComputation { image, source },
        }
    }
}

/// Result of one invocation that did not fail
#[derive(Debug)]
pub enum Outcome
{
    /// A slide was computed
    Report(SlideReport),
    /// `--help` or `--version` was requested; holds the rendered text
    Info(String),
}

/// The `get_aslr` workflow over injected collaborators
///
/// `resolver` turns the parsed argument into a PID; the binary passes
/// [`aslr_core::platform::resolve_selector`].
pub struct Driver<L, C, R>
{
    locator: L,
    calculator: C,
    resolver: R,
    elevated: bool,
}

impl<L, C, R> Driver<L, C, R>
where
    L: ImageLocator,
    C: SlideCalculator,
    R: Fn(&ProcessSelector) -> aslr_core::Result<ProcessId>,
{
    /// Create a driver that assumes it is running as root
    pub fn new(locator: L, calculator: C, resolver: R) -> Self
    {
        Self {
            locator,
            calculator,
            resolver,
            elevated: true,
        }
    }

    /// Set whether the process has root privileges
    ///
    /// Without them, [`ROOT_ADVISORY`] is printed before the lookup.
    #[must_use]
    pub fn elevated(mut self, elevated: bool) -> Self
    {
        self.elevated = elevated;
        self
    }

    /// Parse `args` (program name first) and perform the lookup.
    ///
    /// The advisory, if any, is written to `stderr` once the argument count has
    /// been checked, before the argument itself is interpreted.
    ///
    /// ## Errors
    ///
    /// Returns [`DriverError::Usage`] for argument problems and the lookup
    /// errors for collaborator failures. Each collaborator is called at most once.
    pub fn execute<I, T>(&self, args: I, stderr: &mut impl Write) -> Result<Outcome, DriverError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                return Ok(Outcome::Info(err.render().to_string()));
            }
            Err(err) => {
                debug!(kind = ?err.kind(), "rejected arguments");
                return Err(DriverError::Usage(None));
            }
        };

        if !self.elevated {
            debug!("not running as root");
            // Advisory only
            let _ = writeln!(stderr, "{ROOT_ADVISORY}");
        }

        let selector = ProcessSelector::parse(&cli.pid).map_err(|err| DriverError::Usage(Some(err.to_string())))?;

        let pid = (self.resolver)(&selector).map_err(|err| DriverError::Usage(Some(err.to_string())))?;

        let report = locate_slide(pid, &self.locator, &self.calculator)?;
        Ok(Outcome::Report(report))
    }

    /// Run one invocation end to end and return the exit status.
    ///
    /// On success `stdout` receives exactly one line, the slide as
    /// `0x<lowercase hex>`. Diagnostics go to `stderr`.
    pub fn run<I, T>(&self, args: I, stdout: &mut impl Write, stderr: &mut impl Write) -> u8
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let written = match self.execute(args, stderr) {
            Ok(Outcome::Report(report)) => writeln!(stdout, "{}", report.slide),
            Ok(Outcome::Info(text)) => write!(stdout, "{text}"),
            Err(err) => {
                debug!(error = ?err, "lookup failed");
                let _ = err.report(stderr);
                return err.exit_code();
            }
        };

        match written.and_then(|()| stdout.flush()) {
            Ok(()) => EXIT_SUCCESS,
            Err(err) => {
                let _ = writeln!(stderr, "Failed to write output: {err}");
                EXIT_FAILURE
            }
        }
    }
}
