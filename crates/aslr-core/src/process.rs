//! Process-name lookup.
//!
//! Picks the process a name refers to the way `pgrep -o -i -x` does: an exact,
//! case-insensitive match on the short process name, and the oldest process
//! wins when several match.

use std::time::Duration;

use crate::types::ProcessId;

/// A running process as seen by the name lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCandidate
{
    /// Its PID
    pub pid: ProcessId,
    /// Short process name
    pub name: String,
    /// Start time since the Unix epoch, if the kernel told us
    pub started: Option<Duration>,
}

/// Choose the oldest candidate whose name equals `wanted`, ignoring case.
///
/// Candidates without a start time sort after every candidate that has one;
/// ties are broken by the lower PID.
///
/// ```rust
/// use std::time::Duration;
///
/// use aslr_core::process::{pick_oldest, ProcessCandidate};
/// use aslr_core::types::ProcessId;
///
/// let candidates = vec![
///     ProcessCandidate { pid: ProcessId(20), name: "Finder".into(), started: Some(Duration::from_secs(9)) },
///     ProcessCandidate { pid: ProcessId(30), name: "finder".into(), started: Some(Duration::from_secs(3)) },
/// ];
/// assert_eq!(pick_oldest(candidates, "FINDER"), Some(ProcessId(30)));
/// ```
pub fn pick_oldest<I>(candidates: I, wanted: &str) -> Option<ProcessId>
where
    I: IntoIterator<Item = ProcessCandidate>,
{
    let wanted = wanted.to_lowercase();
    candidates
        .into_iter()
        .filter(|candidate| candidate.name.to_lowercase() == wanted)
        .min_by_key(|candidate| (candidate.started.is_none(), candidate.started, candidate.pid))
        .map(|candidate| candidate.pid)
}
