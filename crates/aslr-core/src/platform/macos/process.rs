//! Process table access through `libproc`.

use std::time::Duration;

use libproc::libproc::bsd_info::BSDInfo;
use libproc::libproc::proc_pid::{name, pidinfo};
use libproc::processes::{pids_by_type, ProcFilter};
use tracing::trace;

use crate::error::Result;
use crate::process::ProcessCandidate;
use crate::types::ProcessId;

/// Snapshot every running process's PID, short name and start time.
///
/// Processes that exit while we walk the table, or that we may not inspect,
/// are left out.
///
/// ## Errors
///
/// Returns an `Io` error if the PID list cannot be read.
pub fn running_processes() -> Result<Vec<ProcessCandidate>>
{
    let pids = pids_by_type(ProcFilter::All)?;
    let mut candidates = Vec::with_capacity(pids.len());

    for pid in pids {
        let Ok(raw) = i32::try_from(pid) else {
            continue;
        };
        if raw == 0 {
            continue;
        }
        let Ok(process_name) = name(raw) else {
            trace!(pid, "no name for process");
            continue;
        };
        let started = pidinfo::<BSDInfo>(raw, 0)
            .ok()
            .map(|info| Duration::from_secs(info.pbi_start_tvsec) + Duration::from_micros(info.pbi_start_tvusec));

        candidates.push(ProcessCandidate {
            pid: ProcessId(pid),
            name: process_name,
            started,
        });
    }

    Ok(candidates)
}
