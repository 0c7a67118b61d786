//! Child-status reaping.
//!
//! Runs whenever SIGCHLD arrives. One notification may stand for several
//! children, so every call drains the status source until it is empty.

use std::io::Write;

use crate::error::{Result, ShellError};
use crate::job_control::StatusSource;
use crate::jobs::{JobState, JobTable, Pid};
use crate::status::ChildEvent;

/// Consume every pending status change and apply it to `table`.
/// Returns how many events were consumed.
///
/// The caller holds the table lock for the whole drain.
pub(crate) fn drain(
    table: &mut JobTable,
    source: &mut dyn StatusSource,
    out: &mut dyn Write,
) -> Result<usize> {
    let mut consumed = 0;
    while let Some((pid, event)) = source.next_event().map_err(ShellError::Wait)? {
        consumed += 1;
        apply(table, pid, event, out);
    }
    let _ = out.flush();
    if consumed > 0 && table.is_empty() {
        tracing::debug!("no jobs left");
    }
    Ok(consumed)
}

/// Apply one status change to the table.
pub(crate) fn apply(table: &mut JobTable, pid: Pid, event: ChildEvent, out: &mut dyn Write) {
    let Some(job) = table.find_by_member(pid) else {
        tracing::debug!(pid, ?event, "status change for untracked process");
        return;
    };
    tracing::debug!(
        pid,
        ?event,
        code = event.exit_code(),
        job = job.job_number,
        "child status"
    );
    let job_number = job.job_number;
    let representative = job.representative;
    let already_stopped = job.state == JobState::Stopped;

    match event {
        ChildEvent::Stopped(signal) => {
            if !already_stopped {
                let _ = writeln!(
                    out,
                    "Job [{job_number}] ({representative}) stopped by signal {signal}"
                );
                table.set_job_state(job_number, JobState::Stopped);
            }
        }
        ChildEvent::Continued => {}
        ChildEvent::Exited(_) | ChildEvent::Signaled(_) => {
            let Some(retired) = table.retire_member(pid) else {
                return;
            };
            if let ChildEvent::Signaled(signal) = event {
                if retired.was_representative {
                    let _ = writeln!(
                        out,
                        "Job [{}] ({pid}) terminated by signal {signal}",
                        retired.job_number
                    );
                }
            }
            if retired.job_finished {
                table.remove_job(retired.job_number);
            }
        }
    }
}
