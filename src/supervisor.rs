use std::io::Write;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::job_control::{self, ForegroundTerminalGuard, StatusSource};
use crate::jobs::{JobTable, Pid};
use crate::reaper;

/// How long the foreground wait sleeps before re-checking the table even
/// without a wakeup.
const FOREGROUND_RECHECK: Duration = Duration::from_secs(1);

/// State shared between the read loop and the signal threads.
///
/// Every multi-step read-modify-write of the job table happens under
/// `jobs`; the reaper notifies `changed` after each drain.
pub struct Supervisor {
    jobs: Mutex<JobTable>,
    changed: Condvar,
    config: Config,
    interactive: bool,
}

impl Supervisor {
    /// `interactive` is true when stdin is the controlling terminal; the
    /// foreground job is then handed the terminal while it runs.
    pub fn new(config: Config, interactive: bool) -> Self {
        Self {
            jobs: Mutex::new(JobTable::new()),
            changed: Condvar::new(),
            config,
            interactive,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Exclusive access to the job table.
    pub fn lock(&self) -> MutexGuard<'_, JobTable> {
        // A panic while holding the lock leaves the table itself consistent:
        // each mutation is a single slot write.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drain all pending child status changes, then wake the foreground wait.
    pub(crate) fn reap(&self, source: &mut dyn StatusSource, out: &mut dyn Write) -> Result<usize> {
        let consumed = {
            let mut table = self.lock();
            reaper::drain(&mut table, source, out)?
        };
        self.changed.notify_all();
        Ok(consumed)
    }

    /// Block until the job represented by `pid` leaves the foreground:
    /// it exited, was killed, or was stopped.
    pub fn wait_for_foreground(&self, pid: Pid) {
        let leader = self.lock().find_by_pid(pid).map(|job| job.leader);
        let _terminal = match leader {
            Some(pgid) if self.interactive => match ForegroundTerminalGuard::new(pgid) {
                Ok(guard) => Some(guard),
                Err(err) => {
                    tracing::warn!(%err, pgid, "could not hand the terminal to the job");
                    None
                }
            },
            _ => None,
        };

        let mut table = self.lock();
        while table.foreground_pid() == Some(pid) {
            table = match self.changed.wait_timeout(table, FOREGROUND_RECHECK) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Forward a keyboard signal to the foreground job's process group.
    /// Returns the group signalled, if there was a foreground job.
    pub fn relay(&self, signal: libc::c_int) -> Option<Pid> {
        let table = self.lock();
        let pgid = table.foreground_job()?.leader;
        if let Err(err) = job_control::signal_group(pgid, signal) {
            tracing::warn!(%err, pgid, signal, "could not relay signal");
        }
        Some(pgid)
    }
}
