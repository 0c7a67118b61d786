use std::fmt;

use crate::error::{Result, ShellError};

/// Maximum number of jobs tracked at any point in time.
pub const MAX_JOBS: usize = 16;

/// Job numbers wrap back to 1 after this value.
pub const MAX_JOB_NUMBER: usize = 1 << 16;

/// Process id as used by the kernel (also a process-group id for leaders).
pub type Pid = libc::pid_t;

/// The lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Foreground,
    Background,
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// One supervised pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Process-group leader; signals for the job go to `-leader`.
    pub leader: Pid,
    /// Last stage of the pipeline; the id the foreground wait tracks.
    pub representative: Pid,
    /// Stage processes that have not been reaped yet, in pipeline order.
    pub members: Vec<Pid>,
    pub job_number: usize,
    pub state: JobState,
    pub command: String,
}

impl Job {
    pub fn owns(&self, pid: Pid) -> bool {
        self.leader == pid || self.representative == pid
    }

    /// Standard background announcement: `[n] (pid) command`, naming the
    /// representative.
    pub fn announcement(&self) -> String {
        format!("[{}] ({}) {}", self.job_number, self.representative, self.command)
    }

    fn is_live(&self, pid: Pid) -> bool {
        self.members.contains(&pid)
    }
}

/// Result of retiring one reaped stage of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Retired {
    pub job_number: usize,
    pub was_representative: bool,
    /// No stage of the job is left alive.
    pub job_finished: bool,
}

/// Fixed-capacity job table. `None` marks an empty slot.
pub struct JobTable {
    slots: Vec<Option<Job>>,
    next_job_number: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::with_capacity(MAX_JOBS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self {
            slots: Vec::with_capacity(capacity),
            next_job_number: 1,
        };
        table.slots.resize_with(capacity, || None);
        table.initialize();
        table
    }

    /// Reset every slot and restart numbering at 1.
    pub fn initialize(&mut self) {
        for slot in 0..self.slots.len() {
            self.clear(slot);
        }
        self.next_job_number = 1;
    }

    pub fn clear(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = None;
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_capacity(&self) -> bool {
        self.slots.iter().any(Option::is_none)
    }

    /// Register a pipeline whose stages are already in process group `leader`.
    /// The last stage becomes the representative. Returns the job number.
    pub fn add(
        &mut self,
        leader: Pid,
        stages: &[Pid],
        state: JobState,
        command: &str,
    ) -> Result<usize> {
        if leader <= 0 {
            return Err(ShellError::InvalidProcessId(leader));
        }
        let representative = match stages.last() {
            Some(&pid) => pid,
            None => return Err(ShellError::InvalidProcessId(0)),
        };
        if let Some(&bad) = stages.iter().find(|&&pid| pid <= 0) {
            return Err(ShellError::InvalidProcessId(bad));
        }

        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return Err(ShellError::TableFull {
                capacity: self.capacity(),
            });
        };

        let job_number = self.allocate_job_number();
        self.slots[slot] = Some(Job {
            leader,
            representative,
            members: stages.to_vec(),
            job_number,
            state,
            command: command.trim_end_matches('\n').to_string(),
        });
        tracing::debug!(job_number, leader, representative, command, "added job");
        Ok(job_number)
    }

    /// Drop the job whose representative is `representative`. A reaped
    /// representative id can already belong to a newer job, so a job with no
    /// live stages wins over one that is still running.
    #[allow(dead_code)]
    pub fn remove(&mut self, representative: Pid) -> bool {
        if representative <= 0 {
            return false;
        }
        let matches = |j: &Job| j.representative == representative;
        let slot = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|j| matches(j) && j.members.is_empty()))
            .or_else(|| {
                self.slots
                    .iter()
                    .position(|s| s.as_ref().is_some_and(|j| matches(j)))
            });
        match slot {
            Some(slot) => {
                self.remove_slot(slot);
                true
            }
            None => false,
        }
    }

    /// Drop the job numbered `job_number`.
    pub fn remove_job(&mut self, job_number: usize) -> bool {
        let Some(slot) = self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|j| j.job_number == job_number))
        else {
            return false;
        };
        self.remove_slot(slot);
        true
    }

    fn remove_slot(&mut self, slot: usize) {
        let job_number = self.slots[slot].as_ref().map(|j| j.job_number);
        self.clear(slot);
        self.next_job_number = self.max_job_number() + 1;
        tracing::debug!(?job_number, "removed job");
    }

    /// Mark one stage process as reaped. The job stays in the table; callers
    /// remove it once `job_finished` is reported.
    pub fn retire_member(&mut self, pid: Pid) -> Option<Retired> {
        if pid <= 0 {
            return None;
        }
        let job = self
            .slots
            .iter_mut()
            .flatten()
            .find(|j| j.is_live(pid))?;

        job.members.retain(|&member| member != pid);
        Some(Retired {
            job_number: job.job_number,
            was_representative: job.representative == pid,
            job_finished: job.members.is_empty(),
        })
    }

    /// Representative of the job currently in the foreground.
    pub fn foreground_pid(&self) -> Option<Pid> {
        self.jobs()
            .find(|j| j.state == JobState::Foreground)
            .map(|j| j.representative)
    }

    pub fn foreground_job(&self) -> Option<&Job> {
        self.jobs().find(|j| j.state == JobState::Foreground)
    }

    /// Look up by group leader or representative process id. A job where
    /// `pid` is still running wins over one where it was already reaped.
    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        let slot = self.slot_of_pid(pid)?;
        self.slots[slot].as_ref()
    }

    pub fn find_by_pid_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        let slot = self.slot_of_pid(pid)?;
        self.slots[slot].as_mut()
    }

    fn slot_of_pid(&self, pid: Pid) -> Option<usize> {
        if pid <= 0 {
            return None;
        }
        let owned = |s: &Option<Job>, live: bool| {
            s.as_ref().is_some_and(|j| j.owns(pid) && (!live || j.is_live(pid)))
        };
        self.slots
            .iter()
            .position(|s| owned(s, true))
            .or_else(|| self.slots.iter().position(|s| owned(s, false)))
    }

    /// Look up the job that still counts `pid` among its live stages.
    pub fn find_by_member(&self, pid: Pid) -> Option<&Job> {
        if pid <= 0 {
            return None;
        }
        self.jobs().find(|j| j.is_live(pid))
    }

    pub fn find_by_job_number(&self, job_number: usize) -> Option<&Job> {
        if job_number == 0 {
            return None;
        }
        self.jobs().find(|j| j.job_number == job_number)
    }

    pub fn find_by_job_number_mut(&mut self, job_number: usize) -> Option<&mut Job> {
        if job_number == 0 {
            return None;
        }
        self.slots
            .iter_mut()
            .flatten()
            .find(|j| j.job_number == job_number)
    }

    /// Job number for `pid`, or 0 when no job owns it.
    pub fn pid_to_job_number(&self, pid: Pid) -> usize {
        self.find_by_pid(pid).map_or(0, |j| j.job_number)
    }

    /// Snapshot of every live job, ordered by job number.
    pub fn list(&self) -> Vec<Job> {
        let mut list: Vec<Job> = self.jobs().cloned().collect();
        list.sort_by_key(|j| j.job_number);
        list
    }

    /// Change a job's state. Moving to Background returns the announcement
    /// line for the caller to print.
    #[allow(dead_code)]
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> Option<String> {
        let job_number = self.find_by_pid(pid)?.job_number;
        self.set_job_state(job_number, state)
    }

    /// `set_state` for a job already resolved to its number.
    pub fn set_job_state(&mut self, job_number: usize, state: JobState) -> Option<String> {
        let job = self.find_by_job_number_mut(job_number)?;
        job.state = state;
        (state == JobState::Background).then(|| job.announcement())
    }

    fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    fn max_job_number(&self) -> usize {
        self.jobs().map(|j| j.job_number).max().unwrap_or(0)
    }

    fn allocate_job_number(&mut self) -> usize {
        let mut candidate = self.next_job_number;
        while candidate == 0
            || candidate > MAX_JOB_NUMBER
            || self.find_by_job_number(candidate).is_some()
        {
            candidate = if candidate >= MAX_JOB_NUMBER { 1 } else { candidate + 1 };
        }
        self.next_job_number = candidate + 1;
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(table: &JobTable) -> Vec<usize> {
        table.list().iter().map(|j| j.job_number).collect()
    }

    #[test]
    fn add_assigns_increasing_numbers() {
        let mut table = JobTable::new();
        assert_eq!(table.add(100, &[100], JobState::Background, "sleep 5 &\n").unwrap(), 1);
        assert_eq!(table.add(200, &[200, 201], JobState::Background, "a | b &").unwrap(), 2);

        let job = table.find_by_job_number(2).unwrap();
        assert_eq!(job.leader, 200);
        assert_eq!(job.representative, 201);
        assert_eq!(table.find_by_job_number(1).unwrap().command, "sleep 5 &");
    }

    #[test]
    fn add_rejects_invalid_ids() {
        let mut table = JobTable::new();
        assert!(matches!(
            table.add(0, &[0], JobState::Foreground, "x"),
            Err(ShellError::InvalidProcessId(0))
        ));
        assert!(matches!(
            table.add(10, &[], JobState::Foreground, "x"),
            Err(ShellError::InvalidProcessId(_))
        ));
        assert!(matches!(
            table.add(10, &[10, -3], JobState::Foreground, "x"),
            Err(ShellError::InvalidProcessId(-3))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn full_table_is_reported_not_overwritten() {
        let mut table = JobTable::with_capacity(2);
        table.add(1, &[1], JobState::Background, "a").unwrap();
        table.add(2, &[2], JobState::Background, "b").unwrap();
        assert!(!table.has_capacity());

        let err = table.add(3, &[3], JobState::Background, "c").unwrap_err();
        assert!(matches!(err, ShellError::TableFull { capacity: 2 }));
        assert_eq!(numbers(&table), vec![1, 2]);
        assert!(table.find_by_pid(3).is_none());
    }

    #[test]
    fn remove_recomputes_next_number_from_live_max() {
        let mut table = JobTable::new();
        table.add(10, &[10], JobState::Background, "a").unwrap();
        table.add(20, &[20], JobState::Background, "b").unwrap();
        table.add(30, &[30], JobState::Background, "c").unwrap();

        assert!(table.remove(30));
        assert_eq!(table.add(40, &[40], JobState::Background, "d").unwrap(), 3);

        assert!(table.remove(20));
        // Max live number is still 3.
        assert_eq!(table.add(50, &[50], JobState::Background, "e").unwrap(), 4);
        assert_eq!(numbers(&table), vec![1, 3, 4]);
    }

    #[test]
    fn remove_unknown_or_invalid_is_false() {
        let mut table = JobTable::new();
        table.add(10, &[9, 10], JobState::Background, "a").unwrap();
        assert!(!table.remove(0));
        assert!(!table.remove(-10));
        assert!(!table.remove(9));
        assert!(table.remove(10));
        assert!(table.is_empty());
    }

    #[test]
    fn remove_job_clears_only_that_number() {
        let mut table = JobTable::new();
        table.add(10, &[10, 11], JobState::Background, "a | b &").unwrap();
        table.add(20, &[20, 11], JobState::Foreground, "c | d").unwrap();

        assert!(table.remove_job(2));
        assert!(!table.remove_job(2));
        assert_eq!(numbers(&table), vec![1]);
        assert_eq!(table.foreground_pid(), None);
    }

    #[test]
    fn reused_representative_prefers_the_live_job() {
        let mut table = JobTable::new();
        table.add(10, &[10, 11], JobState::Background, "a | b &").unwrap();
        table.retire_member(11).unwrap();
        // The kernel hands 11 to the last stage of a new job.
        table.add(20, &[20, 11], JobState::Foreground, "c | d").unwrap();

        assert_eq!(table.find_by_pid(11).unwrap().job_number, 2);
        assert_eq!(table.pid_to_job_number(10), 1);

        table.retire_member(20).unwrap();
        table.retire_member(11).unwrap();
        // Job 2 has nothing left running; job 1 still has its first stage.
        assert!(table.remove(11));
        assert_eq!(numbers(&table), vec![1]);
        assert_eq!(table.find_by_member(10).unwrap().job_number, 1);
    }

    #[test]
    fn numbers_stay_unique_after_wrap() {
        let mut table = JobTable::with_capacity(3);
        table.add(1, &[1], JobState::Background, "a").unwrap();
        table.next_job_number = MAX_JOB_NUMBER;
        assert_eq!(table.add(2, &[2], JobState::Background, "b").unwrap(), MAX_JOB_NUMBER);
        // Wraps past MAX_JOB_NUMBER and skips 1, which is still live.
        assert_eq!(table.add(3, &[3], JobState::Background, "c").unwrap(), 2);
    }

    #[test]
    fn lookups_ignore_non_positive_ids() {
        let mut table = JobTable::new();
        table.add(5, &[5], JobState::Background, "a").unwrap();
        assert!(table.find_by_pid(0).is_none());
        assert!(table.find_by_pid(-5).is_none());
        assert!(table.find_by_job_number(0).is_none());
        assert_eq!(table.pid_to_job_number(-1), 0);
        assert_eq!(table.pid_to_job_number(5), 1);
    }

    #[test]
    fn find_by_pid_matches_leader_and_representative() {
        let mut table = JobTable::new();
        table.add(10, &[10, 11, 12], JobState::Background, "a | b | c").unwrap();
        assert_eq!(table.find_by_pid(10).unwrap().job_number, 1);
        assert_eq!(table.find_by_pid(12).unwrap().job_number, 1);
        assert!(table.find_by_pid(11).is_none());
        assert_eq!(table.find_by_member(11).unwrap().job_number, 1);
    }

    #[test]
    fn foreground_pid_is_the_representative() {
        let mut table = JobTable::new();
        assert_eq!(table.foreground_pid(), None);
        table.add(10, &[10, 11], JobState::Foreground, "a | b").unwrap();
        table.add(20, &[20], JobState::Background, "c &").unwrap();
        assert_eq!(table.foreground_pid(), Some(11));

        table.set_state(11, JobState::Stopped);
        assert_eq!(table.foreground_pid(), None);
    }

    #[test]
    fn set_state_announces_only_background() {
        let mut table = JobTable::new();
        table.add(42, &[42], JobState::Stopped, "sleep 5").unwrap();
        assert_eq!(table.set_state(42, JobState::Foreground), None);
        assert_eq!(table.set_state(42, JobState::Stopped), None);
        assert_eq!(
            table.set_state(42, JobState::Background).as_deref(),
            Some("[1] (42) sleep 5")
        );

        table.add(50, &[50, 51], JobState::Stopped, "a | b").unwrap();
        assert_eq!(
            table.set_state(50, JobState::Background).as_deref(),
            Some("[2] (51) a | b")
        );
        assert_eq!(table.set_state(7, JobState::Background), None);
    }

    #[test]
    fn retire_member_reports_completion() {
        let mut table = JobTable::new();
        table.add(10, &[10, 11], JobState::Foreground, "a | b").unwrap();

        let retired = table.retire_member(11).unwrap();
        assert!(retired.was_representative);
        assert!(!retired.job_finished);
        // Still foreground while the first stage is alive.
        assert_eq!(table.foreground_pid(), Some(11));

        let retired = table.retire_member(10).unwrap();
        assert!(!retired.was_representative);
        assert!(retired.job_finished);
        assert_eq!(retired.job_number, 1);
        assert!(table.retire_member(10).is_none());
    }

    #[test]
    fn initialize_empties_every_slot() {
        let mut table = JobTable::new();
        table.add(1, &[1], JobState::Background, "a").unwrap();
        table.add(2, &[2], JobState::Stopped, "b").unwrap();
        table.initialize();
        assert!(table.is_empty());
        assert_eq!(table.add(3, &[3], JobState::Background, "c").unwrap(), 1);
    }

    #[test]
    fn state_names_match_jobs_listing() {
        assert_eq!(JobState::Background.to_string(), "Running");
        assert_eq!(JobState::Foreground.to_string(), "Foreground");
        assert_eq!(JobState::Stopped.to_string(), "Stopped");
    }
}
