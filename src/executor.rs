use std::fs::File;
use std::io::{self, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use os_pipe::PipeReader;

use crate::ast::{Pipeline, Stage};
use crate::config::EnvPolicy;
use crate::error::{Result, ShellError};
use crate::job_control;
use crate::jobs::{JobState, Pid};
use crate::supervisor::Supervisor;

/// A pipeline that was started and registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Launched {
    pub job_number: usize,
    pub leader: Pid,
    pub representative: Pid,
    pub state: JobState,
}

/// Start every stage of `pipeline` in one new process group and register the
/// group as a single job.
///
/// The job table stays locked from the capacity check until the job is
/// registered, so neither the reaper nor the signal relay can see a stage
/// before its job exists. Returns `Ok(None)` when no stage could be started.
pub fn launch(
    supervisor: &Supervisor,
    pipeline: &Pipeline,
    out: &mut dyn Write,
) -> Result<Option<Launched>> {
    let mut table = supervisor.lock();
    if !table.has_capacity() {
        return Err(ShellError::TableFull {
            capacity: table.capacity(),
        });
    }

    let redirections = open_redirections(&pipeline.stages)?;
    let env_policy = supervisor.config().env_policy;
    let last = pipeline.stages.len().saturating_sub(1);

    let mut leader: Option<Pid> = None;
    let mut pids: Vec<Pid> = Vec::with_capacity(pipeline.stages.len());
    let mut upstream: Option<PipeReader> = None;

    for (i, (stage, (input, output))) in pipeline.stages.iter().zip(redirections).enumerate() {
        let (downstream, pipe_writer) = if i < last {
            match os_pipe::pipe() {
                Ok((reader, writer)) => (Some(reader), Some(writer)),
                Err(err) => {
                    abandon(leader);
                    return Err(ShellError::Pipe(err));
                }
            }
        } else {
            (None, None)
        };

        // A pipe end overrides a file redirection on the same stream.
        let stdin = match (upstream.take(), input) {
            (Some(reader), _) => Stdio::from(reader),
            (None, Some(file)) => Stdio::from(file),
            (None, None) => Stdio::inherit(),
        };
        let stdout = match (pipe_writer, output) {
            (Some(writer), _) => Stdio::from(writer),
            (None, Some(file)) => Stdio::from(file),
            (None, None) => Stdio::inherit(),
        };

        match spawn_stage(stage, stdin, stdout, leader, env_policy) {
            Ok(pid) => {
                let pgid = *leader.get_or_insert(pid);
                // The child joined the group itself before exec; doing it here
                // too closes the window before the parent continues.
                if let Err(err) = job_control::set_process_group(pid, pgid) {
                    tracing::warn!(%err, pid, pgid, "setpgid failed");
                }
                tracing::debug!(pid, pgid, program = stage.program(), "started stage");
                pids.push(pid);
            }
            Err(err) if is_exec_failure(&err) => {
                tracing::debug!(%err, program = stage.program(), "exec failed");
                let _ = writeln!(out, "{}: Command not found", pipeline.text);
            }
            Err(source) => {
                abandon(leader);
                return Err(ShellError::Spawn {
                    command: stage.program().to_string(),
                    source,
                });
            }
        }

        upstream = downstream;
    }

    let Some(leader) = leader else {
        return Ok(None);
    };

    let state = if pipeline.background {
        JobState::Background
    } else {
        JobState::Foreground
    };
    let job_number = match table.add(leader, &pids, state, &pipeline.text) {
        Ok(number) => number,
        Err(err) => {
            abandon(Some(leader));
            return Err(err);
        }
    };

    if state == JobState::Background {
        if let Some(job) = table.find_by_job_number(job_number) {
            let _ = writeln!(out, "{}", job.announcement());
        }
    }

    Ok(Some(Launched {
        job_number,
        leader,
        representative: *pids.last().unwrap_or(&leader),
        state,
    }))
}

/// Open every `<` and `>` target before any process exists, so a bad path
/// abandons the whole submission cleanly.
fn open_redirections(stages: &[Stage]) -> Result<Vec<(Option<File>, Option<File>)>> {
    stages
        .iter()
        .map(|stage| {
            let input = stage.input.as_deref().map(open_input).transpose()?;
            let output = stage.output.as_deref().map(open_output).transpose()?;
            Ok((input, output))
        })
        .collect()
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| ShellError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

fn open_output(path: &Path) -> Result<File> {
    File::create(path).map_err(|source| ShellError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

fn spawn_stage(
    stage: &Stage,
    stdin: Stdio,
    stdout: Stdio,
    leader: Option<Pid>,
    env_policy: EnvPolicy,
) -> io::Result<Pid> {
    let program = find_program(stage.program())
        .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

    let mut command = Command::new(program);
    command
        .args(stage.argv.iter().skip(1))
        .stdin(stdin)
        .stdout(stdout)
        // 0 starts a new group led by this process.
        .process_group(leader.unwrap_or(0));
    if env_policy == EnvPolicy::Minimal {
        command.env_clear();
    }

    // spawn() returns once the child has exec'd or failed to.
    let child = command.spawn()?;
    Pid::try_from(child.id()).map_err(|_| io::Error::other("process id out of range"))
}

/// The program could not be loaded; only this stage fails.
fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || err.raw_os_error() == Some(libc::ENOEXEC)
}

/// Kill whatever part of a pipeline was already started.
fn abandon(leader: Option<Pid>) {
    if let Some(pgid) = leader {
        if let Err(err) = job_control::signal_group(pgid, libc::SIGKILL) {
            tracing::warn!(%err, pgid, "could not kill partial pipeline");
        }
    }
}

/// Resolve a program name the way `execvp` would, against the shell's own
/// `PATH`. Names containing `/` are used as given.
fn find_program(name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        return Some(PathBuf::from(name));
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Check if a path points to an executable file.
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = path.metadata() else {
        return false;
    };
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    use super::*;

    use crate::config::Config;

    /// Output sink that, on the first line written during a launch, starts a
    /// thread relaying a null signal to the foreground job. That thread has
    /// to wait for the table lock held by `launch`.
    struct ContendingOutput {
        supervisor: Arc<Supervisor>,
        relay: Option<JoinHandle<Option<Pid>>>,
        text: Vec<u8>,
    }

    impl Write for ContendingOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.relay.is_none() {
                let supervisor = Arc::clone(&self.supervisor);
                self.relay = Some(thread::spawn(move || supervisor.relay(0)));
            }
            self.text.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn find_program_searches_path() {
        let sh = find_program("sh").expect("sh on PATH");
        assert!(sh.is_absolute());
        assert!(is_executable(&sh));
        assert!(find_program("definitely-not-a-real-program-tsh").is_none());
        assert!(find_program("").is_none());
    }

    #[test]
    fn slash_names_are_taken_literally() {
        assert_eq!(find_program("./nope"), Some(PathBuf::from("./nope")));
        assert_eq!(find_program("/bin/sh"), Some(PathBuf::from("/bin/sh")));
    }

    #[test]
    fn exec_failures_are_per_stage() {
        assert!(is_exec_failure(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(is_exec_failure(&io::Error::from_raw_os_error(libc::EACCES)));
        assert!(is_exec_failure(&io::Error::from_raw_os_error(libc::ENOEXEC)));
        assert!(!is_exec_failure(&io::Error::from_raw_os_error(libc::EAGAIN)));
    }

    #[test]
    fn missing_input_file_abandons_before_spawning() {
        let sup = Supervisor::new(Config::default(), false);
        let pipeline = crate::parser::parse("cat < /definitely/missing/tsh-input")
            .unwrap()
            .unwrap();
        let mut out = Vec::new();
        let err = launch(&sup, &pipeline, &mut out).unwrap_err();
        assert!(matches!(err, ShellError::Redirect { .. }));
        assert!(out.is_empty());
        assert!(sup.lock().is_empty());
    }

    #[test]
    fn unknown_program_registers_nothing() {
        let sup = Supervisor::new(Config::default(), false);
        let pipeline = crate::parser::parse("definitely-not-a-real-program-tsh\n")
            .unwrap()
            .unwrap();
        let mut out = Vec::new();
        assert_eq!(launch(&sup, &pipeline, &mut out).unwrap(), None);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "definitely-not-a-real-program-tsh: Command not found\n"
        );
        assert!(sup.lock().is_empty());
    }

    #[test]
    fn relay_during_launch_sees_the_registered_job() {
        let sup = Arc::new(Supervisor::new(Config::default(), false));
        // The first stage fails before the second one is spawned, so the
        // relay thread starts while the job does not exist yet.
        let pipeline = crate::parser::parse("definitely-not-a-real-program-tsh | sleep 5")
            .unwrap()
            .unwrap();
        let mut out = ContendingOutput {
            supervisor: Arc::clone(&sup),
            relay: None,
            text: Vec::new(),
        };

        let launched = launch(&sup, &pipeline, &mut out).unwrap().expect("sleep started");
        let relayed = out.relay.take().expect("relay thread").join().unwrap();
        job_control::signal_group(launched.leader, libc::SIGKILL).unwrap();

        assert_eq!(relayed, Some(launched.leader));
        assert_eq!(launched.state, JobState::Foreground);
        assert!(String::from_utf8(out.text).unwrap().ends_with(": Command not found\n"));
    }

    #[test]
    fn full_table_launches_nothing() {
        let sup = Supervisor::new(Config::default(), false);
        {
            let mut table = sup.lock();
            for pid in 1..=table.capacity() as Pid {
                table.add(100_000 + pid, &[100_000 + pid], JobState::Background, "x &").unwrap();
            }
        }
        let pipeline = crate::parser::parse("definitely-not-a-real-program-tsh").unwrap().unwrap();
        let err = launch(&sup, &pipeline, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ShellError::TableFull { capacity: 16 }));
    }
}
