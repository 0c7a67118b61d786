use std::io::Write;

use crate::error::{Result, ShellError};
use crate::job_control;
use crate::jobs::{Job, JobState, JobTable, Pid};
use crate::supervisor::Supervisor;

/// The list of all builtin command names.
const BUILTINS: &[&str] = &["quit", "jobs", "bg", "fg"];

#[derive(Debug, PartialEq, Eq)]
pub enum BuiltinAction {
    Continue,
    Quit,
}

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Execute a builtin command, writing its output to `out`.
pub fn execute(
    supervisor: &Supervisor,
    program: &str,
    args: &[String],
    out: &mut dyn Write,
) -> Result<BuiltinAction> {
    match program {
        "quit" => Ok(BuiltinAction::Quit),
        "jobs" => {
            builtin_jobs(&supervisor.lock(), out);
            Ok(BuiltinAction::Continue)
        }
        "fg" => builtin_bgfg(supervisor, "fg", JobState::Foreground, args, out),
        "bg" => builtin_bgfg(supervisor, "bg", JobState::Background, args, out),
        _ => {
            let _ = writeln!(out, "tsh: unknown builtin: {program}");
            Ok(BuiltinAction::Continue)
        }
    }
}

/// Print a snapshot of every live job.
fn builtin_jobs(table: &JobTable, out: &mut dyn Write) {
    for job in table.list() {
        let _ = writeln!(
            out,
            "[{}] ({}) {} {}",
            job.job_number, job.representative, job.state, job.command
        );
    }
}

/// What a `fg`/`bg` argument names.
#[derive(Debug, PartialEq, Eq)]
enum Target {
    Job(usize),
    Process(Pid),
}

/// Parse `%N` or a bare pid. The error is the user-facing message.
fn parse_target(name: &str, arg: Option<&str>) -> std::result::Result<Target, String> {
    let Some(arg) = arg else {
        return Err(format!("{name} command requires PID or %job id argument"));
    };
    let malformed = || format!("{name}: argument must be a PID or %job id");

    match arg.strip_prefix('%') {
        Some(number) => match number.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Target::Job(n)),
            _ => Err(malformed()),
        },
        None => match arg.parse::<Pid>() {
            Ok(pid) if pid > 0 => Ok(Target::Process(pid)),
            _ => Err(malformed()),
        },
    }
}

fn resolve<'a>(table: &'a JobTable, target: &Target) -> std::result::Result<&'a Job, String> {
    let job_number = match *target {
        Target::Job(n) => n,
        Target::Process(pid) => match table.pid_to_job_number(pid) {
            0 => return Err(format!("({pid}): No such process")),
            n => n,
        },
    };
    table
        .find_by_job_number(job_number)
        .ok_or_else(|| format!("%{job_number}: No such job"))
}

/// Move a job to the foreground or background, continuing it if stopped.
fn builtin_bgfg(
    supervisor: &Supervisor,
    name: &str,
    target_state: JobState,
    args: &[String],
    out: &mut dyn Write,
) -> Result<BuiltinAction> {
    let target = match parse_target(name, args.first().map(String::as_str)) {
        Ok(target) => target,
        Err(message) => {
            let _ = writeln!(out, "{message}");
            return Ok(BuiltinAction::Continue);
        }
    };

    let representative = {
        let mut table = supervisor.lock();
        let (job_number, leader, representative, state) = match resolve(&table, &target) {
            Ok(job) => (job.job_number, job.leader, job.representative, job.state),
            Err(message) => {
                let _ = writeln!(out, "{message}");
                return Ok(BuiltinAction::Continue);
            }
        };

        if state == JobState::Stopped {
            job_control::signal_group(leader, libc::SIGCONT)
                .map_err(|source| ShellError::Signal { pgid: leader, source })?;
        }
        if let Some(announcement) = table.set_job_state(job_number, target_state) {
            let _ = writeln!(out, "{announcement}");
        }
        representative
    };

    if target_state == JobState::Foreground {
        supervisor.wait_for_foreground(representative);
    }
    Ok(BuiltinAction::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn supervisor_with(jobs: &[(Pid, &[Pid], JobState, &str)]) -> Supervisor {
        let sup = Supervisor::new(Config::default(), false);
        {
            let mut table = sup.lock();
            for (leader, stages, state, command) in jobs {
                table.add(*leader, stages, *state, command).unwrap();
            }
        }
        sup
    }

    fn run(sup: &Supervisor, line: &[&str]) -> (BuiltinAction, String) {
        let args: Vec<String> = line[1..].iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        let action = execute(sup, line[0], &args, &mut out).unwrap();
        (action, String::from_utf8(out).unwrap())
    }

    #[test]
    fn builtin_names() {
        for name in ["quit", "jobs", "bg", "fg"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("exit"));
        assert!(!is_builtin("sleep"));
    }

    #[test]
    fn quit_ends_the_loop() {
        let sup = supervisor_with(&[]);
        assert_eq!(run(&sup, &["quit"]).0, BuiltinAction::Quit);
    }

    #[test]
    fn jobs_lists_state_names() {
        let sup = supervisor_with(&[
            (100, &[100][..], JobState::Background, "sleep 10 &"),
            (200, &[200, 201][..], JobState::Stopped, "cat | wc"),
        ]);
        let (_, out) = run(&sup, &["jobs"]);
        assert_eq!(
            out,
            "[1] (100) Running sleep 10 &\n[2] (201) Stopped cat | wc\n"
        );
    }

    #[test]
    fn target_parsing() {
        assert_eq!(parse_target("fg", Some("%3")), Ok(Target::Job(3)));
        assert_eq!(parse_target("bg", Some("1234")), Ok(Target::Process(1234)));
        assert_eq!(
            parse_target("fg", None),
            Err("fg command requires PID or %job id argument".to_string())
        );
        for bad in ["abc", "%", "%x", "0", "%0", "-5", "12abc"] {
            assert_eq!(
                parse_target("bg", Some(bad)),
                Err("bg: argument must be a PID or %job id".to_string()),
                "argument {bad:?}"
            );
        }
    }

    #[test]
    fn unknown_targets_are_reported() {
        let sup = supervisor_with(&[(100, &[100][..], JobState::Background, "sleep 10 &")]);
        assert_eq!(run(&sup, &["bg", "%7"]).1, "%7: No such job\n");
        assert_eq!(run(&sup, &["fg", "999999"]).1, "(999999): No such process\n");
        assert_eq!(run(&sup, &["fg"]).1, "fg command requires PID or %job id argument\n");
    }

    #[test]
    fn bg_on_running_job_reannounces_without_signalling() {
        let sup = supervisor_with(&[(100, &[100][..], JobState::Background, "sleep 10 &")]);
        let (action, out) = run(&sup, &["bg", "100"]);
        assert_eq!(action, BuiltinAction::Continue);
        assert_eq!(out, "[1] (100) sleep 10 &\n");
        assert_eq!(sup.lock().find_by_pid(100).unwrap().state, JobState::Background);
    }

    #[test]
    fn pipeline_jobs_resolve_by_representative_pid() {
        let sup = supervisor_with(&[(100, &[100, 101][..], JobState::Background, "a | b &")]);
        let table = sup.lock();
        let job = resolve(&table, &Target::Process(101)).unwrap();
        assert_eq!(job.leader, 100);
        assert!(resolve(&table, &Target::Job(1)).is_ok());
    }

    #[test]
    fn bg_announces_the_representative_of_a_pipeline() {
        let sup = supervisor_with(&[(100, &[100, 101][..], JobState::Background, "a | b &")]);
        assert_eq!(run(&sup, &["bg", "%1"]).1, "[1] (101) a | b &\n");
        assert_eq!(run(&sup, &["jobs"]).1, "[1] (101) Running a | b &\n");
    }
}
