//! Signal wiring for the supervisor.
//!
//! The real handlers installed by `ctrlc` and `signal-hook` only wake a
//! thread; all job-table work happens on that thread under the table lock.
//!
//! - SIGINT (Ctrl-C): forwarded to the foreground job's process group.
//! - SIGTSTP (Ctrl-Z): forwarded to the foreground job's process group.
//! - SIGCHLD: drains every pending child status change.
//! - SIGQUIT: terminates the shell.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

use signal_hook::consts::{SIGCHLD, SIGQUIT, SIGTSTP};
use signal_hook::iterator::Signals;

use crate::error::{Result, ShellError};
use crate::job_control::Waitpid;
use crate::supervisor::Supervisor;

pub fn install(supervisor: Arc<Supervisor>) -> Result<()> {
    let relay = Arc::clone(&supervisor);
    ctrlc::set_handler(move || {
        relay.relay(libc::SIGINT);
        println!();
        let _ = io::stdout().flush();
    })
    .map_err(|err| ShellError::SignalSetup(err.to_string()))?;

    let mut signals = Signals::new([SIGCHLD, SIGTSTP, SIGQUIT])
        .map_err(|err| ShellError::SignalSetup(err.to_string()))?;

    thread::Builder::new()
        .name("tsh-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                handle(&supervisor, signal);
            }
        })
        .map_err(|err| ShellError::SignalSetup(err.to_string()))?;

    Ok(())
}

fn handle(supervisor: &Supervisor, signal: libc::c_int) {
    match signal {
        SIGCHLD => {
            let mut stdout = io::stdout();
            match supervisor.reap(&mut Waitpid, &mut stdout) {
                Ok(consumed) => tracing::trace!(consumed, "reaped"),
                Err(err) => {
                    // Without waitpid the table can no longer be trusted.
                    eprintln!("tsh: {err}");
                    std::process::exit(1);
                }
            }
        }
        SIGTSTP => {
            supervisor.relay(libc::SIGTSTP);
            println!();
            let _ = io::stdout().flush();
        }
        SIGQUIT => {
            println!("Terminating after receipt of SIGQUIT signal");
            let _ = io::stdout().flush();
            std::process::exit(1);
        }
        other => tracing::debug!(signal = other, "ignoring unexpected signal"),
    }
}
