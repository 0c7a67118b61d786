use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures the supervisor itself can hit while managing jobs.
///
/// User typos in `fg`/`bg` are not errors of the shell and are reported
/// directly by the builtins; a program that cannot be exec'd is a per-stage
/// failure reported by the launcher.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Tried to create too many jobs")]
    TableFull { capacity: usize },

    #[error("invalid process id {0}")]
    InvalidProcessId(libc::pid_t),

    #[error("{}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("{command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("kill ({pgid}): {source}")]
    Signal {
        pgid: libc::pid_t,
        #[source]
        source: io::Error,
    },

    #[error("waitpid error: {0}")]
    Wait(#[source] io::Error),

    #[error("signal error: {0}")]
    SignalSetup(String),
}

impl ShellError {
    /// Errors after which the supervisor can no longer guarantee correct job
    /// bookkeeping.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::Wait(_) | ShellError::SignalSetup(_))
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
