mod ast;
mod builtins;
mod config;
mod error;
mod executor;
mod job_control;
mod jobs;
mod parser;
mod reaper;
mod signals;
mod status;
mod supervisor;

#[cfg(not(unix))]
compile_error!("tsh needs Unix process groups and signals");

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::builtins::BuiltinAction;
use crate::config::{Config, PROMPT, Startup, USAGE};
use crate::error::ShellError;
use crate::jobs::JobState;
use crate::supervisor::Supervisor;

fn main() -> ExitCode {
    let config = match Config::from_args(std::env::args().skip(1)) {
        Startup::Run(config) => config,
        Startup::Usage => {
            print!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tsh: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<()> {
    let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) } == 1;
    let supervisor = Arc::new(Supervisor::new(config, interactive));
    signals::install(Arc::clone(&supervisor)).context("installing signal handlers")?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if supervisor.config().emit_prompt {
            print!("{PROMPT}");
            stdout.flush()?;
        }

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("reading command line")?;
        if read == 0 {
            // End of file (ctrl-d).
            stdout.flush()?;
            return Ok(());
        }

        match eval(&supervisor, &line, &mut stdout) {
            Ok(BuiltinAction::Continue) => {}
            Ok(BuiltinAction::Quit) => return Ok(()),
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(ShellError::TableFull { .. }) => println!("Tried to create too many jobs"),
            Err(err) => eprintln!("tsh: {err}"),
        }
        stdout.flush()?;
    }
}

/// Run one command line: a builtin directly, anything else as a job. A
/// foreground job is waited for before returning.
fn eval(supervisor: &Supervisor, line: &str, out: &mut dyn Write) -> error::Result<BuiltinAction> {
    let pipeline = match parser::parse(line) {
        Ok(Some(pipeline)) => pipeline,
        Ok(None) => return Ok(BuiltinAction::Continue),
        Err(message) => {
            let _ = writeln!(out, "tsh: {message}");
            return Ok(BuiltinAction::Continue);
        }
    };

    let first = &pipeline.stages[0];
    if builtins::is_builtin(first.program()) {
        return builtins::execute(supervisor, first.program(), &first.argv[1..], out);
    }

    if let Some(launched) = executor::launch(supervisor, &pipeline, out)? {
        tracing::debug!(
            job = launched.job_number,
            pgid = launched.leader,
            representative = launched.representative,
            "launched"
        );
        let _ = out.flush();
        if launched.state == JobState::Foreground {
            supervisor.wait_for_foreground(launched.representative);
        }
    }
    Ok(BuiltinAction::Continue)
}
