use std::io;

use crate::jobs::Pid;
use crate::status::ChildEvent;

/// Put `pid` into process group `pgid` (0 = its own group).
pub(crate) fn set_process_group(pid: Pid, pgid: Pid) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Child already exec'd (it set its own group first) or is already gone.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Deliver `signal` to every process in group `pgid`.
pub(crate) fn signal_group(pgid: Pid, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Source of pending child status changes. The reaper drains one of these
/// until it reports nothing more.
pub(crate) trait StatusSource {
    /// Next pending change, or `None` when no child has anything to report.
    fn next_event(&mut self) -> io::Result<Option<(Pid, ChildEvent)>>;
}

/// `waitpid(-1, WNOHANG | WUNTRACED | WCONTINUED)` over every descendant.
pub(crate) struct Waitpid;

impl StatusSource for Waitpid {
    fn next_event(&mut self) -> io::Result<Option<(Pid, ChildEvent)>> {
        let mut raw_status: libc::c_int = 0;

        loop {
            let rc = unsafe {
                libc::waitpid(
                    -1,
                    &mut raw_status,
                    libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED,
                )
            };
            if rc == 0 {
                return Ok(None);
            }
            if rc < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(code) if code == libc::EINTR => continue,
                    // No children left at all.
                    Some(code) if code == libc::ECHILD => return Ok(None),
                    _ => return Err(err),
                }
            }

            match ChildEvent::from_wait_status(raw_status) {
                Some(event) => return Ok(Some((rc, event))),
                None => {
                    tracing::warn!(pid = rc, raw_status, "unrecognized wait status");
                    continue;
                }
            }
        }
    }
}

/// Hands the controlling terminal to a foreground job and takes it back on drop.
/// Does nothing when stdin is not a terminal.
pub(crate) struct ForegroundTerminalGuard {
    tty_fd: Option<libc::c_int>,
    shell_pgid: Pid,
}

impl ForegroundTerminalGuard {
    pub(crate) fn new(target_pgid: Pid) -> io::Result<Self> {
        let tty_fd = if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
            Some(libc::STDIN_FILENO)
        } else {
            None
        };

        let shell_pgid = unsafe { libc::getpgrp() };
        let guard = Self { tty_fd, shell_pgid };

        if let Some(fd) = guard.tty_fd {
            set_terminal_foreground(fd, target_pgid)?;
        }

        Ok(guard)
    }
}

impl Drop for ForegroundTerminalGuard {
    fn drop(&mut self) {
        if let Some(fd) = self.tty_fd {
            if let Err(err) = set_terminal_foreground(fd, self.shell_pgid) {
                tracing::warn!(%err, "could not reclaim the terminal");
            }
        }
    }
}

struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

impl SignalIgnoreGuard {
    fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}

fn set_terminal_foreground(fd: libc::c_int, pgid: Pid) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    // The shell is not the terminal's foreground group while a job holds it.
    let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}
