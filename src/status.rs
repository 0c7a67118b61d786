/// One status change reported by `waitpid` for a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    /// Exited normally with this code.
    Exited(i32),
    /// Terminated by this signal.
    Signaled(i32),
    /// Stopped by this signal; the process is still alive.
    Stopped(i32),
    /// Resumed by SIGCONT.
    Continued,
}

impl ChildEvent {
    /// Decode a raw wait status as filled in by `waitpid`.
    pub fn from_wait_status(raw_status: libc::c_int) -> Option<ChildEvent> {
        if unsafe { libc::WIFEXITED(raw_status) } {
            return Some(ChildEvent::Exited(unsafe { libc::WEXITSTATUS(raw_status) }));
        }

        if unsafe { libc::WIFSIGNALED(raw_status) } {
            return Some(ChildEvent::Signaled(unsafe { libc::WTERMSIG(raw_status) }));
        }

        if unsafe { libc::WIFSTOPPED(raw_status) } {
            return Some(ChildEvent::Stopped(unsafe { libc::WSTOPSIG(raw_status) }));
        }

        if unsafe { libc::WIFCONTINUED(raw_status) } {
            return Some(ChildEvent::Continued);
        }

        None
    }

    /// Shell-style exit code: 128 + signal for signal deaths.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            ChildEvent::Exited(code) => Some(code),
            ChildEvent::Signaled(signal) => Some(128 + signal),
            ChildEvent::Stopped(_) | ChildEvent::Continued => None,
        }
    }
}
