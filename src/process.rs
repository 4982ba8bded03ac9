use std::fmt;

use crate::error::{Error, Result};

/// Exit status of a process.
///
/// This is an opaque type that wraps the platform's native exit status
/// representation. Use the provided methods to query the exit status.
///
/// On Unix, the raw value is the status from `waitpid()`. On Windows, it is the exit code
/// from `GetExitCodeProcess()`.
#[derive(Eq, PartialEq, Hash, Copy, Clone)]
pub struct ExitStatus(pub(crate) os::RawExitStatus);

impl ExitStatus {
    /// Create an `ExitStatus` from the raw platform value.
    pub(crate) fn from_raw(raw: os::RawExitStatus) -> ExitStatus {
        ExitStatus(raw)
    }

    /// True if the exit code of the process is 0.
    pub fn success(&self) -> bool {
        self.code() == 0
    }
}

/// An owned handle to a child process that has not been reaped yet.
///
/// The handle is consumed by [`wait_for_exit`](Self::wait_for_exit), so a
/// process can be waited for at most once. If the handle is dropped without
/// being waited for, the drop blocks until the child exits, so that no zombie
/// process (Unix) or process handle (Windows) outlives it.
///
/// Because the handle does not own any pipes to the child, callers must close
/// their end of the child's stdin before dropping it. Otherwise the child may
/// wait for input while the drop waits for the child.
pub struct ProcessHandle {
    pid: u32,
    // `None` once the process has been reaped.
    inner: Option<os::ProcessId>,
}

impl ProcessHandle {
    pub(crate) fn new(pid: u32, id: os::ProcessId) -> ProcessHandle {
        ProcessHandle {
            pid,
            inner: Some(id),
        }
    }

    /// Returns the PID of the child process.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Block until the process terminates and return its exit status.
    ///
    /// This reaps the process; the handle cannot be used afterwards.
    pub fn wait_for_exit(mut self) -> Result<ExitStatus> {
        self.reap()
    }

    fn reap(&mut self) -> Result<ExitStatus> {
        match self.inner.take() {
            Some(id) => os::wait(self.pid, id).map_err(Error::WaitFailed),
            None => Err(Error::InvalidInput(format!(
                "process {} has already been waited for",
                self.pid
            ))),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.inner.is_some() {
            tracing::debug!(pid = self.pid, "reaping process on drop");
            if let Err(e) = self.reap() {
                tracing::warn!(pid = self.pid, error = %e, "failed to reap process");
            }
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("waited", &self.inner.is_none())
            .finish()
    }
}

#[cfg(unix)]
mod os {
    use super::*;
    use crate::posix;
    use std::io;

    pub type RawExitStatus = i32;
    pub type ProcessId = ();

    impl ExitStatus {
        /// Returns the exit code of the process.
        ///
        /// A process killed by a signal reports `128 + signal`, following the
        /// shell convention.
        pub fn code(&self) -> i32 {
            let raw = self.0;
            if libc::WIFEXITED(raw) {
                libc::WEXITSTATUS(raw)
            } else if libc::WIFSIGNALED(raw) {
                128 + libc::WTERMSIG(raw)
            } else {
                raw
            }
        }

        /// Returns the signal number if the process was killed by a signal.
        pub fn signal(&self) -> Option<i32> {
            let raw = self.0;
            libc::WIFSIGNALED(raw).then(|| libc::WTERMSIG(raw))
        }
    }

    impl fmt::Display for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let raw = self.0;
            if libc::WIFEXITED(raw) {
                write!(f, "exit code {}", libc::WEXITSTATUS(raw))
            } else if libc::WIFSIGNALED(raw) {
                write!(f, "signal {}", libc::WTERMSIG(raw))
            } else {
                write!(f, "unrecognized wait status: {} {:#x}", raw, raw)
            }
        }
    }

    impl fmt::Debug for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let raw = self.0;
            if libc::WIFEXITED(raw) {
                write!(f, "ExitStatus(Exited({}))", libc::WEXITSTATUS(raw))
            } else if libc::WIFSIGNALED(raw) {
                write!(f, "ExitStatus(Signal({}))", libc::WTERMSIG(raw))
            } else {
                write!(f, "ExitStatus(Unknown({} {:#x}))", raw, raw)
            }
        }
    }

    pub fn wait(pid: u32, _id: ProcessId) -> io::Result<ExitStatus> {
        loop {
            match posix::waitpid(pid, 0) {
                Ok((pid_out, status)) if pid_out == pid => {
                    return Ok(ExitStatus::from_raw(status));
                }
                Ok(_) => continue,
                Err(e) if e.raw_os_error() == Some(posix::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(windows)]
mod os {
    use super::*;
    use crate::win32;
    use std::io;

    pub type RawExitStatus = u32;
    pub type ProcessId = win32::Handle;

    impl ExitStatus {
        /// Returns the exit code of the process.
        pub fn code(&self) -> i32 {
            self.0 as i32
        }

        /// Returns the signal number if the process was killed by a signal.
        ///
        /// On Windows, this always returns `None`.
        pub fn signal(&self) -> Option<i32> {
            None
        }
    }

    impl fmt::Display for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "exit code {}", self.0)
        }
    }

    impl fmt::Debug for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "ExitStatus(Exited({}))", self.0)
        }
    }

    pub fn wait(_pid: u32, handle: ProcessId) -> io::Result<ExitStatus> {
        wait_for_termination(&handle)?;
        let exit_code = win32::GetExitCodeProcess(&handle)?;
        Ok(ExitStatus::from_raw(exit_code))
    }

    pub fn wait_for_termination(handle: &win32::Handle) -> io::Result<()> {
        match win32::WaitForSingleObject(handle, None)? {
            win32::WaitEvent::OBJECT_0 => Ok(()),
            win32::WaitEvent::TIMEOUT => Err(io::Error::other(
                "WaitForSingleObject timed out without a timeout",
            )),
        }
    }

    impl ProcessHandle {
        /// Block until the process has terminated, without collecting its
        /// exit status.
        pub(crate) fn wait_for_termination(&self) -> io::Result<()> {
            match &self.inner {
                Some(handle) => wait_for_termination(handle),
                None => Ok(()),
            }
        }
    }
}
