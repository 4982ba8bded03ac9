use std::collections::HashSet;
use std::ffi::{OsStr, OsString};

use crate::error::{Error, Result};
use crate::path::AbsolutePath;
use crate::pipe::ChildEnds;
use crate::process::{ExitStatus, ProcessHandle};

/// Whether the child starts from a copy of the parent's environment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum EnvironmentInheritance {
    /// The child sees the parent's variables plus the additional ones.
    #[default]
    Inherit,
    /// The child sees only the additional variables.
    NoInherit,
}

/// Everything needed to create the child, apart from its standard streams.
#[derive(Debug, Clone)]
pub struct LaunchParams {
    pub executable: AbsolutePath,
    /// Values for the child's `argv[1..]`; `argv[0]` is the executable.
    pub arguments: Vec<OsString>,
    /// Must be an existing directory, otherwise the child fails to launch.
    pub current_dir: AbsolutePath,
    /// Variables set in addition to (or, with `NoInherit`, instead of) the
    /// parent's environment. Later entries override earlier ones.
    pub environment: Vec<(OsString, OsString)>,
    pub inheritance: EnvironmentInheritance,
    /// On Linux, deliver SIGHUP to the child when the launching thread exits.
    pub die_with_parent: bool,
}

impl LaunchParams {
    pub fn new(executable: AbsolutePath, current_dir: AbsolutePath) -> LaunchParams {
        LaunchParams {
            executable,
            arguments: vec![],
            current_dir,
            environment: vec![],
            inheritance: EnvironmentInheritance::Inherit,
            die_with_parent: true,
        }
    }

    fn validate(&self) -> Result<()> {
        fn has_nul(s: &OsStr) -> bool {
            s.as_encoded_bytes().contains(&0)
        }
        if has_nul(self.executable.as_os_str()) || has_nul(self.current_dir.as_os_str()) {
            return Err(Error::InvalidInput("path contains a NUL character".into()));
        }
        if self.arguments.iter().any(|a| has_nul(a)) {
            return Err(Error::InvalidInput("argument contains a NUL character".into()));
        }
        for (name, value) in &self.environment {
            if name.is_empty() || name.as_encoded_bytes().contains(&b'=') || has_nul(name) {
                return Err(Error::InvalidInput(format!(
                    "invalid environment variable name {:?}",
                    name
                )));
            }
            if has_nul(value) {
                return Err(Error::InvalidInput(format!(
                    "value of environment variable {:?} contains a NUL character",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// A launched child process whose launch outcome may still be pending.
///
/// On Unix the launcher returns right after `fork()`; whether the child
/// actually managed to exec is learned in [`wait_for_exit`](Self::wait_for_exit).
#[derive(Debug)]
pub struct AsyncProcess {
    process: ProcessHandle,
    #[cfg(unix)]
    child_error: crate::error_channel::ErrorReader,
}

impl AsyncProcess {
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Wait for the child to exit.
    ///
    /// An error reported by the child before exec takes precedence over its
    /// exit status; the child is reaped in either case.
    pub fn wait_for_exit(mut self) -> Result<ExitStatus> {
        if let Some(code) = self.reported_error()? {
            tracing::debug!(pid = self.pid(), code, "child failed before exec");
            if let Err(e) = self.process.wait_for_exit() {
                tracing::warn!(error = %e, "failed to reap child after setup failure");
            }
            return Err(Error::ChildSetupFailed { code });
        }
        let pid = self.process.pid();
        let status = self.process.wait_for_exit()?;
        tracing::debug!(pid, %status, "process exited");
        Ok(status)
    }

    #[cfg(unix)]
    fn reported_error(&mut self) -> Result<Option<i32>> {
        use crate::error_channel::ChildReport;
        match self.child_error.read_reported_error()? {
            ChildReport::Launched => Ok(None),
            ChildReport::Failed(code) => Ok(Some(code)),
        }
    }

    #[cfg(windows)]
    fn reported_error(&mut self) -> Result<Option<i32>> {
        // CreateProcessW reports every launch failure synchronously.
        Ok(None)
    }

    #[cfg(windows)]
    pub(crate) fn wait_for_termination(&self) -> std::io::Result<()> {
        self.process.wait_for_termination()
    }
}

/// Start `params.executable` with `stdio` as its standard streams.
///
/// The given ends are consumed and closed in the parent once the child has
/// been created. The call does not wait for the child.
pub fn launch_process(params: &LaunchParams, stdio: ChildEnds) -> Result<AsyncProcess> {
    params.validate()?;
    let process = os::launch(params, stdio)?;
    tracing::debug!(
        pid = process.pid(),
        executable = %params.executable,
        "launched process"
    );
    Ok(process)
}

/// Format `NAME=VALUE` entries, dropping all but the last definition of each
/// name. Entries are ordered by the position of that last definition.
#[cfg_attr(windows, allow(dead_code))]
fn format_env<'a>(env: impl DoubleEndedIterator<Item = (&'a OsStr, &'a OsStr)>) -> Vec<OsString> {
    let mut seen = HashSet::<&OsStr>::new();
    let mut formatted: Vec<_> = env
        .rev()
        .filter(|&(k, _)| seen.insert(k))
        .map(|(k, v)| {
            let mut fmt = k.to_owned();
            fmt.push("=");
            fmt.push(v);
            fmt
        })
        .collect();
    formatted.reverse();
    formatted
}

#[cfg(unix)]
mod os {
    use super::*;

    use std::convert::Infallible;
    use std::ffi::CString;
    use std::io;
    use std::os::unix::io::{AsRawFd, RawFd};

    use crate::error_channel::{self, ErrorChannel};
    use crate::posix::{self, CVec};

    /// Everything the child needs, allocated before fork.
    struct PreparedExec {
        path: CString,
        argv: CVec,
        envp: CVec,
        cwd: CString,
        die_with_parent: bool,
    }

    impl PreparedExec {
        fn new(params: &LaunchParams) -> io::Result<PreparedExec> {
            let mut argv = Vec::with_capacity(params.arguments.len() + 1);
            argv.push(params.executable.as_os_str().to_owned());
            argv.extend(params.arguments.iter().cloned());
            Ok(PreparedExec {
                path: posix::os_to_cstring(params.executable.as_os_str())?,
                argv: CVec::new(&argv)?,
                envp: CVec::new(&resolve_environment(params))?,
                cwd: posix::os_to_cstring(params.current_dir.as_os_str())?,
                die_with_parent: params.die_with_parent,
            })
        }
    }

    fn resolve_environment(params: &LaunchParams) -> Vec<OsString> {
        let inherited: Vec<(OsString, OsString)> = match params.inheritance {
            EnvironmentInheritance::Inherit => std::env::vars_os().collect(),
            EnvironmentInheritance::NoInherit => vec![],
        };
        format_env(
            inherited
                .iter()
                .chain(params.environment.iter())
                .map(|(k, v)| (k.as_os_str(), v.as_os_str())),
        )
    }

    pub(crate) fn launch(params: &LaunchParams, stdio: ChildEnds) -> Result<AsyncProcess> {
        let prepared = PreparedExec::new(params).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let (reader, writer) = ErrorChannel::new().map_err(Error::SpawnFailed)?.into_parts();
        let stdio_fds = [
            stdio.stdin.as_raw_fd(),
            stdio.stdout.as_raw_fd(),
            stdio.stderr.as_raw_fd(),
        ];

        let pid = match unsafe { posix::fork() }.map_err(Error::SpawnFailed)? {
            Some(pid) => pid,
            None => {
                drop(reader);
                exec_child(&prepared, stdio_fds, writer.as_raw_fd());
            }
        };

        // Only the child may hold the write end, so that exec closes the
        // last copy of it.
        drop(writer);
        drop(stdio);
        Ok(AsyncProcess {
            process: ProcessHandle::new(pid, ()),
            child_error: reader,
        })
    }

    // Move `fd` out of the standard stream slots 0-2.
    fn lift(fd: RawFd) -> io::Result<RawFd> {
        if fd > 2 {
            Ok(fd)
        } else {
            posix::dup_cloexec_above(fd, 3)
        }
    }

    fn errno_of(e: &io::Error) -> i32 {
        e.raw_os_error().unwrap_or(libc::EIO)
    }

    // Runs in the forked child: async-signal-safe operations only.
    fn exec_child(prepared: &PreparedExec, stdio: [RawFd; 3], err_fd: RawFd) -> ! {
        let mut err_fd = match lift(err_fd) {
            Ok(fd) => fd,
            Err(e) => error_channel::report_and_exit(err_fd, errno_of(&e)),
        };
        match child_setup(prepared, stdio, &mut err_fd) {
            Ok(never) => match never {},
            Err(e) => error_channel::report_and_exit(err_fd, errno_of(&e)),
        }
    }

    fn child_setup(
        prepared: &PreparedExec,
        stdio: [RawFd; 3],
        err_fd: &mut RawFd,
    ) -> io::Result<Infallible> {
        // Lift the ends first so that no dup2 below overwrites an end that is
        // still to be installed.
        let mut ends = stdio;
        for fd in &mut ends {
            *fd = lift(*fd)?;
        }
        for (target, &fd) in ends.iter().enumerate() {
            posix::dup2(fd, target as RawFd)?;
        }

        posix::set_cloexec(*err_fd)?;
        posix::chdir(&prepared.cwd)?;

        // Park the error channel at 3 so that everything above it can go.
        if *err_fd != 3 {
            posix::dup2(*err_fd, 3)?;
            *err_fd = 3;
            posix::set_cloexec(3)?;
        }
        posix::close_fds_from(4);

        if prepared.die_with_parent {
            posix::set_parent_death_signal()?;
        }
        posix::reset_signals()?;
        Err(posix::execve(&prepared.path, &prepared.argv, &prepared.envp))
    }
}

#[cfg(windows)]
mod os {
    use super::*;

    use std::os::windows::ffi::{OsStrExt, OsStringExt};
    use std::os::windows::io::AsRawHandle;
    use std::sync::{Mutex, PoisonError};

    use crate::cmdline;
    use crate::envblock;
    use crate::win32;

    // Serializes the window in which child ends are inheritable, so that a
    // concurrent launch cannot inherit another child's pipe ends.
    static SPAWN_LOCK: Mutex<()> = Mutex::new(());

    fn wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().collect()
    }

    fn environment_block(params: &LaunchParams) -> std::io::Result<Option<Vec<u16>>> {
        if params.environment.is_empty() && params.inheritance == EnvironmentInheritance::Inherit {
            return Ok(None);
        }
        let base = match params.inheritance {
            EnvironmentInheritance::Inherit => {
                envblock::parse_block(&win32::GetEnvironmentStrings()?)
            }
            EnvironmentInheritance::NoInherit => vec![],
        };
        let overrides = params
            .environment
            .iter()
            .map(|(k, v)| (wide(k), wide(v)))
            .collect();
        let mut vars = envblock::merge(base, overrides);
        if vars.is_empty() {
            // Keep the child's notion of the current directory on drive C:.
            let name = OsStr::new("=C:");
            if let Some(value) = win32::GetEnvironmentVariable(name)? {
                vars.push((wide(name), value));
            }
        }
        Ok(Some(envblock::format_block(&vars)))
    }

    pub(crate) fn launch(params: &LaunchParams, stdio: ChildEnds) -> Result<AsyncProcess> {
        let executable = wide(params.executable.as_os_str());
        let arguments: Vec<Vec<u16>> = params.arguments.iter().map(|a| wide(a)).collect();
        let cmdline = cmdline::assemble_cmdline(&executable, &arguments).ok_or_else(|| {
            Error::SpawnFailed(std::io::Error::from_raw_os_error(
                win32::ERROR_BAD_PATHNAME as i32,
            ))
        })?;
        let appname = OsString::from_wide(&cmdline::to_native_separators(&executable));
        let cwd = OsString::from_wide(&cmdline::to_native_separators(&wide(
            params.current_dir.as_os_str(),
        )));
        let env_block = environment_block(params).map_err(Error::SpawnFailed)?;
        let mut flags = win32::CREATE_NO_WINDOW;
        if env_block.is_some() {
            flags |= win32::CREATE_UNICODE_ENVIRONMENT;
        }

        let (handle, pid) = {
            let _guard = SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let stdin = win32::DuplicateInheritable(&stdio.stdin).map_err(Error::SpawnFailed)?;
            let stdout = win32::DuplicateInheritable(&stdio.stdout).map_err(Error::SpawnFailed)?;
            let stderr = win32::DuplicateInheritable(&stdio.stderr).map_err(Error::SpawnFailed)?;
            win32::CreateProcess(
                &appname,
                &OsString::from_wide(&cmdline),
                env_block.as_deref(),
                &cwd,
                flags,
                stdin.as_raw_handle(),
                stdout.as_raw_handle(),
                stderr.as_raw_handle(),
            )
            .map_err(Error::SpawnFailed)?
            // the inheritable duplicates are closed here, before the lock is
            // released
        };
        drop(stdio);
        Ok(AsyncProcess {
            process: ProcessHandle::new(pid, handle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(s: &str) -> OsString {
        OsString::from(s)
    }

    #[test]
    fn format_env_keeps_last_definition() {
        let env = [
            (os("A"), os("1")),
            (os("B"), os("2")),
            (os("A"), os("3")),
        ];
        let formatted = format_env(env.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str())));
        assert_eq!(formatted, vec![os("B=2"), os("A=3")]);
    }

    fn params() -> LaunchParams {
        let root = AbsolutePath::current_dir().unwrap();
        LaunchParams::new(root.join("prog"), root)
    }

    #[test]
    fn validate_rejects_bad_variable_names() {
        let mut p = params();
        p.environment.push((os("A=B"), os("x")));
        assert!(matches!(p.validate(), Err(Error::InvalidInput(_))));

        let mut p = params();
        p.environment.push((os(""), os("x")));
        assert!(matches!(p.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn validate_rejects_nul() {
        let mut p = params();
        p.arguments.push(os("a\0b"));
        assert!(matches!(p.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(params().validate().is_ok());
    }
}
