use std::ffi::{CStr, CString, OsStr};
use std::fs::File;
use std::io::{Error, Result};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::ptr;
use std::time::Duration;

pub use libc::EINTR;

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

/// Create a pipe whose ends are both close-on-exec.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

/// Create a pipe whose ends are both close-on-exec.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    let (read, write) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    set_cloexec(read.as_raw_fd())?;
    set_cloexec(write.as_raw_fd())?;
    Ok((read, write))
}

pub fn set_cloexec(fd: RawFd) -> Result<()> {
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    check_err(unsafe { libc::fcntl(fd, libc::F_SETFD, old | libc::FD_CLOEXEC) })?;
    Ok(())
}

/// Fork the current process.
///
/// Returns `Some(pid)` in the parent and `None` in the child.
///
/// # Safety
///
/// The child may only call async-signal-safe functions until it execs or
/// exits.
pub unsafe fn fork() -> Result<Option<u32>> {
    let pid = check_err(unsafe { libc::fork() })?;
    Ok(if pid == 0 { None } else { Some(pid as u32) })
}

pub fn os_to_cstring(s: &OsStr) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| Error::from_raw_os_error(libc::EINVAL))
}

#[derive(Debug)]
pub struct CVec {
    // Individual C strings; they are not unused as rustc thinks, they
    // are pointed to by elements of self.ptrs.
    #[allow(dead_code)]
    strings: Vec<CString>,

    // nullptr-terminated vector of pointers to data inside
    // self.strings.
    ptrs: Vec<*const libc::c_char>,
}

// The pointers only refer to the heap buffers owned by `strings`.
unsafe impl Send for CVec {}
unsafe impl Sync for CVec {}

impl CVec {
    pub fn new<S: AsRef<OsStr>>(slice: &[S]) -> Result<CVec> {
        let strings = slice
            .iter()
            .map(|x| os_to_cstring(x.as_ref()))
            .collect::<Result<Vec<CString>>>()?;
        let ptrs = strings
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(CVec { strings, ptrs })
    }

    pub fn as_c_vec(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

// The functions below are called in the forked child and must stay
// async-signal-safe: no allocation, no locks.

pub fn dup2(oldfd: RawFd, newfd: RawFd) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

/// Duplicate `fd` onto the lowest free descriptor that is `>= min`, with
/// close-on-exec set on the copy.
pub fn dup_cloexec_above(fd: RawFd, min: RawFd) -> Result<RawFd> {
    check_err(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, min) })
}

pub fn chdir(dir: &CStr) -> Result<()> {
    check_err(unsafe { libc::chdir(dir.as_ptr()) })?;
    Ok(())
}

/// Close every descriptor `>= first`.
pub fn close_fds_from(first: RawFd) {
    #[cfg(target_os = "linux")]
    {
        let ret = unsafe {
            libc::syscall(
                libc::SYS_close_range,
                first as libc::c_uint,
                libc::c_uint::MAX,
                0 as libc::c_uint,
            )
        };
        if ret == 0 {
            return;
        }
    }
    let max_fd = match unsafe { libc::sysconf(libc::_SC_OPEN_MAX) } {
        n if n > 0 => n.min(libc::c_int::MAX as libc::c_long) as RawFd,
        _ => 1024,
    };
    for fd in first..max_fd {
        // most of these are not open descriptors
        unsafe { libc::close(fd) };
    }
}

/// Have the kernel send SIGHUP to this process when its parent thread exits.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn set_parent_death_signal() -> Result<()> {
    check_err(unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGHUP) })?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn set_parent_death_signal() -> Result<()> {
    Ok(())
}

/// Restore the signal mask and SIGPIPE disposition Unix programs expect.
///
/// libstd ignores SIGPIPE and the feeder thread blocks it; children inherit
/// both, so they are reset before exec.
pub fn reset_signals() -> Result<()> {
    unsafe {
        let mut set = mem::MaybeUninit::<libc::sigset_t>::uninit();
        check_err(libc::sigemptyset(set.as_mut_ptr()))?;
        let set = set.assume_init();
        let ret = libc::pthread_sigmask(libc::SIG_SETMASK, &set, ptr::null_mut());
        if ret != 0 {
            return Err(Error::from_raw_os_error(ret));
        }
        if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

/// Replace the process image. Only returns on failure.
pub fn execve(path: &CStr, argv: &CVec, envp: &CVec) -> Error {
    unsafe {
        libc::execve(path.as_ptr(), argv.as_c_vec(), envp.as_c_vec());
    }
    Error::last_os_error()
}

/// Write all of `buf` to a raw descriptor, retrying on EINTR.
pub fn write_all_raw(fd: RawFd, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        if n < 0 {
            let err = Error::last_os_error();
            if err.raw_os_error() == Some(EINTR) {
                continue;
            }
            return Err(err);
        }
        buf = &buf[n as usize..];
    }
    Ok(())
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

// End of child-side functions.

/// Block SIGPIPE for the calling thread, so that writing to a pipe with no
/// reader fails with EPIPE instead of terminating the process.
pub fn block_sigpipe_on_current_thread() -> Result<()> {
    unsafe {
        let mut set = mem::MaybeUninit::<libc::sigset_t>::uninit();
        check_err(libc::sigemptyset(set.as_mut_ptr()))?;
        let mut set = set.assume_init();
        check_err(libc::sigaddset(&mut set, libc::SIGPIPE))?;
        let ret = libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut());
        if ret != 0 {
            return Err(Error::from_raw_os_error(ret));
        }
    }
    Ok(())
}

pub fn waitpid(pid: u32, flags: i32) -> Result<(u32, i32)> {
    let mut status = 0 as libc::c_int;
    let pid = check_err(unsafe {
        libc::waitpid(
            pid as libc::pid_t,
            &mut status as *mut libc::c_int,
            flags as libc::c_int,
        )
    })?;
    Ok((pid as u32, status))
}

#[repr(transparent)]
pub struct PollFd(libc::pollfd);

impl PollFd {
    pub fn new(f: Option<&File>, events: i16) -> PollFd {
        PollFd(libc::pollfd {
            fd: f.map(|f| f.as_raw_fd()).unwrap_or(-1),
            events,
            revents: 0,
        })
    }

    pub fn test(&self, mask: i16) -> bool {
        self.0.revents & mask != 0
    }
}

pub use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL};

pub fn poll(fds: &mut [PollFd], timeout: Option<Duration>) -> Result<usize> {
    let timeout = timeout
        .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1);
    let cnt = check_err(unsafe {
        libc::poll(
            fds.as_mut_ptr() as *mut libc::pollfd,
            fds.len() as libc::nfds_t,
            timeout,
        )
    })?;
    Ok(cnt as usize)
}
