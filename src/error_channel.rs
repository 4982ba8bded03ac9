//! Side channel that carries a failure from the forked child back to the
//! parent.
//!
//! Once `fork()` returns, errors in the child can no longer be returned to the
//! caller. The child instead writes the errno of the failed step into a pipe
//! whose write end is close-on-exec and exits. If `execve` succeeds, the
//! kernel closes the write end and the parent reads zero bytes.

use std::fs::File;
use std::io::{self, Read};
use std::mem;
use std::os::unix::io::RawFd;

use crate::posix;

const REPORT_SIZE: usize = mem::size_of::<i32>();

/// What the child reported through the error channel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChildReport {
    /// The channel was closed without data: the program image was replaced.
    Launched,
    /// The child failed before exec with this OS error code.
    Failed(i32),
}

#[derive(Debug)]
pub(crate) struct ErrorChannel {
    read: File,
    write: File,
}

impl ErrorChannel {
    pub fn new() -> io::Result<ErrorChannel> {
        let (read, write) = posix::pipe()?;
        Ok(ErrorChannel { read, write })
    }

    pub fn into_parts(self) -> (ErrorReader, File) {
        (ErrorReader(self.read), self.write)
    }
}

/// Parent side of the error channel.
#[derive(Debug)]
pub struct ErrorReader(File);

impl ErrorReader {
    /// Block until the child either execs or reports an error.
    ///
    /// The write end held by the parent must already be closed, otherwise this
    /// never returns.
    ///
    /// # Panics
    ///
    /// Panics if the channel delivers a partial report, which can only happen
    /// through a bug in the child setup code.
    pub fn read_reported_error(&mut self) -> io::Result<ChildReport> {
        let mut buf = [0u8; REPORT_SIZE];
        let mut total_read = 0;
        while total_read < REPORT_SIZE {
            match self.0.read(&mut buf[total_read..]) {
                Ok(0) => break,
                Ok(n) => total_read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        match total_read {
            0 => Ok(ChildReport::Launched),
            REPORT_SIZE => Ok(ChildReport::Failed(i32::from_ne_bytes(buf))),
            n => panic!("error channel protocol violation: read {n} of {REPORT_SIZE} bytes"),
        }
    }
}

/// Report `code` to the parent and terminate the child.
///
/// Called in the forked child only. The exit status is irrelevant because the
/// parent gives the reported code precedence over it.
pub(crate) fn report_and_exit(fd: RawFd, code: i32) -> ! {
    let _ = posix::write_all_raw(fd, &code.to_ne_bytes());
    posix::_exit(127)
}
