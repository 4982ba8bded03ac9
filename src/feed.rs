//! Copying caller-supplied input into the child's stdin.

use std::fs::File;
use std::io::{self, Read, Write};

/// Largest unit read from the source and written to the pipe at once.
pub const FEED_CHUNK: usize = 64 * 1024;

/// Outcome of feeding the child's stdin.
#[derive(Debug, Default)]
pub struct FeedReport {
    /// Bytes written to the pipe.
    pub bytes: u64,
    /// Whether the whole source was delivered. False if the child stopped
    /// reading or the source failed.
    pub complete: bool,
}

/// Copy `source` into `stdin` until the source is exhausted, then close
/// `stdin` so the child sees end-of-file.
///
/// A child that exits or closes its stdin early is not an error: feeding
/// simply stops. A failing source is logged and treated like end of input.
/// The write end is closed on every path.
///
/// On Unix SIGPIPE is blocked for the calling thread, so this should run on a
/// thread dedicated to feeding.
pub fn feed_stdin(source: &mut dyn Read, stdin: File) -> FeedReport {
    #[cfg(unix)]
    if let Err(e) = crate::posix::block_sigpipe_on_current_thread() {
        tracing::warn!(error = %e, "failed to block SIGPIPE for feeder thread");
    }

    let mut stdin = stdin;
    let mut report = FeedReport::default();
    let mut buf = vec![0u8; FEED_CHUNK];
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => {
                report.complete = true;
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "reading process input failed, closing stdin");
                break;
            }
        };
        if let Err(e) = stdin.write_all(&buf[..n]) {
            tracing::debug!(error = %e, written = report.bytes, "child stopped accepting input");
            break;
        }
        report.bytes += n as u64;
    }
    drop(stdin);
    tracing::trace!(bytes = report.bytes, complete = report.complete, "stdin closed");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::Pipe;

    struct FailingSource;

    impl Read for FailingSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("source broke"))
        }
    }

    #[test]
    fn feeds_everything_then_closes() {
        let pipe = Pipe::new().unwrap();
        let data = b"Hello,\ncat\n".repeat(3);
        let report = feed_stdin(&mut &data[..], pipe.write);
        assert!(report.complete);
        assert_eq!(report.bytes, data.len() as u64);

        let mut read = pipe.read;
        let mut got = vec![];
        read.read_to_end(&mut got).unwrap();
        assert_eq!(got, data);
    }

    #[test]
    fn failing_source_ends_input() {
        let pipe = Pipe::new().unwrap();
        let report = feed_stdin(&mut FailingSource, pipe.write);
        assert!(!report.complete);
        assert_eq!(report.bytes, 0);

        let mut read = pipe.read;
        let mut got = vec![];
        read.read_to_end(&mut got).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn closed_reader_stops_feeding() {
        let pipe = Pipe::new().unwrap();
        drop(pipe.read);
        let data = vec![7u8; 3 * FEED_CHUNK];
        let report = feed_stdin(&mut &data[..], pipe.write);
        assert!(!report.complete);
        assert_eq!(report.bytes, 0);
    }
}
