//! Draining the child's output pipes into caller-supplied sinks.
//!
//! Unix pipes support readiness notification, so all pipes are served by a
//! single-threaded `poll()` reactor. Windows anonymous pipes do not, so each
//! pipe gets a thread that peeks at the pipe and idles between checks.
//!
//! Either way every byte the child writes reaches the sink once and in order,
//! and draining ends when the child closes its end of the pipe.

use std::fs::File;
use std::io::{self, Write};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Size of a single read from a pipe.
pub const READ_CHUNK: usize = 64 * 1024;

/// How long a polling pump idles when its pipe is empty.
pub const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// A pipe read end together with the sink that receives its contents.
pub struct PumpTarget<'a> {
    name: &'static str,
    reader: File,
    sink: &'a mut (dyn Write + Send),
}

impl<'a> PumpTarget<'a> {
    /// `name` is used in log messages only.
    pub fn new(name: &'static str, reader: File, sink: &'a mut (dyn Write + Send)) -> Self {
        PumpTarget { name, reader, sink }
    }
}

/// Outcome of draining one pipe.
#[derive(Debug, Default)]
pub struct PumpReport {
    /// Bytes delivered to the sink.
    pub bytes: u64,
    /// The read or sink failure absorbed by the pump, if any. The bytes
    /// delivered before it remain in the sink. After a sink failure the pump
    /// keeps reading and discards the rest, so the child never sees a
    /// broken pipe on account of the sink.
    pub error: Option<io::Error>,
}

/// One-shot cancellation token shared by any number of observers.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<(Mutex<bool>, Condvar)>);

impl StopSignal {
    pub fn new() -> StopSignal {
        StopSignal::default()
    }

    /// Raise the signal, waking every waiting observer. Idempotent.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until the signal is raised or `timeout` elapses. Returns whether
    /// the signal was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.0;
        let mut stopped = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            stopped = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *stopped
    }
}

/// Drain every target until end-of-stream and return one report per target,
/// in the order given.
///
/// On Windows `stop` ends the pumps early: once it is raised, each pump
/// copies whatever is still buffered in its pipe and returns. The Unix
/// reactor learns about end-of-stream directly and does not observe `stop`.
pub fn drain(targets: Vec<PumpTarget<'_>>, stop: &StopSignal) -> Vec<PumpReport> {
    os::drain(targets, stop)
}

fn absorb(name: &'static str, report: &mut PumpReport, error: io::Error) {
    tracing::warn!(stream = name, error = %error, "pipe output lost");
    report.error = Some(error);
}

#[cfg(unix)]
mod os {
    use super::*;
    use crate::posix::{self, PollFd};
    use std::io::Read;

    struct Slot<'a> {
        name: &'static str,
        // `None` after end-of-stream or a read failure.
        reader: Option<File>,
        // `None` after the sink failed; output is discarded from then on.
        sink: Option<&'a mut (dyn Write + Send)>,
        report: PumpReport,
    }

    impl Slot<'_> {
        fn read_once(&mut self, buf: &mut [u8]) {
            let Some(reader) = self.reader.as_mut() else {
                return;
            };
            match reader.read(buf) {
                Ok(0) => {
                    tracing::trace!(stream = self.name, bytes = self.report.bytes, "end of stream");
                    self.reader = None;
                }
                Ok(n) => {
                    let Some(sink) = self.sink.as_mut() else {
                        return;
                    };
                    match sink.write_all(&buf[..n]) {
                        Ok(()) => self.report.bytes += n as u64,
                        Err(e) => {
                            self.sink = None;
                            absorb(self.name, &mut self.report, e);
                        }
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) => {}
                Err(e) => self.fail(e),
            }
        }

        fn fail(&mut self, error: io::Error) {
            self.reader = None;
            absorb(self.name, &mut self.report, error);
        }
    }

    /// Single-threaded readiness loop over a set of pipe read ends.
    pub struct Reactor<'a> {
        slots: Vec<Slot<'a>>,
    }

    impl<'a> Reactor<'a> {
        pub fn new() -> Reactor<'a> {
            Reactor { slots: vec![] }
        }

        pub fn register(&mut self, target: PumpTarget<'a>) {
            self.slots.push(Slot {
                name: target.name,
                reader: Some(target.reader),
                sink: Some(target.sink),
                report: PumpReport::default(),
            });
        }

        pub fn run(mut self) -> Vec<PumpReport> {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let live: Vec<usize> = (0..self.slots.len())
                    .filter(|&i| self.slots[i].reader.is_some())
                    .collect();
                if live.is_empty() {
                    break;
                }
                let mut fds: Vec<PollFd> = live
                    .iter()
                    .map(|&i| PollFd::new(self.slots[i].reader.as_ref(), posix::POLLIN))
                    .collect();
                match posix::poll(&mut fds, None) {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        for &i in &live {
                            let slot = &mut self.slots[i];
                            slot.fail(io::Error::new(e.kind(), e.to_string()));
                        }
                        break;
                    }
                }
                let ready = posix::POLLIN | posix::POLLHUP | posix::POLLERR | posix::POLLNVAL;
                for (fd, &i) in fds.iter().zip(&live) {
                    if fd.test(ready) {
                        self.slots[i].read_once(&mut buf);
                    }
                }
            }
            self.slots.into_iter().map(|s| s.report).collect()
        }
    }

    pub fn drain(targets: Vec<PumpTarget<'_>>, _stop: &StopSignal) -> Vec<PumpReport> {
        let mut reactor = Reactor::new();
        for target in targets {
            reactor.register(target);
        }
        reactor.run()
    }
}

#[cfg(windows)]
mod os {
    use super::*;
    use crate::win32;
    use std::io::Read;
    use std::thread;

    /// Copy `target` into its sink by repeatedly peeking at the pipe, idling
    /// for `interval` whenever it is empty.
    pub fn poll_pipe(target: PumpTarget<'_>, stop: &StopSignal, interval: Duration) -> PumpReport {
        let PumpTarget {
            name,
            mut reader,
            sink,
        } = target;
        // `None` after the sink failed; output is discarded from then on.
        let mut sink = Some(sink);
        let mut report = PumpReport::default();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut stopping = false;
        loop {
            let available = match win32::PeekNamedPipe(&reader) {
                Ok(n) => n as usize,
                Err(e) if e.raw_os_error() == Some(win32::ERROR_BROKEN_PIPE as i32) => {
                    tracing::trace!(stream = name, bytes = report.bytes, "end of stream");
                    break;
                }
                Err(e) => {
                    absorb(name, &mut report, e);
                    break;
                }
            };
            if available == 0 {
                if stopping {
                    tracing::trace!(stream = name, bytes = report.bytes, "stopped after final drain");
                    break;
                }
                stopping = stop.wait_timeout(interval);
                continue;
            }
            let want = available.min(buf.len());
            match reader.read(&mut buf[..want]) {
                // ReadFile reports a broken pipe as end of file
                Ok(0) => break,
                Ok(n) => {
                    if let Some(out) = sink.as_mut() {
                        match out.write_all(&buf[..n]) {
                            Ok(()) => report.bytes += n as u64,
                            Err(e) => {
                                sink = None;
                                absorb(name, &mut report, e);
                            }
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    absorb(name, &mut report, e);
                    break;
                }
            }
        }
        report
    }

    pub fn drain(targets: Vec<PumpTarget<'_>>, stop: &StopSignal) -> Vec<PumpReport> {
        thread::scope(|s| {
            let handles: Vec<_> = targets
                .into_iter()
                .map(|target| s.spawn(move || poll_pipe(target, stop, POLL_INTERVAL)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(report) => report,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

#[cfg(unix)]
pub use os::Reactor;
#[cfg(windows)]
pub use os::poll_pipe;
