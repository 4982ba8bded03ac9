use std::ffi::OsStr;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ScopedJoinHandle};

use crate::error::{Error, Result};
use crate::feed::{self, FeedReport};
use crate::path::AbsolutePath;
use crate::pipe::{ParentEnds, StdioPipes};
use crate::process::ExitStatus;
use crate::pump::{self, PumpReport, PumpTarget, StopSignal};
use crate::spawn::{self, EnvironmentInheritance, LaunchParams};

type Source<'a> = &'a mut (dyn Read + Send);
type Sink<'a> = &'a mut (dyn Write + Send);

/// A complete description of one process run.
///
/// Build it with [`ProcessSpec::new`] and the chained setters, then pass it to
/// [`run_process`] or [`run_process_status`]:
///
/// ```no_run
/// # use runproc::{AbsolutePath, ProcessSpec, run_process};
/// # fn main() -> runproc::Result<()> {
/// let mut out = Vec::new();
/// let mut input: &[u8] = b"b\nc\na\n";
/// let code = run_process(
///     ProcessSpec::new(
///         AbsolutePath::new("/usr/bin/sort").unwrap(),
///         AbsolutePath::current_dir()?,
///     )
///     .input(&mut input)
///     .output(&mut out),
/// )?;
/// assert_eq!((code, &out[..]), (0, &b"a\nb\nc\n"[..]));
/// # Ok(())
/// # }
/// ```
///
/// Streams without a sink are drained and discarded. Without an input source
/// the child's stdin is at end-of-file from the start.
#[must_use]
pub struct ProcessSpec<'a> {
    params: LaunchParams,
    input: Option<Source<'a>>,
    output: Option<Sink<'a>>,
    error: Option<Sink<'a>>,
    merged: Option<Sink<'a>>,
}

impl<'a> ProcessSpec<'a> {
    /// Run `executable` in `current_dir`, with no arguments and the parent's
    /// environment.
    pub fn new(executable: AbsolutePath, current_dir: AbsolutePath) -> ProcessSpec<'a> {
        ProcessSpec {
            params: LaunchParams::new(executable, current_dir),
            input: None,
            output: None,
            error: None,
            merged: None,
        }
    }

    /// Appends `arg` to argument list.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.params.arguments.push(arg.as_ref().to_owned());
        self
    }

    /// Extends the argument list with `args`.
    pub fn args(mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Self {
        self.params
            .arguments
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Sets an environment variable in the child. If the same variable is set
    /// more than once, the last value is used.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.params
            .environment
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    pub fn envs(
        mut self,
        vars: impl IntoIterator<Item = (impl AsRef<OsStr>, impl AsRef<OsStr>)>,
    ) -> Self {
        self.params.environment.extend(
            vars.into_iter()
                .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned())),
        );
        self
    }

    /// Whether the child starts from the parent's environment. Variables set
    /// with [`env`](Self::env) are visible either way.
    pub fn inheritance(mut self, inheritance: EnvironmentInheritance) -> Self {
        self.params.inheritance = inheritance;
        self
    }

    /// Feed the contents of `source` to the child's stdin.
    pub fn input(mut self, source: Source<'a>) -> Self {
        self.input = Some(source);
        self
    }

    /// Collect the child's stdout into `sink`.
    ///
    /// If writing to `sink` fails, the rest of the output is discarded; the
    /// failure is logged and does not affect the result.
    pub fn output(mut self, sink: Sink<'a>) -> Self {
        self.output = Some(sink);
        self
    }

    /// Collect the child's stderr into `sink`.
    pub fn error(mut self, sink: Sink<'a>) -> Self {
        self.error = Some(sink);
        self
    }

    /// Collect both output streams into `sink`, overriding
    /// [`output`](Self::output) and [`error`](Self::error).
    ///
    /// Bytes from one stream stay in order, but there is no ordering between
    /// the two streams beyond the chunks in which they were read.
    pub fn merged_output(mut self, sink: Sink<'a>) -> Self {
        self.merged = Some(sink);
        self
    }

    /// On Linux, kill the child with SIGHUP if the launching thread exits
    /// first. Enabled by default; ignored elsewhere.
    pub fn die_with_parent(mut self, enabled: bool) -> Self {
        self.params.die_with_parent = enabled;
        self
    }

    pub fn params(&self) -> &LaunchParams {
        &self.params
    }
}

impl fmt::Debug for ProcessSpec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("params", &self.params)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .field("error", &self.error.is_some())
            .field("merged", &self.merged.is_some())
            .finish()
    }
}

// One of the writers sharing a merged sink.
struct SharedSink<'s, 'a>(&'s Mutex<Sink<'a>>);

impl Write for SharedSink<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).write(buf)
    }

    // One lock per chunk, so chunks from the two streams never interleave.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }
}

fn join<T>(handle: ScopedJoinHandle<'_, T>) -> T {
    handle
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

/// Run the process described by `spec` to completion and return its exit
/// code.
///
/// Input is fed and both output streams are drained concurrently, so the
/// child never blocks on a full pipe. The exit code is read only after all
/// three streams are done.
///
/// On Unix a child killed by a signal yields `128 + signal`. Use
/// [`run_process_status`] to tell the two apart.
pub fn run_process(spec: ProcessSpec<'_>) -> Result<i32> {
    run_process_status(spec).map(|status| status.code())
}

/// Like [`run_process`], but return the full exit status.
pub fn run_process_status(spec: ProcessSpec<'_>) -> Result<ExitStatus> {
    let ProcessSpec {
        params,
        input,
        output,
        error,
        merged,
    } = spec;

    let StdioPipes { child, parent } = StdioPipes::new().map_err(Error::PipeFailed)?;
    tracing::trace!("pipes created");
    let process = spawn::launch_process(&params, child)?;
    let ParentEnds {
        stdin,
        stdout,
        stderr,
    } = parent;

    let mut discard_out = io::sink();
    let mut discard_err = io::sink();
    let merged_lock;
    let mut merged_out;
    let mut merged_err;
    let (out_sink, err_sink): (&mut (dyn Write + Send), &mut (dyn Write + Send)) = match merged {
        Some(sink) => {
            merged_lock = Mutex::new(sink);
            merged_out = SharedSink(&merged_lock);
            merged_err = SharedSink(&merged_lock);
            (
                &mut merged_out as &mut (dyn Write + Send),
                &mut merged_err as &mut (dyn Write + Send),
            )
        }
        None => (
            match output {
                Some(sink) => sink,
                None => &mut discard_out,
            },
            match error {
                Some(sink) => sink,
                None => &mut discard_err,
            },
        ),
    };

    let stop = StopSignal::new();
    let (fed, pumped): (Option<FeedReport>, Vec<PumpReport>) = thread::scope(|s| {
        let feeder = match input {
            Some(source) => Some(s.spawn(move || feed::feed_stdin(source, stdin))),
            None => {
                drop(stdin);
                None
            }
        };

        // Anonymous pipes on Windows stay open as long as any process holds
        // the write end, grandchildren included. Stop the pumps once the
        // child itself has terminated.
        #[cfg(windows)]
        let feeder = {
            let (process, stop) = (&process, &stop);
            Some(s.spawn(move || {
                let fed = feeder.map(join);
                if let Err(e) = process.wait_for_termination() {
                    tracing::warn!(error = %e, "failed to wait for process termination");
                }
                tracing::trace!("process terminated, stopping pumps");
                stop.stop();
                fed
            }))
        };

        tracing::trace!("draining output");
        let pumped = pump::drain(
            vec![
                PumpTarget::new("stdout", stdout, out_sink),
                PumpTarget::new("stderr", stderr, err_sink),
            ],
            &stop,
        );

        #[cfg(unix)]
        let fed = feeder.map(join);
        #[cfg(windows)]
        let fed = feeder.and_then(join);
        (fed, pumped)
    });

    tracing::trace!(
        stdin = fed.as_ref().map(|r| r.bytes),
        stdout = pumped[0].bytes,
        stderr = pumped[1].bytes,
        "streams done, reaping"
    );
    process.wait_for_exit()
}

/// Run `executable` with `arguments` and no input, collecting stdout and
/// stderr into `sink`.
///
/// Both paths must be absolute.
pub fn run_process_merged<S: AsRef<OsStr>>(
    executable: &Path,
    arguments: &[S],
    current_dir: &Path,
    sink: &mut (dyn Write + Send),
) -> Result<i32> {
    let absolute = |path: &Path| {
        AbsolutePath::new(path)
            .ok_or_else(|| Error::InvalidInput(format!("{} is not an absolute path", path.display())))
    };
    run_process(
        ProcessSpec::new(absolute(executable)?, absolute(current_dir)?)
            .args(arguments)
            .merged_output(sink),
    )
}
