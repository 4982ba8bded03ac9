//! Launching a child process with all three standard streams piped, feeding
//! its input and collecting its output concurrently, and reporting its exit
//! code.
//!
//! The simplest entry point is [`run_process`]:
//!
//! ```no_run
//! # use runproc::{AbsolutePath, ProcessSpec, run_process};
//! # fn main() -> runproc::Result<()> {
//! let mut out = Vec::new();
//! let code = run_process(
//!     ProcessSpec::new(AbsolutePath::new("/bin/echo").unwrap(), AbsolutePath::current_dir()?)
//!         .arg("hello")
//!         .output(&mut out),
//! )?;
//! assert_eq!(code, 0);
//! assert_eq!(out, b"hello\n");
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks are public as well: [`Pipe`], [`launch_process`] and
//! [`AsyncProcess`] for starting a child with explicit pipe ends,
//! [`pump::drain`] and [`feed::feed_stdin`] for moving the bytes, and
//! [`ProcessHandle`] for reaping.
//!
//! No shell is involved and `PATH` is not searched: the executable and the
//! working directory are given as [`AbsolutePath`]s.
//!
//! The crate logs through [`tracing`] and never installs a subscriber.

#[cfg_attr(not(windows), allow(dead_code))]
mod cmdline;
#[cfg_attr(not(windows), allow(dead_code))]
mod envblock;
mod error;
#[cfg(unix)]
mod error_channel;
pub mod feed;
mod path;
mod pipe;
mod process;
pub mod pump;
mod run;
mod spawn;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod win32;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use path::AbsolutePath;
pub use pipe::{ChildEnds, Pipe};
pub use process::{ExitStatus, ProcessHandle};
pub use run::{ProcessSpec, run_process, run_process_merged, run_process_status};
pub use spawn::{AsyncProcess, EnvironmentInheritance, LaunchParams, launch_process};
