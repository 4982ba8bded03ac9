use std::io;

use thiserror::Error;

/// Failure of a process run.
///
/// Every variant except `InvalidInput` identifies the stage that failed.
/// `SpawnFailed` and `ChildSetupFailed` both mean "the program never started
/// running"; use [`raw_os_error`](Error::raw_os_error) or
/// [`kind`](Error::kind) to inspect the cause without caring which of the two
/// was produced.
#[derive(Debug, Error)]
pub enum Error {
    /// The request was rejected before any OS resource was created.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Creating one of the standard stream pipes failed.
    #[error("failed to create pipe: {0}")]
    PipeFailed(#[source] io::Error),

    /// The OS could not create the process at all.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// The child was created but failed before the target program started
    /// running (redirection, working directory, environment or exec).
    #[error("child setup failed: {}", io::Error::from_raw_os_error(*code))]
    ChildSetupFailed { code: i32 },

    /// Retrieving the termination status of the child failed.
    #[error("failed to wait for process: {0}")]
    WaitFailed(#[source] io::Error),

    /// An unexpected I/O failure that prevented determining the result.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// The OS error code behind this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::InvalidInput(_) => None,
            Error::ChildSetupFailed { code } => Some(*code),
            Error::PipeFailed(e) | Error::SpawnFailed(e) | Error::WaitFailed(e) | Error::Io(e) => {
                e.raw_os_error()
            }
        }
    }

    /// The `io::ErrorKind` corresponding to this error.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Error::InvalidInput(_) => io::ErrorKind::InvalidInput,
            Error::ChildSetupFailed { code } => io::Error::from_raw_os_error(*code).kind(),
            Error::PipeFailed(e) | Error::SpawnFailed(e) | Error::WaitFailed(e) | Error::Io(e) => {
                e.kind()
            }
        }
    }

    /// True if the program never started running.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Error::SpawnFailed(_) | Error::ChildSetupFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
