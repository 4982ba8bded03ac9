use std::fs::File;
use std::io;

/// The two ends of an anonymous pipe.
///
/// Each end is an owned `File`; dropping it closes the descriptor. Dropping
/// `write` delivers end-of-file to whoever reads from `read`, and dropping
/// `read` makes subsequent writes to `write` fail with a broken pipe.
///
/// Both ends are created close-on-exec (not inheritable on Windows), so they
/// never leak into a child unless explicitly installed as one of its standard
/// streams.
#[derive(Debug)]
pub struct Pipe {
    pub read: File,
    pub write: File,
}

impl Pipe {
    pub fn new() -> io::Result<Pipe> {
        let (read, write) = os::make_pipe()?;
        Ok(Pipe { read, write })
    }
}

#[cfg(unix)]
mod os {
    pub use crate::posix::pipe as make_pipe;
}

#[cfg(windows)]
mod os {
    pub use crate::win32::CreatePipe as make_pipe;
}

/// Pipes for the three standard streams of one child, split by which side
/// owns each end.
#[derive(Debug)]
pub(crate) struct StdioPipes {
    pub child: ChildEnds,
    pub parent: ParentEnds,
}

/// The ends installed as the child's stdin/stdout/stderr.
#[derive(Debug)]
pub struct ChildEnds {
    pub stdin: File,
    pub stdout: File,
    pub stderr: File,
}

/// The ends the parent keeps to talk to the child.
#[derive(Debug)]
pub(crate) struct ParentEnds {
    pub stdin: File,
    pub stdout: File,
    pub stderr: File,
}

impl StdioPipes {
    pub fn new() -> io::Result<StdioPipes> {
        let input = Pipe::new()?;
        let output = Pipe::new()?;
        let error = Pipe::new()?;
        Ok(StdioPipes {
            child: ChildEnds {
                stdin: input.read,
                stdout: output.write,
                stderr: error.write,
            },
            parent: ParentEnds {
                stdin: input.write,
                stdout: output.read,
                stderr: error.read,
            },
        })
    }
}
