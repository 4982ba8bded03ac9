use std::ffi::OsStr;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// A path that is known to be absolute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AbsolutePath(PathBuf);

impl AbsolutePath {
    /// Returns `None` if `path` is not absolute.
    pub fn new(path: impl Into<PathBuf>) -> Option<AbsolutePath> {
        let path = path.into();
        path.is_absolute().then_some(AbsolutePath(path))
    }

    /// The current working directory of this process.
    pub fn current_dir() -> std::io::Result<AbsolutePath> {
        // current_dir() always returns an absolute path
        std::env::current_dir().map(AbsolutePath)
    }

    /// Append a relative path; an absolute `segment` replaces the path, as
    /// with `Path::join`.
    pub fn join(&self, segment: impl AsRef<Path>) -> AbsolutePath {
        AbsolutePath(self.0.join(segment))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl Deref for AbsolutePath {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for AbsolutePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<OsStr> for AbsolutePath {
    fn as_ref(&self) -> &OsStr {
        self.0.as_os_str()
    }
}

impl fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.display(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_rejected() {
        assert!(AbsolutePath::new("bin/cat").is_none());
        assert!(AbsolutePath::new("").is_none());
    }

    #[test]
    fn current_dir_is_absolute() {
        let cwd = AbsolutePath::current_dir().unwrap();
        assert!(cwd.is_absolute());
        assert_eq!(cwd.join("x").parent(), Some(cwd.as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn join_segments() {
        let root = AbsolutePath::new("/").unwrap();
        assert_eq!(root.join("does-not-exist").as_path(), Path::new("/does-not-exist"));
    }

    #[test]
    fn into_path_buf_keeps_path() {
        let cwd = AbsolutePath::current_dir().unwrap();
        assert_eq!(cwd.clone().into_path_buf(), std::env::current_dir().unwrap());
        assert_eq!(AbsolutePath::new(cwd.clone().into_path_buf()), Some(cwd));
    }
}
