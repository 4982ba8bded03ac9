use std::io::Read;

use crate::pipe::{ParentEnds, StdioPipes};
use crate::{AbsolutePath, AsyncProcess, LaunchParams, launch_process};

pub fn cwd() -> AbsolutePath {
    AbsolutePath::current_dir().unwrap()
}

pub fn read_whole_file<T: Read>(mut f: T) -> String {
    let mut content = String::new();
    f.read_to_string(&mut content).unwrap();
    content
}

/// Launch with all three streams piped, returning the parent's ends.
pub fn launch_piped(params: &LaunchParams) -> (AsyncProcess, ParentEnds) {
    let StdioPipes { child, parent } = StdioPipes::new().unwrap();
    let process = launch_process(params, child).unwrap();
    (process, parent)
}
