use std::io;
use std::path::Path;

use runproc::{AbsolutePath, Error, ProcessSpec, run_process, run_process_merged};

fn cat_path() -> AbsolutePath {
    AbsolutePath::new(env!("CARGO_BIN_EXE_runproc-cat")).unwrap()
}

fn cwd() -> AbsolutePath {
    AbsolutePath::current_dir().unwrap()
}

fn root() -> AbsolutePath {
    AbsolutePath::new(if cfg!(windows) { "C:/" } else { "/" }).unwrap()
}

fn through_cat(message: &[u8]) -> (i32, Vec<u8>) {
    let mut input = message;
    let mut output = Vec::new();
    let code = run_process(
        ProcessSpec::new(cat_path(), cwd())
            .input(&mut input)
            .output(&mut output),
    )
    .unwrap();
    (code, output)
}

// Deterministic pseudo-random bytes (xorshift32).
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

#[test]
fn standard_input_empty() {
    assert_eq!(through_cat(b""), (0, vec![]));
}

#[test]
fn standard_input_small() {
    assert_eq!(through_cat(b"Hello, cat"), (0, b"Hello, cat".to_vec()));
}

#[test]
fn standard_input_line_feed() {
    assert_eq!(through_cat(b"Hello,\ncat\n"), (0, b"Hello,\ncat\n".to_vec()));
}

#[test]
fn standard_input_large() {
    let message = noise(10_000);
    let (code, output) = through_cat(&message);
    assert_eq!(code, 0);
    assert!(output == message);
}

#[test]
fn standard_input_larger_than_pipe_buffers() {
    // several times the usual 64 KiB pipe buffer in both directions
    let message = noise(1 << 20);
    let (code, output) = through_cat(&message);
    assert_eq!(code, 0);
    assert_eq!(output.len(), message.len());
    assert!(output == message);
}

#[test]
fn same_spec_twice_gives_same_result() {
    let message = noise(5000);
    assert_eq!(through_cat(&message), through_cat(&message));
}

#[test]
fn no_input_source_means_empty_stdin() {
    let mut output = Vec::new();
    let code = run_process(ProcessSpec::new(cat_path(), cwd()).output(&mut output)).unwrap();
    assert_eq!(code, 0);
    assert!(output.is_empty());
}

#[test]
fn helper_reports_usage_on_stderr() {
    let mut output = Vec::new();
    let mut error = Vec::new();
    let code = run_process(
        ProcessSpec::new(cat_path(), cwd())
            .arg("unexpected")
            .output(&mut output)
            .error(&mut error),
    )
    .unwrap();
    assert_eq!(code, 2);
    assert!(output.is_empty());
    assert_eq!(error, b"usage: runproc-cat < input\n");
}

#[test]
fn merged_output_collects_stderr() {
    let mut merged = Vec::new();
    let code = run_process_merged(cat_path().as_path(), &["unexpected"], cwd().as_path(), &mut merged)
        .unwrap();
    assert_eq!(code, 2);
    assert_eq!(merged, b"usage: runproc-cat < input\n");
}

#[test]
fn run_from_nonexistent_executable() {
    let err = run_process(ProcessSpec::new(root().join("does-not-exist"), cwd())).unwrap_err();
    assert!(err.is_launch_failure());
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    #[cfg(unix)]
    assert_eq!(err.raw_os_error(), Some(2)); // ENOENT
}

#[test]
fn relative_executable_is_rejected() {
    let mut sink = Vec::new();
    let err = run_process_merged(Path::new("runproc-cat"), &[] as &[&str], cwd().as_path(), &mut sink)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[test]
fn input_ignored_by_child() {
    // The child exits without reading; feeding must stop quietly.
    let message = noise(1 << 20);
    let mut input = &message[..];
    let mut error = Vec::new();
    let code = run_process(
        ProcessSpec::new(cat_path(), cwd())
            .arg("unexpected")
            .input(&mut input)
            .error(&mut error),
    )
    .unwrap();
    assert_eq!(code, 2);
    assert_eq!(error, b"usage: runproc-cat < input\n");
}

#[cfg(unix)]
#[test]
fn run_process_unix_which() {
    let which = Path::new("/usr/bin/which");
    if !which.exists() {
        return;
    }
    let mut output = Vec::new();
    let code = run_process(
        ProcessSpec::new(AbsolutePath::new(which).unwrap(), cwd())
            .arg("which")
            .output(&mut output),
    )
    .unwrap();
    assert_eq!(code, 0);
    // PATH decides which copy is found first
    let found = String::from_utf8(output).unwrap();
    assert!(found.starts_with('/') && found.ends_with("/which\n"), "{found:?}");
}
