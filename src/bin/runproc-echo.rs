//! Writes its single argument to stdout, without a trailing newline.

use std::io::Write;

fn main() {
    let mut args = std::env::args_os().skip(1);
    let (Some(arg), None) = (args.next(), args.next()) else {
        eprintln!("usage: runproc-echo ARG");
        std::process::exit(2);
    };
    let mut stdout = std::io::stdout().lock();
    if stdout.write_all(arg.as_encoded_bytes()).is_err() {
        std::process::exit(1);
    }
}
