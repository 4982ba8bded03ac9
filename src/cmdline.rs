//! Command line assembly for `CreateProcessW`.
//!
//! Windows passes a single string to the child, which the C runtime splits
//! back into `argv`. The functions here work on UTF-16 code units so they can
//! be tested on every platform.

const QUOTE: u16 = b'"' as u16;
const BACKSLASH: u16 = b'\\' as u16;
const SLASH: u16 = b'/' as u16;
const SPACE: u16 = b' ' as u16;

/// Build the command line for `executable` followed by `args`.
///
/// The executable is always quoted, with forward slashes turned into
/// backslashes. Returns `None` if any part contains a NUL character.
pub fn assemble_cmdline<A: AsRef<[u16]>>(executable: &[u16], args: &[A]) -> Option<Vec<u16>> {
    if executable.contains(&0) || args.iter().any(|a| a.as_ref().contains(&0)) {
        return None;
    }
    let mut cmdline = Vec::with_capacity(executable.len() + 2);
    cmdline.push(QUOTE);
    cmdline.extend(to_native_separators(executable));
    cmdline.push(QUOTE);
    for arg in args {
        cmdline.push(SPACE);
        append_quoted(arg.as_ref(), &mut cmdline);
    }
    Some(cmdline)
}

/// Replace forward slashes with backslashes; `CreateProcessW` does not accept
/// forward slashes in the application path.
pub fn to_native_separators(path: &[u16]) -> Vec<u16> {
    path.iter()
        .map(|&c| if c == SLASH { BACKSLASH } else { c })
        .collect()
}

// Translated from ArgvQuote at
// https://learn.microsoft.com/en-us/archive/blogs/twistylittlepassagesallalike/everyone-quotes-command-line-arguments-the-wrong-way
fn append_quoted(arg: &[u16], cmdline: &mut Vec<u16>) {
    let needs_quoting = arg.is_empty()
        || arg
            .iter()
            .any(|&c| c == SPACE || c == b'\t' as u16 || c == b'\n' as u16 || c == 0x0b || c == QUOTE);
    if !needs_quoting {
        cmdline.extend_from_slice(arg);
        return;
    }
    cmdline.push(QUOTE);

    let mut i = 0;
    while i < arg.len() {
        let mut num_backslashes = 0;
        while i < arg.len() && arg[i] == BACKSLASH {
            i += 1;
            num_backslashes += 1;
        }

        if i == arg.len() {
            cmdline.extend(std::iter::repeat_n(BACKSLASH, num_backslashes * 2));
            break;
        } else if arg[i] == QUOTE {
            cmdline.extend(std::iter::repeat_n(BACKSLASH, num_backslashes * 2 + 1));
            cmdline.push(arg[i]);
        } else {
            cmdline.extend(std::iter::repeat_n(BACKSLASH, num_backslashes));
            cmdline.push(arg[i]);
        }
        i += 1;
    }
    cmdline.push(QUOTE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn cmdline(exe: &str, args: &[&str]) -> String {
        let args: Vec<Vec<u16>> = args.iter().map(|a| wide(a)).collect();
        String::from_utf16(&assemble_cmdline(&wide(exe), &args).unwrap()).unwrap()
    }

    #[test]
    fn executable_is_quoted_with_backslashes() {
        assert_eq!(
            cmdline("C:/Program Files/tool.exe", &[]),
            r#""C:\Program Files\tool.exe""#
        );
    }

    #[test]
    fn plain_args_are_not_quoted() {
        assert_eq!(cmdline(r"C:\a.exe", &["/C", "set"]), r#""C:\a.exe" /C set"#);
    }

    #[test]
    fn args_with_spaces_and_quotes() {
        assert_eq!(cmdline(r"C:\a.exe", &["a b"]), r#""C:\a.exe" "a b""#);
        assert_eq!(cmdline(r"C:\a.exe", &[""]), r#""C:\a.exe" """#);
        assert_eq!(cmdline(r"C:\a.exe", &[r#"say "hi""#]), r#""C:\a.exe" "say \"hi\"""#);
    }

    #[test]
    fn trailing_backslashes_are_doubled_inside_quotes() {
        assert_eq!(cmdline(r"C:\a.exe", &[r"dir \"]), r#""C:\a.exe" "dir \\""#);
        // no quoting needed, backslashes stay as they are
        assert_eq!(cmdline(r"C:\a.exe", &[r"x\\"]), r#""C:\a.exe" x\\"#);
    }

    #[test]
    fn nul_is_rejected() {
        let args = [wide("a\0b")];
        assert!(assemble_cmdline(&wide(r"C:\a.exe"), &args).is_none());
    }
}
