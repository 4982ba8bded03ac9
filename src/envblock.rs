//! Environment block encoding for `CreateProcessW`.
//!
//! The block is a sequence of `NAME=VALUE\0` UTF-16 entries sorted by name,
//! terminated by an additional `\0`. Windows keeps per-drive working
//! directories in pseudo-variables such as `=C:`, whose names begin with `=`;
//! a leading `=` is therefore part of the name, not a separator.

use std::collections::HashSet;

const EQUALS: u16 = b'=' as u16;

/// A variable name and value in UTF-16.
pub type WideVar = (Vec<u16>, Vec<u16>);

/// Split a block as returned by `GetEnvironmentStringsW` into variables.
///
/// Parsing stops at the first empty entry; the terminator may be missing.
pub fn parse_block(block: &[u16]) -> Vec<WideVar> {
    block
        .split(|&c| c == 0)
        .take_while(|entry| !entry.is_empty())
        .map(|entry| {
            // skip a leading '=' when looking for the separator
            let split = entry
                .iter()
                .skip(1)
                .position(|&c| c == EQUALS)
                .map(|p| p + 1);
            match split {
                Some(p) => (entry[..p].to_vec(), entry[p + 1..].to_vec()),
                None => (entry.to_vec(), vec![]),
            }
        })
        .collect()
}

fn fold_case(name: &[u16]) -> Vec<u16> {
    name.iter()
        .map(|&c| {
            if c < 128 {
                (c as u8).to_ascii_uppercase() as u16
            } else {
                c
            }
        })
        .collect()
}

/// Combine `base` with `overrides` into a sorted, duplicate-free list.
///
/// Names are compared ASCII case-insensitively, as Windows does. An override
/// replaces any base variable of the same name, and a later override replaces
/// an earlier one. Entries are ordered by their case-folded name.
pub fn merge(base: Vec<WideVar>, overrides: Vec<WideVar>) -> Vec<WideVar> {
    let mut seen = HashSet::new();
    let mut merged: Vec<(Vec<u16>, WideVar)> = base
        .into_iter()
        .chain(overrides)
        .rev()
        .filter_map(|var| {
            let key = fold_case(&var.0);
            seen.insert(key.clone()).then_some((key, var))
        })
        .collect();
    merged.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.0.cmp(&b.1.0)));
    merged.into_iter().map(|(_, var)| var).collect()
}

/// Serialize variables into a block, in the given order.
///
/// An empty list produces `\0\0`, which Windows accepts as an empty
/// environment.
pub fn format_block(vars: &[WideVar]) -> Vec<u16> {
    let mut block = vec![];
    for (name, value) in vars {
        block.extend_from_slice(name);
        block.push(EQUALS);
        block.extend_from_slice(value);
        block.push(0);
    }
    if block.is_empty() {
        block.push(0);
    }
    block.push(0);
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn var(name: &str, value: &str) -> WideVar {
        (wide(name), wide(value))
    }

    fn block(entries: &[&str]) -> Vec<u16> {
        let mut b = vec![];
        for e in entries {
            b.extend(wide(e));
            b.push(0);
        }
        b.push(0);
        b
    }

    #[test]
    fn parse_keeps_leading_equals_in_name() {
        let parsed = parse_block(&block(&["=C:=C:\\work", "PATH=C:\\bin", "A=b=c"]));
        assert_eq!(
            parsed,
            vec![var("=C:", "C:\\work"), var("PATH", "C:\\bin"), var("A", "b=c")]
        );
    }

    #[test]
    fn parse_empty_block() {
        assert!(parse_block(&[0, 0]).is_empty());
        assert!(parse_block(&[]).is_empty());
    }

    #[test]
    fn merge_overrides_case_insensitively() {
        let merged = merge(
            vec![var("Path", "old"), var("TEMP", "t")],
            vec![var("PATH", "new")],
        );
        assert_eq!(merged, vec![var("PATH", "new"), var("TEMP", "t")]);
    }

    #[test]
    fn merge_later_override_wins() {
        let merged = merge(vec![], vec![var("key", "1"), var("key", "2")]);
        assert_eq!(merged, vec![var("key", "2")]);
    }

    #[test]
    fn merge_sorts_pseudo_variables_first() {
        let merged = merge(vec![var("b", "1"), var("=C:", "C:\\"), var("A", "2")], vec![]);
        assert_eq!(merged, vec![var("=C:", "C:\\"), var("A", "2"), var("b", "1")]);
    }

    #[test]
    fn format_round_trips_through_parse() {
        let vars = vec![var("=C:", "C:\\"), var("key", "value")];
        let formatted = format_block(&vars);
        assert_eq!(formatted, block(&["=C:=C:\\", "key=value"]));
        assert_eq!(parse_block(&formatted), vars);
    }

    #[test]
    fn format_empty_is_double_null() {
        assert_eq!(format_block(&[]), vec![0, 0]);
    }
}
