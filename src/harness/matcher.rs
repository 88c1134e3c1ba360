//! Test name filtering
//!
//! Sanitizes, uniques and filters names of tests and subtests. A pattern is
//! a slash-separated list of unanchored regular expressions, one per level
//! of the test hierarchy; missing levels match anything.

use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;

use crate::error::{HarnessError, Result};

/// Per-suite name matcher
#[derive(Debug)]
pub struct Matcher {
    filter: Vec<Regex>,
    sub_names: Mutex<HashMap<String, u64>>,
}

impl Matcher {
    /// Compile `pattern`; every segment must be a valid regexp.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut filter = Vec::new();
        if !pattern.is_empty() {
            for (index, segment) in split_regexp(pattern).into_iter().enumerate() {
                let segment = rewrite(segment);
                let re = Regex::new(&segment).map_err(|source| HarnessError::InvalidPattern {
                    index,
                    pattern: segment.clone(),
                    source,
                })?;
                filter.push(re);
            }
        }
        Ok(Self {
            filter,
            sub_names: Mutex::new(HashMap::new()),
        })
    }

    /// Same filter with no names claimed yet.
    pub fn fresh(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            sub_names: Mutex::new(HashMap::new()),
        }
    }

    /// Computes the unique full name of `sub` under `parent` (empty for the
    /// root) and reports whether the filter selects it.
    pub fn full_name(&self, parent: &str, sub: &str) -> (String, bool) {
        let name = self.unique(parent, &rewrite(sub));

        // The whole path is checked each time so a pattern may carry a '/'
        // that lines up with a subtest name containing one.
        for (segment, re) in name.split('/').zip(self.filter.iter()) {
            if !re.is_match(segment) {
                return (name, false);
            }
        }
        (name, true)
    }

    fn unique(&self, parent: &str, sub: &str) -> String {
        let mut names = self.sub_names.lock();
        let mut name = if parent.is_empty() {
            sub.to_string()
        } else {
            format!("{parent}/{sub}")
        };
        let mut empty = sub.is_empty();
        loop {
            let next = names.get(&name).copied();
            match next {
                None if !empty => {
                    names.insert(name.clone(), 1);
                    return name;
                }
                _ => {
                    let next = next.unwrap_or(0);
                    names.insert(name.clone(), next + 1);
                    name = format!("{name}#{next:02}");
                    empty = false;
                }
            }
        }
    }
}

/// Splits a pattern at slashes that are not inside a character class, a
/// group or an escape.
pub(crate) fn split_regexp(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut class_depth = 0i32;
    let mut paren_depth = 0i32;
    let mut begin = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => class_depth += 1,
            b']' => {
                // An unmatched ']' is legal.
                class_depth = (class_depth - 1).max(0);
            }
            b'(' if class_depth == 0 => paren_depth += 1,
            b')' if class_depth == 0 => paren_depth -= 1,
            b'\\' => i += 1,
            b'/' if class_depth == 0 && paren_depth == 0 => {
                parts.push(&s[begin..i]);
                begin = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[begin.min(s.len())..]);
    parts
}

/// Rewrites a name to printable characters without white space.
pub(crate) fn rewrite(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_whitespace() {
            out.push('_');
        } else if !is_printable(c) {
            escape(&mut out, c);
        } else {
            out.push(c);
        }
    }
    out
}

fn is_printable(c: char) -> bool {
    let cp = c as u32;
    !(c.is_control()
        || (0xFDD0..=0xFDEF).contains(&cp)
        || cp & 0xFFFE == 0xFFFE
        || (0xE000..=0xF8FF).contains(&cp)
        || cp >= 0xF0000
        || matches!(cp, 0xAD | 0x200B..=0x200F | 0x2028..=0x202E | 0x2060..=0x206F | 0xFEFF))
}

fn escape(out: &mut String, c: char) {
    let cp = c as u32;
    let _ = match c {
        '\x07' => write!(out, "\\a"),
        '\x08' => write!(out, "\\b"),
        _ if cp < 0x80 => write!(out, "\\x{cp:02x}"),
        _ if cp < 0x10000 => write!(out, "\\u{cp:04x}"),
        _ => write!(out, "\\U{cp:08x}"),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_regexp() {
        let cases: &[(&str, &[&str])] = &[
            ("", &[""]),
            ("/", &["", ""]),
            ("//", &["", "", ""]),
            ("A", &["A"]),
            ("A/B", &["A", "B"]),
            ("A/B/", &["A", "B", ""]),
            ("/A/B/", &["", "A", "B", ""]),
            ("[A]/(B)", &["[A]", "(B)"]),
            ("[/]/[/]", &["[/]", "[/]"]),
            ("[/]/[:/]", &["[/]", "[:/]"]),
            ("/]", &["", "]"]),
            ("]/", &["]", ""]),
            ("]/[/]", &["]", "[/]"]),
            ("([)/][(])", &["([)/][(])"]),
            ("[(]/[)]", &["[(]", "[)]"]),
            // Faulty patterns stay faulty in at least one segment.
            (")/", &[")/"]),
            (")/(/)", &[")/(", ")"]),
            ("a[/)b", &["a[/)b"]),
            ("(/]", &["(/]"]),
            ("(/", &["(/"]),
            ("[/]/[/", &["[/]", "[/"]),
            (r"\p{/}", &[r"\p{", "}"]),
            (r"\p/", &[r"\p", ""]),
            ("[[:/:]]", &["[[:/:]]"]),
        ];
        for (pattern, want) in cases {
            assert_eq!(split_regexp(pattern), *want, "pattern {pattern:?}");
        }
    }

    #[test]
    fn test_invalid_pattern_names_segment() {
        let err = Matcher::new("Foo/(bar").unwrap_err();
        match err {
            HarnessError::InvalidPattern { index, pattern, .. } => {
                assert_eq!(index, 1);
                assert_eq!(pattern, "(bar");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_matching() {
        let cases = [
            // Top-level tests.
            ("", "", "TestFoo", true),
            ("TestFoo", "", "TestFoo", true),
            ("TestFoo/", "", "TestFoo", true),
            ("TestFoo/bar/baz", "", "TestFoo", true),
            ("TestFoo", "", "TestBar", false),
            ("TestFoo/", "", "TestBar", false),
            ("TestFoo/bar/baz", "", "TestBar/bar/baz", false),
            // Subtests.
            ("", "TestFoo", "x", true),
            ("TestFoo", "TestFoo", "x", true),
            ("TestFoo/", "TestFoo", "x", true),
            ("TestFoo/bar/baz", "TestFoo", "bar", true),
            ("TestFoo/bar/baz", "TestFoo", "bar/baz", true),
            ("TestFoo/bar/baz", "TestFoo/bar", "baz", true),
            ("TestFoo/bar/baz", "TestFoo", "x", false),
            ("TestFoo", "TestBar", "x", false),
            ("TestFoo/", "TestBar", "x", false),
            ("TestFoo/bar/baz", "TestBar", "x/bar/baz", false),
            // Subtests only.
            ("/", "TestFoo", "x", true),
            ("./", "TestFoo", "x", true),
            ("./.", "TestFoo", "x", true),
            ("/bar/baz", "TestFoo", "bar", true),
            ("/bar/baz", "TestFoo", "bar/baz", true),
            ("//baz", "TestFoo", "bar/baz", true),
            ("//", "TestFoo", "bar/baz", true),
            ("/bar/baz", "TestFoo/bar", "baz", true),
            ("//foo", "TestFoo", "bar/baz", false),
            ("/bar/baz", "TestFoo", "x", false),
            ("/bar/baz", "TestBar", "x/bar/baz", false),
        ];
        for (pattern, parent, sub, ok) in cases {
            let m = Matcher::new(pattern).unwrap();
            let (name, got) = m.full_name(parent, sub);
            assert_eq!(
                got, ok,
                "pattern {pattern:?}, parent {parent:?}, sub {sub:?} -> {name:?}"
            );
        }
    }

    #[test]
    fn test_naming() {
        let m = Matcher::new("").unwrap();
        m.sub_names.lock().insert("x/b".to_string(), 1000);

        let cases = [
            ("", "x/#00"),
            ("", "x/#01"),
            ("t", "x/t"),
            ("t", "x/t#01"),
            ("t", "x/t#02"),
            ("a#01", "x/a#01"),
            ("a", "x/a"),
            ("a", "x/a#01#01"),
            ("a", "x/a#02"),
            ("a", "x/a#03"),
            ("a#02", "x/a#02#01"),
            ("b", "x/b#1000"),
            ("b", "x/b#1001"),
            ("A:1 B:2", "x/A:1_B:2"),
            ("s\t\r\u{a0}", "x/s___"),
            ("\x01", r"x/\x01"),
            ("\u{10ffff}", r"x/\U0010ffff"),
        ];
        for (i, (sub, want)) in cases.iter().enumerate() {
            let (got, _) = m.full_name("x", sub);
            assert_eq!(&got, want, "case {i}: {sub:?}");
        }
    }

    #[test]
    fn test_top_level_names_have_no_prefix() {
        let m = Matcher::new("").unwrap();
        assert_eq!(m.full_name("", "boot").0, "boot");
        assert_eq!(m.full_name("", "boot").0, "boot#01");
        assert_eq!(m.fresh().full_name("", "boot").0, "boot");
    }
}
