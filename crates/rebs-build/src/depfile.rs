//! Parser for compiler-emitted dependency files.
//!
//! The format is the Make-rule convention Clang and GCC produce with
//! `-MD -MF`: everything up to and including the first `:` is the target,
//! the rest is a whitespace-separated list of paths with `\`-continuations
//! across lines and `\ ` escaping literal spaces inside a path. The escape
//! only applies to the space immediately following the backslash; a bare
//! backslash otherwise terminates the current token.

use std::fs;
use std::path::{Path, PathBuf};

/// Parses a dependency file's contents into the list of paths after the
/// target, in encounter order.
pub fn parse_depfile(contents: &str) -> Vec<PathBuf> {
    let mut dependencies = Vec::new();

    let after_colon = match contents.find(':') {
        Some(index) => &contents[index + 1..],
        None => return dependencies,
    };

    let mut token = String::new();
    let mut has_non_space = false;
    let mut flush = |token: &mut String, has_non_space: &mut bool| {
        if !token.is_empty() && *has_non_space {
            dependencies.push(PathBuf::from(token.as_str()));
        }
        token.clear();
        *has_non_space = false;
    };

    let mut chars = after_colon.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&' ') {
            chars.next();
            token.push(' ');
            continue;
        }
        if matches!(c, ' ' | '\n' | '\r' | '\\') {
            flush(&mut token, &mut has_non_space);
        } else {
            token.push(c);
            has_non_space = true;
        }
    }
    flush(&mut token, &mut has_non_space);

    dependencies
}

/// Reads and parses a dependency file. A missing or unreadable file yields
/// an empty list.
pub fn read_depfile(path: &Path) -> Vec<PathBuf> {
    match fs::read_to_string(path) {
        Ok(contents) => parse_depfile(&contents),
        Err(_) => Vec::new(),
    }
}
