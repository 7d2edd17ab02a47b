//! `${name}` placeholder substitution for command templates and
//! configuration strings.
//!
//! The planner derives a fresh table per package from the context's global
//! table, so per-step values (`${in}`, `${out}`) never leak into the next
//! planning step. Substituted text is not re-expanded: the scan resumes
//! past the inserted value, which is also what lets `${deps file}` be bound
//! to its own literal and survive until a worker substitutes it at
//! execution time.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values_by_name: HashMap<String, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a placeholder value. The name excludes the `${}` wrapper:
    /// `${abc}` is registered as just `abc`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values_by_name.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values_by_name.get(name).map(String::as_str)
    }

    /// Replaces every registered placeholder in `input`. Unknown
    /// placeholders substitute to nothing with a diagnostic.
    pub fn expand(&self, input: &str) -> String {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            let Some(length) = rest[start + 2..].find('}') else {
                // No closing brace; the remainder is literal text.
                break;
            };
            output.push_str(&rest[..start]);
            let name = &rest[start + 2..start + 2 + length];
            match self.values_by_name.get(name) {
                Some(value) => output.push_str(value),
                None => eprintln!("Encountered unknown placeholder: ${{{name}}}"),
            }
            rest = &rest[start + 2 + length + 1..];
        }

        output.push_str(rest);
        output
    }
}

/// Wraps `text` in double quotes, escaping embedded quotes and
/// backslashes, for safe embedding into a shell command line.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Quotes a path for embedding into a shell command line.
pub fn quote_path(path: &std::path::Path) -> String {
    quote(&path.display().to_string())
}

/// Replaces the first occurrence of `needle` in `input`. Returns whether a
/// substitution happened, which the scheduler uses to tell dependency-file
/// compile commands apart from direct ones.
pub fn replace_first(input: &str, needle: &str, value: &str) -> (String, bool) {
    match input.find(needle) {
        Some(index) => {
            let mut output = String::with_capacity(input.len() + value.len());
            output.push_str(&input[..index]);
            output.push_str(value);
            output.push_str(&input[index + needle.len()..]);
            (output, true)
        }
        None => (input.to_string(), false),
    }
}
