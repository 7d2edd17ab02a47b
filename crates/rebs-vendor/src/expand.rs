//! List-valued placeholder expansion.
//!
//! The vendoring DSL's placeholders carry lists of values. Expanding a
//! string containing K distinct placeholders whose lists have sizes
//! n1..nK produces the cartesian product of the choices; placeholders the
//! string does not reference do not multiply the result. As with the
//! scalar engine, substituted text is never reprocessed.

use std::collections::BTreeMap;

/// Placeholder table keyed by the full `${name}` token.
#[derive(Debug, Default, Clone)]
pub struct MultiPlaceholders {
    values_by_token: BTreeMap<String, Vec<String>>,
}

impl MultiPlaceholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the values for a placeholder name (without the `${}`
    /// wrapper).
    pub fn set(&mut self, name: &str, values: Vec<String>) {
        self.values_by_token.insert(format!("${{{name}}}"), values);
    }

    /// Stores a single value for a placeholder name.
    pub fn set_single(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, vec![value.into()]);
    }

    /// The values of a placeholder name, if registered.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values_by_token
            .get(&format!("${{{name}}}"))
            .map(Vec::as_slice)
    }

    /// Expands one string into the cartesian product over the placeholders
    /// it references.
    pub fn expand(&self, input: &str) -> Vec<String> {
        let referenced: Vec<&String> = self
            .values_by_token
            .keys()
            .filter(|token| input.contains(token.as_str()))
            .collect();
        if referenced.is_empty() {
            return vec![input.to_string()];
        }

        let mut results = vec![input.to_string()];
        for token in referenced {
            let values = &self.values_by_token[token];
            let mut next_results = Vec::with_capacity(results.len() * values.len());
            for current in &results {
                for value in values {
                    next_results.push(replace_all_advancing(current, token, value));
                }
            }
            results = next_results;
        }
        results
    }

    /// Expands a list of strings, concatenating the products.
    pub fn expand_all(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().flat_map(|input| self.expand(input)).collect()
    }
}

/// Replaces every occurrence of `needle`, resuming each scan past the
/// inserted value so substitutions are never reprocessed.
fn replace_all_advancing(input: &str, needle: &str, value: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(index) = rest.find(needle) {
        output.push_str(&rest[..index]);
        output.push_str(value);
        rest = &rest[index + needle.len()..];
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn values(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_unreferenced_placeholders_do_not_multiply() {
        let mut placeholders = MultiPlaceholders::new();
        placeholders.set("unused", values(&["a", "b", "c"]));
        assert_eq!(placeholders.expand("plain"), vec!["plain"]);
    }

    #[test]
    fn test_single_placeholder_expands_per_value() {
        let mut placeholders = MultiPlaceholders::new();
        placeholders.set("file", values(&["a.c", "b.c"]));
        assert_eq!(
            placeholders.expand("src/${file}"),
            vec!["src/a.c", "src/b.c"]
        );
    }

    #[test]
    fn test_two_placeholders_expand_to_the_cartesian_product() {
        let mut placeholders = MultiPlaceholders::new();
        placeholders.set("dir", values(&["x", "y"]));
        placeholders.set("file", values(&["1", "2", "3"]));

        let expanded = placeholders.expand("${dir}/${file}");
        assert_eq!(expanded.len(), 6);
        assert!(expanded.contains(&"x/1".to_string()));
        assert!(expanded.contains(&"y/3".to_string()));
    }

    #[test]
    fn test_repeated_token_uses_the_same_value() {
        let mut placeholders = MultiPlaceholders::new();
        placeholders.set("n", values(&["1", "2"]));
        assert_eq!(
            placeholders.expand("${n}-${n}"),
            vec!["1-1", "2-2"]
        );
    }

    #[test]
    fn test_substitution_is_not_reprocessed() {
        let mut placeholders = MultiPlaceholders::new();
        placeholders.set("a", values(&["${b}"]));
        placeholders.set("b", values(&["boom"]));

        // ${a} inserts the literal "${b}", which is not expanded again.
        assert_eq!(placeholders.expand("${a}"), vec!["${b}"]);
    }

    #[test]
    fn test_expand_all_concatenates() {
        let mut placeholders = MultiPlaceholders::new();
        placeholders.set("n", values(&["1", "2"]));
        let expanded =
            placeholders.expand_all(&[String::from("a${n}"), String::from("b")]);
        assert_eq!(expanded, vec!["a1", "a2", "b"]);
    }
}
