//! YAML frontmatter splitting and parsing.

use crate::error::{ErrorKind, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// A note split into its frontmatter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter<'a> {
    /// Top-level keys, with `serde_yaml` values converted to JSON values.
    pub fields: BTreeMap<String, Value>,
    /// Top-level keys that appeared more than once (the last one won).
    pub duplicate_keys: Vec<String>,
    /// Everything after the closing delimiter.
    pub body: &'a str,
}

/// Split a note into frontmatter fields and body.
///
/// A frontmatter block starts with a `---` line (optionally preceded by a
/// BOM) and ends at the next `---` or `...` line. A note with no block, or
/// with an unterminated one, is all body. A block that isn't a YAML mapping
/// is an error.
pub fn split(input: &str) -> Result<Frontmatter<'_>> {
    let input = input.trim_start_matches('\u{feff}');
    let Some((yaml, body)) = delimit(input) else {
        return Ok(Frontmatter {
            fields: BTreeMap::new(),
            duplicate_keys: Vec::new(),
            body: input,
        });
    };
    let (yaml, duplicate_keys) = last_write_wins(yaml);
    let fields = parse_mapping(&yaml)?;
    Ok(Frontmatter { fields, duplicate_keys, body })
}

/// Locate the YAML between the delimiters, and the body after them.
fn delimit(input: &str) -> Option<(&str, &str)> {
    let mut lines = input.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }
    let start = first.len();
    let mut offset = start;
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some((&input[start..offset], &input[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Name of the top-level key a line opens, if it opens one.
fn top_level_key(line: &str) -> Option<&str> {
    if line.starts_with([' ', '\t', '#', '-']) || line.trim().is_empty() {
        return None;
    }
    let (key, rest) = line.split_once(':')?;
    if !(rest.is_empty() || rest.starts_with([' ', '\t', '\r', '\n'])) {
        return None;
    }
    Some(key.trim().trim_matches(['"', '\'']))
}

/// `serde_yaml` rejects repeated keys outright. Drop every top-level entry
/// that a later entry with the same key overrides, and report which keys
/// were repeated.
fn last_write_wins(yaml: &str) -> (String, Vec<String>) {
    let mut entries: Vec<(Option<&str>, Vec<&str>)> = Vec::new();
    for line in yaml.split_inclusive('\n') {
        match top_level_key(line) {
            Some(key) => entries.push((Some(key), vec![line])),
            None => match entries.last_mut() {
                Some((_, lines)) => lines.push(line),
                None => entries.push((None, vec![line])),
            },
        }
    }
    let mut last_index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut duplicates: Vec<String> = Vec::new();
    for (index, (key, _)) in entries.iter().enumerate() {
        if let Some(key) = key
            && last_index.insert(key, index).is_some()
            && !duplicates.iter().any(|d| d == key)
        {
            duplicates.push(key.to_string());
        }
    }
    let kept = entries
        .iter()
        .enumerate()
        .filter(|(index, (key, _))| key.is_none_or(|key| last_index.get(key) == Some(index)))
        .flat_map(|(_, (_, lines))| lines.iter().copied())
        .collect();
    (kept, duplicates)
}

fn parse_mapping(yaml: &str) -> Result<BTreeMap<String, Value>> {
    if yaml.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let malformed = |reason: String| ErrorKind::MalformedFrontmatter { reason };
    let yaml_value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| malformed(e.to_string()))?;
    let json_value: Value = serde_json::to_value(yaml_value).map_err(|e| malformed(e.to_string()))?;
    match json_value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(BTreeMap::new()),
        other => exn::bail!(malformed(format!("expected a mapping, found `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_basic_frontmatter() {
        let fm = split("---\ntitle: Foo\ntags: [a, b]\n---\n# Heading\nBody\n").unwrap();
        assert_eq!(fm.fields["title"], Value::String("Foo".into()));
        assert_eq!(fm.fields["tags"].as_array().unwrap().len(), 2);
        assert_eq!(fm.body, "# Heading\nBody\n");
        assert!(fm.duplicate_keys.is_empty());
    }

    #[test]
    fn test_bom_and_dots_terminator() {
        let fm = split("\u{feff}---\ntitle: Foo\n...\nBody").unwrap();
        assert_eq!(fm.fields["title"], Value::String("Foo".into()));
        assert_eq!(fm.body, "Body");
    }

    #[rstest]
    #[case::no_block("# Title\nBody")]
    #[case::unterminated("---\ntitle: Foo\nBody")]
    #[case::rule_later("Intro\n---\ntitle: Foo\n---\n")]
    fn test_all_body(#[case] input: &str) {
        let fm = split(input).unwrap();
        assert!(fm.fields.is_empty());
        assert_eq!(fm.body, input);
    }

    #[test]
    fn test_empty_block() {
        let fm = split("---\n---\nBody").unwrap();
        assert!(fm.fields.is_empty());
        assert_eq!(fm.body, "Body");
    }

    #[test]
    fn test_duplicate_keys_last_write_wins() {
        let input = "---\ntitle: First\ntags:\n  - a\ntitle: Second\ntags:\n- b\n- c\n---\nBody";
        let fm = split(input).unwrap();
        assert_eq!(fm.fields["title"], Value::String("Second".into()));
        assert_eq!(fm.fields["tags"], serde_json::json!(["b", "c"]));
        assert_eq!(fm.duplicate_keys, vec!["title".to_string(), "tags".to_string()]);
    }

    #[rstest]
    #[case::unclosed_flow("---\ntags: [a, b\n---\n")]
    #[case::scalar("---\njust a string\n---\n")]
    #[case::unterminated_quote("---\ntitle: \"Foo\n---\n")]
    fn test_malformed(#[case] input: &str) {
        let err = split(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedFrontmatter { .. }));
    }

    #[test]
    fn test_nested_values_survive() {
        let fm = split("---\nproject:\n  status: active\n  owners: [me]\n---\n").unwrap();
        assert_eq!(fm.fields["project"]["status"], Value::String("active".into()));
    }
}
