//! Typed accessors over a note's frontmatter.

use serde_json::Value;
use std::collections::BTreeMap;

/// Keys with a dedicated place in the Org output; everything else is passed
/// through as a file keyword.
pub const RESERVED_KEYS: &[&str] = &["id", "title", "tags", "tag", "aliases", "alias", "created", "modified", "updated"];

/// Parsed frontmatter of a note. Key order is irrelevant, so keys are kept
/// sorted for deterministic output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, Value>);

impl Metadata {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn title(&self) -> Option<String> {
        self.get("title").and_then(scalar).filter(|title| !title.trim().is_empty())
    }

    /// Explicit stable identifier, if the note carries one.
    pub fn id(&self) -> Option<String> {
        self.get("id").and_then(scalar).map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
    }

    /// Tags from `tags` and the legacy `tag`, without a leading `#`.
    ///
    /// Accepts either a YAML list or a string separated by commas or spaces.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        for key in ["tags", "tag"] {
            for tag in self.get(key).map(|v| list(v, true)).unwrap_or_default() {
                let tag = tag.trim_start_matches('#').to_string();
                if !tag.is_empty() && !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags
    }

    /// Aliases from `aliases` and the legacy `alias`. Strings are only split
    /// on commas, since aliases usually contain spaces.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = Vec::new();
        for key in ["aliases", "alias"] {
            for alias in self.get(key).map(|v| list(v, false)).unwrap_or_default() {
                if !aliases.contains(&alias) {
                    aliases.push(alias);
                }
            }
        }
        aliases
    }

    pub fn created(&self) -> Option<String> {
        self.get("created").and_then(scalar)
    }

    /// `modified`, else `updated`.
    pub fn modified(&self) -> Option<String> {
        self.get("modified").or_else(|| self.get("updated")).and_then(scalar)
    }

    /// Keys without a dedicated place in the output, in key order. `updated`
    /// is among them when `modified` took its place.
    pub fn passthrough(&self) -> impl Iterator<Item = (&str, &Value)> {
        let shadowed = self.0.contains_key("modified");
        self.0
            .iter()
            .filter(move |(key, _)| {
                !RESERVED_KEYS.contains(&key.as_str()) || (shadowed && key.as_str() == "updated")
            })
            .map(|(key, value)| (key.as_str(), value))
    }
}

/// A scalar rendered as text; `null`, arrays and objects have none.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn list(value: &Value, split_whitespace: bool) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar).map(|s| s.trim().to_string()).collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || (split_whitespace && c.is_whitespace()))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        other => scalar(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        let Value::Object(map) = value else { panic!("not an object") };
        Metadata::new(map.into_iter().collect())
    }

    #[rstest]
    #[case::list(json!({"tags": ["a", "#b"]}), vec!["a", "b"])]
    #[case::comma_string(json!({"tags": "a, b"}), vec!["a", "b"])]
    #[case::space_string(json!({"tags": "#a #b"}), vec!["a", "b"])]
    #[case::legacy_merged(json!({"tags": ["a"], "tag": "a b"}), vec!["a", "b"])]
    #[case::absent(json!({}), vec![])]
    fn test_tags(#[case] value: Value, #[case] expected: Vec<&str>) {
        assert_eq!(metadata(value).tags(), expected);
    }

    #[test]
    fn test_aliases_keep_spaces() {
        let meta = metadata(json!({"aliases": "First Alias, Second Alias"}));
        assert_eq!(meta.aliases(), vec!["First Alias", "Second Alias"]);
    }

    #[test]
    fn test_scalars() {
        let meta = metadata(json!({"title": "Foo", "id": 42, "created": "2024-01-02", "updated": "2024-02-03"}));
        assert_eq!(meta.title().as_deref(), Some("Foo"));
        assert_eq!(meta.id().as_deref(), Some("42"));
        assert_eq!(meta.created().as_deref(), Some("2024-01-02"));
        assert_eq!(meta.modified().as_deref(), Some("2024-02-03"));
        assert_eq!(metadata(json!({"title": "  "})).title(), None);
    }

    #[test]
    fn test_passthrough_excludes_reserved() {
        let meta = metadata(json!({"title": "Foo", "status": "draft", "rating": 3, "tags": ["a"]}));
        let keys: Vec<_> = meta.passthrough().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["rating", "status"]);
    }

    #[test]
    fn test_updated_passes_through_beside_modified() {
        let both = metadata(json!({"modified": "2024-02-03", "updated": "2024-03-04"}));
        assert_eq!(both.modified().as_deref(), Some("2024-02-03"));
        assert_eq!(both.passthrough().map(|(k, _)| k).collect::<Vec<_>>(), vec!["updated"]);

        let alone = metadata(json!({"updated": "2024-03-04"}));
        assert_eq!(alone.modified().as_deref(), Some("2024-03-04"));
        assert_eq!(alone.passthrough().count(), 0);
    }
}
