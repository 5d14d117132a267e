//! Org-roam properties from Markdown frontmatter.

use orgify_extract::Note;
use serde_json::Value;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Everything that goes above the body of an Org-roam note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBlock {
    pub identifier: String,
    pub title: String,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub aliases: Vec<String>,
    pub tags: Vec<String>,
    /// Unrecognised frontmatter, passed through as `#+key: value`.
    pub keywords: Vec<(String, String)>,
}

/// Build the property block for `note` and tidy the converter's output into
/// the body that follows it.
pub fn transform(note: &Note, identifier: &str, raw_output: &str, section_tags: bool) -> (PropertyBlock, String) {
    let metadata = &note.metadata;
    let mut tags: Vec<String> = Vec::new();
    let section = section_tags.then(|| note.section()).flatten();
    for tag in metadata.tags().iter().map(String::as_str).chain(section) {
        let tag = sanitize_tag(tag);
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    let keywords = metadata.passthrough().map(|(key, value)| (sanitize_keyword(key), keyword_value(value))).collect();
    let block = PropertyBlock {
        identifier: identifier.to_string(),
        title: single_line(&note.title()),
        created: metadata.created().map(|value| org_timestamp(&value)),
        modified: metadata.modified().map(|value| org_timestamp(&value)),
        aliases: metadata.aliases(),
        tags,
        keywords,
    };
    let body = raw_output.trim_start_matches(['\n', '\r']).trim_end();
    let body = if body.is_empty() { String::new() } else { format!("{body}\n") };
    (block, body)
}

impl fmt::Display for PropertyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ":PROPERTIES:")?;
        writeln!(f, ":ID: {}", self.identifier)?;
        if let Some(created) = &self.created {
            writeln!(f, ":CREATED: {created}")?;
        }
        if let Some(modified) = &self.modified {
            writeln!(f, ":MODIFIED: {modified}")?;
        }
        if !self.aliases.is_empty() {
            let aliases: Vec<_> = self.aliases.iter().map(|a| format!("\"{}\"", single_line(a).replace('"', "\\\""))).collect();
            writeln!(f, ":ROAM_ALIASES: {}", aliases.join(" "))?;
        }
        writeln!(f, ":END:")?;
        writeln!(f, "#+title: {}", self.title)?;
        if !self.tags.is_empty() {
            writeln!(f, "#+filetags: :{}:", self.tags.join(":"))?;
        }
        for (key, value) in &self.keywords {
            writeln!(f, "#+{key}: {value}")?;
        }
        Ok(())
    }
}

/// A frontmatter date or date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timestamp {
    Date(Date),
    DateTime(PrimitiveDateTime),
}

impl Timestamp {
    /// Accepts RFC 3339 and `YYYY-MM-DD[( |T)HH:MM[:SS]]`. Offsets are
    /// dropped: the wall-clock time is what the author wrote.
    pub(crate) fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(datetime) = OffsetDateTime::parse(value, &Rfc3339) {
            return Some(Self::DateTime(PrimitiveDateTime::new(datetime.date(), datetime.time())));
        }
        let datetimes = [
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            format_description!("[year]-[month]-[day]T[hour]:[minute]"),
            format_description!("[year]-[month]-[day] [hour]:[minute]"),
        ];
        if let Some(datetime) = datetimes.iter().find_map(|format| PrimitiveDateTime::parse(value, *format).ok()) {
            return Some(Self::DateTime(datetime));
        }
        Date::parse(value, format_description!("[year]-[month]-[day]")).ok().map(Self::Date)
    }

    /// Inactive Org timestamp: `[2024-01-02 Tue]` or `[2024-01-02 Tue 10:30]`.
    pub(crate) fn org(&self) -> Option<String> {
        let formatted = match self {
            Self::Date(date) => date.format(format_description!("[year]-[month]-[day] [weekday repr:short]")),
            Self::DateTime(datetime) => {
                datetime.format(format_description!("[year]-[month]-[day] [weekday repr:short] [hour]:[minute]"))
            },
        };
        formatted.ok().map(|s| format!("[{s}]"))
    }

    /// `20240102103000`, for file names.
    pub(crate) fn compact(&self) -> Option<String> {
        let datetime = match self {
            Self::Date(date) => date.midnight(),
            Self::DateTime(datetime) => *datetime,
        };
        datetime.format(format_description!("[year][month][day][hour][minute][second]")).ok()
    }
}

/// Unparseable timestamps are kept verbatim rather than dropped.
fn org_timestamp(value: &str) -> String {
    Timestamp::parse(value).and_then(|ts| ts.org()).unwrap_or_else(|| single_line(value))
}

fn single_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Org tags may only hold letters, digits, `_`, `@`, `#` and `%`.
fn sanitize_tag(tag: &str) -> String {
    tag.trim().chars().map(|c| if c.is_alphanumeric() || "_@#%".contains(c) { c } else { '_' }).collect()
}

fn sanitize_keyword(key: &str) -> String {
    key.trim().chars().map(|c| if c.is_whitespace() || c == ':' { '_' } else { c }).collect()
}

fn keyword_value(value: &Value) -> String {
    match value {
        Value::String(s) => single_line(s),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
