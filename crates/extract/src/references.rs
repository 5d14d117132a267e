//! Reference scanning in Markdown source.

use crate::consts::{INLINE_CODE_REGEX, MARKDOWN_LINK_REGEX, NOTE_EXTENSIONS, SCHEME_REGEX, WIKILINK_REGEX};
use std::path::Path;

/// A reference to another vault file, as written in Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Link target with any `#heading` or `#^block` fragment removed.
    pub target: String,
    pub label: Option<String>,
    /// Written as an embed (`![[...]]` or `![...](...)`).
    pub embed: bool,
}
impl Reference {
    /// Whether the target names an asset rather than a note.
    pub fn is_asset(&self) -> bool {
        asset_extension(&self.target).is_some()
    }
}

/// Whether a target points outside the vault (`https://...`, `mailto:...`).
pub fn is_external(target: &str) -> bool {
    SCHEME_REGEX.is_match(target)
}

/// Split off a `#heading` or `#^block` fragment.
pub fn split_fragment(target: &str) -> (&str, Option<&str>) {
    match target.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (target, None),
    }
}

/// Lowercased extension of a target, if it has one that isn't a note
/// extension. `Meeting 2024.01` has no extension (digits only).
pub fn asset_extension(target: &str) -> Option<String> {
    let ext = Path::new(target).extension()?.to_str()?.to_ascii_lowercase();
    let plausible = ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) && ext.chars().any(|c| c.is_ascii_alphabetic());
    (plausible && !NOTE_EXTENSIONS.contains(&ext.as_str())).then_some(ext)
}

/// All local references in a Markdown body, in order of appearance.
///
/// Fenced code blocks and inline code spans are ignored; external URLs and
/// same-note anchors are left out.
pub fn scan_markdown(body: &str) -> Vec<Reference> {
    let mut references = Vec::new();
    let mut fence: Option<&str> = None;
    for line in body.lines() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if let Some(marker) = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m)) {
            fence = Some(marker);
            continue;
        }
        let line = INLINE_CODE_REGEX.replace_all(line, |caps: &regex::Captures| " ".repeat(caps[0].len()));
        let mut found: Vec<(usize, Reference)> = Vec::new();
        for caps in WIKILINK_REGEX.captures_iter(&line) {
            let start = caps.get(0).map_or(0, |m| m.start());
            let (target, _) = split_fragment(caps[2].trim());
            if target.is_empty() {
                continue;
            }
            found.push((start, Reference {
                target: target.to_string(),
                label: caps.get(3).map(|m| m.as_str().trim().to_string()),
                embed: !caps[1].is_empty(),
            }));
        }
        for caps in MARKDOWN_LINK_REGEX.captures_iter(&line) {
            let start = caps.get(0).map_or(0, |m| m.start());
            let raw = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
            if is_external(raw) {
                continue;
            }
            let decoded = urlencoding::decode(raw).map(|d| d.into_owned()).unwrap_or_else(|_| raw.to_string());
            let (target, _) = split_fragment(&decoded);
            if target.is_empty() {
                continue;
            }
            let label = caps[2].trim();
            found.push((start, Reference {
                target: target.to_string(),
                label: (!label.is_empty()).then(|| label.to_string()),
                embed: !caps[1].is_empty(),
            }));
        }
        found.sort_by_key(|(start, _)| *start);
        references.extend(found.into_iter().map(|(_, reference)| reference));
    }
    references
}
