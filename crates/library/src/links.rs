//! Cross-note link resolution.
//!
//! Runs on converted Org text, once every note has an identifier. A link is
//! matched against the vault in a fixed order, and the first rule with any
//! match wins:
//!
//! 1. vault path, relative to the linking note's directory, then to the vault root
//! 2. file stem (only for targets without a `/`)
//! 3. title
//! 4. alias
//!
//! Matching is case-insensitive and ignores a trailing note extension. When a
//! rule matches several notes, the lexicographically-first path wins and an
//! [`AmbiguousLink`](WarningKind::AmbiguousLink) warning is raised for that
//! occurrence.

use crate::registry::IdentifierRegistry;
use crate::report::{Warning, WarningKind};
use orgify_extract::{Note, OrgLink, asset_extension, rewrite_links, split_fragment};
use orgify_storage::validate_path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A note as a link target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub path: PathBuf,
    pub identifier: String,
    pub title: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a IndexEntry),
    Ambiguous { chosen: &'a IndexEntry, candidates: usize },
    Missing,
}

impl<'a> Lookup<'a> {
    pub fn entry(&self) -> Option<&'a IndexEntry> {
        match self {
            Self::Found(entry) | Self::Ambiguous { chosen: entry, .. } => Some(entry),
            Self::Missing => None,
        }
    }
}

type Bucket = HashMap<String, Vec<usize>>;

/// Every note that can be linked to, by each of the ways it can be named.
#[derive(Debug, Default)]
pub struct NoteIndex {
    entries: Vec<IndexEntry>,
    by_path: Bucket,
    by_stem: Bucket,
    by_title: Bucket,
    by_alias: Bucket,
    note_extensions: Vec<String>,
}

impl NoteIndex {
    pub fn build<'n, S: AsRef<str>>(
        notes: impl IntoIterator<Item = (&'n Note, String)>,
        note_extensions: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut notes: Vec<_> = notes.into_iter().collect();
        notes.sort_by(|(a, _), (b, _)| a.path.cmp(&b.path));
        let mut index = Self {
            note_extensions: note_extensions.into_iter().map(|ext| ext.as_ref().to_lowercase()).collect(),
            ..Self::default()
        };
        for (position, (note, identifier)) in notes.into_iter().enumerate() {
            let key = IdentifierRegistry::key_for(&note.path);
            index.by_path.entry(index.normalize(&key)).or_default().push(position);
            index.by_stem.entry(note.stem().to_lowercase()).or_default().push(position);
            index.by_title.entry(note.title().to_lowercase()).or_default().push(position);
            for alias in note.metadata.aliases() {
                index.by_alias.entry(alias.to_lowercase()).or_default().push(position);
            }
            index.entries.push(IndexEntry {
                path: note.path.clone(),
                identifier,
                title: note.title(),
            });
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lowercase, with any note extension removed.
    fn normalize(&self, target: &str) -> String {
        let lower = target.trim().to_lowercase();
        for ext in &self.note_extensions {
            if let Some(stripped) = lower.strip_suffix(&format!(".{ext}")) {
                return stripped.to_string();
            }
        }
        lower
    }

    /// Find the note `target` names, as seen from a note in `from_dir`.
    pub fn lookup(&self, from_dir: &Path, target: &str) -> Lookup<'_> {
        let target = target.trim();
        if target.is_empty() {
            return Lookup::Missing;
        }
        let normalized = self.normalize(target);
        for candidate in [from_dir.join(&normalized), PathBuf::from(&normalized)] {
            let Ok(path) = validate_path(&candidate) else { continue };
            if let Some(hits) = self.by_path.get(&IdentifierRegistry::key_for(&path).to_lowercase()) {
                return self.pick(hits);
            }
        }
        let lower = target.to_lowercase();
        let buckets = [
            (!normalized.contains('/')).then_some((&self.by_stem, &normalized)),
            Some((&self.by_title, &lower)),
            Some((&self.by_alias, &lower)),
        ];
        for (bucket, key) in buckets.into_iter().flatten() {
            if let Some(hits) = bucket.get(key.as_str()) {
                return self.pick(hits);
            }
        }
        Lookup::Missing
    }

    fn pick(&self, hits: &[usize]) -> Lookup<'_> {
        let Some(&first) = hits.iter().min() else {
            return Lookup::Missing;
        };
        let chosen = &self.entries[first];
        match hits.len() {
            1 => Lookup::Found(chosen),
            candidates => Lookup::Ambiguous { chosen, candidates },
        }
    }
}

/// Marker left in place of a reference that couldn't be resolved.
pub(crate) fn unresolved(text: &str) -> String {
    format!("/{}/ (unresolved)", text.trim())
}

/// Percent-decoded link target with any fragment removed.
pub(crate) fn link_target(raw: &str) -> String {
    let decoded = urlencoding::decode(raw).map(|d| d.into_owned()).unwrap_or_else(|_| raw.to_string());
    let (target, _) = split_fragment(&decoded);
    target.trim().to_string()
}

/// Whether an Org link could be a vault reference at all. Heading, custom-id
/// and coderef links are internal to the note.
pub(crate) fn is_vault_link(link: &OrgLink<'_>) -> bool {
    !link.is_external() && !link.target.starts_with(['*', '#', '('])
}

pub struct LinkResolver<'a> {
    index: &'a NoteIndex,
}

impl<'a> LinkResolver<'a> {
    pub fn new(index: &'a NoteIndex) -> Self {
        Self { index }
    }

    /// Rewrite every note link in `body` into an `id:` link. Asset links are
    /// left alone.
    ///
    /// Returns the new body and one warning per ambiguous or unresolved link
    /// occurrence.
    pub fn resolve_links(&self, note: &Note, body: &str) -> (String, Vec<Warning>) {
        let mut warnings = Vec::new();
        let body = rewrite_links(body, |link| {
            if !is_vault_link(link) {
                return None;
            }
            let target = link_target(link.target);
            if target.is_empty() || asset_extension(&target).is_some() {
                return None;
            }
            let lookup = self.index.lookup(note.directory(), &target);
            if let Some(warning) = Self::warning(note, &target, &lookup) {
                warnings.push(warning);
            }
            Some(match lookup.entry() {
                Some(entry) => {
                    let description = link.description.map(str::to_string).unwrap_or_else(|| entry.title.replace(['[', ']'], ""));
                    format!("[[id:{}][{description}]]", entry.identifier)
                },
                None => unresolved(link.description.unwrap_or(&target)),
            })
        });
        (body, warnings)
    }

    /// How each of the note's own references resolves, one line per
    /// occurrence, plus the warnings that resolution raises. Used to tell
    /// whether a previously written note would still come out the same.
    pub fn preview(&self, note: &Note) -> (Vec<String>, Vec<Warning>) {
        let mut context = Vec::new();
        let mut warnings = Vec::new();
        for reference in &note.references {
            let lookup = self.index.lookup(note.directory(), reference);
            warnings.extend(Self::warning(note, reference, &lookup));
            let resolved = lookup.entry().map_or("?", |entry| entry.identifier.as_str());
            context.push(format!("link {reference} => {resolved}"));
        }
        (context, warnings)
    }

    fn warning(note: &Note, target: &str, lookup: &Lookup<'_>) -> Option<Warning> {
        let kind = match lookup {
            Lookup::Found(_) => return None,
            Lookup::Ambiguous { chosen, candidates } => WarningKind::AmbiguousLink {
                chosen: chosen.path.clone(),
                candidates: *candidates,
            },
            Lookup::Missing => WarningKind::UnresolvedLink,
        };
        Some(Warning::new(&note.path, target, kind))
    }
}
