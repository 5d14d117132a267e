use crate::error::{ErrorKind, Result};
use crate::frontmatter;
use crate::metadata::Metadata;
use crate::references::scan_markdown;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// A parsed vault note.
///
/// The source text is kept verbatim; everything else is derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Vault-relative path.
    pub path: PathBuf,
    pub source: String,
    pub metadata: Metadata,
    /// Source with the frontmatter block removed.
    pub body: String,
    /// Outbound note references, as written (fragments removed), one per
    /// occurrence in order of appearance.
    pub references: Vec<String>,
    /// Asset references, one per occurrence in order of appearance.
    pub assets: Vec<String>,
    /// Frontmatter keys that appeared more than once.
    pub duplicate_keys: Vec<String>,
}

impl Note {
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display(), size = bytes.len()))]
    pub fn parse(path: impl AsRef<Path>, bytes: &[u8]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let source = String::from_utf8(bytes.to_vec()).or_raise(|| ErrorKind::NotUtf8(path.clone()))?;
        let split = frontmatter::split(&source)?;
        let (assets, references): (Vec<_>, Vec<_>) = scan_markdown(split.body).into_iter().partition(|r| r.is_asset());
        let references = references.into_iter().map(|r| r.target).collect();
        let assets = assets.into_iter().map(|r| r.target).collect();
        let metadata = Metadata::new(split.fields);
        let body = split.body.to_string();
        let duplicate_keys = split.duplicate_keys;
        Ok(Self {
            path,
            source,
            metadata,
            body,
            references,
            assets,
            duplicate_keys,
        })
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        self.path.file_stem().and_then(|s| s.to_str()).unwrap_or_default()
    }

    /// The `title` metadata, falling back to the file stem.
    pub fn title(&self) -> String {
        self.metadata.title().unwrap_or_else(|| self.stem().to_string())
    }

    /// Directory containing the note, relative to the vault root.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    /// Top-level vault directory the note lives under, if any.
    pub fn section(&self) -> Option<&str> {
        let mut components = self.path.components();
        let first = components.next()?;
        components.next()?;
        first.as_os_str().to_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_note() {
        let source = "---\ntitle: Foo\ntags: [a, b]\n---\nSee [[Beta]] and ![[img/cat.png]].\n";
        let note = Note::parse("Projects/Foo.md", source.as_bytes()).unwrap();
        assert_eq!(note.title(), "Foo");
        assert_eq!(note.metadata.tags(), vec!["a", "b"]);
        assert_eq!(note.body, "See [[Beta]] and ![[img/cat.png]].\n");
        assert_eq!(note.references, vec!["Beta"]);
        assert_eq!(note.assets, vec!["img/cat.png"]);
        assert_eq!(note.section(), Some("Projects"));
        assert_eq!(note.directory(), Path::new("Projects"));
    }

    #[test]
    fn test_references_keep_every_occurrence() {
        let note = Note::parse("Ref.md", b"[[Dup]] and [[Dup]], ![[a.png]] [[Ghost]] ![[a.png]]").unwrap();
        assert_eq!(note.references, vec!["Dup", "Dup", "Ghost"]);
        assert_eq!(note.assets, vec!["a.png", "a.png"]);
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let note = Note::parse("Inbox.md", b"Just text").unwrap();
        assert_eq!(note.title(), "Inbox");
        assert_eq!(note.section(), None);
        assert_eq!(note.directory(), Path::new(""));
    }

    #[test]
    fn test_not_utf8() {
        let err = Note::parse("Bad.md", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotUtf8(_)));
    }

    #[test]
    fn test_malformed_frontmatter() {
        let err = Note::parse("Bad.md", b"---\ntags: [a\n---\nBody").unwrap_err();
        assert!(matches!(&*err, ErrorKind::MalformedFrontmatter { .. }));
    }
}
