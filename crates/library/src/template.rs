//! Output path templating.
//!
//! Output files are named by a user-configured [upon] template. The syntax
//! follows upon's Mustache-like conventions (`{{ variable }}`,
//! `{{ value|formatter }}`), extended with:
//!
//! - **`slug`**: converts strings to URL-safe slugs, stripping quotation marks
//!   first to avoid artifacts like leading/trailing hyphens.
//! - **`truncate`**: truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable  | Type             | Description                                         |
//! |-----------|------------------|-----------------------------------------------------|
//! | `dir`     | `String`         | Vault directory of the note (`""` at the root)      |
//! | `stem`    | `String`         | File name without extension                         |
//! | `title`   | `String`         | Frontmatter title, else the stem                    |
//! | `id`      | `String`         | The note's stable identifier                        |
//! | `created` | `String`         | `created` as `YYYYMMDDHHMMSS`, empty if unparseable |
//! | `section` | `Option<String>` | Top-level vault directory, if the note is nested    |
//!
//! # Example
//!
//! ```
//! use orgify_library::PathGenerator;
//! use orgify_extract::Note;
//!
//! let note = Note::parse("Daily/Stand Up.md", b"---\ncreated: 2024-01-02\n---\n").unwrap();
//! let generator: PathGenerator = "{{ created }}-{{ stem|slug }}".parse().unwrap();
//! assert_eq!(generator.generate_with_ext(&note, "id", "org").unwrap(), "20240102000000-stand-up.org");
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::properties::Timestamp;
use crate::vault::slash_path;
use exn::{OptionExt, ResultExt};
use orgify_extract::Note;
use orgify_storage::validate_path;
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

/// Mirrors the vault layout: `Projects/Alpha.md` becomes `Projects/Alpha.org`.
pub const DEFAULT_TEMPLATE: &str = "{{ dir }}/{{ stem }}";

/// Generates deterministic output paths from a note and a user-defined
/// template string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time.
///
/// Generated paths are normalized (trimmed, deduplicated separators) and
/// validated by [`orgify_storage::validate_path`] to keep them inside the
/// output tree.
pub struct PathGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for PathGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template })
    }
}
impl PathGenerator {
    /// Renders the template for `note`, returning the normalized path
    /// without any file extension.
    #[instrument(skip_all, fields(note = %note.path.display()))]
    pub fn generate(&self, note: &Note, identifier: &str) -> Result<String> {
        let path = self
            .template
            .render(&self.engine, Self::parameters(note, identifier))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Self::normalize(path)
    }

    /// Renders the template and appends a file extension. Both `"org"` and
    /// `".org"` produce the same result.
    pub fn generate_with_ext(&self, note: &Note, identifier: &str, ext: impl AsRef<str>) -> Result<String> {
        let path = self.generate(note, identifier)?;
        Ok(format!("{path}.{}", ext.as_ref().trim().trim_matches('.')))
    }

    /// Trims each path segment, joins them with `/`, then validates via
    /// [`orgify_storage::validate_path`].
    fn normalize(s: impl Into<String>) -> Result<String> {
        let path = s.into().trim().split('/').map(str::trim).collect::<Vec<_>>().join("/");
        validate_path(&path)
            .or_raise(|| ErrorKind::Template)
            .and_then(|p| p.to_str().map(|p| p.to_string()).ok_or_raise(|| ErrorKind::Template))
    }

    fn parameters(note: &Note, identifier: &str) -> upon::Value {
        let created = note.metadata.created().and_then(|c| Timestamp::parse(&c)).and_then(|ts| ts.compact());
        upon::value! {
            dir: slash_path(note.directory()),
            stem: note.stem(),
            title: note.title(),
            id: identifier,
            created: created.unwrap_or_default(),
            section: note.section(),
        }
    }
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Strips quotation marks before slugifying to avoid awkward slug output
    /// like `"hello"` becoming `-hello-`.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                // Various quotation marks: '"''""„"`«»
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}
