//! Asset resolution and copying.
//!
//! Asset links in converted Org text are matched against the vault's assets,
//! relative to the linking note first, then from the vault root, then by
//! bare file name (the lexicographically-first path when several share it,
//! with a warning). Found assets are copied to the same vault path under the
//! output's asset directory, and the link is rewritten relative to the
//! note's output file.

use crate::links::{is_vault_link, link_target, unresolved};
use crate::report::{Warning, WarningKind};
use crate::vault::{Vault, slash_path};
use orgify_extract::{Note, asset_extension, rewrite_links};
use orgify_storage::error::Result as StorageResult;
use orgify_storage::{StorageBackend, relative_between, validate_path};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::instrument;

/// Every asset in the vault.
#[derive(Debug, Default)]
pub struct AssetIndex {
    by_path: BTreeMap<String, PathBuf>,
    by_name: HashMap<String, Vec<PathBuf>>,
    /// Asset extensions the vault walk collects; empty accepts any.
    extensions: Vec<String>,
}

/// Where an asset reference led.
#[derive(Debug, PartialEq, Eq)]
pub enum Located<'a> {
    Found(&'a Path),
    /// Only the bare file name matched, and several assets share it. The
    /// lexicographically-first path is chosen.
    Ambiguous { chosen: &'a Path, candidates: usize },
    /// The extension isn't one the vault walk collects as an asset.
    Unsupported,
    Missing,
}

impl<'a> Located<'a> {
    pub fn source(&self) -> Option<&'a Path> {
        match self {
            Self::Found(path) | Self::Ambiguous { chosen: path, .. } => Some(path),
            Self::Unsupported | Self::Missing => None,
        }
    }
}

impl AssetIndex {
    pub fn build(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut paths: Vec<_> = paths.into_iter().collect();
        paths.sort();
        let mut index = Self::default();
        for path in paths {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                index.by_name.entry(name.to_lowercase()).or_default().push(path.clone());
            }
            index.by_path.entry(slash_path(&path).to_lowercase()).or_insert(path);
        }
        index
    }

    /// Restrict references to these extensions; anything else is reported
    /// as unsupported rather than missing.
    pub fn supporting<S: AsRef<str>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.extensions = extensions.into_iter().map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase()).collect();
        self
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Find the asset `target` names, as seen from a note in `from_dir`:
    /// relative to the note, then from the vault root, then by file name.
    pub fn locate(&self, from_dir: &Path, target: &str) -> Located<'_> {
        if !self.extensions.is_empty()
            && let Some(ext) = asset_extension(target)
            && !self.extensions.contains(&ext)
        {
            return Located::Unsupported;
        }
        for candidate in [from_dir.join(target), PathBuf::from(target)] {
            let Ok(path) = validate_path(&candidate) else { continue };
            if let Some(found) = self.by_path.get(&slash_path(&path).to_lowercase()) {
                return Located::Found(found);
            }
        }
        let Some(name) = Path::new(target).file_name().and_then(|n| n.to_str()) else {
            return Located::Missing;
        };
        match self.by_name.get(&name.to_lowercase()).map(Vec::as_slice) {
            Some([only]) => Located::Found(only),
            Some(all @ [chosen, ..]) => Located::Ambiguous {
                chosen,
                candidates: all.len(),
            },
            _ => Located::Missing,
        }
    }
}

/// One asset to copy from the vault into the output tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CopyAction {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Copied,
    /// The destination already held identical bytes.
    Unchanged,
    /// Another note copied it earlier in this run.
    AlreadyHandled,
}

pub struct AssetResolver<'a> {
    index: &'a AssetIndex,
    assets_dir: &'a Path,
}

impl<'a> AssetResolver<'a> {
    pub fn new(index: &'a AssetIndex, assets_dir: &'a Path) -> Self {
        Self { index, assets_dir }
    }

    pub fn destination(&self, source: &Path) -> PathBuf {
        self.assets_dir.join(source)
    }

    fn action(&self, source: &Path) -> CopyAction {
        CopyAction {
            source: source.to_path_buf(),
            destination: self.destination(source),
        }
    }

    /// Rewrite every asset link in `body`, which will be written to
    /// `output_path`, and list the copies that makes necessary.
    ///
    /// Missing and unsupported assets become unresolved markers with a
    /// warning each; the note itself still succeeds.
    pub fn resolve_assets(&self, note: &Note, output_path: &Path, body: &str) -> (String, Vec<CopyAction>, Vec<Warning>) {
        let output_dir = output_path.parent().unwrap_or(Path::new(""));
        let mut actions: Vec<CopyAction> = Vec::new();
        let mut warnings = Vec::new();
        let body = rewrite_links(body, |link| {
            if !is_vault_link(link) {
                return None;
            }
            let target = link_target(link.target);
            asset_extension(&target)?;
            let located = self.index.locate(note.directory(), &target);
            warnings.extend(Self::warning(note, &target, &located));
            let Some(source) = located.source() else {
                return Some(unresolved(link.description.unwrap_or(&target)));
            };
            let action = self.action(source);
            let relative = slash_path(&relative_between(output_dir, &action.destination));
            if !actions.contains(&action) {
                actions.push(action);
            }
            Some(match link.description {
                Some(description) => format!("[[file:{relative}][{description}]]"),
                None => format!("[[file:{relative}]]"),
            })
        });
        (body, actions, warnings)
    }

    /// Where each of the note's own asset references resolves, the copies
    /// that keeps in place, and the warnings it raises. See
    /// [`LinkResolver::preview`](crate::LinkResolver::preview).
    pub fn preview(&self, note: &Note) -> (Vec<String>, Vec<CopyAction>, Vec<Warning>) {
        let mut context = Vec::new();
        let mut actions: Vec<CopyAction> = Vec::new();
        let mut warnings = Vec::new();
        for target in &note.assets {
            let located = self.index.locate(note.directory(), target);
            warnings.extend(Self::warning(note, target, &located));
            let resolved = match located.source() {
                Some(source) => {
                    let action = self.action(source);
                    let resolved = slash_path(&action.destination);
                    if !actions.contains(&action) {
                        actions.push(action);
                    }
                    resolved
                },
                None => "?".to_string(),
            };
            context.push(format!("asset {target} => {resolved}"));
        }
        (context, actions, warnings)
    }

    fn warning(note: &Note, target: &str, located: &Located<'_>) -> Option<Warning> {
        let kind = match located {
            Located::Found(_) => return None,
            Located::Ambiguous { chosen, candidates } => WarningKind::AmbiguousAsset {
                chosen: chosen.to_path_buf(),
                candidates: *candidates,
            },
            Located::Unsupported => WarningKind::UnsupportedAsset,
            Located::Missing => WarningKind::MissingAsset,
        };
        Some(Warning::new(&note.path, target, kind))
    }
}

/// Copies assets, at most once per destination per run.
///
/// Notes sharing an asset wait on the first copy; if it fails, the next note
/// tries again.
#[derive(Default)]
pub struct AssetCopier {
    claimed: Mutex<HashMap<PathBuf, Arc<OnceCell<CopyStatus>>>>,
}

impl AssetCopier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy one asset unless the destination already holds the same bytes.
    #[instrument(skip_all, fields(source = %action.source.display()))]
    pub async fn copy(&self, vault: &Vault, output: &dyn StorageBackend, action: &CopyAction) -> StorageResult<CopyStatus> {
        let cell = Arc::clone(self.claimed.lock().await.entry(action.destination.clone()).or_default());
        let mut first = false;
        let status = cell
            .get_or_try_init(|| {
                first = true;
                Self::copy_once(vault, output, action)
            })
            .await?;
        Ok(if first { *status } else { CopyStatus::AlreadyHandled })
    }

    async fn copy_once(vault: &Vault, output: &dyn StorageBackend, action: &CopyAction) -> StorageResult<CopyStatus> {
        let data = vault.read_asset(&action.source).await?;
        if let Ok(existing) = output.stat(&action.destination).await
            && existing.size == data.len() as u64
            && blake3::hash(&output.read(&action.destination).await?) == blake3::hash(&data)
        {
            tracing::trace!("Asset unchanged");
            return Ok(CopyStatus::Unchanged);
        }
        output.write(&action.destination, &data).await?;
        tracing::debug!(destination = %action.destination.display(), "Copied asset");
        Ok(CopyStatus::Copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::WalkRules;
    use orgify_storage::backend::MockBackend;

    fn index() -> AssetIndex {
        AssetIndex::build(["img/cat.png", "Projects/diagram.svg", "b/dup.pdf", "a/dup.pdf"].map(PathBuf::from))
            .supporting(["png", "svg", "pdf"])
    }

    #[test]
    fn test_locate() {
        let index = index();
        let found = |from: &str, target: &str| index.locate(Path::new(from), target).source().map(Path::to_path_buf);
        assert_eq!(found("", "img/cat.png"), Some("img/cat.png".into()));
        assert_eq!(found("Projects", "diagram.svg"), Some("Projects/diagram.svg".into()));
        assert_eq!(found("Projects", "../IMG/Cat.PNG"), Some("img/cat.png".into()));
        assert_eq!(index.locate(Path::new("Daily"), "cat.png"), Located::Found(Path::new("img/cat.png")));
        assert_eq!(index.locate(Path::new(""), "b/dup.pdf"), Located::Found(Path::new("b/dup.pdf")));
        assert_eq!(index.locate(Path::new(""), "img/dog.png"), Located::Missing);
    }

    #[test]
    fn test_shared_file_name_is_ambiguous() {
        let index = index();
        assert_eq!(index.locate(Path::new(""), "dup.pdf"), Located::Ambiguous {
            chosen: Path::new("a/dup.pdf"),
            candidates: 2,
        });
    }

    #[test]
    fn test_unsupported_extension() {
        let index = AssetIndex::build([PathBuf::from("img/cat.png")]).supporting(["png"]);
        assert_eq!(index.locate(Path::new(""), "audio/song.mp3"), Located::Unsupported);
        let any = AssetIndex::build([PathBuf::from("audio/song.mp3")]);
        assert_eq!(any.locate(Path::new(""), "audio/song.mp3"), Located::Found(Path::new("audio/song.mp3")));
    }

    #[test]
    fn test_resolve_assets() {
        let index = index();
        let resolver = AssetResolver::new(&index, Path::new("assets"));
        let note = Note::parse("Projects/Alpha.md", b"").unwrap();
        let body = "![[file:img/cat.png]] [[file:diagram.svg][Diagram]] [[file:img/cat.png]]\n\
                    [[file:img/dog.png]] [[id:abc][Known]] [[Beta]]\n";
        let (out, actions, warnings) = resolver.resolve_assets(&note, Path::new("Projects/Alpha.org"), body);
        assert_eq!(
            out,
            "[[file:../assets/img/cat.png]] [[file:../assets/Projects/diagram.svg][Diagram]] [[file:../assets/img/cat.png]]\n\
             /img/dog.png/ (unresolved) [[id:abc][Known]] [[Beta]]\n"
        );
        assert_eq!(actions, vec![
            CopyAction {
                source: "img/cat.png".into(),
                destination: "assets/img/cat.png".into(),
            },
            CopyAction {
                source: "Projects/diagram.svg".into(),
                destination: "assets/Projects/diagram.svg".into(),
            },
        ]);
        assert_eq!(warnings, vec![Warning::new("Projects/Alpha.md", "img/dog.png", WarningKind::MissingAsset)]);
    }

    #[test]
    fn test_unsupported_and_ambiguous_warnings() {
        let index = index();
        let resolver = AssetResolver::new(&index, Path::new("assets"));
        let note = Note::parse("Alpha.md", b"").unwrap();
        let (out, actions, warnings) =
            resolver.resolve_assets(&note, Path::new("Alpha.org"), "[[file:song.mp3]] [[file:dup.pdf]]\n");
        assert_eq!(out, "/song.mp3/ (unresolved) [[file:assets/a/dup.pdf]]\n");
        assert_eq!(actions.len(), 1);
        assert_eq!(warnings, vec![
            Warning::new("Alpha.md", "song.mp3", WarningKind::UnsupportedAsset),
            Warning::new("Alpha.md", "dup.pdf", WarningKind::AmbiguousAsset {
                chosen: "a/dup.pdf".into(),
                candidates: 2,
            }),
        ]);
    }

    #[test]
    fn test_preview() {
        let index = index();
        let resolver = AssetResolver::new(&index, Path::new("assets"));
        let note = Note::parse("Alpha.md", b"![[img/cat.png]] ![](missing.png) ![[img/cat.png]]").unwrap();
        let (context, actions, warnings) = resolver.preview(&note);
        assert_eq!(context, vec![
            "asset img/cat.png => assets/img/cat.png",
            "asset missing.png => ?",
            "asset img/cat.png => assets/img/cat.png",
        ]);
        assert_eq!(actions, vec![CopyAction {
            source: "img/cat.png".into(),
            destination: "assets/img/cat.png".into(),
        }]);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_copy_is_idempotent() {
        let vault = Vault::new(Arc::new(MockBackend::with_files([("img/cat.png", b"meow".to_vec())])), WalkRules::default());
        let output = MockBackend::default();
        let action = CopyAction {
            source: "img/cat.png".into(),
            destination: "assets/img/cat.png".into(),
        };

        let copier = AssetCopier::new();
        assert_eq!(copier.copy(&vault, &output, &action).await.unwrap(), CopyStatus::Copied);
        assert_eq!(copier.copy(&vault, &output, &action).await.unwrap(), CopyStatus::AlreadyHandled);
        assert_eq!(output.contents("assets/img/cat.png").await.as_deref(), Some("meow"));

        let next_run = AssetCopier::new();
        assert_eq!(next_run.copy(&vault, &output, &action).await.unwrap(), CopyStatus::Unchanged);
        assert_eq!(output.write_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_copy_is_retried_by_next_note() {
        let source = Arc::new(MockBackend::default());
        let vault = Vault::new(source.clone(), WalkRules::default());
        let output = MockBackend::default();
        let action = CopyAction {
            source: "gone.png".into(),
            destination: "assets/gone.png".into(),
        };

        let copier = AssetCopier::new();
        assert!(copier.copy(&vault, &output, &action).await.is_err());
        assert!(copier.copy(&vault, &output, &action).await.is_err());
        assert_eq!(output.contents("assets/gone.png").await, None);

        source.write(Path::new("gone.png"), b"back").await.unwrap();
        assert_eq!(copier.copy(&vault, &output, &action).await.unwrap(), CopyStatus::Copied);
        assert_eq!(output.contents("assets/gone.png").await.as_deref(), Some("back"));
    }
}
