//! The read side of a run: which vault files are notes, which are assets,
//! and which are ignored altogether.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use orgify_storage::backend::{ExtensionFilter, StorageBackend};
use orgify_storage::{BackendHandle, FileInfo};
use std::path::{Component, Path};
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct WalkRules {
    pub note_extensions: Vec<String>,
    pub asset_extensions: Vec<String>,
    /// Skip notes in, or named like, `_meta` sections.
    pub skip_underscored: bool,
    /// Directory names ignored wherever they appear.
    pub exclude_dirs: Vec<String>,
}

impl Default for WalkRules {
    fn default() -> Self {
        Self {
            note_extensions: vec!["md".to_string()],
            asset_extensions: ["png", "jpg", "jpeg", "gif", "svg", "webp", "pdf"].into_iter().map(String::from).collect(),
            skip_underscored: true,
            exclude_dirs: vec![".obsidian".to_string(), ".trash".to_string()],
        }
    }
}

impl WalkRules {
    /// Whether any directory on the way to `path` is excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        directories(path).any(|name| self.exclude_dirs.iter().any(|excluded| excluded == name))
    }

    /// Notes named `_something`, or inside a `_something` directory, are
    /// vault metadata rather than content.
    pub fn is_meta_note(&self, path: &Path) -> bool {
        if !self.skip_underscored {
            return false;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        stem.starts_with('_') || directories(path).any(|name| name.starts_with('_'))
    }
}

fn directories(path: &Path) -> impl Iterator<Item = &str> {
    let parent = path.parent().unwrap_or(Path::new(""));
    parent.components().filter_map(|component| match component {
        Component::Normal(name) => name.to_str(),
        _ => None,
    })
}

/// `path` with `/` separators, whatever the platform.
pub(crate) fn slash_path(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// A vault seen through [`WalkRules`]: one view for notes and one for assets.
pub struct Vault {
    notes: ExtensionFilter,
    assets: ExtensionFilter,
    rules: WalkRules,
}

impl Vault {
    pub fn new(backend: BackendHandle, rules: WalkRules) -> Self {
        Self {
            notes: ExtensionFilter::new(Arc::clone(&backend), &rules.note_extensions),
            assets: ExtensionFilter::new(backend, &rules.asset_extensions),
            rules,
        }
    }

    pub fn rules(&self) -> &WalkRules {
        &self.rules
    }

    /// Every note in the vault, sorted by path.
    #[instrument(skip_all, fields(vault = self.notes.name()))]
    pub async fn list_notes(&self) -> Result<Vec<FileInfo>> {
        let mut notes = self.notes.list(None).await.or_raise(|| ErrorKind::Vault)?;
        notes.retain(|info| !self.rules.is_excluded(&info.path) && !self.rules.is_meta_note(&info.path));
        notes.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(count = notes.len(), "Listed notes");
        Ok(notes)
    }

    /// Every asset in the vault, sorted by path. Meta sections are not
    /// skipped: attachment folders are often named `_attachments`.
    #[instrument(skip_all, fields(vault = self.assets.name()))]
    pub async fn list_assets(&self) -> Result<Vec<FileInfo>> {
        let mut assets = self.assets.list(None).await.or_raise(|| ErrorKind::Vault)?;
        assets.retain(|info| !self.rules.is_excluded(&info.path));
        assets.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(count = assets.len(), "Listed assets");
        Ok(assets)
    }

    pub async fn read_note(&self, path: &Path) -> orgify_storage::error::Result<Vec<u8>> {
        self.notes.read(path).await
    }

    pub async fn read_asset(&self, path: &Path) -> orgify_storage::error::Result<Vec<u8>> {
        self.assets.read(path).await
    }
}
