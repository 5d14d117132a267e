//! Extension-filtered storage decorator.
//!
//! A vault holds notes and assets side by side. Wrapping the same vault
//! backend in two filters gives a notes-only view and an assets-only view.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::models::extension_of;
use crate::{BackendHandle, FileInfo, StorageBackend, error::Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::path::Path;

/// Storage backend restricted to a set of file extensions.
///
/// Extensions are compared case-insensitively and without the leading dot.
/// Operations on any other path return [`FilteredPath`](ErrorKind::FilteredPath);
/// listings silently leave them out.
#[derive(Clone)]
pub struct ExtensionFilter {
    inner: BackendHandle,
    extensions: BTreeSet<String>,
}
impl ExtensionFilter {
    pub fn new<S: AsRef<str>>(inner: BackendHandle, extensions: impl IntoIterator<Item = S>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { inner, extensions }
    }

    /// Whether this filter lets `path` through.
    pub fn allows(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn guard(&self, path: &Path) -> Result<()> {
        if !self.allows(path) {
            exn::bail!(ErrorKind::FilteredPath(path.to_path_buf()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ExtensionFilter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        Box::pin(self.inner.list_stream(prefix).filter(|item| {
            std::future::ready(match item {
                Ok(info) => self.allows(&info.path),
                Err(_) => true,
            })
        }))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.guard(path)?;
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.guard(path)?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.guard(path)?;
        self.inner.write(path, data).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.guard(path)?;
        self.inner.delete(path).await
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.guard(path)?;
        self.inner.stat(path).await
    }
}
