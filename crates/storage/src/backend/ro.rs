//! Read-only storage decorator.
//!
//! Every mutation becomes a logged no-op that reports success, and is
//! counted. The vault is always read through one; a dry run writes its output
//! tree through one too.

use crate::backend::FileInfoStream;
use crate::error::Result;
use crate::{BackendHandle, FileInfo, StorageBackend};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
    dropped: Arc<AtomicUsize>,
}

impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self {
            inner,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Writes and deletes dropped so far, across every clone.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.inner.stat(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::info!(backend = self.inner.name(), path = %path.display(), bytes = data.len(), "Would write");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::info!(backend = self.inner.name(), path = %path.display(), "Would delete");
        Ok(())
    }
}
