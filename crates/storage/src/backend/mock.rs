//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::{FileInfo, StorageBackend};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Files are stored in a `BTreeMap` behind a [`RwLock`], so listings come
/// back in path order. Writes are counted, and can be switched to fail with
/// [`PermissionDenied`](ErrorKind::PermissionDenied) to simulate an
/// unwritable output tree.
///
/// ```
/// use orgify_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let vault = MockBackend::with_files([
///     ("Projects/Alpha.md", "# Alpha\n\nSee [[Beta]]."),
/// ]);
/// assert!(vault.exists(Path::new("Projects/Alpha.md")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, (UtcDateTime, Vec<u8>)>>,
    writes: AtomicUsize,
    deny_writes: AtomicBool,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation; broken test setup should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        let now = UtcDateTime::now();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            writes: AtomicUsize::new(0),
            deny_writes: AtomicBool::new(false),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make every subsequent write and delete fail with `PermissionDenied`.
    pub fn deny_writes(&self, deny: bool) {
        self.deny_writes.store(deny, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of a file's contents as UTF-8, for assertions.
    pub async fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        let guard = self.storage.read().await;
        guard.get(path.as_ref()).map(|(_, data)| String::from_utf8_lossy(data).into_owned())
    }

    /// All stored paths, in order.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.storage.read().await.keys().cloned().collect()
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        if self.deny_writes.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::PermissionDenied(path.to_path_buf()));
        }
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            // Snapshot under the read lock; never hold it across a yield.
            let entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| validated_prefix.as_ref().is_none_or(|pfx| path.starts_with(pfx)))
                    .map(|(path, (inserted, data))| FileInfo::new(path.clone(), data.len() as u64, *inserted))
                    .collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (_inserted, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(data.clone())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.check_writable(&path)?;
        self.storage.write().await.insert(path, (UtcDateTime::now(), data.to_vec()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.check_writable(&path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (inserted, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("Inbox.org"), b"hello").await.unwrap();
        assert_eq!(backend.read(Path::new("Inbox.org")).await.unwrap(), b"hello");
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.md")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_deny_writes() {
        let backend = MockBackend::default();
        backend.deny_writes(true);
        let err = backend.write(Path::new("Note.org"), b"x").await.unwrap_err();
        assert!(err.is_unwritable());
        backend.deny_writes(false);
        backend.write(Path::new("Note.org"), b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_with_prefix_in_order() {
        let backend = MockBackend::with_files([
            ("Projects/B.md", "b"),
            ("Projects/A.md", "a"),
            ("Inbox.md", "i"),
        ]);
        let files = backend.list(Some(Path::new("Projects"))).await.unwrap();
        let paths: Vec<_> = files.into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec![PathBuf::from("Projects/A.md"), PathBuf::from("Projects/B.md")]);
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", "bad")]);
    }
}
