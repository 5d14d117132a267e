//! Storage backend trait and implementations.
//!
//! The vault is only ever read through a [`StorageBackend`], and the output
//! tree only ever written through one. Decorators narrow what a backend can
//! see ([`ExtensionFilter`]) or what it is allowed to change
//! ([`ReadOnlyBackend`], used for dry runs).

mod filter;
mod local;
#[cfg(feature = "mock")]
mod mock;
mod ro;

pub use self::filter::ExtensionFilter;
pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
use crate::FileInfo;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use orgify_storage::{backend::StorageBackend, error::Result};
///
/// async fn read_note(backend: &dyn StorageBackend) -> Result<Option<Vec<u8>>> {
///     let path = Path::new("Projects/Alpha.md");
///     if backend.exists(path).await? {
///         Ok(Some(backend.read(path).await?))
///     } else {
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Collects [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// Yields results incrementally and in no particular order; callers that
    /// need a deterministic order sort the collected results. Prefix matching
    /// is component based, so `Projects` matches `Projects/Alpha.md` but not
    /// `ProjectsArchive/Beta.md`.
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use orgify_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("Daily")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, replacing anything already at `path`.
    ///
    /// Implementations create parent directories as needed, and must never
    /// leave a partially written file behind at `path`.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
