//! Local filesystem storage backend.
//!
//! Files are accessed with `tokio::fs`. Writes go to a hidden sibling file
//! first and are renamed into place, so an interrupted run never leaves a
//! truncated Org file where a complete one used to be.
//!
//! Vaults tend to carry large directories nobody wants converted (`.git`,
//! `.obsidian`, `.trash`); [`LocalBackend::pruning`] keeps the walk out of
//! them entirely.

use crate::backend::FileInfoStream;
use crate::error::ErrorKind;
use crate::{FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::ffi::OsString;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

/// Suffix of in-flight writes; the listing skips these.
const PARTIAL_SUFFIX: &str = ".orgify-partial";

enum WalkEntry {
    File(FileInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// ```no_run
/// use orgify_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let vault = LocalBackend::new("vault", "/home/me/Notes")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
    pruned: Vec<OsString>,
}
impl LocalBackend {
    /// Create a new local filesystem backend rooted at an absolute path.
    ///
    /// The root directory is created if it doesn't exist yet.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Only happens once per run; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self {
            name: name.into(),
            root,
            pruned: Vec::new(),
        })
    }

    /// Never descend into directories with these names, at any depth.
    ///
    /// Only listing is affected; a pruned file can still be read by path.
    pub fn pruning<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.pruned.extend(names.into_iter().map(|n| OsString::from(n.as_ref())));
        self
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?;
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    fn partial_path(absolute: &Path) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(absolute.file_name().unwrap_or_default());
        name.push(PARTIAL_SUFFIX);
        absolute.with_file_name(name)
    }

    /// Classifies one directory entry; errors can't be `?`-ed inside `stream!`.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if metadata.is_dir() {
            if self.pruned.iter().any(|name| *name == entry.file_name()) {
                tracing::trace!(backend = %self.name, path = %relative.display(), "Pruned directory");
                return Ok(WalkEntry::Skip);
            }
            let related = prefix.is_none_or(|pfx| relative.starts_with(pfx) || pfx.starts_with(&relative));
            return Ok(if related { WalkEntry::Descend(path) } else { WalkEntry::Skip });
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if relative.as_os_str().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        // Walk from the parent of the prefix so a prefix naming a file (or
        // nothing yet) doesn't error.
        let start_dir = validated_prefix
            .as_ref()
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A missing directory lists as empty.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        let partial = Self::partial_path(&abs_path);
        fs::write(&partial, data).await.map_err(|e| Self::map_io_error(e, path))?;
        if let Err(e) = fs::rename(&partial, &abs_path).await {
            let _ = fs::remove_file(&partial).await;
            exn::bail!(Self::map_io_error(e, path));
        }
        tracing::trace!(backend = %self.name, path = %path.display(), bytes = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::metadata(&validate_path(path)?, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn setup() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("test", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("vault", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("vault", "relative/path").is_err());
        assert!(LocalBackend::new("vault", "./relative").is_err());
    }

    #[test]
    fn test_absolute_and_relative_paths() {
        let (dir, backend) = setup();
        let expected = dir.path().join("Projects/Alpha.md");
        assert_eq!(backend.absolute_path(Path::new("Projects/Alpha.md")).unwrap(), expected);
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
        assert_eq!(backend.relative_path(&expected).unwrap(), Path::new("Projects/Alpha.md"));
        assert!(backend.relative_path(Path::new("/other/file.md")).is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_dir, backend) = setup();
        backend.write(Path::new("Inbox.org"), b"* Inbox").await.unwrap();
        assert_eq!(backend.read(Path::new("Inbox.org")).await.unwrap(), b"* Inbox");
    }

    #[tokio::test]
    async fn test_write_replaces_and_leaves_no_partial_file() {
        let (dir, backend) = setup();
        backend.write(Path::new("a/b/Note.org"), b"first").await.unwrap();
        backend.write(Path::new("a/b/Note.org"), b"second").await.unwrap();
        assert_eq!(backend.read(Path::new("a/b/Note.org")).await.unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(dir.path().join("a/b")).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(names.len(), 1);
        assert_eq!(backend.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (_dir, backend) = setup();
        assert!(!backend.exists(Path::new("Note.md")).await.unwrap());
        backend.write(Path::new("Note.md"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("Note.md")).await.unwrap());
        backend.delete(Path::new("Note.md")).await.unwrap();
        assert!(!backend.exists(Path::new("Note.md")).await.unwrap());
        let err = backend.delete(Path::new("Note.md")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stat() {
        let (_dir, backend) = setup();
        backend.write(Path::new("img/diagram.png"), b"\x89PNG").await.unwrap();
        let info = backend.stat(Path::new("img/diagram.png")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("img/diagram.png"));
        assert_eq!(info.size, 4);
        let err = backend.stat(Path::new("img")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_with_prefix_is_component_based() {
        let (_dir, backend) = setup();
        backend.write(Path::new("Projects/Alpha.md"), b"a").await.unwrap();
        backend.write(Path::new("Projects/Sub/Beta.md"), b"b").await.unwrap();
        backend.write(Path::new("ProjectsArchive/Gamma.md"), b"c").await.unwrap();
        assert_eq!(backend.list(None).await.unwrap().len(), 3);
        let mut paths: Vec<_> =
            backend.list(Some(Path::new("Projects"))).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("Projects/Alpha.md"), PathBuf::from("Projects/Sub/Beta.md")]);
        assert!(backend.list(Some(Path::new("nonexistent"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pruned_directories_are_not_walked() {
        let (_dir, backend) = setup();
        let backend = backend.pruning([".obsidian", ".git"]);
        backend.write(Path::new("Inbox.md"), b"a").await.unwrap();
        backend.write(Path::new(".obsidian/workspace.json"), b"{}").await.unwrap();
        backend.write(Path::new("Projects/.git/HEAD"), b"ref").await.unwrap();
        backend.write(Path::new("Projects/Alpha.md"), b"b").await.unwrap();

        let mut paths: Vec<_> = backend.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("Inbox.md"), PathBuf::from("Projects/Alpha.md")]);
        assert!(backend.exists(Path::new(".obsidian/workspace.json")).await.unwrap());
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_dir, backend) = setup();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape.org"), b"data").await.is_err());
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
