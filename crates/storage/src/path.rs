//! Path validation and relative path arithmetic.
//!
//! Every path handed to a backend is relative to that backend's root. Notes
//! link to each other and to assets with paths that may contain `..`, so
//! those are normalized here before anything touches the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path, normalizing `.` and `..` components.
///
/// Rejects paths that would escape the storage root, absolute Windows
/// prefixes, embedded null bytes, and paths that normalize to nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use orgify_storage::validate_path;
/// assert!(validate_path("Daily/2024-01-01.md").is_ok());
/// assert!(validate_path("Projects/../Inbox.md").is_ok());
/// assert!(validate_path("../outside.md").is_err());
/// assert_eq!(
///     validate_path("Projects/./Alpha/../Beta.md").unwrap(),
///     Path::new("Projects/Beta.md")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(original.to_path_buf());
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate in syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(invalid());
    }
    Ok(components.into_iter().collect())
}

/// Path of `to` as seen from inside the directory `from_dir`, both relative
/// to the same root.
///
/// ```
/// use std::path::Path;
/// use orgify_storage::relative_between;
/// assert_eq!(
///     relative_between(Path::new("Projects/Alpha"), Path::new("assets/img/a.png")),
///     Path::new("../../assets/img/a.png")
/// );
/// assert_eq!(relative_between(Path::new(""), Path::new("a.png")), Path::new("a.png"));
/// ```
pub fn relative_between(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from_dir.components().filter(|c| matches!(c, Component::Normal(_))).collect();
    let target: Vec<_> = to.components().filter(|c| matches!(c, Component::Normal(_))).collect();
    let shared = from.iter().zip(target.iter()).take_while(|(a, b)| a == b).count();
    let mut relative = PathBuf::new();
    for _ in shared..from.len() {
        relative.push("..");
    }
    for component in &target[shared..] {
        relative.push(component);
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("Daily/2024-01-01.md")).unwrap(), Path::new("Daily/2024-01-01.md"));
        assert_eq!(validate(Path::new("a/b/c/Note.md")).unwrap(), Path::new("a/b/c/Note.md"));
        assert_eq!(validate(Path::new("Inbox.md")).unwrap(), Path::new("Inbox.md"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/./b/./c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
        assert_eq!(validate(Path::new("Projects/")).unwrap(), Path::new("Projects"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
    }

    #[test]
    fn test_invalid_and_empty() {
        assert!(validate(Path::new("a\0b")).is_err());
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new("./.")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }

    #[test]
    fn test_relative_between_siblings() {
        assert_eq!(relative_between(Path::new("Projects"), Path::new("Projects/diagram.png")), Path::new("diagram.png"));
        assert_eq!(relative_between(Path::new("a/b"), Path::new("a/c/d.pdf")), Path::new("../c/d.pdf"));
    }

    #[test]
    fn test_relative_between_from_root() {
        assert_eq!(relative_between(Path::new(""), Path::new("assets/a.png")), Path::new("assets/a.png"));
    }
}
