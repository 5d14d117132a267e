//! Storage models.

use std::path::{Path, PathBuf};
use time::UtcDateTime;

/// File metadata returned by storage backends.
///
/// Used both for vault discovery (notes and assets) and for checking what
/// already exists in the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: UtcDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<UtcDateTime>) -> Self {
        Self {
            path: path.into(),
            size,
            modified: modified.into(),
        }
    }

    /// Lowercased file extension, if any (`Note.MD` → `md`).
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_lowercased() {
        let info = FileInfo::new("Daily/2024-01-01.MD", 12, UtcDateTime::now());
        assert_eq!(info.extension().as_deref(), Some("md"));
        let info = FileInfo::new("README", 12, UtcDateTime::now());
        assert_eq!(info.extension(), None);
    }
}
