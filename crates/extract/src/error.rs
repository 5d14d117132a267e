//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every kind here is a property of the note's bytes, so none of them are
/// worth retrying: fix the note in the vault instead.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The note is not valid UTF-8.
    #[display("note is not valid UTF-8: {}", _0.display())]
    NotUtf8(#[error(not(source))] PathBuf),
    /// The frontmatter block could not be parsed as a YAML mapping.
    #[display("malformed frontmatter: {reason}")]
    MalformedFrontmatter {
        /// What the YAML parser objected to.
        reason: String,
    },
}
