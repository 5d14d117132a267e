//! Errors raised while reading the vault or writing the output tree.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// The pipeline decides per kind whether a failure stays with one note or
/// ends the run; see [`ErrorKind::is_unwritable`].
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Absolute, or climbs out of the backend root.
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// Not a note or asset extension; see `ExtensionFilter`.
    #[display("filtered path: {}", _0.display())]
    FilteredPath(#[error(not(source))] PathBuf),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if the destination can never be written to, no matter
    /// which file is attempted next.
    pub fn is_unwritable(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}
