//! Cache store failures.
//!
//! The pipeline never stops for these: a failed lookup is treated as a miss
//! and a failed store only loses the shortcut for the next run.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("cache database error")]
    Database,
    #[display("could not migrate the cache schema")]
    Migration,
    /// A stored row no longer parses, e.g. a truncated fingerprint.
    #[display("corrupt cache row: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}
