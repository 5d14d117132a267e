//! CLI Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// What stopped a command before it could produce a report.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not open the cache")]
    Cache,
    #[display("could not open {_0}")]
    Storage(#[error(not(source))] &'static str),
    #[display("converter unavailable")]
    Converter,
    #[display("conversion aborted")]
    Pipeline,
    #[display("maintenance failed")]
    Maintenance,
}
