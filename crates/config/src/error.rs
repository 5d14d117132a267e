//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every one of these is fixed by editing the configuration, so nothing here
/// is retryable.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration sources couldn't be read or merged.
    #[display("could not load configuration")]
    Load,
    /// An explicitly requested config file doesn't exist.
    #[display("config file not found: {}", _0.display())]
    FileNotFound(#[error(not(source))] PathBuf),
    /// The config file extension isn't one of `toml`, `yaml`, `yml` or `json`.
    #[display("unsupported config file format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// A value was loaded but doesn't make sense.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}
