//! Ways a converter invocation can fail.

use derive_more::{Display, Error};
use std::time::Duration;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Split along the line the pipeline cares about: [`is_fatal()`](Self::is_fatal)
/// kinds stop the whole batch, everything else only fails the note at hand.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The converter binary could not be found or started.
    #[display("converter not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The converter cannot read or produce the configured format.
    #[display("converter does not support format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The converter exited unsuccessfully for this input.
    #[display("converter rejected input (exit code {}): {stderr}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Rejected { code: Option<i32>, stderr: String },
    /// The converter didn't finish within the configured time.
    #[display("converter timed out after {}s", _0.as_secs_f32())]
    Timeout(#[error(not(source))] Duration),
    /// The converter produced output that isn't UTF-8.
    #[display("converter output is not valid UTF-8")]
    InvalidOutput,
    /// Talking to the converter process failed part way.
    #[display("converter I/O error: {_0}")]
    Io(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if no note can be converted while this persists, so
    /// the batch should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::UnsupportedFormat(_))
    }

    /// Returns `true` if retrying might succeed. Rejected input never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotFound("pandoc".into()), true, true)]
    #[case(ErrorKind::UnsupportedFormat("org".into()), true, false)]
    #[case(ErrorKind::Rejected { code: Some(64), stderr: String::new() }, false, false)]
    #[case(ErrorKind::Timeout(Duration::from_secs(30)), false, false)]
    #[case(ErrorKind::InvalidOutput, false, false)]
    #[case(ErrorKind::Io("broken pipe".into()), false, true)]
    fn test_classification(#[case] kind: ErrorKind, #[case] fatal: bool, #[case] retryable: bool) {
        assert_eq!(kind.is_fatal(), fatal);
        assert_eq!(kind.is_retryable(), retryable);
    }

    #[test]
    fn test_display() {
        let kind = ErrorKind::Rejected { code: Some(64), stderr: "unexpected end".into() };
        assert_eq!(kind.to_string(), "converter rejected input (exit code 64): unexpected end");
    }
}
