//! Why a note, or the whole batch, failed.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies a pipeline failure.
///
/// ### Fatal Errors
/// Stop the whole batch; see [`ErrorKind::is_fatal`].
/// - [`ErrorKind::Discovery`]
/// - [`ErrorKind::ConverterUnavailable`]
/// - [`ErrorKind::Unwritable`]
/// - [`ErrorKind::Registry`]
///
/// ### Note Errors
/// Fail one note, which is then reported and skipped.
/// - [`ErrorKind::Unreadable`]
/// - [`ErrorKind::Malformed`]
/// - [`ErrorKind::OutputPath`]
/// - [`ErrorKind::OutputCollision`]
/// - [`ErrorKind::Convert`]
/// - [`ErrorKind::Asset`]
/// - [`ErrorKind::Write`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The vault could not be listed.
    #[display("could not list the vault")]
    Discovery,
    /// The converter is missing or can't handle the configured formats.
    #[display("converter unavailable")]
    ConverterUnavailable,
    /// The output tree refused a write that no other file would get past.
    #[display("output tree is not writable: {}", _0.display())]
    Unwritable(#[error(not(source))] PathBuf),
    /// Identifiers could not be loaded or persisted.
    #[display("identifier registry unavailable")]
    Registry,
    #[display("unreadable note: {_0}")]
    Unreadable(#[error(not(source))] String),
    #[display("malformed note: {_0}")]
    Malformed(#[error(not(source))] String),
    /// The output path template could not be rendered for this note.
    #[display("no output path: {_0}")]
    OutputPath(#[error(not(source))] String),
    /// Another note already renders to the same output path.
    #[display("output path {} is already produced by {}", path.display(), owner.display())]
    OutputCollision { path: PathBuf, owner: PathBuf },
    #[display("{_0}")]
    Convert(#[error(not(source))] String),
    #[display("could not copy asset: {_0}")]
    Asset(#[error(not(source))] String),
    #[display("could not write output: {_0}")]
    Write(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if the batch must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Discovery | Self::ConverterUnavailable | Self::Unwritable(_) | Self::Registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Discovery, true)]
    #[case(ErrorKind::ConverterUnavailable, true)]
    #[case(ErrorKind::Unwritable("out/Alpha.org".into()), true)]
    #[case(ErrorKind::Registry, true)]
    #[case(ErrorKind::Malformed("bad frontmatter".into()), false)]
    #[case(ErrorKind::Convert("converter rejected input".into()), false)]
    #[case(ErrorKind::OutputCollision { path: "a.org".into(), owner: "A.md".into() }, false)]
    fn test_is_fatal(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_fatal(), expected);
    }

    #[test]
    fn test_collision_display() {
        let kind = ErrorKind::OutputCollision {
            path: "notes/alpha.org".into(),
            owner: "Alpha.md".into(),
        };
        assert_eq!(kind.to_string(), "output path notes/alpha.org is already produced by Alpha.md");
    }
}
