//! The two-pass conversion of a vault.
//!
//! The first pass reads every note, assigns identifiers and output paths, and
//! persists the identifier registry. Only then does the second pass start
//! converting, so every link can be resolved to an identifier whichever order
//! notes finish in.
//!
//! The primary entry point is [`convert_vault`], which streams
//! [`PipelineEvent`]s; [`run`] drains that stream into a [`Report`](crate::Report).

pub mod error;
mod note;
mod prepare;
mod stream;

pub use self::stream::{PipelineEvent, convert_vault, run};
