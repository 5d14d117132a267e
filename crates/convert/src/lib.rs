//! The external document converter, behind the [`Converter`] trait.
//!
//! The converter is treated as an opaque, deterministic function of the
//! source text and [`ConversionOptions`]. [`Pandoc`] runs the real thing as
//! a child process; [`Retrying`] adds the one-retry policy on top of any
//! converter.

pub mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod options;
mod pandoc;
mod retry;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(any(test, feature = "mock"))]
pub use crate::mock::MockConverter;
pub use crate::options::ConversionOptions;
pub use crate::pandoc::Pandoc;
pub use crate::retry::Retrying;

pub type ConverterHandle = Arc<dyn Converter>;

#[async_trait]
pub trait Converter: Send + Sync {
    /// Name of the converter, for logging.
    fn name(&self) -> &str;

    /// Check the converter can handle `options` at all, before any note is
    /// attempted. Failures here are fatal.
    async fn verify(&self, options: &ConversionOptions) -> Result<()>;

    /// Convert one document.
    async fn convert(&self, source: &str, options: &ConversionOptions) -> Result<String>;
}
