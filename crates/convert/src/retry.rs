use crate::error::Result;
use crate::{ConversionOptions, Converter, ConverterHandle};
use async_trait::async_trait;

/// Retries a converter once when the failure looks transient and
/// [`ConversionOptions::retry`] is set.
///
/// Rejected input and timeouts are never retried; the same input would only
/// fail the same way again.
pub struct Retrying {
    inner: ConverterHandle,
}

impl Retrying {
    pub fn new(inner: ConverterHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Converter for Retrying {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn verify(&self, options: &ConversionOptions) -> Result<()> {
        self.inner.verify(options).await
    }

    async fn convert(&self, source: &str, options: &ConversionOptions) -> Result<String> {
        let attempts = options.attempts();
        let mut attempt = 1;
        loop {
            match self.inner.convert(source, options).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::warn!(converter = self.inner.name(), attempt, error = ?err, "Conversion failed; retrying");
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }
}
