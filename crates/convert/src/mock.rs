//! In-process stand-in for pandoc, for tests.

use crate::error::{ErrorKind, Result};
use crate::{ConversionOptions, Converter};
use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};

static WIKILINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!?\[\[([^\[\]|]+?)(?:\|([^\[\]]*))?\]\]").unwrap());
static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!?\[([^\[\]]*)\]\(([^()\s]+)\)").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^(#{1,6}) ").unwrap());

/// Deterministic Markdown → Org converter covering headings and links,
/// which is all the pipeline looks at.
///
/// Counts invocations so tests can assert on cache behaviour, and can be
/// told to reject particular inputs or to fail as if the binary were
/// missing.
#[derive(Default)]
pub struct MockConverter {
    calls: AtomicUsize,
    transient_failures: AtomicUsize,
    missing: AtomicBool,
    reject: Mutex<Vec<String>>,
}

impl MockConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `convert` calls so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next `count` conversions with `NotFound`.
    pub fn fail_transiently(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every call, including `verify`, with `NotFound`.
    pub fn set_missing(&self, missing: bool) {
        self.missing.store(missing, Ordering::SeqCst);
    }

    /// Reject any source containing `needle`.
    pub fn reject_containing(&self, needle: impl Into<String>) {
        if let Ok(mut reject) = self.reject.lock() {
            reject.push(needle.into());
        }
    }

    fn transform(source: &str) -> String {
        let text = HEADING.replace_all(source, |caps: &regex::Captures| format!("{} ", "*".repeat(caps[1].len())));
        let text = WIKILINK.replace_all(&text, |caps: &regex::Captures| match caps.get(2) {
            Some(label) => format!("[[{}][{}]]", &caps[1], label.as_str()),
            None => format!("[[{}]]", &caps[1]),
        });
        let text = MARKDOWN_LINK.replace_all(&text, |caps: &regex::Captures| match &caps[1] {
            "" => format!("[[file:{}]]", &caps[2]),
            label => format!("[[file:{}][{}]]", &caps[2], label),
        });
        text.into_owned()
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn verify(&self, _options: &ConversionOptions) -> Result<()> {
        if self.missing.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::NotFound("mock".to_string()));
        }
        Ok(())
    }

    async fn convert(&self, source: &str, _options: &ConversionOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing.load(Ordering::SeqCst) {
            exn::bail!(ErrorKind::NotFound("mock".to_string()));
        }
        let transient = self.transient_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if transient.is_ok() {
            exn::bail!(ErrorKind::NotFound("mock".to_string()));
        }
        let rejected = self.reject.lock().map(|r| r.iter().any(|needle| source.contains(needle.as_str()))).unwrap_or(false);
        if rejected {
            exn::bail!(ErrorKind::Rejected {
                code: Some(64),
                stderr: "rejected by mock".to_string(),
            });
        }
        Ok(Self::transform(source))
    }
}
