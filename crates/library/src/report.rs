//! Per-note results and the batch report.

use derive_more::Display;
use std::fmt;
use std::path::PathBuf;

/// How a note left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Converted by the external converter and written.
    Written,
    /// Converter output came from the cache, then written.
    CacheHitWritten,
    /// Output already up to date; nothing written.
    SkippedUnchanged,
    Failed(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Something worth fixing in the vault that didn't stop the note.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum WarningKind {
    #[display("ambiguous link, {candidates} notes match; chose {}", chosen.display())]
    AmbiguousLink { chosen: PathBuf, candidates: usize },
    #[display("unresolved link")]
    UnresolvedLink,
    #[display("missing asset")]
    MissingAsset,
    #[display("ambiguous asset name, {candidates} files match; chose {}", chosen.display())]
    AmbiguousAsset { chosen: PathBuf, candidates: usize },
    /// Exists or not, the file type isn't one the vault walk copies.
    #[display("unsupported asset type")]
    UnsupportedAsset,
    #[display("duplicate metadata key, last value kept")]
    DuplicateKey,
    #[display("identifier already used by {owner}; assigned a new one")]
    DuplicateIdentifier { owner: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{}: {kind}: {reference}", note.display())]
pub struct Warning {
    pub note: PathBuf,
    /// The reference, key or identifier as written in the note.
    pub reference: String,
    pub kind: WarningKind,
}

impl Warning {
    pub fn new(note: impl Into<PathBuf>, reference: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            note: note.into(),
            reference: reference.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteResult {
    pub path: PathBuf,
    pub outcome: Outcome,
    pub warnings: Vec<Warning>,
}

impl NoteResult {
    pub fn failed(path: impl Into<PathBuf>, reason: impl Into<String>, warnings: Vec<Warning>) -> Self {
        let path = path.into();
        let reason = reason.into();
        tracing::error!(note = %path.display(), %reason, "Note failed");
        Self {
            path,
            outcome: Outcome::Failed(reason),
            warnings,
        }
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub written: usize,
    pub cache_hits: usize,
    pub skipped: usize,
    pub failures: Vec<(PathBuf, String)>,
    pub warnings: Vec<Warning>,
    /// The run was interrupted before every note was processed.
    pub cancelled: bool,
}

impl Report {
    pub fn add(&mut self, result: NoteResult) {
        match result.outcome {
            Outcome::Written => self.written += 1,
            Outcome::CacheHitWritten => self.cache_hits += 1,
            Outcome::SkippedUnchanged => self.skipped += 1,
            Outcome::Failed(reason) => self.failures.push((result.path, reason)),
        }
        for warning in &result.warnings {
            tracing::warn!(note = %warning.note.display(), reference = %warning.reference, "{}", warning.kind);
        }
        self.warnings.extend(result.warnings);
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.written + self.cache_hits + self.skipped + self.failed()
    }

    /// No failures and not cancelled. Warnings don't count.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} notes: {} written, {} written from cache, {} unchanged, {} failed",
            self.total(),
            self.written,
            self.cache_hits,
            self.skipped,
            self.failed()
        )?;
        if self.cancelled {
            writeln!(f, "run was cancelled before every note was processed")?;
        }
        if !self.warnings.is_empty() {
            writeln!(f, "\nwarnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  {warning}")?;
            }
        }
        if !self.failures.is_empty() {
            writeln!(f, "\nfailures:")?;
            for (path, reason) in &self.failures {
                writeln!(f, "  {}: {reason}", path.display())?;
            }
        }
        Ok(())
    }
}
