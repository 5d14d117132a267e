//! The conversion pipeline.
//!
//! A run is two passes over the vault separated by a barrier:
//!
//! 1. every note is read, parsed and given a stable identifier, and the
//!    identifier registry is persisted;
//! 2. every note is fingerprinted, converted (or taken from the cache), given
//!    an Org-roam property drawer, and has its links and assets rewritten
//!    before being written to the output tree.
//!
//! [`convert_vault`] streams [`PipelineEvent`]s as this happens; [`run`]
//! drives the stream to completion and returns the final [`Report`].

mod assets;
pub mod error;
mod fingerprint;
mod links;
pub mod maintenance;
pub mod pipeline;
mod properties;
mod registry;
mod report;
mod template;
mod vault;

pub use crate::assets::{AssetCopier, AssetIndex, AssetResolver, CopyAction, CopyStatus};
pub use crate::fingerprint::FingerprintStore;
pub use crate::links::{LinkResolver, Lookup, NoteIndex};
pub use crate::pipeline::{PipelineEvent, convert_vault, run};
pub use crate::properties::{PropertyBlock, transform};
pub use crate::registry::{Assignment, IdentifierRegistry};
pub use crate::report::{NoteResult, Outcome, Report, Warning, WarningKind};
pub use crate::template::{DEFAULT_TEMPLATE, PathGenerator};
pub use crate::vault::{Vault, WalkRules};
use orgify_cache::StoreHandle;
use orgify_convert::{ConversionOptions, ConverterHandle};
use orgify_storage::BackendHandle;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Upper bound on notes in flight at once, whatever the configuration says.
pub const MAX_PROCESS_CONCURRENCY: usize = 100;

/// Everything a run needs, passed in rather than reached for.
pub struct Context {
    /// The vault being converted. Only ever read.
    pub vault: BackendHandle,
    /// The output tree. Wrap it in a `ReadOnlyBackend` for dry runs.
    pub output: BackendHandle,
    pub store: StoreHandle,
    pub converter: ConverterHandle,
    pub options: ConversionOptions,
    pub template: PathGenerator,
    pub settings: Settings,
    pub cancel: CancellationToken,
}

/// Pipeline tuning that doesn't belong to any one component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub concurrency: usize,
    /// Rewrite notes even when their output is up to date.
    pub force: bool,
    /// Output directory that assets are copied into.
    pub assets_dir: PathBuf,
    pub section_tags: bool,
    pub walk: WalkRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            force: false,
            assets_dir: PathBuf::from("assets"),
            section_tags: false,
            walk: WalkRules::default(),
        }
    }
}

impl Settings {
    /// Configured concurrency, clamped to `1..=MAX_PROCESS_CONCURRENCY`.
    pub fn concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_PROCESS_CONCURRENCY)
    }
}
