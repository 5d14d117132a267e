//! Durable state shared between pipeline runs.
//!
//! Nothing in here is the source of truth (the vault is), but losing it has
//! a cost: converted output has to be regenerated by the external converter,
//! and note identifiers would change, breaking every link an Org-roam
//! database holds to them.
//!
//! # Architecture
//! The [`CacheStore`] trait is what the pipeline talks to. It covers three
//! tables:
//! - **Conversions**: raw converter output keyed by [`Fingerprint`]. Written
//!   once, never updated, optionally pruned.
//! - **Identifiers**: the persisted identifier registry, vault-relative note
//!   path → stable identifier.
//! - **Records**: per identifier, the fingerprint and resolution context the
//!   note's output was last written with.
//!
//! [`Repository`] implements it on SQLite; [`MemoryStore`] implements it in
//! memory for tests and cache-less runs.

mod db;
pub mod error;
mod memory;
mod models;
mod repo;

use crate::error::Result;
use async_trait::async_trait;
use orgify_extract::Fingerprint;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub use crate::db::{Database, Location, Stats};
pub use crate::memory::MemoryStore;
pub use crate::models::NoteRecord;
pub use crate::repo::Repository;

pub type StoreHandle = Arc<dyn CacheStore>;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Raw converter output for a fingerprint, if it was stored before.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<String>>;

    /// Store raw converter output. Storing a fingerprint twice keeps the
    /// first entry.
    async fn store(&self, fingerprint: &Fingerprint, output: &str) -> Result<()>;

    /// Delete conversions whose fingerprint isn't in `live`; returns how many.
    async fn prune(&self, live: &BTreeSet<Fingerprint>) -> Result<u64>;

    /// Every persisted note key → identifier mapping.
    async fn load_identifiers(&self) -> Result<BTreeMap<String, String>>;

    /// Persist new or changed mappings, all or nothing.
    async fn save_identifiers(&self, changed: &BTreeMap<String, String>) -> Result<()>;

    /// Forget every identifier (and the records keyed by them); returns how
    /// many identifiers were removed.
    async fn reset_identifiers(&self) -> Result<u64>;

    async fn last_record(&self, identifier: &str) -> Result<Option<NoteRecord>>;

    async fn record(&self, identifier: &str, record: &NoteRecord) -> Result<()>;
}
