//! In-memory [`CacheStore`], for tests and runs with the cache disabled.

use crate::error::{ErrorKind, Result};
use crate::{CacheStore, NoteRecord};
use async_trait::async_trait;
use orgify_extract::Fingerprint;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    conversions: RwLock<HashMap<Fingerprint, String>>,
    identifiers: RwLock<BTreeMap<String, String>>,
    records: RwLock<HashMap<String, NoteRecord>>,
    stores: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversions stored so far.
    pub fn store_count(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    /// Number of conversions currently held.
    pub async fn len(&self) -> usize {
        self.conversions.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        Ok(self.conversions.read().await.get(fingerprint).cloned())
    }

    async fn store(&self, fingerprint: &Fingerprint, output: &str) -> Result<()> {
        let mut conversions = self.conversions.write().await;
        if !conversions.contains_key(fingerprint) {
            conversions.insert(fingerprint.clone(), output.to_string());
            self.stores.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn prune(&self, live: &BTreeSet<Fingerprint>) -> Result<u64> {
        let mut conversions = self.conversions.write().await;
        let before = conversions.len();
        conversions.retain(|fingerprint, _| live.contains(fingerprint));
        Ok((before - conversions.len()) as u64)
    }

    async fn load_identifiers(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.identifiers.read().await.clone())
    }

    async fn save_identifiers(&self, changed: &BTreeMap<String, String>) -> Result<()> {
        let mut identifiers = self.identifiers.write().await;
        let mut next = identifiers.clone();
        next.extend(changed.iter().map(|(k, v)| (k.clone(), v.clone())));
        let distinct: BTreeSet<&String> = next.values().collect();
        if distinct.len() != next.len() {
            exn::bail!(ErrorKind::Database);
        }
        *identifiers = next;
        Ok(())
    }

    async fn reset_identifiers(&self) -> Result<u64> {
        let mut identifiers = self.identifiers.write().await;
        let removed = identifiers.len() as u64;
        identifiers.clear();
        self.records.write().await.clear();
        Ok(removed)
    }

    async fn last_record(&self, identifier: &str) -> Result<Option<NoteRecord>> {
        Ok(self.records.read().await.get(identifier).cloned())
    }

    async fn record(&self, identifier: &str, record: &NoteRecord) -> Result<()> {
        self.records.write().await.insert(identifier.to_string(), record.clone());
        Ok(())
    }
}
