//! Stable note identifiers.
//!
//! Identifiers are keyed by the note's vault path. Once assigned they are
//! persisted and reused on every later run; only an explicit reset (or an
//! explicit `id` in the note's frontmatter) changes them.

use crate::vault::slash_path;
use orgify_cache::CacheStore;
use orgify_cache::error::Result;
use orgify_extract::Note;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

/// The identifier given to one note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub identifier: String,
    /// The note asked for an explicit identifier that another note already
    /// owns; holds that note's key. The note got a different identifier.
    pub conflict: Option<String>,
}

/// Bijective mapping between note keys and identifiers.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    by_key: BTreeMap<String, String>,
    owners: HashMap<String, String>,
    changed: BTreeMap<String, String>,
}

impl IdentifierRegistry {
    /// Load every stored mapping.
    #[instrument(skip_all)]
    pub async fn load(store: &dyn CacheStore) -> Result<Self> {
        let stored = store.load_identifiers().await?;
        tracing::debug!(count = stored.len(), "Loaded identifiers");
        Ok(Self::from_map(stored))
    }

    pub fn from_map(by_key: BTreeMap<String, String>) -> Self {
        let owners = by_key.iter().map(|(key, id)| (id.clone(), key.clone())).collect();
        Self {
            by_key,
            owners,
            changed: BTreeMap::new(),
        }
    }

    /// Registry key of the note at `path`: the vault path with `/` separators.
    pub fn key_for(path: &Path) -> String {
        slash_path(path)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Mappings added or changed since loading.
    pub fn changed(&self) -> &BTreeMap<String, String> {
        &self.changed
    }

    /// Give `note` its identifier, reusing the stored one when there is one.
    ///
    /// An explicit `id` in the note's metadata wins over the stored identifier,
    /// unless a different note already owns it.
    pub fn assign(&mut self, note: &Note) -> Assignment {
        let key = Self::key_for(&note.path);
        let mut conflict = None;
        if let Some(explicit) = note.metadata.id() {
            match self.owners.get(&explicit).cloned() {
                Some(owner) if owner != key => conflict = Some(owner),
                Some(_) => return Assignment { identifier: explicit, conflict },
                None => {
                    self.insert(&key, explicit.clone());
                    return Assignment { identifier: explicit, conflict };
                },
            }
        }
        let identifier = match self.by_key.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let fresh = self.generate();
                self.insert(&key, fresh.clone());
                fresh
            },
        };
        Assignment { identifier, conflict }
    }

    fn insert(&mut self, key: &str, identifier: String) {
        if let Some(previous) = self.by_key.insert(key.to_string(), identifier.clone()) {
            self.owners.remove(&previous);
        }
        self.owners.insert(identifier.clone(), key.to_string());
        self.changed.insert(key.to_string(), identifier);
    }

    /// Time-ordered UUID (timestamp plus random bits); collisions are
    /// practically impossible but still checked.
    fn generate(&self) -> String {
        loop {
            let candidate = Uuid::now_v7().to_string();
            if !self.owners.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Save new and changed mappings in one go, then forget about them.
    #[instrument(skip_all, fields(changed = self.changed.len()))]
    pub async fn persist(&mut self, store: &dyn CacheStore) -> Result<usize> {
        if self.changed.is_empty() {
            return Ok(0);
        }
        store.save_identifiers(&self.changed).await?;
        let saved = self.changed.len();
        self.changed.clear();
        Ok(saved)
    }

    /// Forget every stored identifier and fingerprint record.
    pub async fn reset(store: &dyn CacheStore) -> Result<u64> {
        store.reset_identifiers().await
    }
}
