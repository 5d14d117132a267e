//! Housekeeping outside of a conversion run.

use crate::error::{ErrorKind, Result};
use crate::registry::IdentifierRegistry;
use crate::vault::Vault;
use exn::ResultExt;
use orgify_cache::CacheStore;
use orgify_convert::ConversionOptions;
use orgify_extract::Fingerprint;
use std::collections::BTreeSet;
use tracing::instrument;

/// Drops cached conversions that no note in the vault would produce any more.
///
/// Every note is read so its current fingerprint is known; if any note can't
/// be read nothing is pruned, since its entry might still be live.
#[instrument(skip_all)]
pub async fn prune(vault: &Vault, store: &dyn CacheStore, options: &ConversionOptions) -> Result<u64> {
    let key = options.cache_key();
    let mut live = BTreeSet::new();
    for info in vault.list_notes().await? {
        let bytes = vault.read_note(&info.path).await.or_raise(|| ErrorKind::Vault)?;
        live.insert(Fingerprint::compute(&bytes, &key));
    }
    let removed = store.prune(&live).await.or_raise(|| ErrorKind::Cache)?;
    tracing::info!(removed, live = live.len(), "Pruned conversion cache");
    Ok(removed)
}

/// Forgets every identifier, so the next run assigns fresh ones. Every
/// `id:` link in the output tree changes as a result.
#[instrument(skip_all)]
pub async fn reset_identifiers(store: &dyn CacheStore) -> Result<u64> {
    let removed = IdentifierRegistry::reset(store).await.or_raise(|| ErrorKind::Cache)?;
    tracing::warn!(removed, "Identifier registry reset");
    Ok(removed)
}
