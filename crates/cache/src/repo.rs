//! SQLite-backed [`CacheStore`].

use crate::error::{ErrorKind, Result};
use crate::models::RecordRow;
use crate::{CacheStore, Database, NoteRecord};
use async_trait::async_trait;
use exn::ResultExt;
use orgify_extract::Fingerprint;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use time::UtcDateTime;
use tracing::instrument;

/// Repository over the cache database.
///
/// In dry-run mode every read works as normal and every write is skipped,
/// so a dry run leaves the database exactly as it found it.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    async fn delete_conversion(&self, fingerprint: &str) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/delete_conversion.sql"))
            .bind(fingerprint)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheStore for Repository {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        let output: Option<Vec<u8>> = sqlx::query_scalar(include_str!("../queries/lookup_conversion.sql"))
            .bind(fingerprint.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(output) = output else {
            return Ok(None);
        };
        match String::from_utf8(output) {
            Ok(output) => Ok(Some(output)),
            Err(_) => {
                // A corrupt entry is a miss; drop it so the next store replaces it.
                tracing::warn!(fingerprint = %fingerprint, "Discarding corrupt cache entry");
                if !self.dry_run {
                    self.delete_conversion(fingerprint.as_str()).await?;
                }
                Ok(None)
            },
        }
    }

    async fn store(&self, fingerprint: &Fingerprint, output: &str) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        sqlx::query(include_str!("../queries/insert_conversion.sql"))
            .bind(fingerprint.as_str())
            .bind(output.as_bytes())
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    #[instrument(skip_all, fields(live = live.len()))]
    async fn prune(&self, live: &BTreeSet<Fingerprint>) -> Result<u64> {
        let stored: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_conversion_fingerprints.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let dead: Vec<String> = stored
            .into_iter()
            .filter(|fingerprint| Fingerprint::from_hex(fingerprint.clone()).is_none_or(|f| !live.contains(&f)))
            .collect();
        if self.dry_run {
            tracing::info!(entries = dead.len(), "Dry run: skipping prune");
            return Ok(dead.len() as u64);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut removed = 0;
        for fingerprint in &dead {
            let result = sqlx::query(include_str!("../queries/delete_conversion.sql"))
                .bind(fingerprint)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            removed += result.rows_affected();
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(removed)
    }

    async fn load_identifiers(&self) -> Result<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(include_str!("../queries/list_identifiers.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().collect())
    }

    async fn save_identifiers(&self, changed: &BTreeMap<String, String>) -> Result<()> {
        if self.dry_run || changed.is_empty() {
            return Ok(());
        }
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        // Delete first: two notes may have swapped identifiers, and the
        // uniqueness constraint is checked per statement.
        for key in changed.keys() {
            sqlx::query(include_str!("../queries/delete_identifier.sql"))
                .bind(key)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        for (key, identifier) in changed {
            sqlx::query(include_str!("../queries/insert_identifier.sql"))
                .bind(key)
                .bind(identifier)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn reset_identifiers(&self) -> Result<u64> {
        if self.dry_run {
            return Ok(self.load_identifiers().await?.len() as u64);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let removed = sqlx::query(include_str!("../queries/reset_identifiers.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?
            .rows_affected();
        sqlx::query(include_str!("../queries/reset_records.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(removed)
    }

    async fn last_record(&self, identifier: &str) -> Result<Option<NoteRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/get_record.sql"))
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(NoteRecord::try_from).transpose()
    }

    async fn record(&self, identifier: &str, record: &NoteRecord) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let row = RecordRow::from_model(identifier, record);
        sqlx::query(include_str!("../queries/upsert_record.sql"))
            .bind(row.identifier)
            .bind(row.fingerprint)
            .bind(row.context)
            .bind(row.recorded_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
