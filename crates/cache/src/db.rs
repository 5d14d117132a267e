//! The SQLite file behind [`Repository`](crate::Repository).

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqliteConnection;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Readers are pipeline workers looking up conversions; there is never more
/// than one writer at a time anyway.
const MAX_CONNECTIONS: u32 = 4;

/// Workers store their conversion as soon as pandoc returns, so writes from
/// a large batch queue up behind each other.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a [`Database`] keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Gone when the pool closes.
    Memory,
}

/// Row counts, for reporting on the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub conversions: u64,
    /// Total size of the cached converter output.
    pub output_bytes: u64,
    pub identifiers: u64,
    pub records: u64,
}

/// Connection pool over the cache database, migrated on open.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    location: Location,
}

impl Database {
    /// Open (creating if needed) the cache database at `path`, along with any
    /// missing parent directories.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Database)?;
        }
        let options = Self::options().filename(path).create_if_missing(true).journal_mode(SqliteJournalMode::Wal);
        Self::open(options, MAX_CONNECTIONS, Location::File(path.to_path_buf())).await
    }

    /// A private in-memory database, for tests and `--no-cache` style runs
    /// that still want SQLite semantics.
    ///
    /// Limited to one connection: every `:memory:` connection is a database
    /// of its own.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::options().filename(":memory:");
        Self::open(options, 1, Location::Memory).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .auto_vacuum(SqliteAutoVacuum::Incremental)
    }

    /// Per-connection settings that [`SqliteConnectOptions`] has no setter for.
    async fn tune(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        // Converter output is mostly small text; keep hot pages around.
        sqlx::query("PRAGMA cache_size = -16384; PRAGMA temp_store = MEMORY; PRAGMA journal_size_limit = 67108864;")
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn open(options: SqliteConnectOptions, connections: u32, location: Location) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .after_connect(|conn, meta| Box::pin(Self::tune(conn, meta)))
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        tracing::debug!(?location, "Opened cache database");
        Ok(Self { pool, location })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub async fn stats(&self) -> Result<Stats> {
        let (conversions, output_bytes, identifiers, records): (i64, i64, i64, i64) =
            sqlx::query_as(include_str!("../queries/stats.sql"))
                .fetch_one(&self.pool)
                .await
                .or_raise(|| ErrorKind::Database)?;
        let count = |n: i64| u64::try_from(n).unwrap_or(0);
        Ok(Stats {
            conversions: count(conversions),
            output_bytes: count(output_bytes),
            identifiers: count(identifiers),
            records: count(records),
        })
    }

    /// Give space freed by pruning back to the filesystem, then close every
    /// connection.
    pub async fn close(&self) {
        if matches!(self.location, Location::File(_)) {
            _ = sqlx::query("PRAGMA incremental_vacuum").execute(&self.pool).await;
            _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        }
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheStore, Repository};
    use orgify_extract::Fingerprint;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_in_memory_starts_empty() {
        let db = Database::connect_in_memory().await.unwrap();
        assert_eq!(db.location(), &Location::Memory);
        assert_eq!(db.stats().await.unwrap(), Stats::default());
        db.close().await;
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/cache.sqlite3");
        let fingerprint = Fingerprint::compute("# Alpha", "markdown>org");

        let db = Database::connect(&path).await.unwrap();
        let repo = Repository::from(&db);
        repo.store(&fingerprint, "* Alpha").await.unwrap();
        repo.save_identifiers(&BTreeMap::from([("Alpha.md".to_string(), "id-alpha".to_string())])).await.unwrap();
        db.close().await;
        assert!(path.is_file());

        let db = Database::connect(&path).await.unwrap();
        let repo = Repository::from(&db);
        assert_eq!(repo.lookup(&fingerprint).await.unwrap().as_deref(), Some("* Alpha"));
        assert_eq!(db.stats().await.unwrap(), Stats {
            conversions: 1,
            output_bytes: 7,
            identifiers: 1,
            records: 0,
        });
        db.close().await;
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("cache.sqlite3")).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let (temp_store,): (i64,) = sqlx::query_as("PRAGMA temp_store").fetch_one(db.pool()).await.unwrap();
        assert_eq!(temp_store, 2, "temp_store should be MEMORY");
        db.close().await;
    }
}
