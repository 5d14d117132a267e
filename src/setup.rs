//! Turns a loaded [`Config`] into the pieces a command runs against.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use orgify_cache::{Database, MemoryStore, Repository, Stats, StoreHandle};
use orgify_config::Config;
use orgify_convert::{ConversionOptions, Pandoc};
use orgify_library::{Context, PathGenerator, Settings, WalkRules};
use orgify_storage::BackendHandle;
use orgify_storage::backend::{LocalBackend, ReadOnlyBackend};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The cache store, plus the database behind it when there is one so it can
/// be closed cleanly.
pub struct Store {
    pub handle: StoreHandle,
    database: Option<Database>,
}

impl Store {
    pub async fn open(config: &Config) -> Result<Self> {
        if !config.cache.enabled {
            tracing::info!("Cache disabled; every note will be converted");
            return Ok(Self {
                handle: Arc::new(MemoryStore::new()),
                database: None,
            });
        }
        let database = Database::connect(&config.cache.path).await.or_raise(|| ErrorKind::Cache)?;
        let repository = Repository::new(database.pool().clone(), config.pipeline.dry_run);
        Ok(Self {
            handle: Arc::new(repository),
            database: Some(database),
        })
    }

    /// Row counts, when the store is a database.
    pub async fn stats(&self) -> Option<Stats> {
        let database = self.database.as_ref()?;
        match database.stats().await {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::debug!(error = ?err, "Could not read cache statistics");
                None
            },
        }
    }

    pub async fn close(self) {
        if let Some(database) = self.database {
            database.close().await;
        }
    }
}

pub fn options(config: &Config) -> ConversionOptions {
    ConversionOptions {
        from: config.converter.from.clone(),
        to: config.converter.to.clone(),
        extra_args: config.converter.extra_args.clone(),
        timeout: config.timeout(),
        retry: config.converter.retry,
    }
}

pub fn walk_rules(config: &Config) -> WalkRules {
    WalkRules {
        note_extensions: config.pipeline.note_extensions.clone(),
        asset_extensions: config.pipeline.asset_extensions.clone(),
        skip_underscored: config.pipeline.skip_underscored,
        exclude_dirs: config.pipeline.exclude_dirs.clone(),
    }
}

pub fn vault(config: &Config) -> Result<BackendHandle> {
    let backend = LocalBackend::new("vault", &config.vault)
        .or_raise(|| ErrorKind::Storage("vault"))?
        .pruning(&config.pipeline.exclude_dirs);
    Ok(Arc::new(ReadOnlyBackend::new(Arc::new(backend))))
}

/// Builds the run context. On a dry run the read-only output tree is handed
/// back too, so the caller can say how much it held back.
pub fn context(
    config: &Config,
    store: StoreHandle,
    cancel: CancellationToken,
) -> Result<(Context, Option<ReadOnlyBackend>)> {
    let output: BackendHandle =
        Arc::new(LocalBackend::new("output", &config.output).or_raise(|| ErrorKind::Storage("output tree"))?);
    let dry_run = config.pipeline.dry_run.then(|| {
        tracing::info!("Dry run: nothing will be written");
        ReadOnlyBackend::new(output.clone())
    });
    let output: BackendHandle = match &dry_run {
        Some(held) => Arc::new(held.clone()),
        None => output,
    };
    let converter = Pandoc::discover(config.converter.program.as_deref()).or_raise(|| ErrorKind::Converter)?;
    let template = config.pipeline.filename_template.parse::<PathGenerator>().or_raise(|| ErrorKind::Config)?;
    let ctx = Context {
        vault: vault(config)?,
        output,
        store,
        converter: Arc::new(converter),
        options: options(config),
        template,
        settings: Settings {
            concurrency: config.pipeline.concurrency,
            force: config.pipeline.force,
            assets_dir: config.pipeline.assets_dir.clone(),
            section_tags: config.pipeline.section_tags,
            walk: walk_rules(config),
        },
        cancel,
    };
    Ok((ctx, dry_run))
}
