//! `orgify` command-line tool
//!
//! Converts an Obsidian-style Markdown vault into an Org-roam directory.
//!
//! ## Commands
//!
//! - `convert [VAULT] [OUTPUT]`: convert every new or changed note
//! - `prune [VAULT]`: drop cached conversions no note needs any more
//! - `reset-ids`: forget every assigned identifier
//!
//! Settings come from `orgify.toml` (or `--config`), `ORGIFY_*` environment
//! variables and the flags below, in increasing order of precedence.
//!
//! Exits with 0 when every note converted, 1 when some notes failed or the
//! run was interrupted, and 2 when the run could not start or was aborted.

mod error;
mod setup;

use crate::error::{ErrorKind, Result};
use crate::setup::Store;
use clap::{Args, Parser, Subcommand};
use exn::ResultExt;
use futures::StreamExt;
use orgify_config::{Config, Overrides};
use orgify_library::{PipelineEvent, Vault, convert_vault, maintenance};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orgify")]
#[command(author, version, about = "Convert an Obsidian-style Markdown vault into an Org-roam directory", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "ORGIFY_CONFIG")]
    config: Option<PathBuf>,

    /// More logging; repeat for even more. `RUST_LOG` wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert the vault, skipping notes whose output is up to date
    Convert {
        #[command(flatten)]
        locations: Locations,

        /// Rewrite every note, even when its output is up to date
        #[arg(long)]
        force: bool,

        /// Report what would be written without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Notes processed at once
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Use an in-memory cache for this run only
        #[arg(long)]
        no_cache: bool,

        /// Converter executable, by name or path
        #[arg(long)]
        converter: Option<PathBuf>,
    },

    /// Delete cached conversions that no current note would produce
    Prune {
        /// Vault directory
        vault: Option<PathBuf>,

        /// Cache database file
        #[arg(long)]
        cache: Option<PathBuf>,
    },

    /// Forget every identifier; the next run assigns new ones and every id link changes
    ResetIds {
        /// Cache database file
        #[arg(long)]
        cache: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Locations {
    /// Vault directory
    vault: Option<PathBuf>,

    /// Output directory
    output: Option<PathBuf>,

    /// Cache database file
    #[arg(long)]
    cache: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::from(2)
        },
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let file = cli.config.as_deref();
    match cli.command {
        Commands::Convert { locations, force, dry_run, jobs, no_cache, converter } => {
            let overrides = Overrides {
                vault: locations.vault,
                output: locations.output,
                cache_path: locations.cache,
                cache_enabled: no_cache.then_some(false),
                program: converter,
                concurrency: jobs,
                force: force.then_some(true),
                dry_run: dry_run.then_some(true),
            };
            let config = Config::load(file, &overrides).or_raise(|| ErrorKind::Config)?;
            convert(&config).await
        },
        Commands::Prune { vault, cache } => {
            let overrides = Overrides {
                vault,
                cache_path: cache,
                ..Overrides::default()
            };
            let config = Config::load_unvalidated(file, &overrides).or_raise(|| ErrorKind::Config)?;
            let store = Store::open(&config).await?;
            let vault = Vault::new(setup::vault(&config)?, setup::walk_rules(&config));
            let removed = maintenance::prune(&vault, &*store.handle, &setup::options(&config)).await;
            let stats = store.stats().await;
            store.close().await;
            println!("removed {} cached conversions", removed.or_raise(|| ErrorKind::Maintenance)?);
            if let Some(stats) = stats {
                println!("{} conversions ({} bytes) remain for {} notes", stats.conversions, stats.output_bytes, stats.identifiers);
            }
            Ok(ExitCode::SUCCESS)
        },
        Commands::ResetIds { cache } => {
            let overrides = Overrides {
                cache_path: cache,
                ..Overrides::default()
            };
            let config = Config::load_unvalidated(file, &overrides).or_raise(|| ErrorKind::Config)?;
            let store = Store::open(&config).await?;
            let removed = maintenance::reset_identifiers(&*store.handle).await;
            store.close().await;
            println!("forgot {} identifiers", removed.or_raise(|| ErrorKind::Maintenance)?);
            Ok(ExitCode::SUCCESS)
        },
    }
}

async fn convert(config: &Config) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing up");
            signal.cancel();
        }
    });

    let store = Store::open(config).await?;
    let (ctx, dry_run) = setup::context(config, store.handle.clone(), cancel)?;
    let mut report = None;
    let mut failure = None;
    {
        let events = convert_vault(&ctx);
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(PipelineEvent::Started) => tracing::info!(vault = %config.vault.display(), "Converting vault"),
                Ok(PipelineEvent::DiscoveryComplete { notes, assets }) => tracing::info!(notes, assets, "Discovered vault"),
                Ok(PipelineEvent::IdentifiersAssigned { notes, saved }) => {
                    tracing::debug!(notes, saved, "Identifiers assigned");
                },
                Ok(PipelineEvent::Processed(result)) => tracing::debug!(note = %result.path.display(), outcome = ?result.outcome, "Note done"),
                Ok(PipelineEvent::Complete(done)) => report = Some(done),
                Err(err) => {
                    failure = Some(err);
                    break;
                },
            }
        }
    }
    drop(ctx);
    store.close().await;

    if let Some(err) = failure {
        return Err(err).or_raise(|| ErrorKind::Pipeline);
    }
    let Some(report) = report else {
        exn::bail!(ErrorKind::Pipeline);
    };
    print!("{report}");
    if let Some(held) = dry_run {
        println!("dry run: {} writes held back", held.dropped());
    }
    Ok(if report.is_success() { ExitCode::SUCCESS } else { ExitCode::from(1) })
}
