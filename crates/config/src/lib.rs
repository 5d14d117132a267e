//! Layered configuration.
//!
//! Sources are merged in order, later ones winning:
//! 1. built-in defaults,
//! 2. a config file (TOML, YAML or JSON, chosen by extension),
//! 3. `ORGIFY_`-prefixed environment variables, with `__` separating nested
//!    keys (`ORGIFY_CONVERTER__TIMEOUT_SECS=60`),
//! 4. command-line overrides.

pub mod error;
mod paths;
mod sections;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use crate::paths::{LOCAL_CONFIG_FILE, default_cache_path, default_config_file};
pub use crate::sections::{CacheConfig, ConverterConfig, PipelineConfig};

const ENV_PREFIX: &str = "ORGIFY_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the Markdown vault.
    pub vault: PathBuf,
    /// Root of the Org output tree.
    pub output: PathBuf,
    pub cache: CacheConfig,
    pub converter: ConverterConfig,
    pub pipeline: PipelineConfig,
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub vault: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub cache_enabled: Option<bool>,
    pub program: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub force: Option<bool>,
    pub dry_run: Option<bool>,
}

impl Config {
    /// Load configuration from every layer and validate it.
    ///
    /// `file` is an explicitly requested config file, which must exist;
    /// otherwise [`default_config_file()`] is used when there is one.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let config = Self::load_unvalidated(file, overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// [`load`](Self::load) without validation, for commands that only need
    /// part of the configuration (resetting identifiers needs no vault).
    pub fn load_unvalidated(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let file = match file {
            Some(file) if !file.is_file() => exn::bail!(ErrorKind::FileNotFound(file.to_path_buf())),
            Some(file) => Some(file.to_path_buf()),
            None => default_config_file(),
        };
        let config = Self::figment(file.as_deref(), overrides)?.extract::<Self>().or_raise(|| ErrorKind::Load)?;
        let config = config.resolve()?;
        tracing::debug!(config_file = ?file, vault = %config.vault.display(), output = %config.output.display(), "Loaded configuration");
        Ok(config)
    }

    fn figment(file: Option<&Path>, overrides: &Overrides) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            let extension = file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
            };
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Ok(overrides.apply(figment))
    }

    /// Make relative paths absolute against the working directory.
    fn resolve(mut self) -> Result<Self> {
        for path in [&mut self.vault, &mut self.output, &mut self.cache.path] {
            if !path.as_os_str().is_empty() && path.is_relative() {
                *path = std::path::absolute(&*path).or_raise(|| ErrorKind::Invalid(format!("cannot resolve {}", path.display())))?;
            }
        }
        Ok(self)
    }

    /// Reject configurations that can't possibly work, before any note is
    /// touched.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| exn::Exn::from(ErrorKind::Invalid(reason.to_string()));
        if self.vault.as_os_str().is_empty() {
            return Err(invalid("no vault directory given"));
        }
        if !self.vault.is_dir() {
            return Err(invalid(&format!("vault is not a directory: {}", self.vault.display())));
        }
        if self.output.as_os_str().is_empty() {
            return Err(invalid("no output directory given"));
        }
        if self.output == self.vault {
            return Err(invalid("output directory must differ from the vault"));
        }
        if self.converter.from.trim().is_empty() || self.converter.to.trim().is_empty() {
            return Err(invalid("converter formats must not be empty"));
        }
        if self.converter.timeout_secs == 0 {
            return Err(invalid("converter timeout must be at least one second"));
        }
        if self.pipeline.concurrency == 0 {
            return Err(invalid("concurrency must be at least 1"));
        }
        if self.pipeline.note_extensions.is_empty() {
            return Err(invalid("at least one note extension is required"));
        }
        if self.pipeline.filename_template.trim().is_empty() {
            return Err(invalid("filename template must not be empty"));
        }
        if self.pipeline.assets_dir.is_absolute() || self.pipeline.assets_dir.as_os_str().is_empty() {
            return Err(invalid("assets directory must be a relative path inside the output"));
        }
        if self.output.starts_with(&self.vault) {
            tracing::warn!(output = %self.output.display(), "Output directory is inside the vault");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.converter.timeout_secs)
    }
}

impl Overrides {
    fn apply(&self, mut figment: Figment) -> Figment {
        macro_rules! set {
            ($key:literal, $value:expr) => {
                if let Some(value) = &$value {
                    figment = figment.merge(Serialized::default($key, value));
                }
            };
        }
        set!("vault", self.vault);
        set!("output", self.output);
        set!("cache.path", self.cache_path);
        set!("cache.enabled", self.cache_enabled);
        set!("converter.program", self.program);
        set!("pipeline.concurrency", self.concurrency);
        set!("pipeline.force", self.force);
        set!("pipeline.dry_run", self.dry_run);
        figment
    }
}
