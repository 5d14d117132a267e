use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where converted output and identifiers are persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the SQLite cache database.
    pub path: PathBuf,
    /// `false` keeps everything in memory for this run only. Identifiers are
    /// then regenerated on every run.
    pub enabled: bool,
}
impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: paths::default_cache_path(),
            enabled: true,
        }
    }
}

/// The external document converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Converter executable; looked up on `PATH` when unset.
    pub program: Option<PathBuf>,
    pub from: String,
    pub to: String,
    pub extra_args: Vec<String>,
    pub timeout_secs: u64,
    /// Retry once when the converter fails in a way that might be transient.
    pub retry: bool,
}
impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: None,
            from: "markdown+wikilinks_title_after_pipe".to_string(),
            to: "org".to_string(),
            extra_args: vec!["--wrap=none".to_string()],
            timeout_secs: 30,
            retry: true,
        }
    }
}

/// How the vault is walked and the output tree laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Notes processed at once.
    pub concurrency: usize,
    /// Rewrite every note even when its output is up to date.
    pub force: bool,
    /// Do everything except write output, cache entries or identifiers.
    pub dry_run: bool,
    /// Directory, relative to the output root, that assets are copied into.
    pub assets_dir: PathBuf,
    /// Output path template, without extension. See `orgify-library`'s
    /// `PathGenerator` for the available variables and filters.
    pub filename_template: String,
    pub note_extensions: Vec<String>,
    pub asset_extensions: Vec<String>,
    /// Skip notes whose file or parent directory name starts with `_`.
    pub skip_underscored: bool,
    /// Directory names skipped anywhere in the vault.
    pub exclude_dirs: Vec<String>,
    /// Tag each note with its top-level vault directory.
    pub section_tags: bool,
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            force: false,
            dry_run: false,
            assets_dir: PathBuf::from("assets"),
            filename_template: "{{ dir }}/{{ stem }}".to_string(),
            note_extensions: vec!["md".to_string()],
            asset_extensions: [
                "png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "pdf", "mp3", "mp4", "webm", "ogg", "wav", "m4a",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            skip_underscored: true,
            exclude_dirs: vec![".obsidian".to_string(), ".trash".to_string()],
            section_tags: false,
        }
    }
}
