use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Config file looked for in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "orgify.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "orgify")
}

/// Platform cache directory, or `.orgify/` in the working directory when the
/// platform has none.
pub fn default_cache_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".orgify"))
        .join("cache.sqlite3")
}

/// `./orgify.toml` if it exists, else `config.toml` in the platform config
/// directory if that exists.
pub fn default_config_file() -> Option<PathBuf> {
    let local = Path::new(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local.to_path_buf());
    }
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml")).filter(|path| path.is_file())
}
