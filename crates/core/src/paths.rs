// crates/core/src/paths.rs
//! Where session-scope keeps its files. Other crates ask here instead of
//! joining `dirs::cache_dir()` themselves.

use std::path::{Path, PathBuf};

/// File name of the persistent summary index inside the cache directory.
pub const SUMMARY_INDEX_FILE: &str = "summary-index.json";

/// App cache root: `~/Library/Caches/session-scope/` (macOS) or `~/.cache/session-scope/` (Linux).
pub fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("session-scope"))
}

/// Config file: `<config_dir>/session-scope/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("session-scope").join("config.toml"))
}

/// Default session log root: `~/.codex/sessions/`.
pub fn default_sessions_root() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".codex").join("sessions"))
}

/// Persistent summary index inside `cache_dir`.
pub fn summary_index_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(SUMMARY_INDEX_FILE)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
