//! Indexer configuration.
//!
//! Resolution order, highest first: explicit overrides applied by the caller,
//! `SESSION_SCOPE_*` environment variables, the TOML config file, defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::paths;

pub const ENV_ROOT: &str = "SESSION_SCOPE_ROOT";
pub const ENV_CACHE_DIR: &str = "SESSION_SCOPE_CACHE_DIR";
pub const ENV_WORKERS: &str = "SESSION_SCOPE_WORKERS";

/// Lines decoded by fast mode before it may stop.
pub const DEFAULT_FAST_LINE_CAP: usize = 64;

/// Entries kept by the in-process summary cache.
pub const DEFAULT_MEMORY_CAPACITY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Root of the `YEAR/MONTH/DAY` log tree.
    pub sessions_root: PathBuf,
    /// Directory holding the persistent summary index. `None` uses the app cache dir.
    pub cache_dir: Option<PathBuf>,
    pub memory_capacity: usize,
    /// Parallel file workers. `None` means `max(2, available_parallelism)`.
    pub workers: Option<usize>,
    pub fast_line_cap: usize,
    /// File extensions (without the dot) treated as session logs.
    pub extensions: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            sessions_root: paths::default_sessions_root()
                .unwrap_or_else(|| PathBuf::from("sessions")),
            cache_dir: None,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            workers: None,
            fast_line_cap: DEFAULT_FAST_LINE_CAP,
            extensions: vec!["jsonl".to_string(), "log".to_string()],
        }
    }
}

impl IndexerConfig {
    /// Defaults rooted at `sessions_root`, caching into `cache_dir`.
    pub fn new(sessions_root: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
            cache_dir: Some(cache_dir.into()),
            ..Self::default()
        }
    }

    /// Load the default config file (if any), then apply the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match paths::config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Read a TOML config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: IndexerConfig = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.expand_paths())
    }

    /// Overlay `SESSION_SCOPE_*` variables read through `lookup`.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT).filter(|v| !v.is_empty()) {
            self.sessions_root = paths::expand_tilde(&root);
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            self.cache_dir = Some(paths::expand_tilde(&dir));
        }
        if let Some(raw) = lookup(ENV_WORKERS).filter(|v| !v.is_empty()) {
            let workers = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidEnv {
                    key: ENV_WORKERS,
                    value: raw.clone(),
                })?;
            self.workers = Some(workers);
        }
        Ok(self)
    }

    fn expand_paths(mut self) -> Self {
        if let Some(s) = self.sessions_root.to_str() {
            self.sessions_root = paths::expand_tilde(s);
        }
        if let Some(dir) = self.cache_dir.take() {
            self.cache_dir = Some(match dir.to_str() {
                Some(s) => paths::expand_tilde(s),
                None => dir,
            });
        }
        self
    }

    /// Directory for the persistent index.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::app_cache_dir().ok_or(ConfigError::NoCacheDir),
        }
    }

    /// Number of files processed at once.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .max(2),
        }
    }

    /// Whether `path` has one of the configured log extensions.
    pub fn is_log_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}
