// crates/db/src/lib.rs
// Two-tier summary cache and the indexing engine built on it.

pub mod calendar;
pub mod disk;
pub mod indexer;
pub mod memory;
mod pool;

pub use calendar::{count_created_by_day, count_updated_by_day, files_for_updated_day};
pub use disk::{DiskCacheEntry, DiskIndex};
pub use indexer::{enumerate_log_files, SessionIndex, SessionIndexBuilder};
pub use memory::MemoryCache;

use std::path::PathBuf;

use session_scope_core::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize summary index: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("No session could be indexed ({failed} failed), first error: {first}")]
    BatchFailed {
        failed: usize,
        #[source]
        first: Box<IndexError>,
    },
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// A failed batch may succeed on the next refresh (files still being written).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BatchFailed { .. })
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
