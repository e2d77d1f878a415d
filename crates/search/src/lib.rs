//! Full-text search over raw session logs.
//!
//! No index: each file is scanned in bounded chunks (see [`scanner`]). Batch
//! searches fan out over a bounded set of blocking workers and stop handing
//! out files once the cancellation token fires.

pub mod scanner;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use scanner::{file_contains, scan_file, CHUNK_SIZE};

/// Errors that can occur during search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Search cancelled")]
    Cancelled,
}

/// Paths among `paths` whose contents contain `term`, sorted.
///
/// At most `workers` files are scanned at once. A cancelled search returns the
/// matches found so far.
pub async fn search_paths(
    paths: Vec<PathBuf>,
    term: &str,
    cancel: &CancellationToken,
    workers: usize,
) -> Vec<PathBuf> {
    let term: Arc<str> = Arc::from(term);
    let mut pending = paths.into_iter();
    let mut tasks = JoinSet::new();
    let mut matches = Vec::new();

    let spawn_next = |tasks: &mut JoinSet<Option<PathBuf>>, pending: &mut std::vec::IntoIter<PathBuf>| {
        if cancel.is_cancelled() {
            return;
        }
        if let Some(path) = pending.next() {
            let term = Arc::clone(&term);
            let cancel = cancel.clone();
            tasks.spawn_blocking(move || file_contains(&path, &term, &cancel).then_some(path));
        }
    };

    for _ in 0..workers.max(1) {
        spawn_next(&mut tasks, &mut pending);
    }

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Some(path)) => matches.push(path),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "search task failed"),
        }
        spawn_next(&mut tasks, &mut pending);
    }

    matches.sort();
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for (name, body) in [
            ("a.jsonl", "{\"text\":\"Refactor the parser\"}\n"),
            ("b.jsonl", "{\"text\":\"write docs\"}\n"),
            ("c.jsonl", "{\"text\":\"PARSER bug\"}\n"),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            paths.push(path);
        }
        (dir, paths)
    }

    #[tokio::test]
    async fn test_search_paths_finds_all_matches() {
        let (dir, paths) = fixture();
        let token = CancellationToken::new();
        let found = search_paths(paths, "parser", &token, 2).await;
        assert_eq!(found, vec![dir.path().join("a.jsonl"), dir.path().join("c.jsonl")]);
    }

    #[tokio::test]
    async fn test_search_paths_skips_missing_files() {
        let (dir, mut paths) = fixture();
        paths.push(dir.path().join("gone.jsonl"));
        let found = search_paths(paths, "docs", &CancellationToken::new(), 8).await;
        assert_eq!(found, vec![dir.path().join("b.jsonl")]);
    }

    #[tokio::test]
    async fn test_cancelled_search_returns_nothing_new() {
        let (_dir, paths) = fixture();
        let token = CancellationToken::new();
        token.cancel();
        assert!(search_paths(paths, "parser", &token, 2).await.is_empty());
    }
}
