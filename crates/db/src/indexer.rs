// crates/db/src/indexer.rs
//! The indexing engine.
//!
//! Per file, in a blocking worker: stat once, try the in-process tier, then
//! the persistent tier, then parse (fast, falling back to full). Workers only
//! read the caches; every insert happens in the async loop that drains the
//! pool, and the persistent tier is rewritten once per batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use session_scope_core::paths::summary_index_path;
use session_scope_core::{
    active_duration, build_full, build_summary, extract_cwd, read_tail_timestamp,
    resolve_scope_dir, IndexerConfig, InputBoundaryGrouper, JsonRowDecoder, ParseError,
    RowDecoder, TurnFilter, TurnGrouper,
};
use session_scope_types::{ScanScope, SessionSummary};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::disk::{DiskCacheEntry, DiskIndex};
use crate::memory::MemoryCache;
use crate::pool::BoundedPool;
use crate::{IndexError, IndexResult};

pub struct SessionIndexBuilder {
    config: IndexerConfig,
    decoder: Arc<dyn RowDecoder>,
    grouper: Arc<dyn TurnGrouper>,
    turn_filter: TurnFilter,
}

impl SessionIndexBuilder {
    pub fn decoder(mut self, decoder: impl RowDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn turn_grouper(mut self, grouper: impl TurnGrouper + 'static) -> Self {
        self.grouper = Arc::new(grouper);
        self
    }

    pub fn turn_filter(mut self, filter: TurnFilter) -> Self {
        self.turn_filter = filter;
        self
    }

    /// Load the persistent tier and hand back the engine.
    pub fn build(self) -> IndexResult<SessionIndex> {
        let cache_dir = self
            .config
            .resolved_cache_dir()
            .map_err(|_| IndexError::NoCacheDir)?;
        let disk = DiskIndex::load(summary_index_path(&cache_dir));
        let memory = MemoryCache::new(self.config.memory_capacity);

        Ok(SessionIndex {
            inner: Arc::new(Inner {
                config: self.config,
                memory,
                disk,
                decoder: self.decoder,
                grouper: self.grouper,
                turn_filter: self.turn_filter,
            }),
        })
    }
}

/// Handle to the engine. Cheap to clone; clones share both cache tiers.
#[derive(Clone)]
pub struct SessionIndex {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: IndexerConfig,
    pub(crate) memory: MemoryCache,
    pub(crate) disk: DiskIndex,
    pub(crate) decoder: Arc<dyn RowDecoder>,
    pub(crate) grouper: Arc<dyn TurnGrouper>,
    pub(crate) turn_filter: TurnFilter,
}

/// What a worker found for one file.
enum FileOutcome {
    Cached {
        modified: Option<SystemTime>,
        summary: SessionSummary,
    },
    /// Valid persistent entry; the loop promotes it to the in-process tier.
    Promoted {
        modified: Option<SystemTime>,
        summary: SessionSummary,
    },
    Parsed {
        modified: Option<SystemTime>,
        summary: SessionSummary,
    },
    Skipped,
    Failed(ParseError),
}

enum EnrichOutcome {
    Gone,
    /// Cancelled part-way; the duration is a partial sum and is not stored.
    Partial(SessionSummary),
    Complete {
        modified: Option<SystemTime>,
        summary: SessionSummary,
    },
}

#[derive(Debug, Default)]
struct RefreshStats {
    cached: usize,
    promoted: usize,
    parsed: usize,
    skipped: usize,
    vanished: usize,
}

impl SessionIndex {
    /// Engine with the default decoder, grouper and turn filter.
    pub fn open(config: IndexerConfig) -> IndexResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: IndexerConfig) -> SessionIndexBuilder {
        SessionIndexBuilder {
            config,
            decoder: Arc::new(JsonRowDecoder::new()),
            grouper: Arc::new(InputBoundaryGrouper),
            turn_filter: TurnFilter::default(),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.inner.config
    }

    /// Entries in the in-process tier.
    pub fn memory_entries(&self) -> usize {
        self.inner.memory.len()
    }

    /// Entries in the persistent tier.
    pub fn disk_entries(&self) -> usize {
        self.inner.disk.len()
    }

    /// Log files under the directory `scope` resolves to. Empty when the
    /// directory does not exist.
    pub async fn scope_files(&self, scope: ScanScope) -> IndexResult<Vec<PathBuf>> {
        let inner = Arc::clone(&self.inner);
        let files = tokio::task::spawn_blocking(move || {
            match resolve_scope_dir(&inner.config.sessions_root, &scope) {
                Some(dir) => enumerate_log_files(&dir, &inner.config),
                None => {
                    debug!(scope = ?scope, root = %inner.config.sessions_root.display(), "scope directory missing");
                    Vec::new()
                }
            }
        })
        .await?;
        Ok(files)
    }

    /// Summaries for every log file in `scope`, in completion order.
    pub async fn refresh(&self, scope: ScanScope) -> IndexResult<Vec<SessionSummary>> {
        let files = self.scope_files(scope).await?;
        self.refresh_files(files).await
    }

    /// Summaries for `paths`. Vanished files are skipped silently; the batch
    /// fails only if nothing could be summarized and something went wrong.
    pub async fn refresh_files(&self, paths: Vec<PathBuf>) -> IndexResult<Vec<SessionSummary>> {
        let start = Instant::now();
        let total = paths.len();
        let inner = Arc::clone(&self.inner);
        let mut pool = BoundedPool::new(paths, self.inner.config.worker_count(), move |path: PathBuf| {
            let outcome = index_file(&inner, &path);
            (path, outcome)
        });

        let mut summaries = Vec::with_capacity(total);
        let mut batch = Vec::new();
        let mut errors: Vec<IndexError> = Vec::new();
        let mut stats = RefreshStats::default();

        while let Some(joined) = pool.next().await {
            let (path, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "indexing task failed");
                    errors.push(IndexError::Join(e));
                    continue;
                }
            };

            match outcome {
                FileOutcome::Cached { summary, .. } => {
                    stats.cached += 1;
                    summaries.push(summary);
                }
                FileOutcome::Promoted { modified, summary } => {
                    stats.promoted += 1;
                    self.inner.memory.put(path, modified, summary.clone());
                    summaries.push(summary);
                }
                FileOutcome::Parsed { modified, summary } => {
                    stats.parsed += 1;
                    self.inner.memory.put(path.clone(), modified, summary.clone());
                    batch.push(DiskCacheEntry {
                        path,
                        modified,
                        summary: summary.clone(),
                    });
                    summaries.push(summary);
                }
                FileOutcome::Skipped => stats.skipped += 1,
                FileOutcome::Failed(e) if e.is_not_found() => {
                    debug!(path = %path.display(), "file vanished before indexing");
                    stats.vanished += 1;
                }
                FileOutcome::Failed(e) => {
                    debug!(path = %path.display(), error = %e, "failed to index file");
                    errors.push(IndexError::Parse(e));
                }
            }
        }

        self.persist(batch).await;

        if summaries.is_empty() && !errors.is_empty() {
            let failed = errors.len();
            let first = errors.swap_remove(0);
            warn!(failed, error = %first, "refresh produced no summaries");
            return Err(IndexError::BatchFailed {
                failed,
                first: Box::new(first),
            });
        }

        info!(
            files = total,
            summaries = summaries.len(),
            cached = stats.cached,
            promoted = stats.promoted,
            parsed = stats.parsed,
            skipped = stats.skipped,
            vanished = stats.vanished,
            failed = errors.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "refresh complete"
        );
        Ok(summaries)
    }

    /// Drop `path` from the in-process tier. The persistent tier still
    /// answers until the file's modification time changes.
    pub fn invalidate(&self, path: &Path) {
        self.inner.memory.remove(path);
    }

    /// Drop the whole in-process tier.
    pub fn invalidate_all(&self) {
        self.inner.memory.clear();
    }

    /// Clear both tiers and delete the index file.
    pub fn reset_all_caches(&self) -> IndexResult<()> {
        self.inner.memory.clear();
        self.inner.disk.reset()?;
        info!(path = %self.inner.disk.path().display(), "summary caches reset");
        Ok(())
    }

    /// Re-parse `path` in full and store its active duration.
    ///
    /// Returns `None` if the file is gone. A cancelled run returns the summary
    /// with a partial duration and stores nothing.
    pub async fn enrich(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> IndexResult<Option<SessionSummary>> {
        let inner = Arc::clone(&self.inner);
        let owned = path.to_path_buf();
        let token = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || enrich_file(&inner, &owned, &token)).await??;

        match outcome {
            EnrichOutcome::Gone => Ok(None),
            EnrichOutcome::Partial(summary) => {
                debug!(path = %path.display(), "enrichment cancelled, partial duration not stored");
                Ok(Some(summary))
            }
            EnrichOutcome::Complete { modified, summary } => {
                self.store(vec![DiskCacheEntry {
                    path: path.to_path_buf(),
                    modified,
                    summary: summary.clone(),
                }])
                .await;
                Ok(Some(summary))
            }
        }
    }

    /// Enrich many files in the background. Returns how many were stored.
    ///
    /// Failures are logged and skipped. Cancellation stops new work; files
    /// already being processed finish but cancelled ones are not stored.
    pub async fn enrich_many(&self, paths: Vec<PathBuf>, cancel: &CancellationToken) -> IndexResult<usize> {
        let start = Instant::now();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let mut pool = BoundedPool::with_cancel(
            paths,
            self.inner.config.worker_count(),
            move |path: PathBuf| {
                let outcome = enrich_file(&inner, &path, &token);
                (path, outcome)
            },
            Some(cancel.clone()),
        );

        let mut batch = Vec::new();
        while let Some(joined) = pool.next().await {
            match joined {
                Ok((path, Ok(EnrichOutcome::Complete { modified, summary }))) => {
                    batch.push(DiskCacheEntry {
                        path,
                        modified,
                        summary,
                    });
                }
                Ok((_, Ok(_))) => {}
                Ok((path, Err(e))) => debug!(path = %path.display(), error = %e, "enrichment failed"),
                Err(e) => warn!(error = %e, "enrichment task failed"),
            }
        }

        let enriched = batch.len();
        self.store(batch).await;
        info!(enriched, elapsed_ms = start.elapsed().as_millis() as u64, "enrichment complete");
        Ok(enriched)
    }

    /// Attach a free-form comment to the summary of `path` (`None` clears it).
    ///
    /// The file is summarized first if no valid cache entry exists. Returns
    /// `None` if the file is gone.
    pub async fn annotate(&self, path: &Path, comment: Option<String>) -> IndexResult<Option<SessionSummary>> {
        let inner = Arc::clone(&self.inner);
        let owned = path.to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || index_file(&inner, &owned)).await?;

        let (modified, mut summary) = match outcome {
            FileOutcome::Cached { modified, summary }
            | FileOutcome::Promoted { modified, summary }
            | FileOutcome::Parsed { modified, summary } => (modified, summary),
            FileOutcome::Skipped => return Ok(None),
            FileOutcome::Failed(e) if e.is_not_found() => return Ok(None),
            FileOutcome::Failed(e) => return Err(e.into()),
        };

        summary.comment = comment.filter(|c| !c.trim().is_empty());
        self.store(vec![DiskCacheEntry {
            path: path.to_path_buf(),
            modified,
            summary: summary.clone(),
        }])
        .await;
        Ok(Some(summary))
    }

    /// Session count per working directory.
    ///
    /// Uses the cached cwd when either tier holds a valid summary, otherwise
    /// scans the head of the file.
    pub async fn aggregate_working_directories(&self, paths: Vec<PathBuf>) -> BTreeMap<String, usize> {
        let inner = Arc::clone(&self.inner);
        let mut pool = BoundedPool::new(paths, self.inner.config.worker_count(), move |path: PathBuf| {
            cwd_for(&inner, &path)
        });

        let mut counts = BTreeMap::new();
        while let Some(joined) = pool.next().await {
            match joined {
                Ok(Some(cwd)) => *counts.entry(cwd).or_insert(0) += 1,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "cwd task failed"),
            }
        }
        counts
    }

    /// Put entries in both tiers; one persistent rewrite for the batch.
    async fn store(&self, entries: Vec<DiskCacheEntry>) {
        for entry in &entries {
            self.inner
                .memory
                .put(entry.path.clone(), entry.modified, entry.summary.clone());
        }
        self.persist(entries).await;
    }

    /// Failure to persist is logged; the in-process tier is still correct.
    async fn persist(&self, batch: Vec<DiskCacheEntry>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || inner.disk.upsert_many(batch)).await {
            Ok(Ok(())) => debug!(entries = count, "summary index updated"),
            Ok(Err(e)) => warn!(error = %e, "failed to persist summary index"),
            Err(e) => warn!(error = %e, "summary index writer failed"),
        }
    }
}

/// Every file under `dir` with a configured log extension, sorted.
pub fn enumerate_log_files(dir: &Path, config: &IndexerConfig) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                debug!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && config.is_log_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn index_file(inner: &Inner, path: &Path) -> FileOutcome {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => return FileOutcome::Failed(ParseError::io(path, e)),
    };
    if !meta.is_file() {
        return FileOutcome::Skipped;
    }
    let modified = meta.modified().ok();

    if let Some(summary) = inner.memory.get(path, modified) {
        return FileOutcome::Cached { modified, summary };
    }
    if let Some(summary) = inner.disk.get(path, modified) {
        return FileOutcome::Promoted { modified, summary };
    }

    let hint = read_tail_timestamp(path);
    match build_summary(
        path,
        meta.len(),
        hint,
        inner.decoder.as_ref(),
        inner.config.fast_line_cap,
    ) {
        Ok(mut summary) => {
            // User comments survive the file growing.
            if let Some(previous) = inner.disk.entry(path) {
                summary.comment = previous.summary.comment;
            }
            FileOutcome::Parsed { modified, summary }
        }
        Err(e) => FileOutcome::Failed(e),
    }
}

fn enrich_file(inner: &Inner, path: &Path, cancel: &CancellationToken) -> Result<EnrichOutcome, ParseError> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            let err = ParseError::io(path, e);
            return if err.is_not_found() {
                Ok(EnrichOutcome::Gone)
            } else {
                Err(err)
            };
        }
    };
    let modified = meta.modified().ok();
    let hint = read_tail_timestamp(path);

    let full = match build_full(path, meta.len(), hint, inner.decoder.as_ref()) {
        Ok(full) => full,
        Err(e) if e.is_not_found() => return Ok(EnrichOutcome::Gone),
        Err(e) => return Err(e),
    };

    let turns = inner.grouper.group(&full.rows);
    let duration = active_duration(&turns, &inner.turn_filter, cancel);

    // Only the duration changes on an existing summary.
    let mut summary = match inner
        .memory
        .get(path, modified)
        .or_else(|| inner.disk.get(path, modified))
    {
        Some(cached) => cached,
        None => {
            let mut fresh = full.summary;
            if let Some(previous) = inner.disk.entry(path) {
                fresh.comment = previous.summary.comment;
            }
            fresh
        }
    };
    summary.active_duration = Some(duration.total);

    if !duration.complete {
        return Ok(EnrichOutcome::Partial(summary));
    }
    Ok(EnrichOutcome::Complete { modified, summary })
}

fn cwd_for(inner: &Inner, path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok();
    let cached = inner
        .memory
        .get(path, modified)
        .or_else(|| inner.disk.get(path, modified))
        .map(|s| s.cwd)
        .filter(|cwd| !cwd.is_empty());
    cached.or_else(|| extract_cwd(path, inner.decoder.as_ref()))
}
