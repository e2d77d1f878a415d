// crates/db/src/pool.rs
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Runs a blocking job per path with at most `workers` in flight.
///
/// The set is primed with `workers` jobs and each completion pulls exactly one
/// more path, so results stream back to the single owner driving `next()`.
pub(crate) struct BoundedPool<T, F> {
    tasks: JoinSet<T>,
    pending: std::vec::IntoIter<PathBuf>,
    job: Arc<F>,
    cancel: Option<CancellationToken>,
}

impl<T, F> BoundedPool<T, F>
where
    T: Send + 'static,
    F: Fn(PathBuf) -> T + Send + Sync + 'static,
{
    pub(crate) fn new(paths: Vec<PathBuf>, workers: usize, job: F) -> Self {
        Self::with_cancel(paths, workers, job, None)
    }

    /// Stop handing out new paths once `cancel` fires; in-flight jobs finish.
    pub(crate) fn with_cancel(
        paths: Vec<PathBuf>,
        workers: usize,
        job: F,
        cancel: Option<CancellationToken>,
    ) -> Self {
        let mut pool = Self {
            tasks: JoinSet::new(),
            pending: paths.into_iter(),
            job: Arc::new(job),
            cancel,
        };
        for _ in 0..workers.max(1) {
            pool.spawn_next();
        }
        pool
    }

    fn spawn_next(&mut self) {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return;
        }
        if let Some(path) = self.pending.next() {
            let job = Arc::clone(&self.job);
            self.tasks.spawn_blocking(move || job(path));
        }
    }

    /// Next finished job, refilling the freed slot. `None` once drained.
    pub(crate) async fn next(&mut self) -> Option<Result<T, JoinError>> {
        let result = self.tasks.join_next().await?;
        self.spawn_next();
        Some(result)
    }
}
