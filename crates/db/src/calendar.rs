// crates/db/src/calendar.rs
//! Calendar views over the log tree.
//!
//! "Created" buckets a file by the day directory it lives in and never opens
//! it. "Updated" buckets by the local date of the file's last in-content
//! timestamp, which means reading the tail of every file in the tree.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use session_scope_core::{month_dir, parse_numbered_dir, read_tail_timestamp, IndexerConfig};
use session_scope_types::{CalendarDimension, ScanScope};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::indexer::SessionIndex;
use crate::pool::BoundedPool;
use crate::IndexResult;

impl SessionIndex {
    /// Files per day of the month starting at `month_start`.
    pub async fn compute_calendar_counts(
        &self,
        month_start: NaiveDate,
        dimension: CalendarDimension,
    ) -> IndexResult<BTreeMap<u32, usize>> {
        match dimension {
            CalendarDimension::Created => {
                let config = self.config().clone();
                let counts =
                    tokio::task::spawn_blocking(move || count_created_by_day(&config, month_start))
                        .await?;
                Ok(counts)
            }
            CalendarDimension::Updated => {
                let index = self.build_updated_index().await?;
                Ok(count_updated_by_day(&index, month_start))
            }
        }
    }

    /// Tail timestamp of every log file under the root. Files without a
    /// readable timestamp are left out.
    pub async fn build_updated_index(&self) -> IndexResult<HashMap<PathBuf, DateTime<Utc>>> {
        let start = Instant::now();
        let files = self.scope_files(ScanScope::All).await?;
        let total = files.len();

        let mut pool = BoundedPool::new(files, self.config().worker_count(), |path: PathBuf| {
            let updated = read_tail_timestamp(&path);
            (path, updated)
        });

        let mut index = HashMap::with_capacity(total);
        while let Some(joined) = pool.next().await {
            match joined {
                Ok((path, Some(updated))) => {
                    index.insert(path, updated);
                }
                Ok((path, None)) => debug!(path = %path.display(), "no tail timestamp"),
                Err(e) => warn!(error = %e, "tail task failed"),
            }
        }

        info!(
            files = total,
            indexed = index.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "updated index built"
        );
        Ok(index)
    }
}

/// Log files per numbered day directory of the month. Both `07` and `7`
/// count toward day 7.
pub fn count_created_by_day(config: &IndexerConfig, month_start: NaiveDate) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    let Some(month) = month_dir(&config.sessions_root, month_start.year(), month_start.month()) else {
        return counts;
    };
    let entries = match std::fs::read_dir(&month) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %month.display(), error = %e, "month directory unreadable");
            return counts;
        }
    };

    for entry in entries.flatten() {
        let Some(day) = entry.file_name().to_str().and_then(parse_numbered_dir) else {
            continue;
        };
        if NaiveDate::from_ymd_opt(month_start.year(), month_start.month(), day).is_none() {
            continue;
        }
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }

        let files = WalkDir::new(entry.path())
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && config.is_log_file(e.path()))
            .count();
        if files > 0 {
            *counts.entry(day).or_insert(0) += files;
        }
    }
    counts
}

fn local_date(ts: &DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

/// Entries of `index` per local day, restricted to the month of `month_start`.
pub fn count_updated_by_day(
    index: &HashMap<PathBuf, DateTime<Utc>>,
    month_start: NaiveDate,
) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for ts in index.values() {
        let date = local_date(ts);
        if date.year() == month_start.year() && date.month() == month_start.month() {
            *counts.entry(date.day()).or_insert(0) += 1;
        }
    }
    counts
}

/// Paths whose last update falls on local `day`, sorted.
pub fn files_for_updated_day(day: NaiveDate, index: &HashMap<PathBuf, DateTime<Utc>>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = index
        .iter()
        .filter(|(_, ts)| local_date(ts) == day)
        .map(|(path, _)| path.clone())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_created_counts_mixed_padding() {
        let dir = TempDir::new().unwrap();
        let month = dir.path().join("2025/01");
        for (day, files) in [("03", 2), ("3", 1), ("15", 1), ("notaday", 4), ("40", 1)] {
            std::fs::create_dir_all(month.join(day)).unwrap();
            for i in 0..files {
                std::fs::write(month.join(day).join(format!("s{i}.jsonl")), "{}").unwrap();
            }
        }
        std::fs::write(month.join("15/readme.txt"), "x").unwrap();

        let config = IndexerConfig::new(dir.path(), dir.path().join("cache"));
        let counts = count_created_by_day(&config, date(2025, 1, 1));
        assert_eq!(counts, BTreeMap::from([(3, 3), (15, 1)]));
    }

    #[test]
    fn test_created_missing_month_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = IndexerConfig::new(dir.path(), dir.path().join("cache"));
        assert!(count_created_by_day(&config, date(2025, 1, 1)).is_empty());
    }

    #[test]
    fn test_updated_counts_and_day_lookup() {
        let index: HashMap<PathBuf, DateTime<Utc>> = HashMap::from([
            (PathBuf::from("/b.jsonl"), noon(2025, 2, 3)),
            (PathBuf::from("/a.jsonl"), noon(2025, 2, 3)),
            (PathBuf::from("/c.jsonl"), noon(2025, 2, 10)),
            (PathBuf::from("/d.jsonl"), noon(2025, 1, 31)),
        ]);

        let counts = count_updated_by_day(&index, date(2025, 2, 1));
        assert_eq!(counts, BTreeMap::from([(3, 2), (10, 1)]));

        assert_eq!(
            files_for_updated_day(date(2025, 2, 3), &index),
            vec![PathBuf::from("/a.jsonl"), PathBuf::from("/b.jsonl")]
        );
        assert!(files_for_updated_day(date(2025, 2, 4), &index).is_empty());
    }
}
