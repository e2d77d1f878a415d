// crates/db/src/disk.rs
//! Persistent summary index: one JSON array file, loaded once, rewritten whole.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use session_scope_types::SessionSummary;
use tracing::{debug, warn};

use crate::{IndexError, IndexResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskCacheEntry {
    pub path: PathBuf,
    /// Signed nanoseconds from the epoch, so pre-1970 times still serialize.
    #[serde(default, with = "modified_nanos")]
    pub modified: Option<SystemTime>,
    pub summary: SessionSummary,
}

pub struct DiskIndex {
    file: PathBuf,
    entries: Mutex<HashMap<PathBuf, DiskCacheEntry>>,
    /// Serializes snapshot + write so an older snapshot never lands last.
    write_lock: Mutex<()>,
}

impl DiskIndex {
    /// Load the index at `file`. A missing file is an empty index; so is a
    /// corrupt one, which is logged and left in place until the next save.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let entries = match std::fs::read(&file) {
            Ok(bytes) => match serde_json::from_slice::<Vec<DiskCacheEntry>>(&bytes) {
                Ok(list) => list.into_iter().map(|e| (e.path.clone(), e)).collect(),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "summary index is corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %file.display(), error = %e, "summary index unreadable, starting empty");
                HashMap::new()
            }
        };
        debug!(path = %file.display(), entries = entries.len(), "summary index loaded");

        Self {
            file,
            entries: Mutex::new(entries),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Stored summary for `path` if it was built at exactly `modified`.
    pub fn get(&self, path: &Path, modified: Option<SystemTime>) -> Option<SessionSummary> {
        let entries = self.lock();
        let entry = entries.get(path)?;
        (entry.modified == modified).then(|| entry.summary.clone())
    }

    /// Stored entry for `path` regardless of freshness.
    pub fn entry(&self, path: &Path) -> Option<DiskCacheEntry> {
        self.lock().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace entries, then rewrite the file once. No-op when empty.
    pub fn upsert_many(&self, batch: Vec<DiskCacheEntry>) -> IndexResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        {
            let mut entries = self.lock();
            for entry in batch {
                entries.insert(entry.path.clone(), entry);
            }
        }
        self.save()
    }

    /// Write the whole index atomically (temp file in the same dir, then rename).
    pub fn save(&self) -> IndexResult<()> {
        let _write = lock_ignoring_poison(&self.write_lock);

        let mut snapshot: Vec<DiskCacheEntry> = self.lock().values().cloned().collect();
        snapshot.sort_by(|a, b| a.path.cmp(&b.path));
        let json = serde_json::to_vec(&snapshot)?;

        let dir = self
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| IndexError::io(dir, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| IndexError::io(dir, e))?;
        tmp.write_all(&json).map_err(|e| IndexError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| IndexError::io(tmp.path(), e))?;
        tmp.persist(&self.file)
            .map_err(|e| IndexError::io(&self.file, e.error))?;

        debug!(path = %self.file.display(), entries = snapshot.len(), "summary index saved");
        Ok(())
    }

    /// Forget everything and delete the file.
    pub fn reset(&self) -> IndexResult<()> {
        let _write = lock_ignoring_poison(&self.write_lock);
        self.lock().clear();
        match std::fs::remove_file(&self.file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::io(&self.file, e)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, DiskCacheEntry>> {
        lock_ignoring_poison(&self.entries)
    }
}

mod modified_nanos {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value.and_then(to_nanos) {
            Some(nanos) => serializer.serialize_some(&nanos),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<i64>::deserialize(deserializer)?.and_then(from_nanos))
    }

    /// `None` past roughly 292 years either side of 1970.
    pub(super) fn to_nanos(time: SystemTime) -> Option<i64> {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()).ok(),
            Err(e) => i64::try_from(e.duration().as_nanos()).ok().map(|n| -n),
        }
    }

    pub(super) fn from_nanos(nanos: i64) -> Option<SystemTime> {
        let offset = Duration::from_nanos(nanos.unsigned_abs());
        if nanos >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        }
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry(path: &str, secs: u64) -> DiskCacheEntry {
        DiskCacheEntry {
            path: PathBuf::from(path),
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs)),
            summary: SessionSummary {
                id: path.trim_start_matches('/').to_string(),
                path: PathBuf::from(path),
                file_size: 10,
                started_at: Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap(),
                ended_at: None,
                last_updated_at: None,
                active_duration: None,
                user_message_count: 1,
                assistant_message_count: 1,
                tool_invocation_count: 0,
                turn_count: 1,
                line_count: 3,
                cwd: "/tmp/proj".into(),
                model: None,
                originator: None,
                cli_version: None,
                model_provider: None,
                title: None,
                comment: None,
            },
        }
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nested/summary-index.json");

        let index = DiskIndex::load(&file);
        assert!(index.is_empty());
        index
            .upsert_many(vec![entry("/a.jsonl", 1), entry("/b.jsonl", 2)])
            .unwrap();
        assert!(file.exists());

        let reloaded = DiskIndex::load(&file);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.entry(Path::new("/a.jsonl")), Some(entry("/a.jsonl", 1)));
    }

    #[test]
    fn test_get_checks_modified_time() {
        let dir = TempDir::new().unwrap();
        let index = DiskIndex::load(dir.path().join("i.json"));
        index.upsert_many(vec![entry("/a.jsonl", 5)]).unwrap();

        let t5 = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(5));
        let t6 = Some(SystemTime::UNIX_EPOCH + Duration::from_secs(6));
        assert!(index.get(Path::new("/a.jsonl"), t5).is_some());
        assert!(index.get(Path::new("/a.jsonl"), t6).is_none());
        assert!(index.get(Path::new("/a.jsonl"), None).is_none());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("i.json");
        std::fs::write(&file, b"[{\"path\": tru").unwrap();
        let index = DiskIndex::load(&file);
        assert!(index.is_empty());

        index.upsert_many(vec![entry("/a.jsonl", 1)]).unwrap();
        assert_eq!(DiskIndex::load(&file).len(), 1);
    }

    #[test]
    fn test_reset_deletes_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("i.json");
        let index = DiskIndex::load(&file);
        index.upsert_many(vec![entry("/a.jsonl", 1)]).unwrap();

        index.reset().unwrap();
        assert!(!file.exists());
        assert!(index.is_empty());
        // Resetting twice is fine.
        index.reset().unwrap();
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("i.json");
        DiskIndex::load(&file).upsert_many(Vec::new()).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_pre_epoch_modified_time_persists() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("i.json");
        let before_1970 = Some(SystemTime::UNIX_EPOCH - Duration::from_millis(10_500));
        let mut old = entry("/old.jsonl", 0);
        old.modified = before_1970;

        let index = DiskIndex::load(&file);
        index.upsert_many(vec![old.clone()]).unwrap();
        index.upsert_many(vec![entry("/new.jsonl", 7)]).unwrap();

        let reloaded = DiskIndex::load(&file);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.entry(Path::new("/old.jsonl")), Some(old));
        assert!(reloaded.get(Path::new("/old.jsonl"), before_1970).is_some());

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&file).unwrap()).unwrap();
        let stored: Vec<i64> = raw
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["modified"].as_i64().unwrap())
            .collect();
        assert_eq!(stored, vec![7_000_000_000, -10_500_000_000]);
    }

    #[test]
    fn test_modified_nanos_bounds() {
        use super::modified_nanos::{from_nanos, to_nanos};
        let before = SystemTime::UNIX_EPOCH - Duration::from_nanos(1);
        assert_eq!(to_nanos(SystemTime::UNIX_EPOCH), Some(0));
        assert_eq!(to_nanos(before), Some(-1));
        assert_eq!(from_nanos(-1), Some(before));
        let far_future = SystemTime::UNIX_EPOCH + Duration::from_secs(400 * 365 * 86_400);
        assert_eq!(to_nanos(far_future), None);
    }

    #[test]
    fn test_file_is_flat_json_array() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("i.json");
        DiskIndex::load(&file)
            .upsert_many(vec![entry("/a.jsonl", 1)])
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&file).unwrap()).unwrap();
        let list = value.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["path"], "/a.jsonl");
        assert_eq!(list[0]["summary"]["cwd"], "/tmp/proj");
    }
}
