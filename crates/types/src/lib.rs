// crates/types/src/lib.rs
//! Shared types for the session-scope crates.
//!
//! Everything here is plain data: serializable, clonable, no I/O.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Queryable snapshot of one session log file.
///
/// `last_updated_at` only ever comes from timestamps written inside the log.
/// A filesystem mtime bump without an append must not look like activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id from the session-start row, or the file stem.
    pub id: String,
    pub path: PathBuf,
    pub file_size: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Sum of per-turn elapsed time. Only set by enrichment.
    #[serde(
        default,
        with = "duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub active_duration: Option<Duration>,
    pub user_message_count: u32,
    pub assistant_message_count: u32,
    pub tool_invocation_count: u32,
    pub turn_count: u32,
    pub line_count: u32,
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SessionSummary {
    /// Sort key for "most recent first" listings. Falls back to the start time
    /// when no in-content update timestamp is known.
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_updated_at.unwrap_or(self.started_at)
    }
}

/// Sort summaries newest first. Batches come back in completion order.
pub fn sort_by_recency(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| b.recency().cmp(&a.recency()));
}

/// Time window selecting which subtree of `root/YEAR/MONTH/DAY` is enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "date", rename_all = "camelCase")]
pub enum ScanScope {
    Today,
    Day(NaiveDate),
    /// Any date inside the month.
    Month(NaiveDate),
    All,
}

impl ScanScope {
    /// Month scope anchored at the first day of `year`/`month`.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self::Month)
    }

    /// Replace `Today` with the concrete day it means on `today`.
    pub fn pin(self, today: NaiveDate) -> Self {
        match self {
            Self::Today => Self::Day(today),
            other => other,
        }
    }
}

/// Which timestamp buckets a file in calendar views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalendarDimension {
    /// The day directory the file lives in. Never opens the file.
    Created,
    /// The day of the file's tail timestamp. Scans the whole tree.
    Updated,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64))
    }
}
