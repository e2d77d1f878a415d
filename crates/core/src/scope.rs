// crates/core/src/scope.rs
//! Scope resolution for the date-partitioned log tree.
//!
//! Logs live under `root/YEAR/MONTH/DAY/`. Producers are not consistent about
//! zero-padding, so `07` and `7` must both resolve for July.

use chrono::{Datelike, Local, NaiveDate};
use std::path::{Path, PathBuf};

use session_scope_types::ScanScope;

/// Resolve `scope` to the directory to enumerate, using the local date for `Today`.
///
/// Returns `None` when any level is missing. That is the normal state for a
/// day with no sessions yet, not an error.
pub fn resolve_scope_dir(root: &Path, scope: &ScanScope) -> Option<PathBuf> {
    resolve_scope_dir_at(root, scope, Local::now().date_naive())
}

/// Same as [`resolve_scope_dir`] with an explicit notion of "today".
pub fn resolve_scope_dir_at(root: &Path, scope: &ScanScope, today: NaiveDate) -> Option<PathBuf> {
    match scope.pin(today) {
        ScanScope::Day(date) => day_dir(root, date),
        ScanScope::Month(date) => month_dir(root, date.year(), date.month()),
        ScanScope::All | ScanScope::Today => root.is_dir().then(|| root.to_path_buf()),
    }
}

/// `root/YEAR/MONTH`, tolerant of padding.
pub fn month_dir(root: &Path, year: i32, month: u32) -> Option<PathBuf> {
    let year_dir = numbered_child(root, year.unsigned_abs())?;
    numbered_child(&year_dir, month)
}

/// `root/YEAR/MONTH/DAY`, tolerant of padding.
pub fn day_dir(root: &Path, date: NaiveDate) -> Option<PathBuf> {
    let month = month_dir(root, date.year(), date.month())?;
    numbered_child(&month, date.day())
}

/// Find `parent/NN` (two-digit zero-padded) or `parent/N`, whichever exists first.
pub fn numbered_child(parent: &Path, value: u32) -> Option<PathBuf> {
    let padded = parent.join(format!("{value:02}"));
    if padded.is_dir() {
        return Some(padded);
    }
    let bare = parent.join(value.to_string());
    bare.is_dir().then_some(bare)
}

/// Parse a numbered directory name (`"07"`, `"7"`) into its value.
pub fn parse_numbered_dir(name: &str) -> Option<u32> {
    if name.is_empty() || name.len() > 4 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
