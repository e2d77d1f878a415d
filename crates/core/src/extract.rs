// crates/core/src/extract.rs
use std::path::Path;

use tracing::trace;

use crate::reader::{map_file, non_empty_lines};
use crate::row::RowDecoder;

/// Lines inspected by [`extract_cwd`] before giving up.
pub const CWD_SCAN_LINES: usize = 200;

/// Working directory of a session without building a summary.
///
/// Takes the first session-start or turn-boundary row carrying a non-empty cwd
/// within the first [`CWD_SCAN_LINES`] non-empty lines.
pub fn extract_cwd(path: &Path, decoder: &dyn RowDecoder) -> Option<String> {
    let data = match map_file(path) {
        Ok(data) => data,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "cwd scan skipped");
            return None;
        }
    };

    let found = non_empty_lines(&data)
        .take(CWD_SCAN_LINES)
        .filter_map(|line| decoder.decode(line).ok())
        .find_map(|row| row.cwd().map(str::to_string));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::JsonRowDecoder;
    use tempfile::TempDir;

    const EVENT: &str = r#"{"type":"event_msg","payload":{"type":"token_count"}}"#;

    #[test]
    fn test_cwd_from_session_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jsonl");
        std::fs::write(
            &path,
            "{broken\n{\"type\":\"session_meta\",\"payload\":{\"id\":\"x\",\"cwd\":\"/work/a\"}}\n",
        )
        .unwrap();
        assert_eq!(extract_cwd(&path, &JsonRowDecoder::new()).as_deref(), Some("/work/a"));
    }

    #[test]
    fn test_cwd_from_turn_boundary_when_meta_has_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.jsonl");
        std::fs::write(
            &path,
            "{\"type\":\"session_meta\",\"payload\":{\"id\":\"x\",\"cwd\":\"\"}}\n{\"type\":\"turn_context\",\"payload\":{\"cwd\":\"/work/b\"}}\n",
        )
        .unwrap();
        assert_eq!(extract_cwd(&path, &JsonRowDecoder::new()).as_deref(), Some("/work/b"));
    }

    #[test]
    fn test_scan_is_bounded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.jsonl");
        let mut content = format!("{EVENT}\n").repeat(CWD_SCAN_LINES);
        content.push_str("{\"type\":\"turn_context\",\"payload\":{\"cwd\":\"/too/late\"}}\n");
        std::fs::write(&path, content).unwrap();
        assert_eq!(extract_cwd(&path, &JsonRowDecoder::new()), None);
    }

    #[test]
    fn test_missing_file() {
        assert_eq!(extract_cwd(Path::new("/nonexistent/x.jsonl"), &JsonRowDecoder::new()), None);
    }
}
