use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use tracing::trace;

use crate::reader::is_blank;

/// First read from EOF: 4KB, doubled on each retry.
const INITIAL_CHUNK: u64 = 4 * 1024;

/// Never read more than 1MB from the tail.
const MAX_CHUNK: u64 = 1024 * 1024;

const MAX_ATTEMPTS: u32 = 3;

/// `"timestamp"` is normally the first key, so the head of the line is enough.
const HEAD_BYTES: usize = 100;

static TIMESTAMP_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn timestamp_regex() -> Option<&'static Regex> {
    TIMESTAMP_RE
        .get_or_init(|| Regex::new(r#""timestamp"\s*:\s*"([^"]+)""#).ok())
        .as_ref()
}

/// Timestamp of the last complete JSON record in `path`.
///
/// Reads only the end of the file: 4KB, then 8KB, then 16KB, stopping as soon
/// as the last non-empty line looks complete. `None` means "unknown" (empty or
/// unreadable file, truncated line, no parseable timestamp) and is never an
/// error.
pub fn read_tail_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    match last_complete_line(path) {
        Ok(Some(line)) => timestamp_from_line(&line),
        Ok(None) => None,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "tail read failed");
            None
        }
    }
}

/// Last non-empty line of `path` that is plausibly a whole JSON object.
///
/// Edge cases handled:
/// - A trailing newline (or `\r\n`) at EOF does not produce an empty last line
/// - A line cut by the seek boundary is retried with a larger chunk, even when
///   the cut happens to land on a `{`
/// - Once a chunk spans the whole file there is nothing more to retry
pub fn last_complete_line(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    if file_len == 0 {
        return Ok(None);
    }

    for attempt in 0..MAX_ATTEMPTS {
        let chunk_len = (INITIAL_CHUNK << attempt).min(MAX_CHUNK).min(file_len);
        let offset = file_len - chunk_len;

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(chunk_len as usize);
        file.read_to_end(&mut buf)?;

        if let Some((line, has_boundary)) = last_non_empty_line(&buf) {
            // Without a newline in front, the line may have started before `offset`.
            let complete = has_boundary || offset == 0;
            if complete && line.first() == Some(&b'{') {
                return Ok(Some(String::from_utf8_lossy(line).into_owned()));
            }
            if complete {
                return Ok(None);
            }
        }

        if offset == 0 {
            break;
        }
    }

    Ok(None)
}

/// Returns the last non-blank line and whether a newline precedes it in `buf`.
fn last_non_empty_line(buf: &[u8]) -> Option<(&[u8], bool)> {
    let mut end = buf.len();
    loop {
        let start = memchr::memrchr(b'\n', &buf[..end]).map(|i| i + 1).unwrap_or(0);
        let raw = &buf[start..end];
        let line = raw.strip_suffix(b"\r").unwrap_or(raw);
        if !is_blank(line) {
            return Some((line, start > 0));
        }
        if start == 0 {
            return None;
        }
        end = start - 1;
    }
}

/// Pull `"timestamp":"..."` out of a JSON line and parse it as RFC 3339.
///
/// Looks at the first 100 bytes first and falls back to the whole line.
pub fn timestamp_from_line(line: &str) -> Option<DateTime<Utc>> {
    let re = timestamp_regex()?;
    let head = line.get(..HEAD_BYTES.min(line.len()));

    let captured = head
        .and_then(|h| re.captures(h))
        .or_else(|| re.captures(line))?;
    let raw = captured.get(1)?.as_str();
    parse_timestamp(raw)
}

/// Timestamp from the first 100 bytes of a raw line only. `None` when the key
/// is absent there or the value runs past the head.
pub fn timestamp_from_head(line: &[u8]) -> Option<DateTime<Utc>> {
    let head = &line[..HEAD_BYTES.min(line.len())];
    let head = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&head[..e.valid_up_to()]).ok()?,
    };
    let captured = timestamp_regex()?.captures(head)?;
    parse_timestamp(captured.get(1)?.as_str())
}

/// Strict RFC 3339 with optional fractional seconds, normalized to UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
