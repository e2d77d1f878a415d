// crates/core/src/builder.rs
//! Fold rows into a [`SessionSummary`].
//!
//! Two modes share one accumulator:
//! - **fast**: decode a bounded prefix, tally the rest through
//!   [`RowDecoder::tally`] so every counter stays exact
//! - **full**: decode everything and keep the rows (used by enrichment and as
//!   the fallback when fast mode finds no session start)

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use session_scope_types::SessionSummary;

use crate::error::{DecodeError, ParseError};
use crate::reader::{is_blank, map_file, non_empty_lines, split_lines};
use crate::row::{is_injected_context, LineClass, Role, Row, RowDecoder, RowKind, SessionMeta};
use crate::tail::timestamp_from_head;

/// Titles are the first real user message, cut to this many characters.
pub const TITLE_MAX_CHARS: usize = 120;

/// Per-file accumulator. Never persisted.
#[derive(Debug)]
pub struct SummaryBuilder {
    path: PathBuf,
    file_size: u64,
    last_updated_hint: Option<DateTime<Utc>>,
    meta: Option<SessionMeta>,
    meta_row_at: Option<DateTime<Utc>>,
    earliest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    user_messages: u32,
    assistant_messages: u32,
    tool_invocations: u32,
    turns: u32,
    lines: u32,
    turn_cwd: Option<String>,
    model: Option<String>,
    title: Option<String>,
    first_error: Option<(usize, String)>,
}

impl SummaryBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_size: 0,
            last_updated_hint: None,
            meta: None,
            meta_row_at: None,
            earliest: None,
            latest: None,
            user_messages: 0,
            assistant_messages: 0,
            tool_invocations: 0,
            turns: 0,
            lines: 0,
            turn_cwd: None,
            model: None,
            title: None,
            first_error: None,
        }
    }

    /// Seed with filesystem size and the tail timestamp, both known before parsing.
    pub fn seed(&mut self, file_size: u64, last_updated_hint: Option<DateTime<Utc>>) {
        self.file_size = file_size;
        self.last_updated_hint = last_updated_hint;
    }

    pub fn has_essential_metadata(&self) -> bool {
        self.meta.is_some()
    }

    pub fn line_count(&self) -> u32 {
        self.lines
    }

    /// Whether a user message still needs decoding to pick a title.
    pub fn wants_title(&self) -> bool {
        self.title.is_none()
    }

    pub fn count_line(&mut self) {
        self.lines = self.lines.saturating_add(1);
    }

    pub fn observe(&mut self, row: &Row) {
        if let Some(ts) = row.timestamp {
            self.observe_timestamp(ts);
        }

        match &row.kind {
            RowKind::SessionStart(meta) => {
                // First session start wins; resumed sessions repeat it.
                if self.meta.is_none() {
                    self.meta = Some(meta.clone());
                    self.meta_row_at = row.timestamp;
                }
            }
            RowKind::TurnBoundary(ctx) => {
                self.turns += 1;
                if let Some(model) = ctx.model.as_ref().filter(|m| !m.is_empty()) {
                    self.model = Some(model.clone());
                }
                if self.turn_cwd.is_none() {
                    self.turn_cwd = ctx.cwd.clone().filter(|c| !c.is_empty());
                }
            }
            RowKind::Message(msg) => match msg.role {
                Role::User => {
                    self.user_messages += 1;
                    if self.title.is_none() {
                        if let Some(text) = msg.text.as_deref() {
                            if !is_injected_context(text) && !text.trim().is_empty() {
                                self.title = Some(truncate_preview(text, TITLE_MAX_CHARS));
                            }
                        }
                    }
                }
                Role::Assistant => self.assistant_messages += 1,
                Role::Other => {}
            },
            RowKind::ToolCall(_) => self.tool_invocations += 1,
            RowKind::Other => {}
        }
    }

    fn observe_timestamp(&mut self, ts: DateTime<Utc>) {
        self.earliest = Some(self.earliest.map_or(ts, |e| e.min(ts)));
        self.latest = Some(self.latest.map_or(ts, |l| l.max(ts)));
    }

    /// Count a line that was classified but not decoded.
    pub fn observe_class(&mut self, class: LineClass) {
        match class {
            LineClass::TurnBoundary => self.turns += 1,
            LineClass::UserMessage => self.user_messages += 1,
            LineClass::AssistantMessage => self.assistant_messages += 1,
            LineClass::ToolCall => self.tool_invocations += 1,
            LineClass::SessionStart | LineClass::Other => {}
        }
    }

    /// Classify a line past the decode cap.
    ///
    /// Only well-formed lines with a timestamp in their head are tallied.
    /// Anything else (a half-written tail, a line with no leading timestamp)
    /// goes through the decoder so it counts exactly as in full mode. Turn
    /// boundaries and a still-missing title are decoded too.
    pub fn tally(&mut self, decoder: &dyn RowDecoder, line: &[u8]) {
        let ts = if looks_complete(line) {
            timestamp_from_head(line)
        } else {
            None
        };
        let Some(ts) = ts else {
            self.decode_and_observe(decoder, line);
            return;
        };

        let class = decoder.tally(line);
        let needs_decode = match class {
            LineClass::TurnBoundary => true,
            LineClass::UserMessage => self.wants_title(),
            _ => false,
        };
        if needs_decode {
            self.decode_and_observe(decoder, line);
            return;
        }
        self.observe_timestamp(ts);
        self.observe_class(class);
    }

    fn decode_and_observe(&mut self, decoder: &dyn RowDecoder, line: &[u8]) {
        // Per-line decode errors are expected in live files; skip them.
        if let Ok(row) = decoder.decode(line) {
            self.observe(&row);
        }
    }

    /// Remember the first decode failure (1-based line number).
    pub fn record_error(&mut self, line: usize, err: &DecodeError) {
        if self.first_error.is_none() {
            self.first_error = Some((line, err.to_string()));
        }
    }

    pub fn take_first_error(&mut self) -> Option<(usize, String)> {
        self.first_error.take()
    }

    /// Produce the summary. `None` unless a session-start row was observed.
    pub fn build(self) -> Option<SessionSummary> {
        let meta = self.meta?;
        let started_at = meta
            .timestamp
            .or(self.meta_row_at)
            .or(self.earliest)
            .or(self.last_updated_hint)?;

        let latest = match (self.latest, self.last_updated_hint) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let id = meta
            .id
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        let cwd = meta
            .cwd
            .filter(|c| !c.is_empty())
            .or(self.turn_cwd)
            .unwrap_or_default();

        Some(SessionSummary {
            id,
            path: self.path,
            file_size: self.file_size,
            started_at,
            ended_at: latest,
            last_updated_at: latest,
            active_duration: None,
            user_message_count: self.user_messages,
            assistant_message_count: self.assistant_messages,
            tool_invocation_count: self.tool_invocations,
            turn_count: self.turns,
            line_count: self.lines,
            cwd,
            model: self.model,
            originator: meta.originator,
            cli_version: meta.cli_version,
            model_provider: meta.model_provider,
            title: self.title,
            comment: None,
        })
    }
}

/// A single JSON object on one line, as far as its first and last bytes tell.
fn looks_complete(line: &[u8]) -> bool {
    let first = line.iter().find(|b| !b.is_ascii_whitespace());
    let last = line.iter().rev().find(|b| !b.is_ascii_whitespace());
    matches!((first, last), (Some(b'{'), Some(b'}')))
}

/// Fast mode: decode at most `line_cap` lines once a session start has been seen.
///
/// Returns `Ok(None)` when the file has no session-start row at all.
pub fn build_fast(
    path: &Path,
    file_size: u64,
    last_updated_hint: Option<DateTime<Utc>>,
    decoder: &dyn RowDecoder,
    line_cap: usize,
) -> Result<Option<SessionSummary>, ParseError> {
    let data = map_file(path)?;
    let mut builder = SummaryBuilder::new(path);
    builder.seed(file_size, last_updated_hint);

    let mut decoded = 0usize;
    let mut decoding = true;
    let mut lines = non_empty_lines(&data).peekable();
    while let Some(line) = lines.next() {
        builder.count_line();
        // The last line of a live file may still be half written.
        if !decoding && lines.peek().is_some() {
            builder.tally(decoder, line);
            continue;
        }

        builder.decode_and_observe(decoder, line);
        decoded += 1;
        if decoded >= line_cap && builder.has_essential_metadata() {
            decoding = false;
        }
    }

    Ok(builder.build())
}

/// Result of a full parse: the summary plus every decoded row.
#[derive(Debug)]
pub struct FullParse {
    pub summary: SessionSummary,
    pub rows: Vec<Row>,
}

/// Full mode: decode every line with no cap.
pub fn build_full(
    path: &Path,
    file_size: u64,
    last_updated_hint: Option<DateTime<Utc>>,
    decoder: &dyn RowDecoder,
) -> Result<FullParse, ParseError> {
    let data = map_file(path)?;
    let mut builder = SummaryBuilder::new(path);
    builder.seed(file_size, last_updated_hint);
    let mut rows = Vec::new();

    for (idx, line) in split_lines(&data).enumerate() {
        if is_blank(line) {
            continue;
        }
        builder.count_line();
        match decoder.decode(line) {
            Ok(row) => {
                builder.observe(&row);
                rows.push(row);
            }
            Err(e) => builder.record_error(idx + 1, &e),
        }
    }

    let empty = builder.line_count() == 0;
    let first_error = builder.take_first_error();
    match builder.build() {
        Some(summary) => Ok(FullParse { summary, rows }),
        None if empty => Err(ParseError::EmptyFile {
            path: path.to_path_buf(),
        }),
        None => Err(match first_error {
            Some((line, message)) => ParseError::MalformedJson {
                path: path.to_path_buf(),
                line,
                message,
            },
            None => ParseError::MissingSessionMeta {
                path: path.to_path_buf(),
            },
        }),
    }
}

/// Fast mode, falling back to full mode when fast finds no session start.
pub fn build_summary(
    path: &Path,
    file_size: u64,
    last_updated_hint: Option<DateTime<Utc>>,
    decoder: &dyn RowDecoder,
    line_cap: usize,
) -> Result<SessionSummary, ParseError> {
    if let Some(summary) = build_fast(path, file_size, last_updated_hint, decoder, line_cap)? {
        return Ok(summary);
    }
    debug!(path = %path.display(), "fast parse found no session start, retrying in full mode");
    build_full(path, file_size, last_updated_hint, decoder).map(|full| full.summary)
}

/// Truncate a preview string to `max_len` characters, preferring a word boundary.
pub fn truncate_preview(text: &str, max_len: usize) -> String {
    let trimmed = text.trim();

    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }

    let truncated: String = trimmed.chars().take(max_len).collect();

    // rfind gives a byte index; the half-way check needs chars.
    if let Some(space_byte_idx) = truncated.rfind(' ') {
        let space_char_idx = truncated[..space_byte_idx].chars().count();
        if space_char_idx > max_len / 2 {
            let up_to_space: String = truncated.chars().take(space_char_idx).collect();
            return format!("{}...", up_to_space.trim_end());
        }
    }

    format!("{}...", truncated.trim_end())
}
