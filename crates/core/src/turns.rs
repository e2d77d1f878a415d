// crates/core/src/turns.rs
//! Turn grouping and active-duration arithmetic for enrichment.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::row::{is_injected_context, Role, Row, RowKind};

/// One input followed by the responses it produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    pub input_at: Option<DateTime<Utc>>,
    pub input_text: Option<String>,
    pub responses: Vec<DateTime<Utc>>,
}

impl Turn {
    /// Elapsed time from the input (or the first response) to the last response.
    ///
    /// Zero without responses; spans that run backwards clamp to zero.
    pub fn span(&self) -> Duration {
        let (Some(first), Some(last)) = (self.responses.first(), self.responses.last()) else {
            return Duration::ZERO;
        };
        let start = self.input_at.unwrap_or(*first);
        (*last - start).to_std().unwrap_or(Duration::ZERO)
    }
}

pub trait TurnGrouper: Send + Sync {
    fn group(&self, rows: &[Row]) -> Vec<Turn>;
}

/// Starts a new turn at every user message. Assistant messages and tool calls
/// are responses; responses before the first input form a turn of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputBoundaryGrouper;

impl TurnGrouper for InputBoundaryGrouper {
    fn group(&self, rows: &[Row]) -> Vec<Turn> {
        let mut turns: Vec<Turn> = Vec::new();
        let mut current: Option<Turn> = None;

        for row in rows {
            match &row.kind {
                RowKind::Message(msg) if msg.role == Role::User => {
                    if let Some(done) = current.take() {
                        turns.push(done);
                    }
                    current = Some(Turn {
                        input_at: row.timestamp,
                        input_text: msg.text.clone(),
                        responses: Vec::new(),
                    });
                }
                RowKind::Message(msg) if msg.role == Role::Assistant => {
                    push_response(&mut current, row.timestamp);
                }
                RowKind::ToolCall(_) => push_response(&mut current, row.timestamp),
                _ => {}
            }
        }

        turns.extend(current);
        turns
    }
}

fn push_response(current: &mut Option<Turn>, at: Option<DateTime<Utc>>) {
    let turn = current.get_or_insert_with(Turn::default);
    if let Some(at) = at {
        turn.responses.push(at);
    }
}

/// Predicate deciding which turns are left out of the active duration.
#[derive(Clone)]
pub struct TurnFilter(Arc<dyn Fn(&Turn) -> bool + Send + Sync>);

impl TurnFilter {
    /// `exclude` returns true for turns that must not count.
    pub fn new<F>(exclude: F) -> Self
    where
        F: Fn(&Turn) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(exclude))
    }

    /// Count every turn.
    pub fn keep_all() -> Self {
        Self::new(|_| false)
    }

    pub fn excludes(&self, turn: &Turn) -> bool {
        (self.0)(turn)
    }
}

/// Excludes turns whose input is harness-injected environment context.
impl Default for TurnFilter {
    fn default() -> Self {
        Self::new(|turn| turn.input_text.as_deref().is_some_and(is_injected_context))
    }
}

impl std::fmt::Debug for TurnFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TurnFilter(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveDuration {
    pub total: Duration,
    /// False when cancellation stopped the sum early.
    pub complete: bool,
}

/// Sum of [`Turn::span`] over turns the filter keeps.
///
/// Cancellation is checked before each turn; a cancelled sum is partial.
pub fn active_duration(turns: &[Turn], filter: &TurnFilter, cancel: &CancellationToken) -> ActiveDuration {
    let mut total = Duration::ZERO;
    for turn in turns {
        if cancel.is_cancelled() {
            return ActiveDuration { total, complete: false };
        }
        if filter.excludes(turn) {
            continue;
        }
        total += turn.span();
    }
    ActiveDuration { total, complete: true }
}
