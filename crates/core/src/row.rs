// crates/core/src/row.rs
//! Typed view of one log line.
//!
//! Rollout lines look like
//! `{"timestamp":"...","type":"response_item","payload":{...}}`. Only the
//! handful of fields the summary needs are extracted; everything else is
//! [`RowKind::Other`].

use chrono::{DateTime, Utc};
use memchr::memmem;
use serde::Deserialize;
use serde_json::Value;

use crate::error::DecodeError;
use crate::tail::parse_timestamp;

/// Text prefixes of user-role messages injected by the harness rather than typed by a person.
const INJECTED_PREFIXES: &[&str] = &[
    "<environment_context>",
    "<user_instructions>",
    "<user_shell_command>",
];

/// True when a user-role message is harness-injected context.
pub fn is_injected_context(text: &str) -> bool {
    let trimmed = text.trim_start();
    INJECTED_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: RowKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    SessionStart(SessionMeta),
    TurnBoundary(TurnContext),
    Message(MessageRow),
    ToolCall(ToolCallRow),
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionMeta {
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub cwd: Option<String>,
    pub originator: Option<String>,
    pub cli_version: Option<String>,
    pub model_provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TurnContext {
    pub cwd: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub role: Role,
    /// Concatenated text parts, `None` when the message carried no text.
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRow {
    pub name: Option<String>,
}

/// Coarse class of a line, enough to keep summary counters exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    SessionStart,
    TurnBoundary,
    UserMessage,
    AssistantMessage,
    ToolCall,
    Other,
}

impl Row {
    pub fn class(&self) -> LineClass {
        match &self.kind {
            RowKind::SessionStart(_) => LineClass::SessionStart,
            RowKind::TurnBoundary(_) => LineClass::TurnBoundary,
            RowKind::Message(m) => match m.role {
                Role::User => LineClass::UserMessage,
                Role::Assistant => LineClass::AssistantMessage,
                Role::Other => LineClass::Other,
            },
            RowKind::ToolCall(_) => LineClass::ToolCall,
            RowKind::Other => LineClass::Other,
        }
    }

    /// Working directory carried by this row, if it is the kind that carries one.
    pub fn cwd(&self) -> Option<&str> {
        let cwd = match &self.kind {
            RowKind::SessionStart(meta) => meta.cwd.as_deref(),
            RowKind::TurnBoundary(ctx) => ctx.cwd.as_deref(),
            _ => None,
        };
        cwd.filter(|c| !c.is_empty())
    }
}

/// Decodes raw lines into rows.
///
/// `tally` is the cheap path used for lines fast mode does not decode. It must
/// agree with `decode(..).class()` for every line that decodes.
pub trait RowDecoder: Send + Sync {
    fn decode(&self, line: &[u8]) -> Result<Row, DecodeError>;

    fn tally(&self, line: &[u8]) -> LineClass {
        self.decode(line)
            .map(|row| row.class())
            .unwrap_or(LineClass::Other)
    }
}

#[derive(Deserialize)]
struct RawLine {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    payload: Value,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

/// Pre-compiled SIMD substring finders for the tally path.
struct TallyFinders {
    type_marker: memmem::Finder<'static>,
    response_item: memmem::Finder<'static>,
    session_meta: memmem::Finder<'static>,
    turn_context: memmem::Finder<'static>,
    message: memmem::Finder<'static>,
    role_user: memmem::Finder<'static>,
    role_assistant: memmem::Finder<'static>,
    function_call: memmem::Finder<'static>,
    custom_tool_call: memmem::Finder<'static>,
    local_shell_call: memmem::Finder<'static>,
}

impl TallyFinders {
    fn new() -> Self {
        Self {
            type_marker: memmem::Finder::new(b"\"type\":\""),
            response_item: memmem::Finder::new(b"\"type\":\"response_item\""),
            session_meta: memmem::Finder::new(b"\"type\":\"session_meta\""),
            turn_context: memmem::Finder::new(b"\"type\":\"turn_context\""),
            message: memmem::Finder::new(b"\"type\":\"message\""),
            role_user: memmem::Finder::new(b"\"role\":\"user\""),
            role_assistant: memmem::Finder::new(b"\"role\":\"assistant\""),
            function_call: memmem::Finder::new(b"\"type\":\"function_call\""),
            custom_tool_call: memmem::Finder::new(b"\"type\":\"custom_tool_call\""),
            local_shell_call: memmem::Finder::new(b"\"type\":\"local_shell_call\""),
        }
    }
}

/// Payload `type`s counted as tool invocations.
const TOOL_CALL_TYPES: &[&str] = &["function_call", "custom_tool_call", "local_shell_call"];

/// Decoder for the JSONL rollout format.
pub struct JsonRowDecoder {
    finders: TallyFinders,
}

impl Default for JsonRowDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRowDecoder {
    pub fn new() -> Self {
        Self {
            finders: TallyFinders::new(),
        }
    }
}

impl RowDecoder for JsonRowDecoder {
    fn decode(&self, line: &[u8]) -> Result<Row, DecodeError> {
        let raw: RawLine = serde_json::from_slice(line)?;
        let kind = match raw.kind.as_deref() {
            Some("session_meta") => {
                RowKind::SessionStart(serde_json::from_value(raw.payload).unwrap_or_default())
            }
            Some("turn_context") => {
                RowKind::TurnBoundary(serde_json::from_value(raw.payload).unwrap_or_default())
            }
            Some("response_item") => response_item(&raw.payload),
            _ => RowKind::Other,
        };
        Ok(Row {
            timestamp: raw.timestamp,
            kind,
        })
    }

    fn tally(&self, line: &[u8]) -> LineClass {
        let f = &self.finders;
        // Pretty-printed or otherwise unusual lines take the slow path.
        if f.type_marker.find(line).is_none() {
            return self
                .decode(line)
                .map(|row| row.class())
                .unwrap_or(LineClass::Other);
        }

        if f.response_item.find(line).is_some() {
            if f.message.find(line).is_some() {
                if f.role_user.find(line).is_some() {
                    return LineClass::UserMessage;
                }
                if f.role_assistant.find(line).is_some() {
                    return LineClass::AssistantMessage;
                }
                return LineClass::Other;
            }
            if f.function_call.find(line).is_some()
                || f.custom_tool_call.find(line).is_some()
                || f.local_shell_call.find(line).is_some()
            {
                return LineClass::ToolCall;
            }
            return LineClass::Other;
        }
        if f.session_meta.find(line).is_some() {
            return LineClass::SessionStart;
        }
        if f.turn_context.find(line).is_some() {
            return LineClass::TurnBoundary;
        }
        LineClass::Other
    }
}

fn response_item(payload: &Value) -> RowKind {
    let item_type = payload.get("type").and_then(Value::as_str).unwrap_or("");
    if item_type == "message" {
        let role = match payload.get("role").and_then(Value::as_str) {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => Role::Other,
        };
        return RowKind::Message(MessageRow {
            role,
            text: message_text(payload.get("content")),
        });
    }
    if TOOL_CALL_TYPES.contains(&item_type) {
        let name = payload
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| (item_type == "local_shell_call").then(|| "shell".to_string()));
        return RowKind::ToolCall(ToolCallRow { name });
    }
    RowKind::Other
}

/// Content is either a plain string or an array of `{type, text}` parts.
fn message_text(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::String(s) => Some(s.clone()).filter(|s| !s.is_empty()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .filter(|t| !t.is_empty())
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        _ => None,
    }
}
