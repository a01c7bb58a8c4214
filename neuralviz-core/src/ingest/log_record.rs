//! Session-log records
//!
//! Each line of a session log is one JSON object. Two shapes are accepted:
//! the flat `{role, content}` form and the on-disk form where role and
//! content sit under `message`. Content is either a string or an array of
//! typed blocks.
//!
//! ## Error Handling
//!
//! - **Malformed JSON**: the line is skipped (`parse_line` returns `None`).
//! - **Unknown block types**: ignored via `#[serde(other)]`.
//! - **Missing fields**: defaulted via `#[serde(default)]`.

use crate::ingest::hook::parse_timestamp;
use crate::ingest::tools::value_text;
use serde::Deserialize;
use serde_json::Value;

/// Record types that carry bookkeeping rather than conversation
const BOOKKEEPING_TYPES: &[&str] = &["file-history-snapshot", "summary"];

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    role: Option<String>,
    content: Option<RawContent>,
    message: Option<RawMessage>,
    timestamp: Option<Value>,
    #[serde(rename = "type")]
    record_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    /// Anything else contributes no segments
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

// ============================================
// Parsed form
// ============================================

/// Speaker of a log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRole {
    User,
    Assistant,
    System,
    Other(String),
}

impl LogRole {
    fn parse(role: &str) -> Self {
        match role {
            "user" => LogRole::User,
            "assistant" => LogRole::Assistant,
            "system" => LogRole::System,
            other => LogRole::Other(other.to_string()),
        }
    }
}

/// One content segment of a log record
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    ToolUse {
        id: Option<String>,
        name: Option<String>,
        input: Value,
    },
    ToolResult {
        tool_use_id: Option<String>,
        content: String,
        is_error: bool,
    },
}

/// A session-log record reduced to what normalization needs
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub role: LogRole,
    pub segments: Vec<Segment>,
    /// Epoch milliseconds, when the record carried a timestamp
    pub timestamp: Option<i64>,
}

impl LogMessage {
    /// Parse one log line. Blank, malformed and bookkeeping lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(line).ok()?;
        Self::from_value(&value)
    }

    /// Interpret an already-decoded record
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let raw = RawRecord::deserialize(value).ok()?;

        let RawRecord {
            role,
            content,
            message,
            timestamp,
            record_type,
        } = raw;
        let (nested_role, nested_content) = match message {
            Some(m) => (m.role, m.content),
            None => (None, None),
        };

        let role = match role.or(nested_role) {
            Some(role) => role,
            None => {
                if let Some(t) = record_type.as_deref() {
                    if BOOKKEEPING_TYPES.contains(&t) {
                        tracing::trace!(record_type = t, "Skipping bookkeeping record");
                    }
                }
                return None;
            }
        };

        Some(Self {
            role: LogRole::parse(&role),
            segments: content.or(nested_content).map(segments).unwrap_or_default(),
            timestamp: timestamp.as_ref().and_then(parse_timestamp),
        })
    }

    /// Text segments joined by newlines
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(t) if !t.is_empty() => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_text(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Text(t) if !t.trim().is_empty()))
    }

    /// First tool invocation, if any
    pub fn first_tool_use(&self) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| matches!(s, Segment::ToolUse { .. }))
    }

    /// First tool result, if any
    pub fn first_tool_result(&self) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| matches!(s, Segment::ToolResult { .. }))
    }
}

fn segments(content: RawContent) -> Vec<Segment> {
    match content {
        RawContent::Text(text) => vec![Segment::Text(text)],
        RawContent::Blocks(blocks) => blocks
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(Segment::Text(text)),
                ContentBlock::ToolUse { id, name, input } => {
                    Some(Segment::ToolUse { id, name, input })
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(Segment::ToolResult {
                    tool_use_id,
                    content: tool_result_text(&content),
                    is_error,
                }),
                ContentBlock::Unknown => None,
            })
            .collect(),
        RawContent::Other(_) => Vec::new(),
    }
}

/// Tool results carry a string or an array of text blocks.
fn tool_result_text(content: &Value) -> String {
    match content {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item.get("text") {
                Some(Value::String(t)) => Some(t.clone()),
                _ if item.is_string() => item.as_str().map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => value_text(other),
    }
}
