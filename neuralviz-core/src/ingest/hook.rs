//! Push-hook payloads
//!
//! Hooks POST a loosely typed JSON object together with a discriminator
//! (`PreToolUse`, `post-tool-use`, ...). [`HookPayload::from_json`] turns that
//! pair into a [`HookEvent`] variant carrying only its own fields. Field
//! values of the wrong JSON type are treated as absent; only a payload that
//! is not an object at all is rejected.

use crate::error::{Error, Result};
use crate::ingest::tools::{value_text, ToolInput};
use crate::types::DEFAULT_SESSION_ID;
use chrono::DateTime;
use serde_json::{Map, Value};

/// Which hook fired
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookKind {
    PreToolUse,
    PostToolUse,
    Stop,
    SubagentStop,
    Notification,
    UserPromptSubmit,
    /// Anything else, with the discriminator as given
    Other(String),
}

impl HookKind {
    /// Parse a discriminator, ignoring case and `-`/`_` separators.
    ///
    /// Never fails: unknown names become [`HookKind::Other`].
    pub fn parse(discriminator: &str) -> Self {
        let folded: String = discriminator
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "pretooluse" => HookKind::PreToolUse,
            "posttooluse" => HookKind::PostToolUse,
            "stop" => HookKind::Stop,
            "subagentstop" => HookKind::SubagentStop,
            "notification" => HookKind::Notification,
            "userpromptsubmit" => HookKind::UserPromptSubmit,
            _ => HookKind::Other(discriminator.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HookKind::PreToolUse => "PreToolUse",
            HookKind::PostToolUse => "PostToolUse",
            HookKind::Stop => "Stop",
            HookKind::SubagentStop => "SubagentStop",
            HookKind::Notification => "Notification",
            HookKind::UserPromptSubmit => "UserPromptSubmit",
            HookKind::Other(name) => name,
        }
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome reported by a post-tool-use hook
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

/// A push-hook event with its variant-specific fields
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    PreToolUse {
        tool_name: Option<String>,
        input: ToolInput,
    },
    PostToolUse {
        tool_name: Option<String>,
        outcome: ToolOutcome,
    },
    Stop {
        reason: Option<String>,
    },
    SubagentStop {
        summary: Option<String>,
    },
    Notification {
        message: Option<String>,
    },
    UserPromptSubmit {
        prompt: Option<String>,
    },
    Other {
        name: String,
        /// Full payload, shown as content
        raw: Value,
    },
}

/// A push-hook payload: envelope fields plus the typed event
#[derive(Debug, Clone, PartialEq)]
pub struct HookPayload {
    pub session_id: String,
    /// Epoch milliseconds, when the payload carried a timestamp
    pub timestamp: Option<i64>,
    pub event: HookEvent,
}

impl HookPayload {
    /// Interpret `payload` as the hook named by `discriminator`.
    ///
    /// Returns [`Error::InvalidPayload`] when `payload` is not a JSON object.
    pub fn from_json(discriminator: &str, payload: &Value) -> Result<Self> {
        let obj = payload.as_object().ok_or_else(|| {
            Error::InvalidPayload(format!(
                "{} payload must be a JSON object, got {}",
                discriminator,
                json_type(payload)
            ))
        })?;

        let session_id = string(obj, "session_id")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

        let timestamp = obj.get("timestamp").and_then(parse_timestamp);

        let event = match HookKind::parse(discriminator) {
            HookKind::PreToolUse => {
                let tool_name = string(obj, "tool_name");
                let input = obj.get("tool_input").cloned().unwrap_or(Value::Null);
                HookEvent::PreToolUse {
                    input: ToolInput::from_json(tool_name.as_deref().unwrap_or(""), &input),
                    tool_name,
                }
            }
            HookKind::PostToolUse => {
                let outcome = match string(obj, "error").filter(|e| !e.is_empty()) {
                    Some(err) => ToolOutcome::Failure(err),
                    None => ToolOutcome::Success(
                        string(obj, "tool_result")
                            .or_else(|| obj.get("tool_response").map(value_text))
                            .unwrap_or_default(),
                    ),
                };
                HookEvent::PostToolUse {
                    tool_name: string(obj, "tool_name"),
                    outcome,
                }
            }
            HookKind::Stop => HookEvent::Stop {
                reason: string(obj, "tool_result").or_else(|| string(obj, "stop_reason")),
            },
            HookKind::SubagentStop => HookEvent::SubagentStop {
                summary: string(obj, "tool_result"),
            },
            HookKind::Notification => HookEvent::Notification {
                message: string(obj, "message"),
            },
            HookKind::UserPromptSubmit => HookEvent::UserPromptSubmit {
                prompt: string(obj, "prompt"),
            },
            HookKind::Other(name) => HookEvent::Other {
                name,
                raw: payload.clone(),
            },
        };

        Ok(Self {
            session_id,
            timestamp,
            event,
        })
    }
}

fn string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Accept epoch milliseconds or an RFC 3339 string
pub(crate) fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_discriminator_spellings() {
        assert_eq!(HookKind::parse("PreToolUse"), HookKind::PreToolUse);
        assert_eq!(HookKind::parse("pre-tool-use"), HookKind::PreToolUse);
        assert_eq!(HookKind::parse("post_tool_use"), HookKind::PostToolUse);
        assert_eq!(HookKind::parse("SubagentStop"), HookKind::SubagentStop);
        assert_eq!(HookKind::parse("subagent-stop"), HookKind::SubagentStop);
        assert_eq!(
            HookKind::parse("user-prompt-submit"),
            HookKind::UserPromptSubmit
        );
        assert_eq!(
            HookKind::parse("PreCompact"),
            HookKind::Other("PreCompact".to_string())
        );
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let err = HookPayload::from_json("Stop", &json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
        assert!(HookPayload::from_json("Stop", &json!("text")).is_err());
    }

    #[test]
    fn test_missing_session_defaults() {
        let payload = HookPayload::from_json("Stop", &json!({})).unwrap();
        assert_eq!(payload.session_id, DEFAULT_SESSION_ID);

        let payload = HookPayload::from_json("Stop", &json!({"session_id": 7})).unwrap();
        assert_eq!(payload.session_id, DEFAULT_SESSION_ID);
    }

    #[test]
    fn test_post_tool_use_error_wins() {
        let payload = HookPayload::from_json(
            "PostToolUse",
            &json!({"tool_name": "Bash", "tool_result": "ok", "error": "exit 1"}),
        )
        .unwrap();
        assert_eq!(
            payload.event,
            HookEvent::PostToolUse {
                tool_name: Some("Bash".to_string()),
                outcome: ToolOutcome::Failure("exit 1".to_string()),
            }
        );
    }

    #[test]
    fn test_post_tool_use_falls_back_to_tool_response() {
        let payload = HookPayload::from_json(
            "PostToolUse",
            &json!({"tool_name": "Read", "tool_response": {"ok": true}}),
        )
        .unwrap();
        match payload.event {
            HookEvent::PostToolUse {
                outcome: ToolOutcome::Success(text),
                ..
            } => assert_eq!(text, r#"{"ok":true}"#),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_forms() {
        assert_eq!(parse_timestamp(&json!(1_700_000_000_123i64)), Some(1_700_000_000_123));
        assert_eq!(
            parse_timestamp(&json!("2025-01-01T00:00:00Z")),
            Some(1_735_689_600_000)
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(true)), None);
    }

    #[test]
    fn test_unknown_hook_keeps_raw_payload() {
        let raw = json!({"session_id": "s", "trigger": "auto"});
        let payload = HookPayload::from_json("PreCompact", &raw).unwrap();
        assert_eq!(
            payload.event,
            HookEvent::Other {
                name: "PreCompact".to_string(),
                raw,
            }
        );
    }
}
