//! Event normalization
//!
//! Turns typed hook payloads and session-log records into [`CanonicalEvent`]s,
//! resolving each event's parent from the session's [`SessionState`].
//!
//! Parent resolution:
//!
//! | Event | Parent |
//! |-------|--------|
//! | tool call, notification, unknown hook, logged tool call | anchor, else last node |
//! | tool result | pending action, else last node |
//! | prompt, stop, subagent stop, logged thought | last node |
//! | logged tool result | matching logged tool call, else pending action, else last node |
//!
//! Every event carries the agent context that was open *before* it was
//! processed, and becomes the session's last node once it is built.

use crate::config::ContentConfig;
use crate::ingest::hook::{HookEvent, HookPayload, ToolOutcome};
use crate::ingest::log_record::{LogMessage, LogRole, Segment};
use crate::ingest::session::{SessionState, SessionTracker, ToolCall};
use crate::ingest::tools::{pretty, ToolInput, TASK_TOOL};
use crate::types::{new_id, now_millis, truncate, CanonicalEvent, NodeKind, SourceKind};

const DEFAULT_TOOL_LABEL: &str = "Tool";

/// Stateless event builder; all memory lives in the [`SessionTracker`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    max_chars: usize,
    label_chars: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&ContentConfig::default())
    }
}

/// Fields that differ between events; the rest is filled in by `finish`
struct Draft {
    kind: NodeKind,
    label: String,
    content: String,
    tool_name: Option<String>,
    parent_node_id: Option<String>,
    completes: Option<String>,
}

impl Normalizer {
    pub fn new(config: &ContentConfig) -> Self {
        Self {
            max_chars: config.max_chars,
            label_chars: config.label_chars,
        }
    }

    /// Normalize a push-hook payload. Always produces an event.
    pub fn normalize_hook(
        &self,
        payload: &HookPayload,
        tracker: &mut SessionTracker,
    ) -> CanonicalEvent {
        let (state, _) = tracker.get_or_create(&payload.session_id);
        let id = new_id();
        let prior_agent = state.current_agent_id.clone();

        let draft = match &payload.event {
            HookEvent::PreToolUse { tool_name, input } => {
                let parent = state.fan_out_parent();
                state.last_action_id = Some(id.clone());
                match input {
                    ToolInput::Task {
                        description,
                        prompt,
                        raw,
                    } => {
                        state.current_agent_id = Some(id.clone());
                        let summary = description
                            .as_deref()
                            .or(prompt.as_deref())
                            .unwrap_or("Subagent");
                        Draft {
                            kind: NodeKind::Agent,
                            label: format!("Agent: {}", truncate(summary, self.label_chars)),
                            content: pretty(raw),
                            tool_name: Some(TASK_TOOL.to_string()),
                            parent_node_id: parent,
                            completes: None,
                        }
                    }
                    _ => Draft {
                        kind: NodeKind::Action,
                        label: tool_label(tool_name.as_deref()).to_string(),
                        content: input.format(),
                        tool_name: tool_name.clone(),
                        parent_node_id: parent,
                        completes: None,
                    },
                }
            }
            HookEvent::PostToolUse { tool_name, outcome } => {
                let tool = tool_label(tool_name.as_deref());
                let (kind, label, content) = match outcome {
                    ToolOutcome::Failure(err) => {
                        (NodeKind::Error, format!("Error: {}", tool), err.clone())
                    }
                    ToolOutcome::Success(result) => {
                        (NodeKind::Result, format!("Result: {}", tool), result.clone())
                    }
                };
                Draft {
                    kind,
                    label,
                    content,
                    tool_name: tool_name.clone(),
                    parent_node_id: state.result_parent(),
                    completes: state.last_action_id.clone(),
                }
            }
            HookEvent::Stop { reason } => {
                state.current_agent_id = None;
                Draft {
                    kind: NodeKind::Result,
                    label: "Stop".to_string(),
                    content: reason
                        .clone()
                        .unwrap_or_else(|| "Session stopped".to_string()),
                    tool_name: None,
                    parent_node_id: state.last_node_id.clone(),
                    completes: None,
                }
            }
            HookEvent::SubagentStop { summary } => {
                let finished = state.current_agent_id.take();
                Draft {
                    kind: NodeKind::Result,
                    label: "Agent Complete".to_string(),
                    content: summary
                        .clone()
                        .unwrap_or_else(|| "Subagent finished".to_string()),
                    tool_name: None,
                    parent_node_id: state.last_node_id.clone(),
                    completes: finished,
                }
            }
            HookEvent::Notification { message } => {
                let parent = state.fan_out_parent();
                state.last_anchor_id = Some(id.clone());
                Draft {
                    kind: NodeKind::Thought,
                    label: "Notification".to_string(),
                    content: message.clone().unwrap_or_default(),
                    tool_name: None,
                    parent_node_id: parent,
                    completes: None,
                }
            }
            HookEvent::UserPromptSubmit { prompt } => {
                let parent = state.last_node_id.clone();
                state.last_anchor_id = Some(id.clone());
                state.last_action_id = None;
                Draft {
                    kind: NodeKind::Prompt,
                    label: "User Prompt".to_string(),
                    content: prompt.clone().unwrap_or_default(),
                    tool_name: None,
                    parent_node_id: parent,
                    completes: None,
                }
            }
            HookEvent::Other { name, raw } => {
                let parent = state.fan_out_parent();
                state.last_anchor_id = Some(id.clone());
                Draft {
                    kind: NodeKind::Thought,
                    label: name.clone(),
                    content: pretty(raw),
                    tool_name: None,
                    parent_node_id: parent,
                    completes: None,
                }
            }
        };

        self.finish(
            state,
            id,
            &payload.session_id,
            SourceKind::Hook,
            payload.timestamp,
            prior_agent,
            draft,
        )
    }

    /// Normalize one session-log record.
    ///
    /// Returns `None` for system and unrecognized roles, without touching
    /// the tracker.
    pub fn normalize_log(
        &self,
        session_id: &str,
        message: &LogMessage,
        source: SourceKind,
        tracker: &mut SessionTracker,
    ) -> Option<CanonicalEvent> {
        if !matches!(message.role, LogRole::User | LogRole::Assistant) {
            return None;
        }

        let (state, _) = tracker.get_or_create(session_id);
        let id = new_id();
        let prior_agent = state.current_agent_id.clone();

        let draft = match message.role {
            LogRole::User => match message.first_tool_result() {
                Some(Segment::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                }) if !message.has_text() => {
                    let call = tool_use_id
                        .as_ref()
                        .and_then(|tid| state.tool_calls.remove(tid));
                    self.log_tool_result(state, call, content, *is_error)
                }
                _ => {
                    let parent = state.last_node_id.clone();
                    state.last_anchor_id = Some(id.clone());
                    state.last_action_id = None;
                    Draft {
                        kind: NodeKind::Prompt,
                        label: "User Prompt".to_string(),
                        content: message.text(),
                        tool_name: None,
                        parent_node_id: parent,
                        completes: None,
                    }
                }
            },
            _ => match message.first_tool_use() {
                Some(Segment::ToolUse {
                    id: tool_use_id,
                    name,
                    input,
                }) => {
                    let parent = state.fan_out_parent();
                    state.last_action_id = Some(id.clone());
                    if let Some(tid) = tool_use_id {
                        state.tool_calls.insert(
                            tid.clone(),
                            ToolCall {
                                node_id: id.clone(),
                                tool_name: name.clone(),
                            },
                        );
                    }
                    let label = tool_label(name.as_deref());
                    Draft {
                        kind: NodeKind::Action,
                        label: label.to_string(),
                        content: ToolInput::from_json(label, input).format(),
                        tool_name: name.clone(),
                        parent_node_id: parent,
                        completes: None,
                    }
                }
                _ => {
                    let parent = state.last_node_id.clone();
                    state.last_anchor_id = Some(id.clone());
                    Draft {
                        kind: NodeKind::Thought,
                        label: "Thinking".to_string(),
                        content: message.text(),
                        tool_name: None,
                        parent_node_id: parent,
                        completes: None,
                    }
                }
            },
        };

        Some(self.finish(
            state,
            id,
            session_id,
            source,
            message.timestamp,
            prior_agent,
            draft,
        ))
    }

    fn log_tool_result(
        &self,
        state: &SessionState,
        call: Option<ToolCall>,
        content: &str,
        is_error: bool,
    ) -> Draft {
        let (parent, completes, tool_name) = match call {
            Some(call) => (
                Some(call.node_id.clone()),
                Some(call.node_id),
                call.tool_name,
            ),
            None => (state.result_parent(), state.last_action_id.clone(), None),
        };
        let tool = tool_label(tool_name.as_deref());
        let (kind, label) = if is_error {
            (NodeKind::Error, format!("Error: {}", tool))
        } else {
            (NodeKind::Result, format!("Result: {}", tool))
        };
        Draft {
            kind,
            label,
            content: content.to_string(),
            tool_name,
            parent_node_id: parent,
            completes,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        state: &mut SessionState,
        id: String,
        session_id: &str,
        source: SourceKind,
        timestamp: Option<i64>,
        parent_agent_id: Option<String>,
        draft: Draft,
    ) -> CanonicalEvent {
        state.last_node_id = Some(id.clone());
        CanonicalEvent {
            id,
            session_id: session_id.to_string(),
            source,
            kind: draft.kind,
            label: draft.label,
            content: truncate(&draft.content, self.max_chars),
            tool_name: draft.tool_name,
            timestamp: timestamp.unwrap_or_else(now_millis),
            parent_agent_id,
            parent_node_id: draft.parent_node_id,
            completes: draft.completes,
        }
    }
}

fn tool_label(tool_name: Option<&str>) -> &str {
    match tool_name {
        Some(name) if !name.is_empty() => name,
        _ => DEFAULT_TOOL_LABEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn hook(
        n: &Normalizer,
        tracker: &mut SessionTracker,
        kind: &str,
        payload: Value,
    ) -> CanonicalEvent {
        let payload = HookPayload::from_json(kind, &payload).unwrap();
        n.normalize_hook(&payload, tracker)
    }

    fn log(
        n: &Normalizer,
        tracker: &mut SessionTracker,
        session: &str,
        line: &str,
    ) -> Option<CanonicalEvent> {
        let msg = LogMessage::parse_line(line)?;
        n.normalize_log(session, &msg, SourceKind::Watcher, tracker)
    }

    #[test]
    fn test_last_node_is_always_the_new_event() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        for kind in [
            "UserPromptSubmit",
            "Notification",
            "PreToolUse",
            "PostToolUse",
            "SubagentStop",
            "Stop",
            "Mystery",
        ] {
            let event = hook(&n, &mut t, kind, json!({"session_id": "s"}));
            assert_eq!(
                t.get("s").unwrap().last_node_id.as_deref(),
                Some(event.id.as_str()),
                "after {}",
                kind
            );
        }
    }

    #[test]
    fn test_session_isolation() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let a_prompt = hook(&n, &mut t, "UserPromptSubmit", json!({"session_id": "a", "prompt": "x"}));
        let b_task = hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"session_id": "b", "tool_name": "Task", "tool_input": {"description": "d"}}),
        );
        let a_action = hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"session_id": "a", "tool_name": "Bash", "tool_input": {"command": "ls"}}),
        );

        assert_eq!(a_action.parent_node_id.as_deref(), Some(a_prompt.id.as_str()));
        assert!(a_action.parent_agent_id.is_none());
        let b = t.get("b").unwrap();
        assert_eq!(b.current_agent_id.as_deref(), Some(b_task.id.as_str()));
        assert!(b.last_anchor_id.is_none());
    }

    #[test]
    fn test_anchor_fan_out() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let thought = hook(&n, &mut t, "Notification", json!({"message": "planning"}));
        let first = hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"tool_name": "Read", "tool_input": {"file_path": "a.ts"}}),
        );
        let second = hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"tool_name": "Grep", "tool_input": {"pattern": "x"}}),
        );

        assert_eq!(first.parent_node_id.as_deref(), Some(thought.id.as_str()));
        assert_eq!(second.parent_node_id.as_deref(), Some(thought.id.as_str()));
        assert_eq!(
            t.get("default").unwrap().last_action_id.as_deref(),
            Some(second.id.as_str())
        );
        assert_eq!(second.content, "/x/ in .");
    }

    #[test]
    fn test_result_correlates_with_action_across_notification() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        hook(&n, &mut t, "UserPromptSubmit", json!({"prompt": "go"}));
        let action = hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"tool_name": "Bash", "tool_input": {"command": "make"}}),
        );
        hook(&n, &mut t, "Notification", json!({"message": "waiting"}));
        let result = hook(
            &n,
            &mut t,
            "PostToolUse",
            json!({"tool_name": "Bash", "tool_result": "built"}),
        );

        assert_eq!(result.kind, NodeKind::Result);
        assert_eq!(result.label, "Result: Bash");
        assert_eq!(result.parent_node_id.as_deref(), Some(action.id.as_str()));
        assert_eq!(result.completes.as_deref(), Some(action.id.as_str()));
    }

    #[test]
    fn test_post_tool_use_error() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let event = hook(
            &n,
            &mut t,
            "post-tool-use",
            json!({"error": "permission denied"}),
        );
        assert_eq!(event.kind, NodeKind::Error);
        assert_eq!(event.label, "Error: Tool");
        assert_eq!(event.content, "permission denied");
        assert!(event.parent_node_id.is_none());
    }

    #[test]
    fn test_agent_context_scope() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let before = hook(&n, &mut t, "UserPromptSubmit", json!({"prompt": "p"}));
        let spawn = hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"tool_name": "Task", "tool_input": {"description": "Investigate the flaky integration test suite thoroughly"}}),
        );
        let inner = hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"tool_name": "Read", "tool_input": {"file_path": "x"}}),
        );
        let done = hook(&n, &mut t, "SubagentStop", json!({}));
        let after = hook(&n, &mut t, "Notification", json!({"message": "m"}));

        assert!(before.parent_agent_id.is_none());
        assert!(spawn.parent_agent_id.is_none());
        assert_eq!(spawn.kind, NodeKind::Agent);
        assert_eq!(
            spawn.label,
            "Agent: Investigate the flaky integration test s..."
        );
        assert_eq!(inner.parent_agent_id.as_deref(), Some(spawn.id.as_str()));
        assert_eq!(done.parent_agent_id.as_deref(), Some(spawn.id.as_str()));
        assert_eq!(done.completes.as_deref(), Some(spawn.id.as_str()));
        assert_eq!(done.content, "Subagent finished");
        assert!(after.parent_agent_id.is_none());
    }

    #[test]
    fn test_stop_clears_agent_and_chains_from_last_node() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        hook(
            &n,
            &mut t,
            "PreToolUse",
            json!({"tool_name": "Task", "tool_input": {"prompt": "p"}}),
        );
        let last = hook(&n, &mut t, "PostToolUse", json!({"tool_result": "r"}));
        let stop = hook(&n, &mut t, "Stop", json!({"stop_reason": "end_turn"}));

        assert_eq!(stop.label, "Stop");
        assert_eq!(stop.content, "end_turn");
        assert_eq!(stop.parent_node_id.as_deref(), Some(last.id.as_str()));
        assert!(t.get("default").unwrap().current_agent_id.is_none());
    }

    #[test]
    fn test_prompt_resets_action_correlation() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        hook(&n, &mut t, "PreToolUse", json!({"tool_name": "Bash"}));
        let prompt = hook(&n, &mut t, "UserPromptSubmit", json!({"prompt": "again"}));
        let state = t.get("default").unwrap();
        assert!(state.last_action_id.is_none());
        assert_eq!(state.last_anchor_id.as_deref(), Some(prompt.id.as_str()));
    }

    #[test]
    fn test_unknown_hook_becomes_thought_anchor() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let event = hook(&n, &mut t, "PreCompact", json!({"trigger": "manual"}));
        assert_eq!(event.kind, NodeKind::Thought);
        assert_eq!(event.label, "PreCompact");
        assert!(event.content.contains("\"trigger\": \"manual\""));
        assert_eq!(
            t.get("default").unwrap().last_anchor_id.as_deref(),
            Some(event.id.as_str())
        );
    }

    #[test]
    fn test_content_is_truncated() {
        let n = Normalizer::new(&ContentConfig {
            max_chars: 10,
            label_chars: 40,
        });
        let mut t = SessionTracker::new();
        let event = hook(
            &n,
            &mut t,
            "UserPromptSubmit",
            json!({"prompt": "abcdefghijklmnop"}),
        );
        assert_eq!(event.content, "abcdefghij...");
    }

    #[test]
    fn test_payload_timestamp_is_used() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let event = hook(&n, &mut t, "Stop", json!({"timestamp": 1234}));
        assert_eq!(event.timestamp, 1234);
        assert_eq!(event.source, SourceKind::Hook);
    }

    #[test]
    fn test_log_system_role_leaves_tracker_untouched() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        assert!(log(&n, &mut t, "s", r#"{"role":"system","content":"x"}"#).is_none());
        assert!(log(&n, &mut t, "s", "garbage").is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn test_log_conversation() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let prompt = log(&n, &mut t, "s", r#"{"role":"user","content":"fix bug"}"#).unwrap();
        let thought = log(
            &n,
            &mut t,
            "s",
            r#"{"role":"assistant","content":[{"type":"text","text":"Looking"}]}"#,
        )
        .unwrap();
        let action = log(
            &n,
            &mut t,
            "s",
            r#"{"role":"assistant","content":[{"type":"tool_use","id":"tu1","name":"Bash","input":{"command":"ls"}}]}"#,
        )
        .unwrap();
        let result = log(
            &n,
            &mut t,
            "s",
            r#"{"role":"user","content":[{"type":"tool_result","tool_use_id":"tu1","content":"a.ts"}]}"#,
        )
        .unwrap();

        assert_eq!(prompt.kind, NodeKind::Prompt);
        assert_eq!(thought.kind, NodeKind::Thought);
        assert_eq!(thought.label, "Thinking");
        assert_eq!(thought.parent_node_id.as_deref(), Some(prompt.id.as_str()));
        assert_eq!(action.kind, NodeKind::Action);
        assert_eq!(action.content, "ls");
        assert_eq!(action.parent_node_id.as_deref(), Some(thought.id.as_str()));
        assert_eq!(result.kind, NodeKind::Result);
        assert_eq!(result.label, "Result: Bash");
        assert_eq!(result.parent_node_id.as_deref(), Some(action.id.as_str()));
        assert_eq!(result.completes.as_deref(), Some(action.id.as_str()));
        assert_eq!(result.source, SourceKind::Watcher);
        assert!(t.get("s").unwrap().tool_calls.is_empty());
    }

    #[test]
    fn test_log_tool_result_error_and_fallback() {
        let n = Normalizer::default();
        let mut t = SessionTracker::new();
        let action = log(
            &n,
            &mut t,
            "s",
            r#"{"role":"assistant","content":[{"type":"tool_use","name":"Read","input":{}}]}"#,
        )
        .unwrap();
        let err = log(
            &n,
            &mut t,
            "s",
            r#"{"role":"user","content":[{"type":"tool_result","tool_use_id":"unknown","content":"boom","is_error":true}]}"#,
        )
        .unwrap();
        assert_eq!(err.kind, NodeKind::Error);
        assert_eq!(err.parent_node_id.as_deref(), Some(action.id.as_str()));
    }
}
