//! Typed tool inputs and their display formatting
//!
//! Tool calls arrive with a free-form `tool_input` object. The tools we know
//! get their own variant carrying only the fields we display; anything else
//! is kept as raw JSON and pretty-printed.

use serde_json::Value;

/// Name of the tool that spawns a subagent
pub const TASK_TOOL: &str = "Task";

const WRITE_PREVIEW_CHARS: usize = 500;
const EDIT_PREVIEW_CHARS: usize = 200;

/// A tool invocation's input, typed by tool name
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Bash {
        command: String,
    },
    Read {
        file_path: String,
    },
    Write {
        file_path: String,
        content: String,
    },
    Edit {
        file_path: String,
        old_string: String,
        new_string: String,
    },
    Grep {
        pattern: String,
        path: Option<String>,
    },
    Glob {
        pattern: Option<String>,
        path: Option<String>,
    },
    /// Subagent spawn
    Task {
        description: Option<String>,
        prompt: Option<String>,
        raw: Value,
    },
    /// Unrecognized tool, or no input at all
    Other(Value),
}

impl ToolInput {
    /// Build the typed input for `tool_name`. Malformed fields default to empty.
    pub fn from_json(tool_name: &str, input: &Value) -> Self {
        match tool_name {
            "Bash" => ToolInput::Bash {
                command: str_field(input, &["command"]).unwrap_or_default(),
            },
            "Read" => ToolInput::Read {
                file_path: path_field(input),
            },
            "Write" => ToolInput::Write {
                file_path: path_field(input),
                content: str_field(input, &["content"]).unwrap_or_default(),
            },
            "Edit" => ToolInput::Edit {
                file_path: path_field(input),
                old_string: str_field(input, &["old_string"]).unwrap_or_default(),
                new_string: str_field(input, &["new_string"]).unwrap_or_default(),
            },
            "Grep" => ToolInput::Grep {
                pattern: str_field(input, &["pattern"]).unwrap_or_default(),
                path: str_field(input, &["path"]),
            },
            "Glob" => ToolInput::Glob {
                pattern: str_field(input, &["pattern"]),
                path: str_field(input, &["path"]),
            },
            TASK_TOOL => ToolInput::Task {
                description: str_field(input, &["description"]).filter(|s| !s.is_empty()),
                prompt: str_field(input, &["prompt"]).filter(|s| !s.is_empty()),
                raw: input.clone(),
            },
            _ => ToolInput::Other(input.clone()),
        }
    }

    /// Human-readable summary used as node content
    pub fn format(&self) -> String {
        match self {
            ToolInput::Bash { command } => command.clone(),
            ToolInput::Read { file_path } => file_path.clone(),
            ToolInput::Write { file_path, content } => {
                format!("{}\n{}", file_path, prefix(content, WRITE_PREVIEW_CHARS))
            }
            ToolInput::Edit {
                file_path,
                old_string,
                new_string,
            } => format!(
                "{}\n- {}\n+ {}",
                file_path,
                prefix(old_string, EDIT_PREVIEW_CHARS),
                prefix(new_string, EDIT_PREVIEW_CHARS)
            ),
            ToolInput::Grep { pattern, path } => {
                format!("/{}/ in {}", pattern, path.as_deref().unwrap_or("."))
            }
            ToolInput::Glob { pattern, path } => format!(
                "{} in {}",
                pattern.as_deref().unwrap_or("*"),
                path.as_deref().unwrap_or(".")
            ),
            ToolInput::Task { raw, .. } => pretty(raw),
            ToolInput::Other(raw) => pretty(raw),
        }
    }
}

/// Pretty-print a JSON value; bare strings are shown without quotes.
pub fn pretty(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Render any JSON value as display text; strings verbatim, everything else compact.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn str_field(input: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| input.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn path_field(input: &Value) -> String {
    str_field(input, &["file_path", "path"]).unwrap_or_default()
}

fn prefix(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fmt(tool: &str, input: Value) -> String {
        ToolInput::from_json(tool, &input).format()
    }

    #[test]
    fn test_bash_shows_command() {
        assert_eq!(fmt("Bash", json!({"command": "cargo test"})), "cargo test");
    }

    #[test]
    fn test_read_falls_back_to_path() {
        assert_eq!(fmt("Read", json!({"file_path": "a.ts"})), "a.ts");
        assert_eq!(fmt("Read", json!({"path": "b.ts"})), "b.ts");
    }

    #[test]
    fn test_write_previews_content() {
        let body = "x".repeat(800);
        let out = fmt("Write", json!({"file_path": "f.rs", "content": body}));
        let (path, preview) = out.split_once('\n').unwrap();
        assert_eq!(path, "f.rs");
        assert_eq!(preview.len(), 500);
    }

    #[test]
    fn test_edit_shows_diff_fragments() {
        let out = fmt(
            "Edit",
            json!({"file_path": "f.rs", "old_string": "a".repeat(300), "new_string": "b"}),
        );
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "f.rs");
        assert_eq!(lines[1].len(), 2 + 200);
        assert_eq!(lines[2], "+ b");
    }

    #[test]
    fn test_grep_and_glob_defaults() {
        assert_eq!(fmt("Grep", json!({"pattern": "fn main"})), "/fn main/ in .");
        assert_eq!(
            fmt("Grep", json!({"pattern": "x", "path": "src"})),
            "/x/ in src"
        );
        assert_eq!(fmt("Glob", json!({})), "* in .");
        assert_eq!(fmt("Glob", json!({"pattern": "**/*.rs"})), "**/*.rs in .");
    }

    #[test]
    fn test_unknown_tool_pretty_prints() {
        let out = fmt("WebFetch", json!({"url": "https://example.com"}));
        assert!(out.contains("\"url\": \"https://example.com\""));
    }

    #[test]
    fn test_malformed_fields_default() {
        assert_eq!(fmt("Bash", json!({"command": 42})), "");
        assert_eq!(fmt("Read", Value::Null), "");
    }

    #[test]
    fn test_task_keeps_description() {
        let input = ToolInput::from_json(TASK_TOOL, &json!({"description": "", "prompt": "p"}));
        match input {
            ToolInput::Task {
                description,
                prompt,
                ..
            } => {
                assert!(description.is_none());
                assert_eq!(prompt.as_deref(), Some("p"));
            }
            other => panic!("expected Task, got {:?}", other),
        }
    }
}
