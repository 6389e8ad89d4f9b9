//! Summaries of finished runs, built from their log files' text.

use serde_json::Value;
use vibes_common::text::truncate_middle;
use vibes_common::ValueExt;

use crate::event;
use crate::event::EngineEvent;
use crate::Engine;
use crate::Normalizer;

pub const PREVIEW_MAX_CHARS: usize = 2400;
const PREVIEW_WINDOW_LINES: usize = 250;
const LAST_MESSAGE_WINDOW_LINES: usize = 500;
pub const STDERR_PREVIEW_LINES: usize = 40;
pub const STDERR_PREVIEW_MAX_CHARS: usize = 1200;

fn last_lines(text: &str, count: usize) -> impl DoubleEndedIterator<Item = &str> {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(count);
    lines.into_iter().skip(skip)
}

/// Replays the tail of a stdout log through a fresh normalizer.
///
/// Hidden reasoning stays hidden, same as in the live view.
pub fn stdout_preview(engine: Engine, log_text: &str, max_chars: usize) -> String {
    let mut normalizer = Normalizer::for_replay(engine);
    let mut rendered = String::new();
    for line in last_lines(log_text, PREVIEW_WINDOW_LINES) {
        if line.trim().is_empty() {
            continue;
        }
        let decoded = event::decode(engine, line);
        let raw = decoded.record.is_none();
        for segment in normalizer.normalize(decoded).segments {
            rendered.push_str(&segment.content);
            if raw && !segment.content.ends_with('\n') {
                rendered.push('\n');
            }
        }
    }
    truncate_middle(rendered.trim(), max_chars)
}

/// The last complete assistant message in a stdout log, from either engine.
pub fn last_agent_message(log_text: &str, max_chars: usize) -> Option<String> {
    last_lines(log_text, LAST_MESSAGE_WINDOW_LINES)
        .rev()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter(Value::is_object)
        .find_map(|record| agent_message_text(&record))
        .map(|text| truncate_middle(text.trim(), max_chars))
}

fn agent_message_text(record: &Value) -> Option<String> {
    for event in event::decode_record(Engine::Claude, record) {
        if let EngineEvent::AssistantMessage(text) | EngineEvent::RunResult(text) = event {
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
    }

    let ty = event::event_type(record);
    if matches!(ty, "agent_message" | "assistant_message") {
        return non_blank(record.str_field("text"));
    }
    if ty.starts_with("item.") {
        let item = record
            .get("item")
            .or_else(|| record.get("data").and_then(|d| d.get("item")))?;
        if matches!(
            item.str_or("type", "").trim(),
            "assistant_message" | "agent_message" | "message"
        ) {
            return ["delta", "text", "content"]
                .iter()
                .find_map(|key| non_blank(item.str_field(key)));
        }
    }
    None
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// The last lines of a stderr log.
pub fn stderr_preview(log_text: &str, max_lines: usize, max_chars: usize) -> String {
    if log_text.trim().is_empty() {
        return String::new();
    }
    let tail: Vec<&str> = last_lines(log_text, max_lines).collect();
    truncate_middle(&tail.join("\n"), max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log(lines: &[Value]) -> String {
        lines
            .iter()
            .map(|l| format!("{}\n", l))
            .collect::<String>()
    }

    #[test]
    fn preview_hides_reasoning_and_keeps_commands() {
        let text = log(&[
            json!({"type": "thread.started", "thread_id": "0b0e1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d"}),
            json!({"type": "item.completed", "item": {"type": "reasoning", "text": "secret plan"}}),
            json!({"type": "item.completed", "item": {"type": "command_execution", "command": "ls", "aggregated_output": "src", "exit_code": 0}}),
            json!({"type": "item.completed", "item": {"type": "agent_message", "text": "Done."}}),
        ]);
        let preview = stdout_preview(Engine::Codex, &text, PREVIEW_MAX_CHARS);
        assert!(!preview.contains("secret"));
        assert!(preview.contains("$ ls"));
        assert!(preview.contains("(exit_code: 0)"));
        assert!(preview.ends_with("Done."));
    }

    #[test]
    fn preview_keeps_non_json_lines() {
        let preview = stdout_preview(Engine::Claude, "boot\nready\n", PREVIEW_MAX_CHARS);
        assert_eq!(preview, "boot\nready");
    }

    #[test]
    fn last_message_from_claude_and_codex() {
        let claude = log(&[
            json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "first"}]}}),
            json!({"type": "result", "result": "final answer"}),
        ]);
        assert_eq!(last_agent_message(&claude, 100).as_deref(), Some("final answer"));

        let codex = log(&[
            json!({"type": "item.completed", "item": {"type": "agent_message", "text": " ok "}}),
            json!({"type": "turn.completed"}),
        ]);
        assert_eq!(last_agent_message(&codex, 100).as_deref(), Some("ok"));
        assert_eq!(last_agent_message("not json\n", 100), None);
    }

    #[test]
    fn stderr_preview_keeps_tail() {
        let text: String = (0..100).map(|i| format!("line {}\n", i)).collect();
        let preview = stderr_preview(&text, 3, STDERR_PREVIEW_MAX_CHARS);
        assert_eq!(preview, "line 97\nline 98\nline 99");
        assert_eq!(stderr_preview("  \n", 3, 100), "");
    }
}
