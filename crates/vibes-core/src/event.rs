//! Decoding of raw engine lines into a tagged event union.
//!
//! Both engines emit JSON Lines, but neither schema is stable across
//! versions, so decoding is deliberately lenient: anything that is a JSON
//! object but matches no known shape becomes [`EngineEvent::Unrecognized`]
//! (or [`EngineEvent::Fallback`] when it still carries text), and anything
//! that is not a JSON object becomes [`EngineEvent::Raw`].

use serde_json::Value;
use vibes_common::ValueExt;

use crate::Engine;

/// One command-execution lifecycle item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExecution {
    pub command: Option<String>,
    pub output: Option<String>,
    pub exit_code: Option<i64>,
    pub started: bool,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Codex thread start; carries no renderable content.
    ThreadStarted,
    /// Claude `system/init`.
    SessionInit,
    /// Hidden model reasoning. Never rendered.
    Reasoning,
    Command(CommandExecution),
    ToolUse {
        command: Option<String>,
        record: Value,
    },
    ToolResult {
        output: Option<String>,
        record: Value,
    },
    FileChange(String),
    /// Incremental assistant text.
    TextDelta(String),
    /// A complete assistant message.
    AssistantMessage(String),
    /// Claude's final `result` text.
    RunResult(String),
    /// Unknown record that still has a text-bearing field.
    Fallback(String),
    /// JSON object with nothing we know how to show.
    Unrecognized,
    /// A line that did not decode to a JSON object, newline included.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLine {
    /// The decoded object, when the line was one.
    pub record: Option<Value>,
    pub events: Vec<EngineEvent>,
}

impl DecodedLine {
    fn raw(line: &str) -> Self {
        Self {
            record: None,
            events: vec![EngineEvent::Raw(line.to_string())],
        }
    }
}

const THREAD_START_TYPES: [&str; 3] = ["thread.started", "thread_started", "thread.start"];
const TEXT_KEYS: [&str; 3] = ["delta", "text", "content"];
const OUTPUT_KEYS: [&str; 4] = ["output", "stdout", "result", "text"];
const DIFF_KEYS: [&str; 3] = ["diff", "patch", "unified_diff"];

/// Decodes one line of engine stdout. Blank lines decode to no events.
pub fn decode(engine: Engine, line: &str) -> DecodedLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return DecodedLine {
            record: None,
            events: Vec::new(),
        };
    }
    let record = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => value,
        _ => return DecodedLine::raw(line),
    };
    DecodedLine {
        events: decode_record(engine, &record),
        record: Some(record),
    }
}

/// Events for an already-parsed JSON object.
pub fn decode_record(engine: Engine, record: &Value) -> Vec<EngineEvent> {
    match engine {
        Engine::Codex => decode_codex(record),
        Engine::Claude => decode_claude(record),
    }
}

/// The record's type tag: the first non-blank of `type`, `event`, `kind`, `name`.
pub fn event_type(record: &Value) -> &str {
    ["type", "event", "kind", "name"]
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

pub fn is_thread_start(event_type: &str) -> bool {
    THREAD_START_TYPES.contains(&event_type)
}

fn first_str<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| record.str_field(key))
}

fn first_str_or_data<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    first_str(record, keys).or_else(|| {
        record
            .get("data")
            .filter(|d| d.is_object())
            .and_then(|data| first_str(data, keys))
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn codex_item(record: &Value) -> Option<&Value> {
    record
        .get("item")
        .filter(|v| v.is_object())
        .or_else(|| {
            record
                .get("data")
                .and_then(|d| d.get("item"))
                .filter(|v| v.is_object())
        })
}

fn decode_command(event_type: &str, item: &Value) -> CommandExecution {
    let status = item.str_or("status", "");
    let command = item
        .get("command")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    CommandExecution {
        command,
        output: non_blank(item.get("aggregated_output").and_then(Value::as_str))
            .map(str::to_string),
        exit_code: item.i64_field("exit_code"),
        started: event_type.ends_with("started") || status == "in_progress",
        finished: event_type.ends_with("completed") || matches!(status, "completed" | "failed"),
    }
}

/// Command string of a tool invocation: `command`/`cmd`, then `input.command`,
/// each also looked up under `data`.
fn tool_command(record: &Value) -> Option<String> {
    fn direct(scope: &Value) -> Option<&str> {
        ["command", "cmd"]
            .iter()
            .find_map(|key| non_blank(scope.get(*key).and_then(Value::as_str)))
    }
    fn from_input(scope: &Value) -> Option<&str> {
        non_blank(
            scope
                .get("input")
                .and_then(|input| input.get("command"))
                .and_then(Value::as_str),
        )
    }
    let data = record.get("data").filter(|d| d.is_object());
    direct(record)
        .or_else(|| data.and_then(direct))
        .or_else(|| from_input(record))
        .or_else(|| data.and_then(from_input))
        .map(|s| s.trim().to_string())
}

fn decode_codex(record: &Value) -> Vec<EngineEvent> {
    let ty = event_type(record);

    if is_thread_start(ty) {
        return vec![EngineEvent::ThreadStarted];
    }

    if ty.starts_with("item.") {
        if let Some(item) = codex_item(record) {
            // Some versions only tag command items through the event type.
            match item.str_or("type", "").trim() {
                "reasoning" => return vec![EngineEvent::Reasoning],
                "command_execution" => {
                    return vec![EngineEvent::Command(decode_command(ty, item))];
                }
                "" if ty.contains("command_execution") => {
                    return vec![EngineEvent::Command(decode_command(ty, item))];
                }
                _ => {}
            }
            if let Some(text) = first_str(item, &TEXT_KEYS) {
                return vec![EngineEvent::TextDelta(text.to_string())];
            }
        }
    }

    match ty {
        "text" => {
            return first_str_or_data(record, &TEXT_KEYS)
                .map(|text| vec![EngineEvent::TextDelta(text.to_string())])
                .unwrap_or_default();
        }
        "agent_message" | "assistant_message" => {
            if let Some(text) = record.str_field("text") {
                return vec![EngineEvent::AssistantMessage(text.to_string())];
            }
        }
        "tool_use" => {
            return vec![EngineEvent::ToolUse {
                command: tool_command(record),
                record: record.clone(),
            }];
        }
        "tool_result" => {
            return vec![EngineEvent::ToolResult {
                output: first_str_or_data(record, &OUTPUT_KEYS).map(str::to_string),
                record: record.clone(),
            }];
        }
        _ => {}
    }

    if let Some(diff) = non_blank(first_str_or_data(record, &DIFF_KEYS)) {
        return vec![EngineEvent::FileChange(diff.to_string())];
    }

    match first_str_or_data(record, &TEXT_KEYS) {
        Some(text) => vec![EngineEvent::Fallback(text.to_string())],
        None => vec![EngineEvent::Unrecognized],
    }
}

fn decode_claude(record: &Value) -> Vec<EngineEvent> {
    match record.str_or("type", "") {
        "system" if record.str_or("subtype", "") == "init" => vec![EngineEvent::SessionInit],
        "stream_event" => decode_claude_stream_event(record),
        "assistant" => decode_claude_assistant(record),
        "user" => decode_claude_tool_results(record),
        "result" => match non_blank(record.get("result").and_then(Value::as_str)) {
            Some(text) => vec![EngineEvent::RunResult(text.to_string())],
            None => vec![EngineEvent::Unrecognized],
        },
        _ => vec![EngineEvent::Unrecognized],
    }
}

fn decode_claude_stream_event(record: &Value) -> Vec<EngineEvent> {
    let Some(event) = record.get("event") else {
        return vec![EngineEvent::Unrecognized];
    };
    if event.str_or("type", "") != "content_block_delta" {
        return vec![EngineEvent::Unrecognized];
    }
    let Some(delta) = event.get("delta") else {
        return vec![EngineEvent::Unrecognized];
    };
    match delta.str_or("type", "") {
        "text_delta" => match delta.str_field("text") {
            Some(text) => vec![EngineEvent::TextDelta(text.to_string())],
            None => Vec::new(),
        },
        "thinking_delta" | "signature_delta" => vec![EngineEvent::Reasoning],
        _ => vec![EngineEvent::Unrecognized],
    }
}

fn content_blocks(record: &Value) -> &[Value] {
    record
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn decode_claude_assistant(record: &Value) -> Vec<EngineEvent> {
    let mut text = String::new();
    let mut events = Vec::new();
    for block in content_blocks(record) {
        match block.str_or("type", "") {
            "text" => {
                if let Some(part) = block.str_field("text") {
                    text.push_str(part);
                }
            }
            "thinking" | "redacted_thinking" => events.push(EngineEvent::Reasoning),
            "tool_use" => events.push(EngineEvent::ToolUse {
                command: tool_command(block),
                record: block.clone(),
            }),
            _ => {}
        }
    }
    if !text.is_empty() {
        events.insert(0, EngineEvent::AssistantMessage(text));
    }
    if events.is_empty() {
        events.push(EngineEvent::Unrecognized);
    }
    events
}

/// Claude reports tool output as `tool_result` blocks inside a `user` message.
fn decode_claude_tool_results(record: &Value) -> Vec<EngineEvent> {
    let events: Vec<EngineEvent> = content_blocks(record)
        .iter()
        .filter(|block| block.str_or("type", "") == "tool_result")
        .map(|block| EngineEvent::ToolResult {
            output: tool_result_text(block),
            record: block.clone(),
        })
        .collect();
    if events.is_empty() {
        vec![EngineEvent::Unrecognized]
    } else {
        events
    }
}

fn tool_result_text(block: &Value) -> Option<String> {
    match block.get("content") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Array(parts)) => {
            let joined: String = parts
                .iter()
                .filter_map(|part| part.str_field("text"))
                .collect::<Vec<_>>()
                .join("\n");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}
