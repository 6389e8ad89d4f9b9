use serde_json::Value;
use vibes_common::text::truncate_middle;
use vibes_common::ValueExt;

use crate::event;
use crate::event::CommandExecution;
use crate::event::DecodedLine;
use crate::event::EngineEvent;
use crate::token;
use crate::Engine;
use crate::Segment;
use crate::DIFF_LIMIT;
use crate::TOOL_OUTPUT_LIMIT;

/// Result of normalizing one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub segments: Vec<Segment>,
    /// Set only on the line where the run's token is first discovered.
    pub token: Option<String>,
    /// The line carried hidden reasoning that was dropped.
    pub suppressed: bool,
}

/// Per-run normalizer state.
///
/// One instance lives for the duration of a run (or a log replay) because
/// command de-duplication and token discovery depend on earlier lines.
#[derive(Debug)]
pub struct Normalizer {
    engine: Engine,
    replay: bool,
    last_command: Option<String>,
    token: Option<String>,
    saw_delta: bool,
}

impl Normalizer {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            replay: false,
            last_command: None,
            token: None,
            saw_delta: false,
        }
    }

    /// A normalizer for replaying a finished run's log.
    ///
    /// Live rendering relies on incremental deltas; a replay also renders
    /// complete assistant messages when the log contains no deltas.
    pub fn for_replay(engine: Engine) -> Self {
        Self {
            replay: true,
            ..Self::new(engine)
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// The token recorded for this run, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn normalize_line(&mut self, line: &str) -> Normalized {
        let decoded = event::decode(self.engine, line);
        self.normalize(decoded)
    }

    pub fn normalize(&mut self, decoded: DecodedLine) -> Normalized {
        let mut out = Normalized::default();
        if let Some(record) = &decoded.record {
            out.token = self.discover_token(record, &decoded.events);
        }
        for event in decoded.events {
            self.render(event, &mut out);
        }
        out
    }

    fn discover_token(&mut self, record: &Value, events: &[EngineEvent]) -> Option<String> {
        if self.token.is_some() {
            return None;
        }
        let found = match self.engine {
            Engine::Codex => token::explicit_token(record).or_else(|| {
                events
                    .iter()
                    .any(|e| matches!(e, EngineEvent::ThreadStarted))
                    .then(|| token::deep_scan_token(record))
                    .flatten()
            }),
            Engine::Claude => {
                if events.iter().any(|e| matches!(e, EngineEvent::SessionInit)) {
                    record
                        .str_field("session_id")
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                } else {
                    token::explicit_token(record)
                }
            }
        }?;
        self.token = Some(found.clone());
        Some(found)
    }

    fn render(&mut self, event: EngineEvent, out: &mut Normalized) {
        match event {
            EngineEvent::ThreadStarted | EngineEvent::SessionInit | EngineEvent::Unrecognized => {}
            EngineEvent::Reasoning => out.suppressed = true,
            EngineEvent::Command(command) => self.render_command(command, &mut out.segments),
            EngineEvent::ToolUse { command, record } => {
                let body = match command {
                    Some(command) => command,
                    None => pretty_truncated(&record),
                };
                out.segments.push(Segment::text(format!("\n[tool_use]\n{}\n", body)));
            }
            EngineEvent::ToolResult { output, record } => {
                let body = match output {
                    Some(output) => truncate_middle(&output, TOOL_OUTPUT_LIMIT),
                    None => pretty_truncated(&record),
                };
                out.segments.push(Segment::text(format!("\n[tool_result]\n{}\n", body)));
            }
            EngineEvent::FileChange(diff) => {
                out.segments.push(Segment::text(format!(
                    "\n[file_change]\n{}\n",
                    truncate_middle(&diff, DIFF_LIMIT)
                )));
            }
            EngineEvent::TextDelta(text) => {
                self.saw_delta = true;
                out.segments.push(Segment::text(text));
            }
            EngineEvent::AssistantMessage(text) | EngineEvent::RunResult(text) => {
                if let Some(segment) = self.complete_message(text) {
                    out.segments.push(segment);
                }
            }
            EngineEvent::Fallback(text) | EngineEvent::Raw(text) => {
                out.segments.push(Segment::text(text));
            }
        }
    }

    /// Complete messages duplicate claude's streamed deltas, so live claude
    /// runs drop them; codex has no deltas for them and shows them as-is.
    fn complete_message(&self, text: String) -> Option<Segment> {
        match (self.engine, self.replay) {
            (Engine::Codex, false) => Some(Segment::text(text)),
            (Engine::Claude, false) => None,
            (_, true) if self.saw_delta => None,
            (_, true) => Some(Segment::text(format!("\n{}\n", text))),
        }
    }

    fn render_command(&mut self, command: CommandExecution, segments: &mut Vec<Segment>) {
        if let Some(cmd) = command.command {
            if (command.started || command.finished) && self.last_command.as_ref() != Some(&cmd) {
                segments.push(Segment::text(format!("\n$ {}\n", cmd)));
                self.last_command = Some(cmd);
            }
        }
        if !command.finished {
            return;
        }
        if let Some(output) = command.output {
            let output = output.trim_end_matches('\n');
            segments.push(Segment::text(format!(
                "{}\n",
                truncate_middle(output, TOOL_OUTPUT_LIMIT)
            )));
        }
        if let Some(code) = command.exit_code {
            segments.push(Segment::text(format!("(exit_code: {})\n", code)));
        }
    }
}

fn pretty_truncated(record: &Value) -> String {
    let pretty = serde_json::to_string_pretty(record).unwrap_or_else(|_| record.to_string());
    truncate_middle(&pretty, TOOL_OUTPUT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOKEN: &str = "0b0e1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d";
    const OTHER: &str = "ffffffff-eeee-dddd-cccc-bbbbbbbbbbbb";

    fn contents(normalized: &Normalized) -> Vec<&str> {
        normalized
            .segments
            .iter()
            .map(|s| s.content.as_str())
            .collect()
    }

    #[test]
    fn reasoning_is_suppressed() {
        let mut n = Normalizer::new(Engine::Codex);
        let out = n.normalize_line(
            &json!({"type": "item.completed", "item": {"type": "reasoning", "text": "private"}})
                .to_string(),
        );
        assert!(out.suppressed);
        assert!(out.segments.is_empty());
    }

    #[test]
    fn command_header_emitted_once_per_command() {
        let mut n = Normalizer::new(Engine::Codex);
        let started = json!({"type": "item.started", "item": {"type": "command_execution", "command": "ls", "status": "in_progress"}});
        let done = json!({"type": "item.completed", "item": {"type": "command_execution", "command": "ls", "aggregated_output": "a\nb\n\n", "exit_code": 0}});

        assert_eq!(contents(&n.normalize_line(&started.to_string())), vec!["\n$ ls\n"]);
        assert_eq!(
            contents(&n.normalize_line(&done.to_string())),
            vec!["a\nb\n", "(exit_code: 0)\n"]
        );
    }

    #[test]
    fn long_command_output_is_capped() {
        let mut n = Normalizer::new(Engine::Codex);
        let done = json!({"type": "item.completed", "item": {"type": "command_execution", "command": "yes", "aggregated_output": "y\n".repeat(5000)}});
        let out = n.normalize_line(&done.to_string());
        assert_eq!(out.segments.len(), 2);
        assert!(out.segments[1].plain_len() <= TOOL_OUTPUT_LIMIT + 1);
    }

    #[test]
    fn tool_use_without_command_shows_record() {
        let mut n = Normalizer::new(Engine::Codex);
        let out = n.normalize_line(&json!({"type": "tool_use", "name": "web"}).to_string());
        let text = &out.segments[0].content;
        assert!(text.starts_with("\n[tool_use]\n{"));
        assert!(text.contains("\"name\": \"web\""));
    }

    #[test]
    fn explicit_token_recorded_once() {
        let mut n = Normalizer::new(Engine::Codex);
        let first = n.normalize_line(&json!({"type": "turn.started", "thread_id": TOKEN}).to_string());
        assert_eq!(first.token.as_deref(), Some(TOKEN));

        let second = n.normalize_line(&json!({"type": "thread.started", "thread_id": OTHER}).to_string());
        assert_eq!(second.token, None);
        assert_eq!(n.token(), Some(TOKEN));
    }

    #[test]
    fn deep_scan_only_on_thread_start() {
        let mut n = Normalizer::new(Engine::Codex);
        let unrelated = json!({"type": "item.completed", "item": {"type": "note", "ref": OTHER}});
        assert_eq!(n.normalize_line(&unrelated.to_string()).token, None);

        let start = json!({"type": "thread.started", "meta": {"conversation": TOKEN}});
        assert_eq!(n.normalize_line(&start.to_string()).token.as_deref(), Some(TOKEN));
    }

    #[test]
    fn claude_live_drops_complete_messages() {
        let mut n = Normalizer::new(Engine::Claude);
        let init = json!({"type": "system", "subtype": "init", "session_id": TOKEN});
        assert_eq!(n.normalize_line(&init.to_string()).token.as_deref(), Some(TOKEN));

        let message = json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "hello"}]}});
        assert!(n.normalize_line(&message.to_string()).segments.is_empty());
    }

    #[test]
    fn replay_shows_messages_when_no_deltas() {
        let mut n = Normalizer::for_replay(Engine::Claude);
        let message = json!({"type": "assistant", "message": {"content": [{"type": "text", "text": "hello"}]}});
        assert_eq!(contents(&n.normalize_line(&message.to_string())), vec!["\nhello\n"]);
    }

    #[test]
    fn raw_lines_pass_through() {
        let mut n = Normalizer::new(Engine::Claude);
        assert_eq!(contents(&n.normalize_line("warning: x\n")), vec!["warning: x\n"]);
    }

    proptest::proptest! {
        #[test]
        fn codex_tokens_are_always_uuid_shaped(line in "\\PC{0,200}") {
            let mut n = Normalizer::new(Engine::Codex);
            let normalized = n.normalize_line(&line);
            if let Some(token) = normalized.token {
                proptest::prop_assert!(token::uuid_in(&Value::String(token)).is_some());
            }
        }

        #[test]
        fn embedded_token_is_found_once(prefix in "([a-z]{1,12} ){0,3}") {
            let mut n = Normalizer::new(Engine::Codex);
            let line = json!({"type": "thread.started", "payload": {"note": format!("{}{}", prefix, TOKEN)}}).to_string();
            let normalized = n.normalize_line(&line);
            proptest::prop_assert_eq!(normalized.token.as_deref(), Some(TOKEN));
            proptest::prop_assert_eq!(n.normalize_line(&line).token, None);
        }
    }
}
