//! Views and action rows shown on run surfaces.

use std::sync::Arc;

use tokio::time::Instant;
use vibes_channel::ReplyAction;
use vibes_channel::ReplyActions;
use vibes_channel::RichText;
use vibes_common::text::format_duration;

use crate::record::SessionRecord;
use crate::stream::FooterProvider;

pub const RUN_START_WAIT_NOTE: &str = "The request has been sent. During startup (especially for larger models), the first logs may appear after about one minute — please wait…";
pub const STOP_CONFIRM_QUESTION: &str = "Are you sure you want to stop this run?";
pub const START_FAILED_NOTICE: &str = "Failed to start.";

pub const ACTION_DETACH: &str = "detach";
pub const ACTION_INTERRUPT: &str = "interrupt";
pub const ACTION_STOP_YES: &str = "stop_yes";
pub const ACTION_STOP_NO: &str = "stop_no";

pub fn wait_note_header() -> RichText {
    RichText::new().italic(RUN_START_WAIT_NOTE)
}

fn field(text: RichText, label: &str, value: &str) -> RichText {
    text.bold(format!("{}:", label)).plain(" ").code(value.to_string())
}

/// Header of a running session's live view.
pub fn running_header(record: &SessionRecord, note: Option<&str>) -> RichText {
    let mut text = field(RichText::new(), "Session", record.name.as_str()).newline();
    text = field(text, "Path", &record.path.display().to_string()).newline();
    text = field(text, "Engine", record.engine.as_str()).newline();
    text = field(text, "Model", &record.model).newline();
    if record.engine.supports_reasoning_effort() {
        text = field(text, "Reasoning effort", &record.reasoning_effort).newline();
    }
    text = text.bold("Status:").plain(format!(" {}", record.status));
    if let Some(note) = note {
        text = text.newline().italic(note.to_string());
    }
    text
}

/// `---- Working Xm Ys ----`, measured from `started`.
pub fn working_footer(started: Instant) -> FooterProvider {
    Arc::new(move || {
        RichText::new().code(format!(
            "---- Working {} ----",
            format_duration(started.elapsed())
        ))
    })
}

pub fn running_actions() -> ReplyActions {
    ReplyActions::row(vec![
        ReplyAction::new("⬅️", ACTION_DETACH),
        ReplyAction::new("⛔", ACTION_INTERRUPT),
    ])
}

pub fn stop_confirm_actions() -> ReplyActions {
    ReplyActions::row(vec![
        ReplyAction::new("✅ Yes, stop", ACTION_STOP_YES),
        ReplyAction::new("❌ No", ACTION_STOP_NO),
    ])
}

/// Summary of a session at rest, with an optional one-line notice.
pub fn session_view(record: &SessionRecord, notice: Option<&str>) -> RichText {
    let mut text = RichText::new()
        .plain(format!("{} ", record.status_badge()))
        .bold(record.name.to_string())
        .newline();
    text = field(text, "Path", &record.path.display().to_string()).newline();
    text = field(text, "Engine", record.engine.as_str()).newline();
    text = field(text, "Model", &record.model).newline();
    if record.engine.supports_reasoning_effort() {
        text = field(text, "Reasoning effort", &record.reasoning_effort).newline();
    }
    text = text
        .bold("Status:")
        .plain(format!(" {} (last run: {})", record.status, record.last_result));
    if let Some(secs) = record.last_run_duration_s {
        text = text
            .newline()
            .bold("Duration:")
            .plain(format!(" {}", format_duration(std::time::Duration::from_secs(secs))));
    }
    if let Some(active) = record.last_active {
        text = text
            .newline()
            .bold("Last active:")
            .plain(format!(" {}", active.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if let Some(thread) = &record.thread_id {
        text = field(text.newline(), "Conversation", thread);
    }
    if let Some(notice) = notice {
        text = text.newline().newline().italic(notice.to_string());
    }
    text
}
