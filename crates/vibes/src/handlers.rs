use std::path::PathBuf;

use tracing::warn;
use vibes_channel::ChatId;
use vibes_channel::MessageChannel;
use vibes_channel::Surface;
use vibes_common::text::format_duration;
use vibes_common::Colors;
use vibes_core::Engine;
use vibes_daemon::ui;
use vibes_daemon::DeleteOutcome;
use vibes_daemon::RunMode;
use vibes_daemon::RunOutcome;
use vibes_daemon::SessionError;
use vibes_daemon::SessionManager;
use vibes_daemon::SessionRecord;

use crate::console::ConsoleChannel;
use crate::signals::SignalHandler;

pub type HandlerResult = anyhow::Result<()>;

/// The chat every console message belongs to.
pub const CONSOLE_CHAT: ChatId = ChatId(0);

/// Exit code of a run stopped by an interrupt.
pub const EXIT_INTERRUPTED: i32 = 130;

pub struct HandlerContext {
    pub manager: SessionManager,
    pub console: ConsoleChannel,
}

impl HandlerContext {
    pub fn new(manager: SessionManager, console: ConsoleChannel) -> Self {
        Self { manager, console }
    }

    fn record(&self, name: &str) -> Result<SessionRecord, SessionError> {
        self.manager
            .get(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }
}

fn model_label(record: &SessionRecord) -> String {
    if record.engine.supports_reasoning_effort() {
        format!("{} ({})", record.model, record.reasoning_effort)
    } else {
        record.model.clone()
    }
}

pub async fn handle_new(
    ctx: &HandlerContext,
    name: Option<String>,
    path: PathBuf,
    engine: Option<Engine>,
) -> HandlerResult {
    let name = name.unwrap_or_else(|| ctx.manager.next_auto_session_name());
    let record = ctx.manager.create(&name, &path, engine).await?;
    println!(
        "{} Created session {} [{} {}] in {}",
        Colors::success("✓"),
        Colors::session_name(record.name.as_str()),
        record.engine,
        model_label(&record),
        record.path.display()
    );
    Ok(())
}

pub fn handle_list(ctx: &HandlerContext) -> HandlerResult {
    let records = ctx.manager.list();
    if records.is_empty() {
        println!("No sessions. Create one with: vibes new <name> --path <dir>");
        return Ok(());
    }
    for record in records {
        let duration = record
            .last_run_duration_s
            .map(|secs| format!("  {}", format_duration(std::time::Duration::from_secs(secs))))
            .unwrap_or_default();
        println!(
            "{} {}  {} {}  {}{}  {}",
            record.status_badge(),
            Colors::session_name(record.name.as_str()),
            record.engine,
            model_label(&record),
            Colors::status(record.status.as_str()),
            duration,
            Colors::dim(&record.path.display().to_string())
        );
    }
    Ok(())
}

pub fn handle_show(ctx: &HandlerContext, name: &str) -> HandlerResult {
    let record = ctx.record(name)?;
    println!("{}", ui::session_view(&record, None).to_plain());
    if let Some(answer) = ctx.manager.last_agent_message(name)? {
        println!();
        println!("{}", Colors::bold("Last answer:"));
        println!("{}", answer);
    }
    Ok(())
}

pub async fn handle_model(
    ctx: &HandlerContext,
    name: &str,
    model: &str,
    effort: Option<&str>,
) -> HandlerResult {
    let record = ctx.manager.set_model(name, model, effort).await?;
    if effort.is_some() && !record.engine.supports_reasoning_effort() {
        eprintln!(
            "{} {} ignores the reasoning effort",
            Colors::warning("Note:"),
            record.engine
        );
    }
    println!(
        "{} {} now uses {}",
        Colors::success("✓"),
        Colors::session_name(record.name.as_str()),
        model_label(&record)
    );
    Ok(())
}

/// Runs the prompt in the foreground and returns the process exit code to
/// use: 0 on success, 1 on engine failure, 130 when stopped.
pub async fn handle_run(
    ctx: &HandlerContext,
    name: &str,
    new: bool,
    prompt: &str,
) -> anyhow::Result<i32> {
    let record = ctx.record(name)?;
    let panel_id = ctx
        .console
        .send_message(CONSOLE_CHAT, &ui::session_view(&record, None).render(), None)
        .await?;
    let panel = Surface::new(CONSOLE_CHAT, panel_id);
    let mode = if new { RunMode::New } else { RunMode::Continue };

    let (_signals, mut interrupts) = SignalHandler::setup()?;
    let mut run = tokio::spawn({
        let manager = ctx.manager.clone();
        let name = name.to_string();
        let prompt = prompt.to_string();
        async move { manager.run_prompt(&name, panel, &prompt, mode).await }
    });

    let finished = tokio::select! {
        result = &mut run => Some(result),
        Some(_) = interrupts.recv() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            if let Err(e) = ctx.manager.stop(name, "interrupt").await {
                warn!(session = name, error = %e, "Failed to stop run after interrupt");
            }
            run.await
        }
    };
    let report = result??;

    if !ctx.console.is_interactive() {
        for surface in [report.surface, panel] {
            if let Some(text) = ctx.console.plain_text(surface) {
                println!("{}\n", text.trim_end());
            }
        }
    }

    Ok(match report.outcome {
        RunOutcome::Success => 0,
        RunOutcome::Stopped => EXIT_INTERRUPTED,
        RunOutcome::Error | RunOutcome::Never => 1,
    })
}

pub fn handle_logs(ctx: &HandlerContext, name: &str, stderr: bool) -> HandlerResult {
    let preview = if stderr {
        ctx.manager.stderr_preview(name)?
    } else {
        ctx.manager.stdout_preview(name)?
    };
    if preview.is_empty() {
        println!("{}", Colors::dim("(no output)"));
    } else {
        println!("{}", preview);
    }
    Ok(())
}

pub async fn handle_clear(ctx: &HandlerContext, name: &str) -> HandlerResult {
    let record = ctx.manager.clear_state(name).await?;
    println!(
        "{} Cleared the conversation of {}",
        Colors::success("✓"),
        Colors::session_name(record.name.as_str())
    );
    Ok(())
}

pub async fn handle_delete(ctx: &HandlerContext, name: &str) -> HandlerResult {
    match ctx.manager.delete(name).await? {
        DeleteOutcome::Deleted => println!(
            "{} Deleted session {}",
            Colors::success("✓"),
            Colors::session_name(name)
        ),
        DeleteOutcome::Pending => println!(
            "{} Session {} is running; it will be deleted when the run stops",
            Colors::warning("…"),
            Colors::session_name(name)
        ),
    }
    Ok(())
}
