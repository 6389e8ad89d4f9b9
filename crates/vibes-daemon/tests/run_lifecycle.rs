//! End-to-end runs against fake engine scripts.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vibes_channel::ChannelCall;
use vibes_channel::ChatId;
use vibes_channel::MessageId;
use vibes_channel::MockChannel;
use vibes_channel::Surface;
use vibes_core::Engine;
use vibes_daemon::ui;
use vibes_daemon::DaemonConfig;
use vibes_daemon::DeleteOutcome;
use vibes_daemon::RunMode;
use vibes_daemon::RunOutcome;
use vibes_daemon::SessionError;
use vibes_daemon::SessionManager;
use vibes_daemon::SessionStatus;
use vibes_process::UnixProcessController;

const THREAD: &str = "0b0e1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d";

struct Harness {
    dir: TempDir,
    channel: MockChannel,
    manager: SessionManager,
}

impl Harness {
    /// A manager whose codex binary is a script with `body`.
    fn new(body: &str) -> Self {
        Self::scripted(|_| body.to_string())
    }

    /// Like [`Harness::new`], with the script body built from the temp dir.
    fn scripted(body: impl FnOnce(&Path) -> String) -> Self {
        let dir = TempDir::new().unwrap();
        let script = write_script(dir.path(), "fake-codex", &body(dir.path()));
        let config = DaemonConfig::with_defaults(dir.path().join("runtime"))
            .with_codex_bin(script.to_string_lossy())
            .with_edit_throttle(Duration::from_millis(20))
            .with_stop_grace(Duration::from_secs(2))
            .with_reader_drain(Duration::from_millis(500));
        Self::with_config(dir, config)
    }

    fn with_config(dir: TempDir, config: DaemonConfig) -> Self {
        let channel = MockChannel::new();
        let manager = SessionManager::new(
            config,
            Arc::new(channel.clone()),
            Arc::new(UnixProcessController),
        );
        Self {
            dir,
            channel,
            manager,
        }
    }

    fn workdir(&self) -> PathBuf {
        let path = self.dir.path().join("work");
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    fn args_file(&self) -> PathBuf {
        self.dir.path().join("args.txt")
    }

    fn edits_on(&self, surface: Surface) -> Vec<String> {
        self.channel
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                ChannelCall::Edit {
                    surface: s,
                    text,
                    accepted: true,
                    ..
                } if s == surface => Some(text),
                _ => None,
            })
            .collect()
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn panel() -> Surface {
    Surface::new(ChatId(7), MessageId(1))
}

/// The message the first run of a fresh harness renders into.
fn first_output() -> Surface {
    Surface::new(ChatId(7), MessageId(1000))
}

async fn wait_until_running(manager: &SessionManager, name: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !manager.is_running(name) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run never started");
}

#[tokio::test]
async fn successful_run_records_token_and_output() {
    let harness = Harness::scripted(|dir| {
        format!(
            r#"printf '%s\n' "$*" >> '{args}'
echo '{{"type":"thread.started","thread_id":"{thread}"}}'
echo 'warming up' >&2
echo '{{"type":"item.completed","item":{{"type":"agent_message","text":"All done."}}}}'
exit 0"#,
            args = dir.join("args.txt").display(),
            thread = THREAD,
        )
    });
    let args_file = harness.args_file();
    let manager = &harness.manager;
    manager.create("demo", &harness.workdir(), None).await.unwrap();

    let report = manager
        .run_prompt("demo", panel(), "fix the tests", RunMode::Continue)
        .await
        .unwrap();
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(report.status, SessionStatus::Idle);
    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.surface, first_output());

    let record = manager.get("demo").unwrap();
    assert_eq!(record.thread_id.as_deref(), Some(THREAD));
    assert_eq!(record.last_result, RunOutcome::Success);
    assert!(record.last_run_duration_s.is_some());
    assert!(record.last_stdout_log.as_ref().unwrap().exists());

    assert_eq!(
        manager.last_agent_message("demo").unwrap().as_deref(),
        Some("All done.")
    );
    assert!(manager.stderr_preview("demo").unwrap().contains("warming up"));

    assert!(harness.channel.sent_texts()[0].contains("The request has been sent"));
    assert!(harness
        .edits_on(first_output())
        .iter()
        .any(|text| text.contains("All done.")));
    let panel_view = harness.edits_on(panel()).pop().unwrap();
    assert!(panel_view.contains("demo"));
    assert!(panel_view.contains("success"));

    // A second run resumes the discovered conversation.
    manager
        .run_prompt("demo", panel(), "and now lint", RunMode::Continue)
        .await
        .unwrap();
    let args = std::fs::read_to_string(&args_file).unwrap();
    let lines: Vec<&str> = args.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(!lines[0].contains("resume"));
    assert!(lines[1].contains(&format!("resume {}", THREAD)));
    assert!(lines[1].ends_with("and now lint"));
}

#[tokio::test]
async fn non_zero_exit_marks_error() {
    let harness = Harness::new("echo 'boom' >&2\nexit 3");
    let manager = &harness.manager;
    manager.create("demo", &harness.workdir(), None).await.unwrap();

    let report = manager
        .run_prompt("demo", panel(), "go", RunMode::New)
        .await
        .unwrap();
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(report.status, SessionStatus::Error);
    assert_eq!(report.outcome, RunOutcome::Error);
    assert_eq!(manager.get("demo").unwrap().status, SessionStatus::Error);
    assert_eq!(manager.stderr_preview("demo").unwrap(), "boom");
}

#[tokio::test]
async fn missing_binary_fails_to_start() {
    let dir = TempDir::new().unwrap();
    let config = DaemonConfig::with_defaults(dir.path().join("runtime"))
        .with_codex_bin(dir.path().join("no-such-codex").to_string_lossy())
        .with_edit_throttle(Duration::from_millis(20));
    let harness = Harness::with_config(dir, config);
    let manager = &harness.manager;
    manager.create("demo", &harness.workdir(), None).await.unwrap();

    let err = manager
        .run_prompt("demo", panel(), "go", RunMode::Continue)
        .await
        .unwrap_err();
    assert!(matches!(&err, SessionError::Process(e) if e.is_not_found()));

    let record = manager.get("demo").unwrap();
    assert_eq!(record.status, SessionStatus::Error);
    assert_eq!(record.last_result, RunOutcome::Error);
    assert!(manager.stderr_preview("demo").unwrap().contains("not found in PATH"));
    assert!(!manager.is_running("demo"));
    assert!(harness
        .edits_on(first_output())
        .last()
        .unwrap()
        .contains(ui::START_FAILED_NOTICE));
}

#[tokio::test]
async fn stop_terminates_the_process_group() {
    let harness = Harness::new(&format!(
        "echo '{{\"type\":\"thread.started\",\"thread_id\":\"{}\"}}'\nsleep 30",
        THREAD
    ));
    let manager = harness.manager.clone();
    manager.create("demo", &harness.workdir(), None).await.unwrap();

    let run = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_prompt("demo", panel(), "go", RunMode::Continue).await }
    });
    wait_until_running(&manager, "demo").await;
    assert_eq!(manager.get("demo").unwrap().status, SessionStatus::Running);
    assert!(matches!(
        manager.run_prompt("demo", panel(), "again", RunMode::Continue).await,
        Err(SessionError::Running(_))
    ));
    assert!(matches!(
        manager.clear_state("demo").await,
        Err(SessionError::Running(_))
    ));

    assert!(manager.stop("demo", "test").await.unwrap());
    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.status, SessionStatus::Stopped);
    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert_eq!(manager.get("demo").unwrap().status, SessionStatus::Stopped);

    // Nothing left to stop.
    assert!(!manager.stop("demo", "test").await.unwrap());
}

#[tokio::test]
async fn deleting_a_running_session_waits_for_the_run() {
    let harness = Harness::new("sleep 30");
    let manager = harness.manager.clone();
    manager.create("demo", &harness.workdir(), None).await.unwrap();

    let run = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_prompt("demo", panel(), "go", RunMode::Continue).await }
    });
    wait_until_running(&manager, "demo").await;

    assert_eq!(manager.delete("demo").await.unwrap(), DeleteOutcome::Pending);
    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.status, SessionStatus::Stopped);
    assert!(manager.get("demo").is_none());
    assert!(harness.workdir().exists());
}

#[tokio::test]
async fn deleting_a_starting_session_cancels_the_spawn() {
    let harness = Harness::scripted(|dir| {
        format!("touch '{}'\nsleep 30", dir.join("spawned").display())
    });
    let marker = harness.dir.path().join("spawned");
    harness.channel.delay_sends(Duration::from_millis(500));
    let manager = harness.manager.clone();
    manager.create("demo", &harness.workdir(), None).await.unwrap();

    let run = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_prompt("demo", panel(), "go", RunMode::Continue).await }
    });
    tokio::time::timeout(Duration::from_secs(10), async {
        while harness.channel.sent_texts().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("output message never requested");
    assert_eq!(manager.get("demo").unwrap().status, SessionStatus::Running);
    assert!(!manager.is_running("demo"));

    assert!(matches!(
        manager.clear_state("demo").await,
        Err(SessionError::Running(_))
    ));
    assert_eq!(manager.delete("demo").await.unwrap(), DeleteOutcome::Pending);
    assert!(manager.get("demo").unwrap().pending_delete);

    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.exit_code, None);
    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert!(manager.get("demo").is_none());
    assert!(!marker.exists());
}

#[tokio::test]
async fn stop_yes_without_confirmation_keeps_running() {
    let harness = Harness::new("sleep 30");
    let manager = harness.manager.clone();
    manager.create("demo", &harness.workdir(), None).await.unwrap();

    let run = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_prompt("demo", panel(), "go", RunMode::Continue).await }
    });
    wait_until_running(&manager, "demo").await;

    let owner = manager
        .handle_action(first_output(), ui::ACTION_STOP_YES)
        .await
        .unwrap();
    assert_eq!(owner.unwrap().as_str(), "demo");
    assert!(manager.is_running("demo"));
    assert!(!manager.is_confirming_stop("demo"));

    manager.shutdown().await;
    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Stopped);
}

#[tokio::test]
async fn actions_follow_the_attached_run() {
    let harness = Harness::new("sleep 30");
    let manager = harness.manager.clone();
    let work = harness.workdir();
    manager.create("alpha", &work, None).await.unwrap();
    manager.create("beta", &work, Some(Engine::Codex)).await.unwrap();

    let alpha = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_prompt("alpha", panel(), "a", RunMode::Continue).await }
    });
    wait_until_running(&manager, "alpha").await;
    let alpha_surface = first_output();
    assert_eq!(
        manager.resolve_attached_running_session(alpha_surface).unwrap().as_str(),
        "alpha"
    );

    manager
        .handle_action(alpha_surface, ui::ACTION_INTERRUPT)
        .await
        .unwrap();
    assert!(manager.is_confirming_stop("alpha"));
    manager
        .handle_action(alpha_surface, ui::ACTION_STOP_NO)
        .await
        .unwrap();
    assert!(!manager.is_confirming_stop("alpha"));

    let beta = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_prompt("beta", panel(), "b", RunMode::Continue).await }
    });
    wait_until_running(&manager, "beta").await;

    // Attaching beta to alpha's message hands the message over.
    manager.attach("beta", alpha_surface).unwrap();
    assert_eq!(
        manager.resolve_attached_running_session(alpha_surface).unwrap().as_str(),
        "beta"
    );

    manager
        .handle_action(alpha_surface, ui::ACTION_INTERRUPT)
        .await
        .unwrap();
    assert!(manager.is_confirming_stop("beta"));
    let owner = manager
        .handle_action(alpha_surface, ui::ACTION_STOP_YES)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(owner.as_str(), "beta");
    let beta_report = tokio::time::timeout(Duration::from_secs(10), beta)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(beta_report.outcome, RunOutcome::Stopped);
    assert!(manager.is_running("alpha"));

    manager.shutdown().await;
    let alpha_report = tokio::time::timeout(Duration::from_secs(10), alpha)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(alpha_report.outcome, RunOutcome::Stopped);
}
