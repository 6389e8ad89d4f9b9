#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use vibes_process::spawn;
use vibes_process::CommandSpec;
use vibes_process::ProcessError;
use vibes_process::RecordingProcessController;
use vibes_process::Signal;
use vibes_process::StopOutcome;
use vibes_process::UnixProcessController;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script)
}

#[tokio::test]
async fn captures_stdout_stderr_and_exit_code() {
    let spawned = spawn(
        &sh("echo out; echo err >&2; exit 3"),
        Arc::new(UnixProcessController),
    )
    .unwrap();

    let mut stdout = BufReader::new(spawned.stdout).lines();
    let mut stderr = BufReader::new(spawned.stderr).lines();
    assert_eq!(stdout.next_line().await.unwrap().as_deref(), Some("out"));
    assert_eq!(stderr.next_line().await.unwrap().as_deref(), Some("err"));
    assert_eq!(spawned.handle.wait().await, 3);
    assert_eq!(spawned.handle.exit_code(), Some(3));
}

#[tokio::test]
async fn runs_in_requested_directory() {
    let dir = tempfile::tempdir().unwrap();
    let spawned = spawn(&sh("pwd").cwd(dir.path()), Arc::new(UnixProcessController)).unwrap();
    let mut stdout = BufReader::new(spawned.stdout).lines();
    let line = stdout.next_line().await.unwrap().unwrap();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(std::path::Path::new(&line).canonicalize().unwrap(), expected);
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let err = spawn(
        &CommandSpec::new("definitely-not-an-engine-binary"),
        Arc::new(UnixProcessController),
    )
    .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, ProcessError::Spawn { .. }));
}

#[tokio::test]
async fn stop_after_exit_sends_no_signal() {
    let controller = Arc::new(RecordingProcessController::new());
    let spawned = spawn(&sh("exit 0"), controller.clone()).unwrap();
    assert_eq!(spawned.handle.wait().await, 0);

    let first = spawned.handle.stop(Duration::from_millis(100)).await.unwrap();
    let second = spawned.handle.stop(Duration::from_millis(100)).await.unwrap();
    assert_eq!(first, StopOutcome::AlreadyExited);
    assert_eq!(second, StopOutcome::AlreadyExited);
    assert!(controller.signals_sent().is_empty());
}

#[tokio::test]
async fn sigterm_stops_the_whole_group() {
    let spawned = spawn(&sh("sleep 30 & wait"), Arc::new(UnixProcessController)).unwrap();
    let outcome = spawned.handle.stop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(outcome, StopOutcome::Terminated);
    assert_eq!(spawned.handle.exit_code(), Some(128 + 15));
}

#[tokio::test]
async fn escalates_to_sigkill_when_term_is_ignored() {
    let spawned = spawn(
        &sh("trap '' TERM; echo ready; while :; do sleep 1; done"),
        Arc::new(UnixProcessController),
    )
    .unwrap();
    let mut stdout = BufReader::new(spawned.stdout).lines();
    assert_eq!(stdout.next_line().await.unwrap().as_deref(), Some("ready"));

    let outcome = spawned.handle.stop(Duration::from_millis(300)).await.unwrap();
    assert_eq!(outcome, StopOutcome::Killed);
    assert_eq!(spawned.handle.exit_code(), Some(128 + 9));
}

#[tokio::test]
async fn escalation_order_is_term_then_kill() {
    let controller = Arc::new(RecordingProcessController::new());
    let spawned = spawn(&sh("sleep 2"), controller.clone()).unwrap();
    let pid = spawned.handle.pid();

    let outcome = spawned.handle.stop(Duration::from_millis(50)).await.unwrap();
    assert_eq!(outcome, StopOutcome::Killed);
    assert_eq!(
        controller.signals_sent(),
        vec![(pid, Signal::Term), (pid, Signal::Kill)]
    );
    assert_eq!(spawned.handle.wait().await, 0);
}
