//! Command-line behavior against a temporary runtime directory and fake
//! engine scripts.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const EX_USAGE: i32 = 64;
const EX_UNAVAILABLE: i32 = 69;
const EX_IOERR: i32 = 74;

struct TestEnv {
    temp_dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("work")).unwrap();
        Self { temp_dir }
    }

    fn work_dir(&self) -> PathBuf {
        self.temp_dir.path().join("work")
    }

    fn fake_codex(&self, body: &str) -> PathBuf {
        let path = self.temp_dir.path().join("fake-codex");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn cli_command(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vibes"));
        cmd.env("NO_COLOR", "1")
            .env("VIBES_EDIT_THROTTLE_MS", "50")
            .env_remove("VIBES_LOG")
            .env_remove("VIBES_CODEX_BIN")
            .env_remove("VIBES_CLAUDE_BIN")
            .arg("--runtime-dir")
            .arg(self.temp_dir.path().join("runtime"));
        cmd
    }

    fn run(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.cli_command().args(args).assert()
    }

    fn create(&self, name: &str) {
        self.cli_command()
            .args(["new", name, "--path"])
            .arg(self.work_dir())
            .assert()
            .success();
    }
}

#[test]
fn new_list_show() {
    let env = TestEnv::new();
    env.run(&["list"])
        .success()
        .stdout(predicate::str::contains("No sessions"));

    env.cli_command()
        .args(["new", "api", "--engine", "claude", "--path"])
        .arg(env.work_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created session api"))
        .stdout(predicate::str::contains("claude sonnet"));

    env.run(&["list"])
        .success()
        .stdout(predicate::str::contains("api"))
        .stdout(predicate::str::contains("idle"));

    env.run(&["show", "api"])
        .success()
        .stdout(predicate::str::contains("🆕 api"))
        .stdout(predicate::str::contains("Engine: claude"))
        .stdout(predicate::str::contains("last run: never"));
}

#[test]
fn invalid_input_uses_usage_exit_code() {
    let env = TestEnv::new();
    env.cli_command()
        .args(["new", "bad name", "--path"])
        .arg(env.work_dir())
        .assert()
        .code(EX_USAGE)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("Suggestion:"));

    env.run(&["new", "api", "--path", "/definitely/not/here"])
        .code(EX_USAGE)
        .stderr(predicate::str::contains("directory not found"));
}

#[test]
fn unknown_session_is_unavailable() {
    let env = TestEnv::new();
    env.run(&["show", "ghost"])
        .code(EX_UNAVAILABLE)
        .stderr(predicate::str::contains("vibes list"));
    env.run(&["delete", "ghost"]).code(EX_UNAVAILABLE);
}

#[test]
fn run_prints_output_and_keeps_logs() {
    let env = TestEnv::new();
    let codex = env.fake_codex(
        r#"echo '{"type":"thread.started","thread_id":"0b0e1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d"}'
echo 'warming up' >&2
echo '{"type":"item.completed","item":{"type":"agent_message","text":"All done."}}'"#,
    );
    env.create("api");

    env.cli_command()
        .env("VIBES_CODEX_BIN", &codex)
        .args(["run", "api", "fix", "the", "tests"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All done."))
        .stdout(predicate::str::contains("Status: idle (last run: success)"));

    env.run(&["logs", "api"])
        .success()
        .stdout(predicate::str::contains("All done."));
    env.run(&["logs", "api", "--stderr"])
        .success()
        .stdout(predicate::str::contains("warming up"));
    env.run(&["show", "api"])
        .success()
        .stdout(predicate::str::contains("Last answer:"));
}

#[test]
fn failed_run_exits_non_zero() {
    let env = TestEnv::new();
    let codex = env.fake_codex("echo 'model overloaded' >&2\nexit 2");
    env.create("api");

    env.cli_command()
        .env("VIBES_CODEX_BIN", &codex)
        .args(["run", "api", "--new", "go"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("last run: error"));
}

#[test]
fn missing_engine_binary_is_an_io_error() {
    let env = TestEnv::new();
    env.create("api");

    env.cli_command()
        .env("VIBES_CODEX_BIN", env.temp_dir.path().join("no-such-codex"))
        .args(["run", "api", "go"])
        .assert()
        .code(EX_IOERR)
        .stderr(predicate::str::contains("Error:"));

    env.run(&["logs", "api", "--stderr"])
        .success()
        .stdout(predicate::str::contains("not found in PATH"));
}

#[test]
fn model_clear_delete() {
    let env = TestEnv::new();
    env.create("api");

    env.run(&["model", "api", "gpt-5.2-codex", "--effort", "medium"])
        .success()
        .stdout(predicate::str::contains("gpt-5.2-codex (medium)"));
    env.run(&["clear", "api"]).success();
    env.run(&["list"])
        .success()
        .stdout(predicate::str::contains("gpt-5.2-codex"));

    env.run(&["delete", "api"])
        .success()
        .stdout(predicate::str::contains("Deleted session api"));
    env.run(&["list"])
        .success()
        .stdout(predicate::str::contains("No sessions"));
    assert!(env.work_dir().exists());
}

#[test]
fn completions_are_generated() {
    let env = TestEnv::new();
    env.run(&["completions", "bash"])
        .success()
        .stdout(predicate::str::contains("vibes"));
}
