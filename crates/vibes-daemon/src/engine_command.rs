//! Argument vectors for the engine CLIs.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;

use vibes_core::Engine;
use vibes_process::CommandSpec;

use crate::config::DaemonConfig;
use crate::record::RunMode;
use crate::record::SessionRecord;

/// Builds the command for one run of `record`.
///
/// `git_dir` only matters for codex, which needs write access to it.
pub fn build_command(
    record: &SessionRecord,
    prompt: &str,
    mode: RunMode,
    config: &DaemonConfig,
    git_dir: Option<&Path>,
) -> CommandSpec {
    let resume = match mode {
        RunMode::Continue => record.thread_id.as_deref().filter(|t| !t.is_empty()),
        RunMode::New => None,
    };
    let spec = match record.engine {
        Engine::Codex => codex_command(record, resume, config, git_dir),
        Engine::Claude => claude_command(record, resume, config),
    };
    let spec = if prompt.trim_start().starts_with('-') {
        spec.arg("--")
    } else {
        spec
    };
    spec.arg(prompt).cwd(&record.path)
}

fn codex_command(
    record: &SessionRecord,
    resume: Option<&str>,
    config: &DaemonConfig,
    git_dir: Option<&Path>,
) -> CommandSpec {
    let codex = config.codex();
    let mut spec = CommandSpec::new(&codex.bin).args([
        "exec".to_string(),
        "--json".to_string(),
        "--sandbox".to_string(),
        codex.sandbox.to_string(),
        "-c".to_string(),
        format!("approval_policy={}", codex.approval_policy),
    ]);
    spec = match git_dir {
        Some(dir) => spec.arg("--add-dir").arg(dir.display().to_string()),
        None => spec.arg("--skip-git-repo-check"),
    };
    spec = spec
        .arg("-C")
        .arg(record.path.display().to_string())
        .arg("--model")
        .arg(&record.model)
        .arg("-c")
        .arg(format!("model_reasoning_effort={}", record.reasoning_effort));
    if let Some(token) = resume {
        spec = spec.arg("resume").arg(token);
    }
    spec
}

fn claude_command(record: &SessionRecord, resume: Option<&str>, config: &DaemonConfig) -> CommandSpec {
    let claude = config.claude();
    let model = if record.model.is_empty() {
        claude.default_model.as_str()
    } else {
        record.model.as_str()
    };
    let mut spec = CommandSpec::new(&claude.bin).args([
        "-p",
        "--verbose",
        "--output-format",
        "stream-json",
        "--include-partial-messages",
        "--permission-mode",
        claude.permission_mode.as_str(),
        "--model",
        model,
    ]);
    if let Some(token) = resume {
        spec = spec.arg("-r").arg(token);
    }
    spec
}

/// The git directory of the repository containing `path`, if any.
///
/// Handles a plain `.git` directory, a `.git` file pointing elsewhere
/// (worktrees, submodules) and paths nested inside a repository.
pub fn detect_git_dir(path: &Path) -> Option<PathBuf> {
    let candidate = path.join(".git");
    if candidate.is_dir() {
        return Some(fs::canonicalize(&candidate).unwrap_or(candidate));
    }
    if candidate.is_file() {
        if let Some(dir) = gitdir_from_file(path, &candidate) {
            return Some(dir);
        }
    }
    rev_parse_git_dir(path)
}

fn gitdir_from_file(path: &Path, file: &Path) -> Option<PathBuf> {
    let raw = fs::read_to_string(file).ok()?;
    let raw = raw.trim();
    let (key, value) = raw.split_once(':')?;
    if !key.trim().eq_ignore_ascii_case("gitdir") {
        return None;
    }
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let dir = path.join(value);
    fs::canonicalize(dir).ok()
}

fn rev_parse_git_dir(path: &Path) -> Option<PathBuf> {
    let output = Command::new("git")
        .arg("-C")
        .arg(path)
        .args(["rev-parse", "--git-dir"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if out.is_empty() {
        return None;
    }
    let dir = path.join(out);
    Some(fs::canonicalize(&dir).unwrap_or(dir))
}
