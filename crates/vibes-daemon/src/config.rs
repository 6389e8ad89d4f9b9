//! Daemon configuration.
//!
//! Everything that used to be a module-level path or constant is carried
//! here and handed to constructors, so tests can point a manager at a
//! temporary directory without touching process-wide state.

use std::env;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use vibes_channel::MAX_MESSAGE_CHARS;
use vibes_process::DEFAULT_STOP_GRACE;

const DEFAULT_RUNTIME_DIR: &str = ".vibes";
const STATE_FILE: &str = "vibe_state.json";
const LOG_DIR: &str = "vibe_logs";
const BOT_LOG_FILE: &str = "vibe_bot.log";

const DEFAULT_EDIT_THROTTLE_MS: u64 = 2000;
const DEFAULT_READER_DRAIN_MS: u64 = 1000;
pub const DEFAULT_STDERR_TAIL_LINES: usize = 80;

pub const DEFAULT_CODEX_MODEL: &str = "gpt-5.2";
pub const DEFAULT_REASONING_EFFORT: &str = "high";
pub const DEFAULT_CLAUDE_MODEL: &str = "sonnet";
pub const DEFAULT_CLAUDE_PERMISSION_MODE: &str = "bypassPermissions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SandboxMode {
    ReadOnly,
    #[default]
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }
}

impl FromStr for SandboxMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(SandboxMode::ReadOnly),
            "workspace-write" => Ok(SandboxMode::WorkspaceWrite),
            "danger-full-access" => Ok(SandboxMode::DangerFullAccess),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    Untrusted,
    OnFailure,
    OnRequest,
    #[default]
    Never,
}

impl ApprovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalPolicy::Untrusted => "untrusted",
            ApprovalPolicy::OnFailure => "on-failure",
            ApprovalPolicy::OnRequest => "on-request",
            ApprovalPolicy::Never => "never",
        }
    }
}

impl FromStr for ApprovalPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untrusted" => Ok(ApprovalPolicy::Untrusted),
            "on-failure" => Ok(ApprovalPolicy::OnFailure),
            "on-request" => Ok(ApprovalPolicy::OnRequest),
            "never" => Ok(ApprovalPolicy::Never),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ApprovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexSettings {
    pub bin: String,
    pub sandbox: SandboxMode,
    pub approval_policy: ApprovalPolicy,
    pub default_model: String,
    pub default_reasoning_effort: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeSettings {
    pub bin: String,
    pub permission_mode: String,
    pub default_model: String,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    runtime_dir: PathBuf,
    state_path: PathBuf,
    log_dir: PathBuf,
    bot_log_path: PathBuf,
    edit_throttle: Duration,
    stop_grace: Duration,
    reader_drain: Duration,
    stderr_tail_lines: usize,
    max_message_chars: usize,
    codex: CodexSettings,
    claude: ClaudeSettings,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DaemonConfig {
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn bot_log_path(&self) -> &Path {
        &self.bot_log_path
    }

    /// Minimum interval between two edits of the same surface.
    pub fn edit_throttle(&self) -> Duration {
        self.edit_throttle
    }

    /// Time between SIGTERM and SIGKILL when stopping a run.
    pub fn stop_grace(&self) -> Duration {
        self.stop_grace
    }

    /// How long readers may keep draining pipes after the process exited.
    pub fn reader_drain(&self) -> Duration {
        self.reader_drain
    }

    pub fn stderr_tail_lines(&self) -> usize {
        self.stderr_tail_lines
    }

    pub fn max_message_chars(&self) -> usize {
        self.max_message_chars
    }

    pub fn codex(&self) -> &CodexSettings {
        &self.codex
    }

    pub fn claude(&self) -> &ClaudeSettings {
        &self.claude
    }

    pub fn from_env() -> Self {
        let runtime_dir = env::var("VIBES_RUNTIME_DIR")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME_DIR));

        let mut config = Self::with_defaults(runtime_dir);
        if let Some(path) = env_string("VIBES_LOG") {
            config.bot_log_path = PathBuf::from(path);
        }
        config.edit_throttle = Duration::from_millis(parse_env_u64(
            "VIBES_EDIT_THROTTLE_MS",
            DEFAULT_EDIT_THROTTLE_MS,
        ));
        config.stop_grace = Duration::from_secs(parse_env_u64(
            "VIBES_STOP_GRACE_SECS",
            DEFAULT_STOP_GRACE.as_secs(),
        ));
        config.codex.sandbox = parse_env_choice("VIBES_CODEX_SANDBOX", SandboxMode::default());
        config.codex.approval_policy =
            parse_env_choice("VIBES_CODEX_APPROVAL_POLICY", ApprovalPolicy::default());
        if let Some(bin) = env_string("VIBES_CODEX_BIN") {
            config.codex.bin = bin;
        }
        if let Some(mode) = env_string("VIBES_CLAUDE_PERMISSION_MODE") {
            config.claude.permission_mode = mode;
        }
        if let Some(model) = env_string("VIBES_CLAUDE_MODEL") {
            config.claude.default_model = model;
        }
        if let Some(bin) = env_string("VIBES_CLAUDE_BIN") {
            config.claude.bin = bin;
        }
        config
    }

    /// Built-in defaults rooted at `runtime_dir`, ignoring the environment.
    pub fn with_defaults(runtime_dir: impl Into<PathBuf>) -> Self {
        let runtime_dir = runtime_dir.into();
        Self {
            state_path: runtime_dir.join(STATE_FILE),
            log_dir: runtime_dir.join(LOG_DIR),
            bot_log_path: runtime_dir.join(BOT_LOG_FILE),
            runtime_dir,
            edit_throttle: Duration::from_millis(DEFAULT_EDIT_THROTTLE_MS),
            stop_grace: DEFAULT_STOP_GRACE,
            reader_drain: Duration::from_millis(DEFAULT_READER_DRAIN_MS),
            stderr_tail_lines: DEFAULT_STDERR_TAIL_LINES,
            max_message_chars: MAX_MESSAGE_CHARS,
            codex: CodexSettings {
                bin: "codex".to_string(),
                sandbox: SandboxMode::default(),
                approval_policy: ApprovalPolicy::default(),
                default_model: DEFAULT_CODEX_MODEL.to_string(),
                default_reasoning_effort: DEFAULT_REASONING_EFFORT.to_string(),
            },
            claude: ClaudeSettings {
                bin: "claude".to_string(),
                permission_mode: DEFAULT_CLAUDE_PERMISSION_MODE.to_string(),
                default_model: DEFAULT_CLAUDE_MODEL.to_string(),
            },
        }
    }

    /// Moves the state file and log directory under `dir`. An explicitly
    /// configured bot log stays where it is.
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.state_path = dir.join(STATE_FILE);
        self.log_dir = dir.join(LOG_DIR);
        if self.bot_log_path == self.runtime_dir.join(BOT_LOG_FILE) {
            self.bot_log_path = dir.join(BOT_LOG_FILE);
        }
        self.runtime_dir = dir;
        self
    }

    pub fn with_edit_throttle(mut self, throttle: Duration) -> Self {
        self.edit_throttle = throttle;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_reader_drain(mut self, drain: Duration) -> Self {
        self.reader_drain = drain;
        self
    }

    pub fn with_codex_bin(mut self, bin: impl Into<String>) -> Self {
        self.codex.bin = bin.into();
        self
    }

    pub fn with_claude_bin(mut self, bin: impl Into<String>) -> Self {
        self.claude.bin = bin.into();
        self
    }

    pub fn with_codex_sandbox(mut self, sandbox: SandboxMode) -> Self {
        self.codex.sandbox = sandbox;
        self
    }

    pub fn with_codex_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.codex.approval_policy = policy;
        self
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_u64(key: &str, default: u64) -> u64 {
    let Some(value) = env_string(key) else {
        return default;
    };
    match value.parse::<u64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, "Invalid numeric config; using default");
            default
        }
    }
}

fn parse_env_choice<T: FromStr + fmt::Display>(key: &str, default: T) -> T {
    let Some(value) = env_string(key) else {
        return default;
    };
    match value.parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, default = %default, "Unsupported config value; using default");
            default
        }
    }
}
