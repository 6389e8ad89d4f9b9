use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::DateTime;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use vibes_core::Engine;

use crate::SessionError;

pub const MAX_SESSION_NAME_LEN: usize = 64;

#[allow(clippy::expect_used)]
fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid session name regex"))
}

/// A validated session name: `[A-Za-z0-9._-]+`, at most 64 chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionName(String);

impl SessionName {
    pub fn try_new(raw: &str) -> Result<Self, SessionError> {
        let name = raw.trim();
        if name.is_empty() || name.chars().count() > MAX_SESSION_NAME_LEN || !name_regex().is_match(name) {
            return Err(SessionError::InvalidName(raw.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Error,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Error => "error",
            SessionStatus::Stopped => "stopped",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SessionStatus::Idle),
            "running" => Ok(SessionStatus::Running),
            "error" => Ok(SessionStatus::Error),
            "stopped" => Ok(SessionStatus::Stopped),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    #[default]
    Never,
    Success,
    Error,
    Stopped,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Never => "never",
            RunOutcome::Success => "success",
            RunOutcome::Error => "error",
            RunOutcome::Stopped => "stopped",
        }
    }
}

impl FromStr for RunOutcome {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(RunOutcome::Never),
            "success" => Ok(RunOutcome::Success),
            "error" => Ok(RunOutcome::Error),
            "stopped" => Ok(RunOutcome::Stopped),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a prompt relates to the session's conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Resume the stored conversation token, if any.
    #[default]
    Continue,
    /// Drop the stored token and start over.
    New,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Continue => "continue",
            RunMode::New => "new",
        }
    }
}

/// Persistent configuration and last-run outcome of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    #[serde(skip)]
    pub name: SessionName,
    pub path: PathBuf,
    pub engine: Engine,
    pub thread_id: Option<String>,
    pub model: String,
    pub reasoning_effort: String,
    pub status: SessionStatus,
    pub last_result: RunOutcome,
    pub created_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
    pub last_stdout_log: Option<PathBuf>,
    pub last_stderr_log: Option<PathBuf>,
    pub last_run_duration_s: Option<u64>,
    pub pending_delete: bool,
}

impl SessionRecord {
    pub fn new(
        name: SessionName,
        path: PathBuf,
        engine: Engine,
        model: impl Into<String>,
        reasoning_effort: impl Into<String>,
    ) -> Self {
        Self {
            name,
            path,
            engine,
            thread_id: None,
            model: model.into(),
            reasoning_effort: reasoning_effort.into(),
            status: SessionStatus::Idle,
            last_result: RunOutcome::Never,
            created_at: Utc::now(),
            last_active: None,
            last_stdout_log: None,
            last_stderr_log: None,
            last_run_duration_s: None,
            pending_delete: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn touch(&mut self) {
        self.last_active = Some(Utc::now());
    }

    /// Forgets everything a run left behind, keeping name, path and engine settings.
    pub fn clear_run_state(&mut self) {
        self.thread_id = None;
        self.status = SessionStatus::Idle;
        self.last_result = RunOutcome::Never;
        self.last_active = None;
        self.last_stdout_log = None;
        self.last_stderr_log = None;
        self.last_run_duration_s = None;
        self.pending_delete = false;
    }

    /// Status emoji for session lists.
    pub fn status_badge(&self) -> &'static str {
        match (self.status, self.last_result) {
            (SessionStatus::Running, _) => "🟢",
            (SessionStatus::Idle, RunOutcome::Success) => "✅",
            (SessionStatus::Stopped, _) | (_, RunOutcome::Stopped) => "⏹",
            (SessionStatus::Error, _) | (_, RunOutcome::Error) => "❌",
            (_, RunOutcome::Never) => "🆕",
            _ => "⚪️",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_name_validation() {
        assert_eq!(SessionName::try_new(" demo-1.x_y ").unwrap().as_str(), "demo-1.x_y");
        assert!(SessionName::try_new("").is_err());
        assert!(SessionName::try_new("has space").is_err());
        assert!(SessionName::try_new("slash/name").is_err());
        assert!(SessionName::try_new(&"a".repeat(64)).is_ok());
        assert!(SessionName::try_new(&"a".repeat(65)).is_err());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            SessionStatus::Idle,
            SessionStatus::Running,
            SessionStatus::Error,
            SessionStatus::Stopped,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!("done".parse::<RunOutcome>().is_err());
    }

    #[test]
    fn clear_keeps_identity() {
        let name = SessionName::try_new("demo").unwrap();
        let mut record = SessionRecord::new(name, PathBuf::from("/w"), Engine::Claude, "sonnet", "high");
        record.thread_id = Some("t".to_string());
        record.last_result = RunOutcome::Error;
        record.status = SessionStatus::Error;
        record.clear_run_state();
        assert_eq!(record.thread_id, None);
        assert_eq!(record.status, SessionStatus::Idle);
        assert_eq!(record.last_result, RunOutcome::Never);
        assert_eq!(record.model, "sonnet");
        assert_eq!(record.status_badge(), "🆕");
    }
}
