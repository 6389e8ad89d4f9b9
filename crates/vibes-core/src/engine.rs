use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// The agent CLI that executes a session's prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Codex,
    Claude,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown engine '{0}' (expected 'codex' or 'claude')")]
pub struct UnknownEngine(pub String);

impl Engine {
    pub const ALL: [Engine; 2] = [Engine::Codex, Engine::Claude];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Codex => "codex",
            Engine::Claude => "claude",
        }
    }

    /// Only codex exposes a reasoning effort knob.
    pub fn supports_reasoning_effort(&self) -> bool {
        matches!(self, Engine::Codex)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "codex" => Ok(Engine::Codex),
            "claude" => Ok(Engine::Claude),
            _ => Err(UnknownEngine(s.to_string())),
        }
    }
}
