use std::io;

use thiserror::Error;

/// Why the OS refused to start a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnFailure {
    NotFound,
    PermissionDenied,
    Other,
}

impl From<io::ErrorKind> for SpawnFailure {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => SpawnFailure::NotFound,
            io::ErrorKind::PermissionDenied => SpawnFailure::PermissionDenied,
            _ => SpawnFailure::Other,
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        failure: SpawnFailure,
        #[source]
        source: io::Error,
    },
    #[error("process {pid} has no {stream} pipe")]
    MissingPipe { pid: u32, stream: &'static str },
    #[error("failed to signal process group {pgid}: {source}")]
    Signal {
        pgid: u32,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn spawn(program: &str, source: io::Error) -> Self {
        ProcessError::Spawn {
            program: program.to_string(),
            failure: source.kind().into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProcessError::Spawn {
                failure: SpawnFailure::NotFound,
                ..
            }
        )
    }

    pub fn suggestion(&self) -> String {
        match self {
            ProcessError::Spawn {
                program,
                failure: SpawnFailure::NotFound,
                ..
            } => format!(
                "'{}' was not found on PATH. Install it or point VIBES_CODEX_BIN / VIBES_CLAUDE_BIN at it.",
                program
            ),
            ProcessError::Spawn {
                failure: SpawnFailure::PermissionDenied,
                ..
            } => "The engine binary is not executable or the session path is not accessible.".to_string(),
            ProcessError::Spawn { .. } => "Check the session path and system process limits.".to_string(),
            ProcessError::MissingPipe { .. } => "This is a bug; the process was spawned without pipes.".to_string(),
            ProcessError::Signal { .. } => "The process may belong to another user or already be gone.".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessError::Spawn {
                failure: SpawnFailure::Other,
                ..
            }
        )
    }
}
