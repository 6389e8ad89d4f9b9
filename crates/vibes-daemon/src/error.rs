use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vibes_channel::ChannelError;
use vibes_process::ProcessError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid session name '{0}'")]
    InvalidName(String),
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("session '{0}' is running")]
    Running(String),
    #[error("session '{0}' is not running")]
    NotRunning(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("{operation} failed: {reason}")]
    Persistence {
        operation: &'static str,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
}

impl SessionError {
    pub fn persistence(operation: &'static str, source: io::Error) -> Self {
        SessionError::Persistence {
            operation,
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            SessionError::NotFound(_) => "Run 'vibes list' to see existing sessions.".to_string(),
            SessionError::AlreadyExists(name) => {
                format!("Pick another name or delete '{}' first.", name)
            }
            SessionError::InvalidName(_) => {
                "Names may use letters, digits, '.', '_' and '-' (max 64 chars).".to_string()
            }
            SessionError::DirectoryNotFound(_) => {
                "Create the directory or pass an existing --path.".to_string()
            }
            SessionError::Running(name) => {
                format!("Wait for the run to finish or stop '{}' first.", name)
            }
            SessionError::NotRunning(_) => "Start a run with 'vibes run'.".to_string(),
            SessionError::Process(e) => e.suggestion(),
            SessionError::Channel(e) => e.suggestion().to_string(),
            SessionError::Persistence { .. } => {
                "Check that the runtime directory is writable.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Running(_) => true,
            SessionError::Process(e) => e.is_retryable(),
            SessionError::Channel(e) => e.is_retryable(),
            SessionError::Persistence { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_name_the_session() {
        let err = SessionError::Running("demo".to_string());
        assert!(err.suggestion().contains("demo"));
        assert!(err.is_retryable());
        assert!(!SessionError::NotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn wraps_process_errors() {
        let err: SessionError =
            ProcessError::spawn("codex", io::Error::from(io::ErrorKind::NotFound)).into();
        assert!(err.to_string().contains("codex"));
        assert!(err.suggestion().contains("PATH"));
    }
}
