//! Session run engine.
//!
//! Owns session records and their persistence, runs engine processes,
//! streams their output into a chat message and decides which run owns
//! which message.

#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod artifacts;
mod config;
pub mod engine_command;
mod error;
mod manager;
mod multiplexer;
mod reader;
mod record;
pub mod render;
mod store;
mod stream;
pub mod ui;

pub use artifacts::RunLogs;
pub use config::ApprovalPolicy;
pub use config::ClaudeSettings;
pub use config::CodexSettings;
pub use config::DaemonConfig;
pub use config::SandboxMode;
pub use error::SessionError;
pub use manager::DeleteOutcome;
pub use manager::RunReport;
pub use manager::SessionManager;
pub use multiplexer::AttachedRun;
pub use multiplexer::Multiplexer;
pub use reader::StderrTail;
pub use reader::TokenSink;
pub use record::RunMode;
pub use record::RunOutcome;
pub use record::SessionName;
pub use record::SessionRecord;
pub use record::SessionStatus;
pub use record::MAX_SESSION_NAME_LEN;
pub use store::StateStore;
pub use store::STATE_VERSION;
pub use stream::FooterProvider;
pub use stream::RenderStream;
pub use stream::StreamOptions;

pub type Result<T> = std::result::Result<T, SessionError>;
