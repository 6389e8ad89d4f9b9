//! Spawning and stopping engine processes.
//!
//! Each engine runs in its own process group so that stopping a run also
//! reaches whatever the engine itself spawned (shells, compilers, test
//! runners).

#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod controller;
mod error;
mod process;

pub use controller::ProcessController;
pub use controller::RecordingProcessController;
pub use controller::Signal;
pub use controller::UnixProcessController;
pub use error::ProcessError;
pub use error::SpawnFailure;
pub use process::spawn;
pub use process::CommandSpec;
pub use process::ProcessHandle;
pub use process::SpawnedProcess;
pub use process::StopOutcome;
pub use process::DEFAULT_STOP_GRACE;
