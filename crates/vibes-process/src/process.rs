use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::ChildStderr;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::ProcessController;
use crate::ProcessError;
use crate::Signal;

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Exit code reported when the exit status itself could not be collected.
const UNKNOWN_EXIT: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process had already exited; no signal was sent.
    AlreadyExited,
    /// Exited within the grace period after SIGTERM.
    Terminated,
    /// Needed SIGKILL.
    Killed,
}

#[derive(Debug)]
pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// A cheap, cloneable view of a running (or finished) child.
///
/// The child itself is owned by a waiter task that publishes the exit code,
/// so any number of clones can wait or stop concurrently.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: u32,
    exit: watch::Receiver<Option<i32>>,
    controller: Arc<dyn ProcessController>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

/// Spawns `spec` in a new process group with piped stdout/stderr and a null
/// stdin. Must be called from within a tokio runtime.
pub fn spawn(
    spec: &CommandSpec,
    controller: Arc<dyn ProcessController>,
) -> Result<SpawnedProcess, ProcessError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .spawn()
        .map_err(|e| ProcessError::spawn(&spec.program, e))?;
    let pid = child.id().unwrap_or_default();

    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        (stdout, _) => {
            let _ = child.start_kill();
            return Err(ProcessError::MissingPipe {
                pid,
                stream: if stdout.is_none() { "stdout" } else { "stderr" },
            });
        }
    };

    info!(pid, program = %spec.program, "process spawned");

    let (exit_tx, exit_rx) = watch::channel(None);
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => exit_code(status),
            Err(e) => {
                warn!(pid, error = %e, "failed to collect exit status");
                UNKNOWN_EXIT
            }
        };
        debug!(pid, code, "process exited");
        let _ = exit_tx.send(Some(code));
    });

    Ok(SpawnedProcess {
        handle: ProcessHandle {
            pid,
            exit: exit_rx,
            controller,
        },
        stdout,
        stderr,
    })
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(UNKNOWN_EXIT)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(UNKNOWN_EXIT)
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The exit code, if the process has exited.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_code().is_some()
    }

    /// Waits for exit. Signal deaths map to `128 + signo`.
    pub async fn wait(&self) -> i32 {
        let mut exit = self.exit.clone();
        let code = match exit.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(UNKNOWN_EXIT),
            Err(_) => UNKNOWN_EXIT,
        };
        code
    }

    /// Stops the whole process group: SIGTERM, then SIGKILL after `grace`.
    ///
    /// Idempotent: an exited process yields [`StopOutcome::AlreadyExited`]
    /// without any signal being sent.
    pub async fn stop(&self, grace: Duration) -> Result<StopOutcome, ProcessError> {
        if self.has_exited() {
            return Ok(StopOutcome::AlreadyExited);
        }

        let delivered = self.signal(Signal::Term)?;
        if !delivered {
            debug!(pid = self.pid, "process group already gone");
            return Ok(StopOutcome::AlreadyExited);
        }

        if timeout(grace, self.wait()).await.is_ok() {
            return Ok(StopOutcome::Terminated);
        }

        warn!(pid = self.pid, grace_ms = grace.as_millis() as u64, "process ignored SIGTERM; killing group");
        self.signal(Signal::Kill)?;
        if timeout(grace, self.wait()).await.is_err() {
            warn!(pid = self.pid, "process still not reaped after SIGKILL");
        }
        Ok(StopOutcome::Killed)
    }

    fn signal(&self, signal: Signal) -> Result<bool, ProcessError> {
        self.controller
            .signal_group(self.pid, signal)
            .map_err(|source| ProcessError::Signal {
                pgid: self.pid,
                source,
            })
    }
}
