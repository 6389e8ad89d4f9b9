//! The session run engine.
//!
//! [`SessionManager`] owns the records, the live runs and the multiplexer.
//! Record and run state sit behind one std mutex that is never held across
//! an await; persistence goes through the store's save lock.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;
use vibes_channel::MessageChannel;
use vibes_channel::Surface;
use vibes_common::mutex_lock_or_recover;
use vibes_core::Engine;
use vibes_process::ProcessController;
use vibes_process::ProcessHandle;
use vibes_process::SpawnedProcess;

use crate::artifacts;
use crate::artifacts::RunLogs;
use crate::config::DaemonConfig;
use crate::engine_command;
use crate::multiplexer::AttachedRun;
use crate::multiplexer::Multiplexer;
use crate::reader;
use crate::reader::StderrTail;
use crate::reader::TokenSink;
use crate::record::RunMode;
use crate::record::RunOutcome;
use crate::record::SessionName;
use crate::record::SessionRecord;
use crate::record::SessionStatus;
use crate::store;
use crate::store::Records;
use crate::store::StateStore;
use crate::stream::RenderStream;
use crate::stream::StreamOptions;
use crate::ui;
use crate::SessionError;

/// A process that is currently running for a session.
struct SessionRun {
    handle: ProcessHandle,
    stream: Arc<RenderStream>,
    logs: RunLogs,
    stderr_tail: StderrTail,
    started: Instant,
    stop_requested: bool,
    paused: bool,
    confirm_stop: bool,
    header_note: Option<String>,
}

impl AttachedRun for SessionRun {
    fn is_running(&self) -> bool {
        !self.handle.has_exited()
    }

    fn surface(&self) -> Surface {
        self.stream.surface()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self) {
        self.paused = true;
        self.stream.pause();
    }
}

#[derive(Default)]
struct State {
    records: Records,
    runs: BTreeMap<SessionName, SessionRun>,
}

impl State {
    fn record_mut(&mut self, name: &str) -> Result<&mut SessionRecord, SessionError> {
        self.records
            .get_mut(name)
            .ok_or_else(|| SessionError::NotFound(name.to_string()))
    }

    fn live_run_mut(&mut self, name: &str) -> Result<&mut SessionRun, SessionError> {
        match self.runs.get_mut(name) {
            Some(run) if run.is_running() => Ok(run),
            _ => Err(SessionError::NotRunning(name.to_string())),
        }
    }
}

struct Inner {
    config: Arc<DaemonConfig>,
    channel: Arc<dyn MessageChannel>,
    controller: Arc<dyn ProcessController>,
    store: StateStore,
    state: Mutex<State>,
    multiplexer: Multiplexer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The session is running; it is deleted once the run ends.
    Pending,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub session: SessionName,
    /// `None` when the session was deleted before the engine started.
    pub exit_code: Option<i32>,
    pub status: SessionStatus,
    pub outcome: RunOutcome,
    pub duration: Duration,
    /// The message the run rendered into.
    pub surface: Surface,
}

/// Session registry and run engine. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = mutex_lock_or_recover(&self.inner.state);
        f.debug_struct("SessionManager")
            .field("sessions", &state.records.len())
            .field("runs", &state.runs.len())
            .finish()
    }
}

struct TokenRecorder {
    manager: SessionManager,
    session: SessionName,
}

#[async_trait]
impl TokenSink for TokenRecorder {
    async fn token_discovered(&self, token: String) {
        self.manager.record_token(&self.session, token).await;
    }
}

impl SessionManager {
    /// Loads the state file named by `config`.
    pub fn new(
        config: DaemonConfig,
        channel: Arc<dyn MessageChannel>,
        controller: Arc<dyn ProcessController>,
    ) -> Self {
        let store = StateStore::new(&config);
        let records = store.load();
        debug!(path = %store.path().display(), sessions = records.len(), "state loaded");
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                channel,
                controller,
                store,
                state: Mutex::new(State {
                    records,
                    runs: BTreeMap::new(),
                }),
                multiplexer: Multiplexer::new(),
            }),
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.inner.config
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        mutex_lock_or_recover(&self.inner.state)
    }

    /// Persists every record. The snapshot is taken under the save lock.
    pub async fn save(&self) -> Result<(), SessionError> {
        self.inner
            .store
            .save_with(|| store::state_document(self.state().records.values()))
            .await
    }

    async fn save_logged(&self) {
        if let Err(e) = self.save().await {
            warn!(error = %e, "Failed to save state");
        }
    }

    pub fn list(&self) -> Vec<SessionRecord> {
        self.state().records.values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<SessionRecord> {
        self.state().records.get(name).cloned()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state().runs.get(name).is_some_and(|run| run.is_running())
    }

    /// First free `session-N`, counting from 1.
    pub fn next_auto_session_name(&self) -> String {
        let state = self.state();
        (1..)
            .map(|n| format!("session-{}", n))
            .find(|candidate| !state.records.contains_key(candidate.as_str()))
            .unwrap_or_else(|| "session".to_string())
    }

    pub async fn create(
        &self,
        name: &str,
        path: &Path,
        engine: Option<Engine>,
    ) -> Result<SessionRecord, SessionError> {
        let name = SessionName::try_new(name)?;
        let path = resolve_dir(path)?;
        let engine = engine.unwrap_or_default();
        let model = match engine {
            Engine::Codex => self.inner.config.codex().default_model.clone(),
            Engine::Claude => self.inner.config.claude().default_model.clone(),
        };
        let record = SessionRecord::new(
            name.clone(),
            path,
            engine,
            model,
            self.inner.config.codex().default_reasoning_effort.clone(),
        );
        {
            let mut state = self.state();
            if state.records.contains_key(&name) {
                return Err(SessionError::AlreadyExists(name.to_string()));
            }
            state.records.insert(name.clone(), record.clone());
        }
        self.save().await?;
        info!(session = %name, engine = %engine, path = %record.path.display(), "session_created");
        Ok(record)
    }

    /// Deletes the session and its logs, or marks it for deletion and stops
    /// it when a run is active or still starting.
    pub async fn delete(&self, name: &str) -> Result<DeleteOutcome, SessionError> {
        let running = {
            let mut state = self.state();
            let has_live_run = state.runs.get(name).is_some_and(|run| run.is_running());
            let record = state.record_mut(name)?;
            let running = has_live_run || record.is_running();
            if running {
                record.pending_delete = true;
            }
            running
        };
        if running {
            self.save().await?;
            info!(session = name, "session_delete_requested");
            self.stop(name, "delete").await?;
            return Ok(DeleteOutcome::Pending);
        }

        let record = {
            let mut state = self.state();
            state.runs.remove(name);
            state
                .records
                .remove(name)
                .ok_or_else(|| SessionError::NotFound(name.to_string()))?
        };
        let removed = artifacts::delete_artifacts(self.inner.config.log_dir(), &record);
        self.save().await?;
        info!(session = name, engine = %record.engine, logs_removed = removed, "session_deleted");
        Ok(DeleteOutcome::Deleted)
    }

    /// Forgets the conversation token, logs and last outcome.
    pub async fn clear_state(&self, name: &str) -> Result<SessionRecord, SessionError> {
        let record = {
            let mut state = self.state();
            let has_live_run = state.runs.get(name).is_some_and(|run| run.is_running());
            let record = state.record_mut(name)?;
            if has_live_run || record.is_running() {
                return Err(SessionError::Running(name.to_string()));
            }
            let before = record.clone();
            record.clear_run_state();
            (before, record.clone())
        };
        let (before, cleared) = record;
        artifacts::delete_artifacts(self.inner.config.log_dir(), &before);
        self.save().await?;
        info!(session = name, engine = %cleared.engine, "session_cleared");
        Ok(cleared)
    }

    /// Changes the model (and, for codex, the reasoning effort) of later runs.
    pub async fn set_model(
        &self,
        name: &str,
        model: &str,
        reasoning_effort: Option<&str>,
    ) -> Result<SessionRecord, SessionError> {
        let model = model.trim();
        let updated = {
            let mut state = self.state();
            let record = state.record_mut(name)?;
            if !model.is_empty() {
                record.model = model.to_string();
            }
            if let Some(effort) = reasoning_effort.map(str::trim).filter(|e| !e.is_empty()) {
                record.reasoning_effort = effort.to_string();
            }
            record.clone()
        };
        self.save().await?;
        info!(session = name, model = %updated.model, effort = %updated.reasoning_effort, "session_model_set");
        Ok(updated)
    }

    async fn record_token(&self, name: &SessionName, token: String) {
        let engine = {
            let mut state = self.state();
            let Some(record) = state.records.get_mut(name) else {
                return;
            };
            if record.thread_id.as_deref() == Some(token.as_str()) {
                return;
            }
            record.thread_id = Some(token.clone());
            record.touch();
            record.engine
        };
        self.save_logged().await;
        info!(session = %name, engine = %engine, thread_id = %token, "thread_id_set");
    }

    /// Runs `prompt` in the session and returns once the process has exited
    /// and its view has been finalized.
    ///
    /// Output goes to a fresh message in `panel`'s chat, or to `panel`
    /// itself when that message cannot be created.
    pub async fn run_prompt(
        &self,
        name: &str,
        panel: Surface,
        prompt: &str,
        mode: RunMode,
    ) -> Result<RunReport, SessionError> {
        let config = Arc::clone(&self.inner.config);
        let (record, logs) = {
            let mut state = self.state();
            let has_run = state.runs.contains_key(name);
            let record = state.record_mut(name)?;
            if has_run || record.is_running() {
                return Err(SessionError::Running(name.to_string()));
            }
            if mode == RunMode::New {
                record.thread_id = None;
            }
            let logs = RunLogs::new(config.log_dir(), record.name.as_str(), Utc::now());
            record.status = SessionStatus::Running;
            record.touch();
            record.last_stdout_log = Some(logs.stdout.clone());
            record.last_stderr_log = Some(logs.stderr.clone());
            record.last_run_duration_s = None;
            (record.clone(), logs)
        };
        let session = record.name.clone();
        self.save_logged().await;

        let started = Instant::now();
        info!(
            session = %session,
            engine = %record.engine,
            mode = mode.as_str(),
            path = %record.path.display(),
            "run_start"
        );

        {
            let mut state = self.state();
            self.inner
                .multiplexer
                .pause_other_attached_runs(panel, Some(&session), state.runs.iter_mut());
        }

        let surface = match self
            .inner
            .channel
            .send_message(panel.chat_id, &ui::wait_note_header().render(), None)
            .await
        {
            Ok(message_id) => Surface::new(panel.chat_id, message_id),
            Err(e) => {
                warn!(session = %session, error = %e, "Failed to create output message; using the panel");
                panel
            }
        };
        self.inner.multiplexer.register_run_message(surface, session.clone());

        let stream = Arc::new(RenderStream::start(
            Arc::clone(&self.inner.channel),
            surface,
            StreamOptions::new()
                .with_transient_header(ui::wait_note_header())
                .with_footer(ui::working_footer(started))
                .with_log_in_pre(true)
                .with_actions(ui::running_actions())
                .with_throttle(config.edit_throttle())
                .with_limit(config.max_message_chars()),
        ));

        let git_dir = match record.engine {
            Engine::Codex => {
                let path = record.path.clone();
                tokio::task::spawn_blocking(move || engine_command::detect_git_dir(&path))
                    .await
                    .ok()
                    .flatten()
            }
            Engine::Claude => None,
        };
        let spec = engine_command::build_command(&record, prompt, mode, &config, git_dir.as_deref());
        debug!(session = %session, argv = ?spec.argv(), "spawning engine");

        // Checked, spawned and registered under one lock: a delete either
        // cancels the start or finds a run to stop.
        let stderr_tail = StderrTail::new(config.stderr_tail_lines());
        let spawned = {
            let mut state = self.state();
            if state.records.get(&session).is_some_and(|r| r.pending_delete) {
                None
            } else {
                Some(
                    vibes_process::spawn(&spec, Arc::clone(&self.inner.controller)).map(
                        |SpawnedProcess {
                             handle,
                             stdout,
                             stderr,
                         }| {
                            let tokens: Arc<dyn TokenSink> = Arc::new(TokenRecorder {
                                manager: self.clone(),
                                session: session.clone(),
                            });
                            let stdout_task = tokio::spawn(reader::read_stdout(
                                stdout,
                                record.engine,
                                logs.stdout.clone(),
                                Arc::clone(&stream),
                                tokens,
                            ));
                            let stderr_task = tokio::spawn(reader::read_stderr(
                                stderr,
                                logs.stderr.clone(),
                                stderr_tail.clone(),
                            ));
                            state.runs.insert(
                                session.clone(),
                                SessionRun {
                                    handle: handle.clone(),
                                    stream: Arc::clone(&stream),
                                    logs: logs.clone(),
                                    stderr_tail: stderr_tail.clone(),
                                    started,
                                    stop_requested: false,
                                    paused: false,
                                    confirm_stop: false,
                                    header_note: None,
                                },
                            );
                            (handle, stdout_task, stderr_task)
                        },
                    ),
                )
            }
        };
        let (handle, stdout_task, stderr_task) = match spawned {
            Some(Ok(spawned)) => spawned,
            Some(Err(e)) => {
                let stderr_text = if e.is_not_found() {
                    format!("`{}` not found in PATH.\n", spec.program)
                } else {
                    let label = match record.engine {
                        Engine::Codex => "Codex",
                        Engine::Claude => "Claude",
                    };
                    format!("Failed to start {}: {}\n", label, e)
                };
                self.handle_start_failure(&session, &logs, &stream, started, &stderr_text)
                    .await;
                return Err(e.into());
            }
            None => return Ok(self.cancel_before_spawn(&session, &stream, started).await),
        };

        let pid = handle.pid();
        self.save_logged().await;
        info!(session = %session, engine = %record.engine, pid, "run_spawned");

        let exit_code = handle.wait().await;
        drain_reader(stdout_task, config.reader_drain(), "stdout").await;
        drain_reader(stderr_task, config.reader_drain(), "stderr").await;

        let duration = started.elapsed();
        let (status, outcome, paused) = {
            let mut state = self.state();
            let (stop_requested, paused) = state
                .runs
                .get(&session)
                .map(|run| (run.stop_requested, run.paused))
                .unwrap_or((false, false));
            let (status, outcome) = if stop_requested {
                (SessionStatus::Stopped, RunOutcome::Stopped)
            } else if exit_code == 0 {
                (SessionStatus::Idle, RunOutcome::Success)
            } else {
                (SessionStatus::Error, RunOutcome::Error)
            };
            if let Some(record) = state.records.get_mut(&session) {
                record.status = status;
                record.last_result = outcome;
                record.last_run_duration_s = Some(duration.as_secs());
                record.touch();
            }
            (status, outcome, paused)
        };
        self.save_logged().await;

        stream.stop().await;
        let final_surface = stream.surface();
        self.inner.multiplexer.unregister_run_message(final_surface);

        let finished = {
            let mut state = self.state();
            state.runs.remove(&session);
            state.records.get(&session).cloned()
        };
        self.save_logged().await;
        info!(
            session = %session,
            engine = %record.engine,
            code = exit_code,
            status = %status,
            duration_s = duration.as_secs(),
            "run_finished"
        );

        if let Some(finished) = finished {
            if !paused && final_surface != panel {
                self.show_session_view(panel, &finished, None).await;
            }
            if finished.pending_delete {
                if let Err(e) = self.delete(session.as_str()).await {
                    warn!(session = %session, error = %e, "Deferred delete failed");
                }
            }
        }

        Ok(RunReport {
            session,
            exit_code: Some(exit_code),
            status,
            outcome,
            duration,
            surface: final_surface,
        })
    }

    async fn cancel_before_spawn(
        &self,
        session: &SessionName,
        stream: &RenderStream,
        started: Instant,
    ) -> RunReport {
        let duration = started.elapsed();
        {
            let mut state = self.state();
            if let Some(record) = state.records.get_mut(session) {
                record.status = SessionStatus::Stopped;
                record.last_result = RunOutcome::Stopped;
                record.last_run_duration_s = Some(duration.as_secs());
                record.touch();
            }
        }
        info!(session = %session, "run_cancelled_before_spawn");

        stream.set_footer(None, false);
        stream.set_reply_actions(None);
        stream.stop().await;
        let surface = stream.surface();
        self.inner.multiplexer.unregister_run_message(surface);

        if let Err(e) = self.delete(session.as_str()).await {
            warn!(session = %session, error = %e, "Deferred delete failed");
        }
        RunReport {
            session: session.clone(),
            exit_code: None,
            status: SessionStatus::Stopped,
            outcome: RunOutcome::Stopped,
            duration,
            surface,
        }
    }

    async fn handle_start_failure(
        &self,
        session: &SessionName,
        logs: &RunLogs,
        stream: &RenderStream,
        started: Instant,
        stderr_text: &str,
    ) {
        if let Some(parent) = logs.stderr.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "Failed to create log dir");
            }
        }
        if let Err(e) = tokio::fs::write(&logs.stderr, stderr_text).await {
            warn!(path = %logs.stderr.display(), error = %e, "Failed to write stderr log for start failure");
        }

        let record = {
            let mut state = self.state();
            state.records.get_mut(session).map(|record| {
                record.status = SessionStatus::Error;
                record.last_result = RunOutcome::Error;
                record.last_run_duration_s = Some(started.elapsed().as_secs());
                record.touch();
                record.clone()
            })
        };
        self.save_logged().await;
        warn!(session = %session, reason = stderr_text.trim_end(), "run_start_failed");

        if let Some(record) = &record {
            stream.set_footer(None, false);
            stream.set_reply_actions(None);
            stream.set_header(ui::session_view(record, Some(ui::START_FAILED_NOTICE)));
        }
        stream.stop().await;
        self.inner.multiplexer.unregister_run_message(stream.surface());

        if record.is_some_and(|r| r.pending_delete) {
            if let Err(e) = self.delete(session.as_str()).await {
                warn!(session = %session, error = %e, "Deferred delete failed");
            }
        }
    }

    async fn show_session_view(&self, surface: Surface, record: &SessionRecord, notice: Option<&str>) {
        let text = ui::session_view(record, notice).render_within(self.inner.config.max_message_chars());
        if let Err(e) = self.inner.channel.edit_message_text(surface, &text, None).await {
            debug!(surface = %surface, error = %e, "Failed to show session view");
        }
    }

    /// Requests termination of the session's run.
    ///
    /// Returns `false` when there is no run. A run whose process already
    /// exited is only marked as stopped; no signal is sent.
    pub async fn stop(&self, name: &str, reason: &str) -> Result<bool, SessionError> {
        let handle = {
            let mut state = self.state();
            let Some(run) = state.runs.get_mut(name) else {
                return Ok(false);
            };
            run.stop_requested = true;
            run.handle.clone()
        };
        info!(session = name, reason, "run_stop_requested");
        if handle.has_exited() {
            return Ok(true);
        }
        let outcome = handle.stop(self.inner.config.stop_grace()).await?;
        debug!(session = name, outcome = ?outcome, "run stopped");
        Ok(true)
    }

    /// Stops every live run, then saves.
    pub async fn shutdown(&self) {
        let names: Vec<SessionName> = self
            .state()
            .runs
            .iter()
            .filter(|(_, run)| run.is_running())
            .map(|(name, _)| name.clone())
            .collect();
        let mut stops = JoinSet::new();
        for name in names {
            let manager = self.clone();
            stops.spawn(async move {
                if let Err(e) = manager.stop(name.as_str(), "shutdown").await {
                    warn!(session = %name, error = %e, "Failed to stop run on shutdown");
                }
            });
        }
        while stops.join_next().await.is_some() {}
        self.save_logged().await;
    }

    /// The session whose live view currently owns `surface`.
    pub fn resolve_attached_running_session(&self, surface: Surface) -> Option<SessionName> {
        let state = self.state();
        self.inner
            .multiplexer
            .resolve_attached_running_session(surface, state.runs.iter())
    }

    /// Pauses every run drawing on `surface`.
    pub fn release_surface(&self, surface: Surface) -> Vec<SessionName> {
        let mut state = self.state();
        self.inner
            .multiplexer
            .pause_other_attached_runs(surface, None, state.runs.iter_mut())
    }

    /// Makes `name` the owner of `surface` and redraws its live view there.
    pub fn attach(&self, name: &str, surface: Surface) -> Result<(), SessionError> {
        let mut state = self.state();
        let session = state
            .records
            .get_key_value(name)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        state.live_run_mut(name)?;
        self.inner
            .multiplexer
            .pause_other_attached_runs(surface, Some(&session), state.runs.iter_mut());

        let record = state.record_mut(name)?.clone();
        let run = state.live_run_mut(name)?;
        run.stream.retarget(surface);
        run.paused = false;
        run.stream.set_header(ui::running_header(&record, run.header_note.as_deref()));
        run.stream
            .set_footer(Some(ui::working_footer(run.started)), true);
        run.stream.set_reply_actions(Some(if run.confirm_stop {
            ui::stop_confirm_actions()
        } else {
            ui::running_actions()
        }));
        run.stream.resume();
        self.inner.multiplexer.register_run_message(surface, session.clone());
        debug!(session = %session, surface = %surface, "run attached");
        Ok(())
    }

    /// Stops drawing the session's live view; the run keeps going.
    pub fn detach(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.state();
        let run = state.live_run_mut(name)?;
        run.pause();
        Ok(())
    }

    pub fn request_stop_confirmation(&self, name: &str) -> Result<(), SessionError> {
        self.set_stop_confirmation(name, true)
    }

    pub fn cancel_stop_confirmation(&self, name: &str) -> Result<(), SessionError> {
        self.set_stop_confirmation(name, false)
    }

    fn set_stop_confirmation(&self, name: &str, confirm: bool) -> Result<(), SessionError> {
        let mut state = self.state();
        let record = state.record_mut(name)?.clone();
        let run = state.live_run_mut(name)?;
        run.confirm_stop = confirm;
        run.header_note = confirm.then(|| ui::STOP_CONFIRM_QUESTION.to_string());
        run.stream
            .set_header(ui::running_header(&record, run.header_note.as_deref()));
        run.stream.set_reply_actions(Some(if confirm {
            ui::stop_confirm_actions()
        } else {
            ui::running_actions()
        }));
        Ok(())
    }

    /// Whether the session's run is waiting for a stop confirmation.
    pub fn is_confirming_stop(&self, name: &str) -> bool {
        self.state().runs.get(name).is_some_and(|run| run.confirm_stop)
    }

    /// Dispatches a reply action pressed on `surface`. Returns the session
    /// it applied to.
    pub async fn handle_action(&self, surface: Surface, action: &str) -> Result<Option<SessionName>, SessionError> {
        let Some(session) = self.resolve_attached_running_session(surface) else {
            return Ok(None);
        };
        let name = session.as_str();
        match action {
            ui::ACTION_DETACH => self.detach(name)?,
            ui::ACTION_INTERRUPT => self.request_stop_confirmation(name)?,
            ui::ACTION_STOP_NO => self.cancel_stop_confirmation(name)?,
            ui::ACTION_STOP_YES if self.is_confirming_stop(name) => {
                self.stop(name, "user").await?;
            }
            ui::ACTION_STOP_YES => {
                debug!(session = name, "Stop confirmation was not requested");
                self.cancel_stop_confirmation(name)?;
            }
            other => {
                debug!(action = other, "Ignoring unknown action");
                return Ok(None);
            }
        }
        Ok(Some(session))
    }

    /// Recent stderr of a live run.
    pub fn live_stderr(&self, name: &str) -> Option<String> {
        self.state().runs.get(name).map(|run| run.stderr_tail.text())
    }

    /// Log files of a live run.
    pub fn live_logs(&self, name: &str) -> Option<RunLogs> {
        self.state().runs.get(name).map(|run| run.logs.clone())
    }

    pub fn stdout_preview(&self, name: &str) -> Result<String, SessionError> {
        let record = self.get(name).ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        Ok(artifacts::preview_from_stdout_log(
            record.engine,
            record.last_stdout_log.as_deref(),
        ))
    }

    pub fn stderr_preview(&self, name: &str) -> Result<String, SessionError> {
        let record = self.get(name).ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        Ok(artifacts::preview_from_stderr_log(record.last_stderr_log.as_deref()))
    }

    pub fn last_agent_message(&self, name: &str) -> Result<Option<String>, SessionError> {
        let record = self.get(name).ok_or_else(|| SessionError::NotFound(name.to_string()))?;
        Ok(artifacts::last_agent_message(record.last_stdout_log.as_deref()))
    }
}

/// Gives a reader `window` to reach EOF after the process exited, then
/// aborts it.
async fn drain_reader(mut task: JoinHandle<()>, window: Duration, stream: &'static str) {
    match tokio::time::timeout(window, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(stream, error = %e, "reader task failed"),
        Err(_) => {
            debug!(stream, "reader still open after exit; aborting");
            task.abort();
        }
    }
}

fn resolve_dir(path: &Path) -> Result<PathBuf, SessionError> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    };
    match std::fs::canonicalize(&expanded) {
        Ok(resolved) if resolved.is_dir() => Ok(resolved),
        _ => Err(SessionError::DirectoryNotFound(expanded)),
    }
}
