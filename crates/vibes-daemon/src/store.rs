//! The session state file.
//!
//! One JSON document holds every record. Saves replace it atomically and
//! are serialized through a single async mutex; loads are tolerant and drop
//! or default whatever does not validate.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;
use vibes_core::Engine;

use crate::config::DaemonConfig;
use crate::record::RunOutcome;
use crate::record::SessionName;
use crate::record::SessionRecord;
use crate::record::SessionStatus;
use crate::SessionError;

pub const STATE_VERSION: u64 = 4;

pub type Records = BTreeMap<SessionName, SessionRecord>;

#[derive(Debug, Clone)]
struct LoadDefaults {
    codex_model: String,
    claude_model: String,
    reasoning_effort: String,
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    defaults: LoadDefaults,
    save_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            path: config.state_path().to_path_buf(),
            defaults: LoadDefaults {
                codex_model: config.codex().default_model.clone(),
                claude_model: config.claude().default_model.clone(),
                reasoning_effort: config.codex().default_reasoning_effort.clone(),
            },
            save_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file. A missing or unreadable file yields no records.
    pub fn load(&self) -> Records {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Records::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read state file");
                return Records::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(raw) => self.parse_state(&raw),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State file is not valid JSON; starting empty");
                Records::new()
            }
        }
    }

    fn parse_state(&self, raw: &Value) -> Records {
        let mut records = Records::new();
        let Some(sessions) = raw.get("sessions").and_then(Value::as_object) else {
            return records;
        };
        for (name, payload) in sessions {
            let Some(payload) = payload.as_object() else {
                continue;
            };
            let Ok(name) = SessionName::try_new(name) else {
                debug!(name = %name, "Skipping session with invalid name");
                continue;
            };
            if let Some(record) = self.parse_record(name, payload) {
                records.insert(record.name.clone(), record);
            }
        }
        records
    }

    fn parse_record(&self, name: SessionName, payload: &Map<String, Value>) -> Option<SessionRecord> {
        let path = non_empty_str(payload, "path")?;
        let engine = payload
            .get("engine")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Engine>().ok())
            .unwrap_or_default();
        let model = non_empty_str(payload, "model").unwrap_or(match engine {
            Engine::Codex => self.defaults.codex_model.as_str(),
            Engine::Claude => self.defaults.claude_model.as_str(),
        });
        let reasoning_effort = non_empty_str(payload, "reasoning_effort")
            .or_else(|| non_empty_str(payload, "model_reasoning_effort"))
            .unwrap_or(self.defaults.reasoning_effort.as_str());

        let mut record = SessionRecord::new(name, PathBuf::from(path), engine, model, reasoning_effort);
        record.thread_id = str_field(payload, "thread_id")
            .or_else(|| str_field(payload, "session_id"))
            .map(str::to_string);
        record.status = str_field(payload, "status")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        // No process survives a restart.
        if record.status == SessionStatus::Running {
            record.status = SessionStatus::Idle;
        }
        record.last_result = str_field(payload, "last_result")
            .and_then(|s| s.parse::<RunOutcome>().ok())
            .unwrap_or_default();
        if let Some(created_at) = timestamp(payload, "created_at") {
            record.created_at = created_at;
        }
        record.last_active = timestamp(payload, "last_active");
        record.last_stdout_log = str_field(payload, "last_stdout_log").map(PathBuf::from);
        record.last_stderr_log = str_field(payload, "last_stderr_log").map(PathBuf::from);
        record.last_run_duration_s = payload.get("last_run_duration_s").and_then(Value::as_u64);
        record.pending_delete = payload
            .get("pending_delete")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Some(record)
    }

    /// Writes every record, replacing the file atomically.
    ///
    /// A `running` status is persisted as `idle`.
    pub async fn save<'a, I>(&self, records: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = &'a SessionRecord>,
    {
        let document = state_document(records);
        self.save_with(move || document).await
    }

    /// Like [`save`](Self::save), but builds the document only once the save
    /// lock is held, so a later caller always persists a later snapshot.
    pub async fn save_with<F>(&self, document: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Value,
    {
        let _guard = self.save_lock.lock().await;
        let text = serde_json::to_string_pretty(&document()).map_err(|e| SessionError::Persistence {
            operation: "serialize state",
            reason: e.to_string(),
            source: None,
        })?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, text.as_bytes()))
            .await
            .map_err(|e| SessionError::Persistence {
                operation: "save state",
                reason: e.to_string(),
                source: None,
            })?
            .map_err(|e| SessionError::persistence("save state", e))
    }
}

pub fn state_document<'a>(records: impl IntoIterator<Item = &'a SessionRecord>) -> Value {
    let mut sessions = Map::new();
    for record in records {
        let mut value = serde_json::to_value(record).unwrap_or(Value::Null);
        if let Some(object) = value.as_object_mut() {
            if record.status == SessionStatus::Running {
                object.insert("status".to_string(), json!(SessionStatus::Idle));
            }
        }
        sessions.insert(record.name.to_string(), value);
    }
    json!({
        "version": STATE_VERSION,
        "sessions": sessions,
    })
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

fn str_field<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

fn non_empty_str<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    str_field(payload, key).filter(|s| !s.is_empty())
}

fn timestamp(payload: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    str_field(payload, key)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::new(&DaemonConfig::with_defaults(dir.path()))
    }

    fn record(name: &str) -> SessionRecord {
        SessionRecord::new(
            SessionName::try_new(name).unwrap(),
            PathBuf::from("/work"),
            Engine::Codex,
            "gpt-5.2",
            "high",
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut a = record("a");
        a.thread_id = Some("0b0e1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d".to_string());
        a.last_result = RunOutcome::Success;
        a.last_run_duration_s = Some(12);
        a.touch();
        let mut b = record("b");
        b.engine = Engine::Claude;
        b.status = SessionStatus::Running;

        store.save([&a, &b]).await.unwrap();
        let loaded = store.load();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["a"], a);
        assert_eq!(loaded["b"].status, SessionStatus::Idle);
        assert_eq!(loaded["b"].engine, Engine::Claude);
        assert!(!dir.path().join("vibe_state.json.tmp").exists());
    }

    #[test]
    fn load_is_tolerant() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let doc = json!({
            "version": 3,
            "sessions": {
                "good": {
                    "path": "/w",
                    "engine": "claude",
                    "session_id": "legacy-token",
                    "model_reasoning_effort": "low",
                    "status": "running",
                    "last_result": "exploded",
                    "last_run_duration_s": "long",
                    "pending_delete": "yes",
                    "created_at": 17
                },
                "bad name": {"path": "/w"},
                "nopath": {"path": ""},
                "notobject": 5
            }
        });
        fs::write(store.path(), doc.to_string()).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        let good = &loaded["good"];
        assert_eq!(good.engine, Engine::Claude);
        assert_eq!(good.model, "sonnet");
        assert_eq!(good.thread_id.as_deref(), Some("legacy-token"));
        assert_eq!(good.reasoning_effort, "low");
        assert_eq!(good.status, SessionStatus::Idle);
        assert_eq!(good.last_result, RunOutcome::Never);
        assert_eq!(good.last_run_duration_s, None);
        assert!(!good.pending_delete);
    }

    #[test]
    fn missing_or_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().is_empty());
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());
    }
}
