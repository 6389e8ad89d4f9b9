//! Pipe readers: every line goes to the run's log file; stdout lines are
//! also normalized into the live view.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::fs::OpenOptions;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::time::Instant;
use tracing::warn;
use vibes_common::mutex_lock_or_recover;
use vibes_core::Engine;
use vibes_core::Normalizer;

use crate::stream::RenderStream;

const READ_RETRY_DELAY: Duration = Duration::from_millis(100);
const LOG_REOPEN_INTERVAL: Duration = Duration::from_secs(5);

/// Receives the conversation token the first time a run reports one.
#[async_trait]
pub trait TokenSink: Send + Sync {
    async fn token_discovered(&self, token: String);
}

/// Bounded buffer of the most recent stderr lines.
#[derive(Debug, Clone)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl StderrTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = mutex_lock_or_recover(&self.lines);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn lines(&self) -> Vec<String> {
        mutex_lock_or_recover(&self.lines).iter().cloned().collect()
    }

    pub fn text(&self) -> String {
        self.lines().concat()
    }
}

/// Append-only log file opened on first write. A failed open is retried
/// at most once per [`LOG_REOPEN_INTERVAL`].
struct LazyLog {
    path: PathBuf,
    file: Option<File>,
    last_attempt: Option<Instant>,
}

impl LazyLog {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            last_attempt: None,
        }
    }

    async fn write(&mut self, text: &str) {
        if self.file.is_none() {
            if self.last_attempt.is_some_and(|t| t.elapsed() < LOG_REOPEN_INTERVAL) {
                return;
            }
            self.last_attempt = Some(Instant::now());
            self.file = self.open().await;
        }
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let result = async {
            file.write_all(text.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to write log file");
            self.file = None;
        }
    }

    async fn open(&self) -> Option<File> {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %self.path.display(), error = %e, "Failed to create log dir");
                return None;
            }
        }
        match OpenOptions::new().create(true).append(true).open(&self.path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to open log file");
                None
            }
        }
    }
}

/// Calls `on_line` for every line (newline included, invalid UTF-8
/// replaced) until EOF.
async fn for_each_line<R, F>(pipe: R, stream_name: &'static str, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: AsyncLineHandler,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                on_line.handle(line).await;
            }
            Err(e) => {
                warn!(stream = stream_name, error = %e, "Pipe read failed; retrying");
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
        }
    }
}

#[async_trait]
trait AsyncLineHandler: Send {
    async fn handle(&mut self, line: String);
}

struct StdoutHandler {
    log: LazyLog,
    normalizer: Normalizer,
    stream: Arc<RenderStream>,
    tokens: Arc<dyn TokenSink>,
}

#[async_trait]
impl AsyncLineHandler for StdoutHandler {
    async fn handle(&mut self, line: String) {
        self.log.write(&line).await;
        if line.trim().is_empty() {
            return;
        }
        let normalized = self.normalizer.normalize_line(&line);
        if let Some(token) = normalized.token {
            self.tokens.token_discovered(token).await;
        }
        for segment in normalized.segments {
            self.stream.add_segment(segment);
        }
    }
}

struct StderrHandler {
    log: LazyLog,
    tail: StderrTail,
}

#[async_trait]
impl AsyncLineHandler for StderrHandler {
    async fn handle(&mut self, line: String) {
        self.log.write(&line).await;
        self.tail.push(line);
    }
}

/// Drains engine stdout into `log_path` and the live view.
pub async fn read_stdout<R>(
    pipe: R,
    engine: Engine,
    log_path: PathBuf,
    stream: Arc<RenderStream>,
    tokens: Arc<dyn TokenSink>,
) where
    R: AsyncRead + Unpin + Send,
{
    let handler = StdoutHandler {
        log: LazyLog::new(log_path),
        normalizer: Normalizer::new(engine),
        stream,
        tokens,
    };
    for_each_line(pipe, "stdout", handler).await;
}

/// Drains engine stderr into `log_path` and the bounded tail.
pub async fn read_stderr<R>(pipe: R, log_path: PathBuf, tail: StderrTail)
where
    R: AsyncRead + Unpin + Send,
{
    let handler = StderrHandler {
        log: LazyLog::new(log_path),
        tail,
    };
    for_each_line(pipe, "stderr", handler).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamOptions;
    use serde_json::json;
    use tempfile::TempDir;
    use vibes_channel::ChatId;
    use vibes_channel::MessageId;
    use vibes_channel::MockChannel;
    use vibes_channel::Surface;

    #[derive(Default)]
    struct RecordingSink {
        tokens: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TokenSink for RecordingSink {
        async fn token_discovered(&self, token: String) {
            mutex_lock_or_recover(&self.tokens).push(token);
        }
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let tail = StderrTail::new(3);
        for i in 0..5 {
            tail.push(format!("{}\n", i));
        }
        assert_eq!(tail.text(), "2\n3\n4\n");
    }

    #[tokio::test]
    async fn stdout_reader_logs_normalizes_and_reports_token() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs").join("run.jsonl");
        let channel = MockChannel::new();
        let stream = Arc::new(RenderStream::start(
            Arc::new(channel.clone()),
            Surface::new(ChatId(1), MessageId(2)),
            StreamOptions::new().with_log_in_pre(true),
        ));
        let sink = Arc::new(RecordingSink::default());

        let token = "0b0e1c2d-3e4f-5a6b-7c8d-9e0f1a2b3c4d";
        let mut input = format!(
            "{}\n{}\n",
            json!({"type": "thread.started", "thread_id": token}),
            json!({"type": "item.completed", "item": {"type": "agent_message", "text": "hi"}}),
        )
        .into_bytes();
        input.extend_from_slice(b"plain \xff line\n");
        read_stdout(&input[..], Engine::Codex, log_path.clone(), Arc::clone(&stream), sink.clone()).await;
        stream.stop().await;

        assert_eq!(*mutex_lock_or_recover(&sink.tokens), vec![token.to_string()]);
        let logged = std::fs::read(&log_path).unwrap();
        assert_eq!(logged.iter().filter(|b| **b == b'\n').count(), 3);
        let shown = channel.last_accepted_edit().unwrap();
        assert!(shown.contains("hi"));
        assert!(shown.contains("plain \u{fffd} line"));
    }

    #[tokio::test]
    async fn stderr_reader_keeps_last_line_without_newline() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("run.stderr.txt");
        let tail = StderrTail::new(80);
        read_stderr(&b"warn: a\nfatal: b"[..], log_path.clone(), tail.clone()).await;
        assert_eq!(tail.lines(), vec!["warn: a\n".to_string(), "fatal: b".to_string()]);
        assert_eq!(std::fs::read_to_string(log_path).unwrap(), "warn: a\nfatal: b");
    }
}
