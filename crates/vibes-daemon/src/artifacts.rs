//! Per-run log files and the previews built from them.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use tracing::debug;
use tracing::warn;
use vibes_core::transcript;
use vibes_core::Engine;

use crate::record::SessionRecord;

const STDOUT_SUFFIX: &str = ".jsonl";
const STDERR_SUFFIX: &str = ".stderr.txt";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
/// Previews only look at the end of a log.
const TAIL_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogs {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl RunLogs {
    pub fn new(log_dir: &Path, session: &str, started_at: DateTime<Utc>) -> Self {
        let stamp = started_at.format(TIMESTAMP_FORMAT);
        Self {
            stdout: log_dir.join(format!("{}_{}{}", session, stamp, STDOUT_SUFFIX)),
            stderr: log_dir.join(format!("{}_{}{}", session, stamp, STDERR_SUFFIX)),
        }
    }
}

/// Whether `file_name` is one of `session`'s log files.
fn is_session_log(file_name: &str, session: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(session)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };
    let Some(stamp) = rest
        .strip_suffix(STDOUT_SUFFIX)
        .or_else(|| rest.strip_suffix(STDERR_SUFFIX))
    else {
        return false;
    };
    // YYYYmmdd_HHMMSS; keeps "a" from matching "a_b"'s logs.
    stamp.len() == 15
        && stamp
            .char_indices()
            .all(|(i, c)| if i == 8 { c == '_' } else { c.is_ascii_digit() })
}

/// Removes the session's recorded logs and every other log of it in
/// `log_dir`. The session's working directory is never touched.
pub fn delete_artifacts(log_dir: &Path, record: &SessionRecord) -> usize {
    let mut paths: BTreeSet<PathBuf> = record
        .last_stdout_log
        .iter()
        .chain(record.last_stderr_log.iter())
        .cloned()
        .collect();

    match fs::read_dir(log_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let name = entry.file_name();
                if is_session_log(&name.to_string_lossy(), record.name.as_str()) {
                    paths.insert(entry.path());
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %log_dir.display(), error = %e, "Failed to list log dir"),
    }

    let mut removed = 0;
    for path in paths {
        if path.starts_with(&record.path) && !path.starts_with(log_dir) {
            warn!(path = %path.display(), "Refusing to delete a file inside the session directory");
            continue;
        }
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => debug!(path = %path.display(), error = %e, "Failed to delete log"),
        }
    }
    removed
}

/// Reads at most the last `max_bytes` of `path`, starting at a line boundary
/// when the file had to be cut.
pub fn read_tail(path: &Path, max_bytes: u64) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    let cut = len > max_bytes;
    if cut {
        file.seek(SeekFrom::Start(len - max_bytes))?;
    }
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if cut {
        if let Some(newline) = text.find('\n') {
            return Ok(text[newline + 1..].to_string());
        }
    }
    Ok(text)
}

fn read_log(path: Option<&Path>) -> Option<String> {
    let path = path?;
    match read_tail(path, TAIL_BYTES) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Log not readable");
            None
        }
    }
}

/// The last run's transcript, normalized the same way as the live view.
pub fn preview_from_stdout_log(engine: Engine, path: Option<&Path>) -> String {
    read_log(path)
        .map(|text| transcript::stdout_preview(engine, &text, transcript::PREVIEW_MAX_CHARS))
        .unwrap_or_default()
}

pub fn last_agent_message(path: Option<&Path>) -> Option<String> {
    read_log(path).and_then(|text| transcript::last_agent_message(&text, transcript::PREVIEW_MAX_CHARS))
}

pub fn preview_from_stderr_log(path: Option<&Path>) -> String {
    read_log(path)
        .map(|text| {
            transcript::stderr_preview(
                &text,
                transcript::STDERR_PREVIEW_LINES,
                transcript::STDERR_PREVIEW_MAX_CHARS,
            )
        })
        .unwrap_or_default()
}
