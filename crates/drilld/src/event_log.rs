use drill_core::{Event, EventId, EventKind};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize event: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append to log file {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `global.jsonl` receives every event; events tagged with a suite are also
/// appended to `suites/<suite>.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlEventLog {
    pub root: PathBuf,
    pub global_file: PathBuf,
    pub suite_dir: PathBuf,
}

impl JsonlEventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let global_file = root.join("global.jsonl");
        let suite_dir = root.join("suites");
        Self {
            root,
            global_file,
            suite_dir,
        }
    }

    pub fn ensure_layout(&self) -> Result<(), EventLogError> {
        fs::create_dir_all(&self.suite_dir).map_err(|source| EventLogError::CreateDir {
            path: self.suite_dir.clone(),
            source,
        })
    }

    pub fn append(&self, event: &Event) -> Result<(), EventLogError> {
        self.ensure_layout()?;
        append_json_line(&self.global_file, event)?;
        if let Some(suite) = &event.suite {
            append_json_line(&self.suite_log_path(suite), event)?;
        }
        Ok(())
    }

    pub fn suite_log_path(&self, suite: &str) -> PathBuf {
        self.suite_dir.join(format!("{}.jsonl", sanitize_file_stem(suite)))
    }

    pub fn global_log_path(&self) -> &Path {
        self.global_file.as_path()
    }
}

fn sanitize_file_stem(value: &str) -> String {
    let out: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        "suite".to_string()
    } else {
        out
    }
}

fn append_json_line(path: &Path, event: &Event) -> Result<(), EventLogError> {
    let mut line =
        serde_json::to_string(event).map_err(|source| EventLogError::Serialize { source })?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| EventLogError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(line.as_bytes())
        .map_err(|source| EventLogError::Append {
            path: path.to_path_buf(),
            source,
        })
}

/// Stamps events with run-scoped ids and appends them to an optional log.
/// Write failures are logged and dropped.
#[derive(Debug)]
pub struct EventRecorder {
    log: Option<JsonlEventLog>,
    run_id: String,
    next_seq: AtomicU64,
}

impl EventRecorder {
    pub fn new(log: Option<JsonlEventLog>, run_id: impl Into<String>) -> Self {
        Self {
            log,
            run_id: run_id.into(),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, "run")
    }

    pub fn emit(&self, suite: Option<&str>, kind: EventKind) -> Event {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let event = Event::new(EventId::new(format!("{}-{seq:05}", self.run_id)), suite, kind);
        if let Some(log) = &self.log {
            if let Err(err) = log.append(&event) {
                warn!(error = %err, kind = event.kind.tag(), "failed to append event");
            }
        }
        event
    }
}
