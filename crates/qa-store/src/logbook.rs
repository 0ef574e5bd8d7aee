//! Day-scoped JSONL logbook.
//!
//! Layout: `<root>/<YYYY-MM-DD>/{actions,errors,messages}.jsonl`. Streams
//! are append-only; the executor never mutates or removes an entry.

use chrono::NaiveDate;
use qa_core::log::{LogEvent, LogStream};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LogbookError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize log event: {source}")]
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
    #[error("failed to read log file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse log line in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logbook {
    pub root: PathBuf,
}

impl Logbook {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn day_dir(&self, day: NaiveDate) -> PathBuf {
        self.root.join(day.format("%Y-%m-%d").to_string())
    }

    pub fn stream_path(&self, day: NaiveDate, stream: LogStream) -> PathBuf {
        self.day_dir(day).join(stream.file_name())
    }

    /// Append one event to the stream its kind routes to, under the day of
    /// its timestamp.
    pub fn append(&self, event: &LogEvent) -> Result<(), LogbookError> {
        let day = event.at.date_naive();
        let dir = self.day_dir(day);
        fs::create_dir_all(&dir).map_err(|source| LogbookError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        append_json_line(&self.stream_path(day, event.stream()), event)
    }

    /// Append events preserving slice order.
    pub fn append_all(&self, events: &[LogEvent]) -> Result<(), LogbookError> {
        for event in events {
            self.append(event)?;
        }
        Ok(())
    }

    /// Read back one stream for one day; a missing file is an empty stream.
    pub fn read_stream(
        &self,
        day: NaiveDate,
        stream: LogStream,
    ) -> Result<Vec<LogEvent>, LogbookError> {
        let path = self.stream_path(day, stream);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let body = fs::read_to_string(&path).map_err(|source| LogbookError::Read {
            path: path.clone(),
            source,
        })?;

        let mut events = Vec::new();
        for line in body.lines().filter(|line| !line.trim().is_empty()) {
            let event = serde_json::from_str::<LogEvent>(line).map_err(|source| {
                LogbookError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Most recent day directory, by name order.
    pub fn latest_day(&self) -> Result<Option<NaiveDate>, LogbookError> {
        if !self.root.exists() {
            return Ok(None);
        }
        let entries = fs::read_dir(&self.root).map_err(|source| LogbookError::Read {
            path: self.root.clone(),
            source,
        })?;

        let mut days: Vec<NaiveDate> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LogbookError::Read {
                path: self.root.clone(),
                source,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(day) = NaiveDate::parse_from_str(name, "%Y-%m-%d") {
                    days.push(day);
                }
            }
        }
        Ok(days.into_iter().max())
    }
}

fn append_json_line(path: &Path, event: &LogEvent) -> Result<(), LogbookError> {
    let line =
        serde_json::to_string(event).map_err(|source| LogbookError::Serialize { source })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LogbookError::Append {
            path: path.to_path_buf(),
            source,
        })?;

    file.write_all(line.as_bytes())
        .map_err(|source| LogbookError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(b"\n").map_err(|source| LogbookError::Append {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
