//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees half a record. Logging never fails the
//! command that emits it: the writer degrades from the log file to stderr
//! (with a `[FIDX-JSONL]` prefix) and finally to silently discarding lines.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::LogConfig;
use crate::core::errors::{FidxError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Activity event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LoadStart,
    LoadComplete,
    Query,
    Error,
}

/// A single JSONL log entry; all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Root directory being indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Query operation (`exact`, `prefix`, `partial`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    /// Number of paths returned by a query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct_keys: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Stable hash of the effective config.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            root: None,
            query: None,
            term: None,
            results: None,
            total_files: None,
            distinct_keys: None,
            workers: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            config_hash: None,
        }
    }

    /// Error event carrying the error's stable code.
    pub fn error(err: &FidxError) -> Self {
        let mut entry = Self::new(EventType::Error, Severity::Error);
        entry.ok = Some(false);
        entry.error_code = Some(err.code().to_string());
        entry.error_message = Some(err.to_string());
        entry
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Append-only JSONL writer with size-based rotation.
pub struct JsonlWriter {
    path: PathBuf,
    max_size_bytes: u64,
    max_rotated_files: u32,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open (or create) the log file, falling back to stderr on failure.
    pub fn open(config: &LogConfig) -> Self {
        let mut w = Self {
            path: config.path.clone(),
            max_size_bytes: config.max_size_bytes,
            max_rotated_files: config.max_rotated_files,
            writer: None,
            state: WriterState::Stderr,
            bytes_written: 0,
        };
        match open_append(&w.path) {
            Ok((file, size)) => {
                w.writer = Some(BufWriter::new(file));
                w.state = WriterState::Normal;
                w.bytes_written = size;
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[FIDX-JSONL] {e}; logging to stderr");
            }
        }
        w
    }

    /// Write a single log entry as one JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[FIDX-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Current degradation state.
    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::Normal
            && self.bytes_written + line.len() as u64 > self.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[FIDX-JSONL] {line}").is_err() {
                    self.degrade();
                }
            }
            WriterState::Discard => {}
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::Normal => {
                let _ = writeln!(io::stderr(), "[FIDX-JSONL] log write failed, using stderr");
                WriterState::Stderr
            }
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }

    /// `activity.jsonl` → `.1` → `.2` …; the oldest beyond the limit is removed.
    fn rotate(&mut self) {
        if let Some(mut w) = self.writer.take() {
            let _ = w.flush();
        }
        if self.max_rotated_files > 0 {
            let _ = fs::remove_file(rotated_name(&self.path, self.max_rotated_files));
            for i in (1..self.max_rotated_files).rev() {
                let _ = fs::rename(
                    rotated_name(&self.path, i),
                    rotated_name(&self.path, i + 1),
                );
            }
            let _ = fs::rename(&self.path, rotated_name(&self.path, 1));
        } else {
            let _ = fs::remove_file(&self.path);
        }

        match open_append(&self.path) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::new(file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Activity log that is a no-op when logging is disabled.
pub struct ActivityLog {
    writer: Option<JsonlWriter>,
}

impl ActivityLog {
    pub fn from_config(config: &LogConfig) -> Self {
        Self {
            writer: config.enabled.then(|| JsonlWriter::open(config)),
        }
    }

    pub fn record(&mut self, entry: &LogEntry) {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_entry(entry);
            writer.flush();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }
}

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| FidxError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| FidxError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
