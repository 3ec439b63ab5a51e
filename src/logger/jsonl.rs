//! Append-only JSONL activity log.
//!
//! One self-contained JSON object per line, assembled in memory and written with
//! a single `write_all` so a tailing reader never sees half a line.
//!
//! When the log path is unusable the writer degrades instead of failing:
//! primary path, then fallback path, then stderr (`[DM-JSONL]` prefix), then
//! discard. Logging never takes the panel down.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{DeckError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PanelStart,
    PanelStop,
    ButtonsApplied,
    PageApplied,
    PageChanged,
    ActionInvoked,
    Error,
}

/// One log line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC, millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destroyed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malformed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            page: None,
            fingerprint: None,
            created: None,
            destroyed: None,
            malformed: None,
            command: None,
            parameter: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl Sink {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate when the current file would grow past this many bytes.
    pub max_size_bytes: u64,
    /// Rotated generations kept (`.1` newest).
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    /// Defaults for a given primary path: 10 MiB files, 3 generations, fallback
    /// in the system temp dir.
    #[must_use]
    pub fn for_path(path: PathBuf) -> Self {
        Self {
            path,
            fallback_path: Some(std::env::temp_dir().join("deckmaster-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<BufWriter<File>>,
    sink: Sink,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the primary path, degrading as needed. Never fails.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Discard,
            bytes_written: 0,
        };
        let primary = writer.config.path.clone();
        if !writer.attach(&primary, Sink::Primary) {
            writer.fall_back();
        }
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[DM-JSONL] serialize error: {e}");
            }
        }
    }

    /// Flush buffered lines and sync file data.
    pub fn sync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.get_ref().sync_data();
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    /// `primary`, `fallback`, `stderr` or `discard`.
    #[must_use]
    pub const fn sink(&self) -> &'static str {
        self.sink.as_str()
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if matches!(self.sink, Sink::Primary | Sink::Fallback)
            && self.bytes_written + len > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.sink {
            Sink::Primary | Sink::Fallback => {
                let ok = self
                    .file
                    .as_mut()
                    .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                if ok {
                    self.bytes_written += len;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            Sink::Stderr => {
                let _ = write!(io::stderr(), "[DM-JSONL] {line}");
            }
            Sink::Discard => {}
        }
    }

    fn attach(&mut self, path: &Path, sink: Sink) -> bool {
        match open_append(path) {
            Ok((file, size)) => {
                self.file = Some(BufWriter::new(file));
                self.sink = sink;
                self.bytes_written = size;
                true
            }
            Err(_) => false,
        }
    }

    fn fall_back(&mut self) {
        self.file = None;
        if let Some(fallback) = self.config.fallback_path.clone()
            && self.attach(&fallback, Sink::Fallback)
        {
            eprintln!(
                "[DM-JSONL] activity log unavailable, using fallback {}",
                fallback.display()
            );
            return;
        }
        eprintln!("[DM-JSONL] no writable activity log path, writing to stderr");
        self.sink = Sink::Stderr;
    }

    fn degrade(&mut self) {
        match self.sink {
            Sink::Primary => self.fall_back(),
            Sink::Fallback => {
                self.file = None;
                self.sink = Sink::Stderr;
                eprintln!("[DM-JSONL] fallback write failed, writing to stderr");
            }
            Sink::Stderr => self.sink = Sink::Discard,
            Sink::Discard => {}
        }
    }

    fn rotate(&mut self) {
        self.flush();
        self.file = None;
        let base = match self.sink {
            Sink::Primary => self.config.path.clone(),
            Sink::Fallback => match self.config.fallback_path.clone() {
                Some(path) => path,
                None => return,
            },
            Sink::Stderr | Sink::Discard => return,
        };

        let keep = self.config.max_rotated_files.max(1);
        let _ = fs::remove_file(generation(&base, keep));
        for n in (1..keep).rev() {
            let _ = fs::rename(generation(&base, n), generation(&base, n + 1));
        }
        let _ = fs::rename(&base, generation(&base, 1));

        let sink = self.sink;
        if !self.attach(&base, sink) {
            self.degrade();
        }
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| DeckError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| DeckError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.2`.
fn generation(base: &Path, n: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}
