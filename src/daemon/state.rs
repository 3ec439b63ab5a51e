//! Runtime state file for `deckmaster status`.
//!
//! Written atomically (write `.tmp`, then `rename()`) at most every
//! [`STATE_WRITE_INTERVAL_SECS`] so the CLI always reads a whole snapshot.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{DeckError, Result};

pub const STATE_WRITE_INTERVAL_SECS: u64 = 5;

/// Age past which `status` warns that the panel may have stopped.
pub const STATE_STALE_THRESHOLD_SECS: u64 = 3 * STATE_WRITE_INTERVAL_SECS;

/// Top-level state document. Every field defaults so older or newer panels
/// stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelState {
    pub version: String,
    pub pid: u32,
    pub started_at: String,
    pub uptime_seconds: u64,
    pub last_updated: String,
    pub store: String,
    pub page: u32,
    pub materialized_buttons: usize,
    pub buttons_fingerprint: Option<String>,
    pub page_fingerprint: Option<String>,
    pub web_url: Option<String>,
    pub counters: Counters,
}

/// Cumulative counters since start. Shared between the fetch worker and the
/// UI thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub fetches: u64,
    pub fetch_failures: u64,
    pub applies: u64,
    pub rebuilds: u64,
    pub stale_discards: u64,
    pub coalesced_ticks: u64,
    pub malformed_rows: u64,
    pub actions: u64,
    pub action_errors: u64,
    pub dropped_log_events: u64,
}

pub type SharedCounters = Arc<Mutex<Counters>>;

#[must_use]
pub fn shared_counters() -> SharedCounters {
    Arc::new(Mutex::new(Counters::default()))
}

/// Periodic state file writer owned by the UI loop.
pub struct StateWriter {
    path: PathBuf,
    interval: Duration,
    start_time: Instant,
    started_at_iso: String,
    last_write: Option<Instant>,
}

impl StateWriter {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            interval: Duration::from_secs(STATE_WRITE_INTERVAL_SECS),
            start_time: Instant::now(),
            started_at_iso: now_rfc3339(),
            last_write: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write if the interval elapsed. `fill` populates the panel-specific fields.
    /// Returns whether a write was attempted.
    pub fn maybe_write(&mut self, now: Instant, fill: impl FnOnce(&mut PanelState)) -> bool {
        if let Some(last) = self.last_write
            && now.saturating_duration_since(last) < self.interval
        {
            return false;
        }
        self.write_now(fill);
        self.last_write = Some(now);
        true
    }

    /// Write unconditionally (used at shutdown).
    pub fn write_now(&mut self, fill: impl FnOnce(&mut PanelState)) {
        let mut state = PanelState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            started_at: self.started_at_iso.clone(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            last_updated: now_rfc3339(),
            ..PanelState::default()
        };
        fill(&mut state);
        if let Err(e) = write_state_atomic(&self.path, &state) {
            eprintln!("[DM-RUNTIME] failed to write state file: {e}");
        }
    }
}

/// Read the state file written by a running panel.
pub fn read_state(path: &Path) -> Result<PanelState> {
    let raw = fs::read_to_string(path).map_err(|source| DeckError::io(path, source))?;
    let state: PanelState = serde_json::from_str(&raw)?;

    if let Ok(updated) = chrono::DateTime::parse_from_rfc3339(&state.last_updated) {
        let age = chrono::Utc::now().signed_duration_since(updated);
        #[allow(clippy::cast_possible_wrap)]
        if age.num_seconds() > STATE_STALE_THRESHOLD_SECS as i64 {
            eprintln!(
                "[DM-STATUS] WARNING: state file is {}s old; panel may have stopped",
                age.num_seconds()
            );
        }
    }
    Ok(state)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn write_state_atomic(path: &Path, state: &PanelState) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(state).map_err(std::io::Error::other)?;

    let result = (|| {
        {
            use std::io::Write;
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o644);
            }
            let mut file = opts.open(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("state.json");
        let mut writer = StateWriter::new(path.clone());
        writer.write_now(|s| {
            s.page = 3;
            s.materialized_buttons = 7;
            s.counters.applies = 2;
        });
        let state = read_state(&path).unwrap();
        assert_eq!(state.page, 3);
        assert_eq!(state.materialized_buttons, 7);
        assert_eq!(state.counters.applies, 2);
        assert_eq!(state.pid, std::process::id());
        assert!(!dir.path().join("run").join("state.json.tmp").exists());
    }

    #[test]
    fn maybe_write_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StateWriter::new(dir.path().join("state.json"));
        let t0 = Instant::now();
        assert!(writer.maybe_write(t0, |_| {}));
        assert!(!writer.maybe_write(t0 + Duration::from_secs(1), |_| {}));
        assert!(writer.maybe_write(t0 + Duration::from_secs(STATE_WRITE_INTERVAL_SECS), |_| {}));
    }

    #[test]
    fn unknown_fields_and_missing_fields_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"page": 4, "future_field": true}"#).unwrap();
        let state = read_state(&path).unwrap();
        assert_eq!(state.page, 4);
        assert_eq!(state.counters, Counters::default());
    }

    #[test]
    fn missing_state_file_is_io_error() {
        let err = read_state(Path::new("/nonexistent/deckmaster/state.json")).unwrap_err();
        assert_eq!(err.code(), "DM-3101");
    }

    #[test]
    fn shared_counters_visible_across_threads() {
        let counters = shared_counters();
        let worker = Arc::clone(&counters);
        std::thread::spawn(move || worker.lock().fetches += 5)
            .join()
            .unwrap();
        assert_eq!(counters.lock().fetches, 5);
    }
}
