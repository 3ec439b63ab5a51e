#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use deckmaster::core::config::Config;
use deckmaster::core::errors::{DeckError, Result};
use deckmaster::store::ConfigStore;
use deckmaster::store::model::{ButtonRow, PageConfig, PageSet};
use deckmaster::store::sqlite::SqliteStore;

// ──────────────────── CLI runner ────────────────────

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_deckmaster") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        "deckmaster.exe"
    } else {
        "deckmaster"
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve deckmaster binary path for integration test"),
    }
}

/// Run the binary with `home` as `$HOME` so default paths stay inside the test
/// directory. Every run is logged for post-mortem.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("deckmaster-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("HOME", home)
        .env_remove("DM_STORE_SQLITE_PATH")
        .env_remove("DM_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute deckmaster command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Parse the last stdout line as JSON.
pub fn last_json(result: &CmdResult) -> serde_json::Value {
    let line = result
        .stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_else(|| panic!("no stdout; log: {}", result.log_path.display()));
    serde_json::from_str(line)
        .unwrap_or_else(|e| panic!("bad json {line:?}: {e}; log: {}", result.log_path.display()))
}

/// Write a config file whose store and paths all live under `dir`.
pub fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config.toml");
    let body = format!(
        "[store]\nsqlite_path = {db:?}\n\n[paths]\nconfig_file = {cfg:?}\nactivity_log = {log:?}\nstate_file = {state:?}\n\n{extra}\n",
        db = dir.join("panel.sqlite3").display().to_string(),
        cfg = path.display().to_string(),
        log = dir.join("activity.jsonl").display().to_string(),
        state = dir.join("state.json").display().to_string(),
    );
    fs::write(&path, body).expect("write config");
    path
}

// ──────────────────── fixtures ────────────────────

/// Config rooted in `dir` with a fast tick for runtime tests.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.store.sqlite_path = dir.join("panel.sqlite3");
    config.paths.config_file = dir.join("config.toml");
    config.paths.activity_log = dir.join("activity.jsonl");
    config.paths.state_file = dir.join("state.json");
    config.scheduler.interval_ms = 20;
    config.notices.ttl_ms = 200;
    config
}

/// Fully populated 6-field row (no image).
pub fn button(label: &str, x: i64, y: i64, action: &str) -> ButtonRow {
    ButtonRow {
        label: Some(label.to_string()),
        x: Some(x),
        y: Some(y),
        background: Some("#333333".to_string()),
        foreground: Some("white".to_string()),
        action: Some(action.to_string()),
        image: None,
        pages: PageSet::single(1),
    }
}

/// Row with only the leading `populated` fields set.
pub fn partial_button(label: &str, populated: usize) -> ButtonRow {
    let full = button(label, 10, 10, "noop");
    ButtonRow {
        label: full.label,
        x: if populated >= 2 { full.x } else { None },
        y: if populated >= 3 { full.y } else { None },
        background: if populated >= 4 { full.background } else { None },
        foreground: if populated >= 5 { full.foreground } else { None },
        action: if populated >= 6 { full.action } else { None },
        image: None,
        pages: full.pages,
    }
}

pub fn page(number: u32, background: &str, web: Option<&str>) -> PageConfig {
    PageConfig {
        page_number: number,
        web_url: web.map(str::to_string),
        show_web: web.is_some(),
        background: Some(background.to_string()),
    }
}

/// SQLite store file under `dir` with schema only.
pub fn sqlite_store(dir: &Path) -> SqliteStore {
    SqliteStore::open(&dir.join("panel.sqlite3"), Duration::from_millis(250))
        .expect("open sqlite store")
}

// ──────────────────── in-memory store ────────────────────

#[derive(Debug, Default)]
pub struct MemoryData {
    pub pages: BTreeMap<u32, PageConfig>,
    pub buttons: Vec<ButtonRow>,
    pub fail_buttons: bool,
    pub fail_pages: bool,
    pub fetch_delay: Option<Duration>,
    pub fetched_pages: Vec<u32>,
}

/// Store whose contents tests can change while a runtime's worker owns a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub data: Arc<Mutex<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(&self, f: impl FnOnce(&mut MemoryData)) {
        f(&mut self.data.lock());
    }

    pub fn fetched_pages(&self) -> Vec<u32> {
        self.data.lock().fetched_pages.clone()
    }
}

fn offline() -> DeckError {
    DeckError::Connectivity {
        context: "memory store",
        details: "offline".to_string(),
    }
}

impl ConfigStore for MemoryStore {
    fn fetch_page(&mut self, page: u32) -> Result<Option<PageConfig>> {
        let delay = {
            let mut data = self.data.lock();
            data.fetched_pages.push(page);
            data.fetch_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let data = self.data.lock();
        if data.fail_pages {
            return Err(offline());
        }
        Ok(data.pages.get(&page).cloned())
    }

    fn fetch_buttons(&mut self, page: u32) -> Result<Vec<ButtonRow>> {
        let data = self.data.lock();
        if data.fail_buttons {
            return Err(offline());
        }
        Ok(data
            .buttons
            .iter()
            .filter(|row| row.pages.contains(page))
            .cloned()
            .collect())
    }
}
