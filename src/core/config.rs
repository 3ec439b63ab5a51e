//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::actions::process::ProcessCommandSpec;
use crate::core::errors::{DeckError, Result};

/// Full panel configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub display: DisplayConfig,
    pub notices: NoticeConfig,
    pub commands: CommandsConfig,
    pub paths: PathsConfig,
}

/// Where button/page records live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite_path: PathBuf,
    /// How long a query waits on a locked database before failing the tick.
    pub busy_timeout_ms: u64,
}

/// Reconciliation cadence and navigation policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_ms: u64,
    pub start_page: u32,
    /// Drop fetch results whose page no longer matches the current page.
    pub discard_stale: bool,
}

/// Layout constants handed to host surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub default_background: String,
    pub offset_x: i32,
    pub offset_y: i32,
    pub button_width: u32,
    pub button_height: u32,
    pub nav_left: (i32, i32),
    pub nav_right: (i32, i32),
}

/// Transient notification behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NoticeConfig {
    pub ttl_ms: u64,
    pub max_visible: usize,
}

/// Config-declared command plugins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CommandsConfig {
    pub process: Vec<ProcessCommandSpec>,
}

/// Filesystem paths used by deckmaster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
    pub state_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: data_dir().join("panel.sqlite3"),
            busy_timeout_ms: 250,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            start_page: 1,
            discard_stale: true,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_background: "#1e1e1e".to_string(),
            offset_x: 20,
            offset_y: 7,
            button_width: 121,
            button_height: 128,
            nav_left: (985, 662),
            nav_right: (1153, 662),
        }
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 4_000,
            max_visible: 3,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let cfg = home_dir()
            .join(".config")
            .join("deckmaster")
            .join("config.toml");
        let data = data_dir();
        Self {
            config_file: cfg,
            activity_log: data.join("activity.jsonl"),
            state_file: data.join("state.json"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[DM-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("deckmaster")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| DeckError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(DeckError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the startup log line.
    ///
    /// FNV-1a over the canonical JSON, stable across processes and releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DM_STORE_SQLITE_PATH") {
            self.store.sqlite_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DM_SCHEDULER_INTERVAL_MS") {
            self.scheduler.interval_ms = parse_env("DM_SCHEDULER_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("DM_SCHEDULER_START_PAGE") {
            self.scheduler.start_page = parse_env("DM_SCHEDULER_START_PAGE", &raw)?;
        }
        if let Some(raw) = lookup("DM_SCHEDULER_DISCARD_STALE") {
            self.scheduler.discard_stale = parse_env("DM_SCHEDULER_DISCARD_STALE", &raw)?;
        }
        if let Some(raw) = lookup("DM_NOTICES_TTL_MS") {
            self.notices.ttl_ms = parse_env("DM_NOTICES_TTL_MS", &raw)?;
        }
        if let Some(raw) = lookup("DM_DISPLAY_DEFAULT_BACKGROUND") {
            self.display.default_background = raw;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.interval_ms == 0 {
            return Err(DeckError::InvalidConfig {
                details: "scheduler.interval_ms must be > 0".to_string(),
            });
        }
        if self.scheduler.start_page == 0 {
            return Err(DeckError::InvalidConfig {
                details: "scheduler.start_page must be >= 1".to_string(),
            });
        }
        // Notices must auto-clear.
        if self.notices.ttl_ms == 0 {
            return Err(DeckError::InvalidConfig {
                details: "notices.ttl_ms must be > 0".to_string(),
            });
        }
        if self.notices.max_visible == 0 {
            return Err(DeckError::InvalidConfig {
                details: "notices.max_visible must be >= 1".to_string(),
            });
        }
        if self.display.button_width == 0 || self.display.button_height == 0 {
            return Err(DeckError::InvalidConfig {
                details: "display.button_width and display.button_height must be > 0".to_string(),
            });
        }
        if !is_valid_color(&self.display.default_background) {
            return Err(DeckError::InvalidConfig {
                details: format!(
                    "display.default_background is not a color: {:?}",
                    self.display.default_background
                ),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.commands.process {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(DeckError::InvalidConfig {
                    details: format!("commands.process declares '{}' twice", spec.name),
                });
            }
        }
        Ok(())
    }
}

/// `#rgb`, `#rrggbb`, or a bare color name such as `red` / `darkslategray`.
#[must_use]
pub fn is_valid_color(raw: &str) -> bool {
    static COLOR: OnceLock<Option<Regex>> = OnceLock::new();
    COLOR
        .get_or_init(|| Regex::new(r"^(#[0-9a-fA-F]{3}|#[0-9a-fA-F]{6}|[a-zA-Z]+[0-9]?)$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(raw.trim()))
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| DeckError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
