//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. The UI loop and the fetch worker
//! send [`ActivityEvent`]s through a bounded crossbeam channel with `try_send`,
//! so logging back-pressure can never stall a tick. Dropped events are counted
//! and reported in the log once the channel drains.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{DeckError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub enum ActivityEvent {
    PanelStarted {
        version: String,
        config_hash: String,
        page: u32,
    },
    PanelStopped {
        reason: String,
        uptime_secs: u64,
    },
    ButtonsApplied {
        page: u32,
        fingerprint: String,
        created: usize,
        destroyed: usize,
        malformed: usize,
    },
    PageApplied {
        page: u32,
        fingerprint: String,
        web_url: Option<String>,
    },
    PageChanged {
        from: u32,
        to: u32,
    },
    ActionInvoked {
        command: String,
        parameter: Option<String>,
        ok: bool,
        error_code: Option<String>,
        error_message: Option<String>,
    },
    Error {
        code: String,
        message: String,
    },
    /// Stop the logger thread after flushing.
    Shutdown,
}

/// Cheap cloneable sender. Never blocks.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Queue an event; if the channel is full the event is dropped and counted.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn error(&self, err: &DeckError) {
        self.send(ActivityEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only until the request
    /// is queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }

    /// A handle whose events go nowhere, for one-shot CLI commands.
    #[must_use]
    pub fn disconnected() -> Self {
        let (tx, _) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Spawn the logger thread.
pub fn spawn_logger(config: JsonlConfig) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    spawn_logger_with_capacity(config, CHANNEL_CAPACITY)
}

pub fn spawn_logger_with_capacity(
    config: JsonlConfig,
    capacity: usize,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("deckmaster-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped))
        .map_err(|e| DeckError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);
    let mut reported_dropped = 0_u64;

    while let Ok(event) = rx.recv() {
        let total_dropped = dropped.load(Ordering::Relaxed);
        if total_dropped > reported_dropped {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!(
                "{} activity events dropped due to back-pressure",
                total_dropped - reported_dropped
            ));
            jsonl.write_entry(&warn);
            reported_dropped = total_dropped;
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&to_entry(&event));
        if rx.is_empty() {
            jsonl.flush();
        }
    }

    jsonl.sync();
}

fn to_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::PanelStarted {
            version,
            config_hash,
            page,
        } => {
            let mut e = LogEntry::new(EventType::PanelStart, Severity::Info);
            e.page = Some(*page);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::PanelStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::PanelStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ButtonsApplied {
            page,
            fingerprint,
            created,
            destroyed,
            malformed,
        } => {
            let severity = if *malformed > 0 {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::ButtonsApplied, severity);
            e.page = Some(*page);
            e.fingerprint = Some(fingerprint.clone());
            e.created = Some(*created);
            e.destroyed = Some(*destroyed);
            e.malformed = Some(*malformed);
            e
        }
        ActivityEvent::PageApplied {
            page,
            fingerprint,
            web_url,
        } => {
            let mut e = LogEntry::new(EventType::PageApplied, Severity::Info);
            e.page = Some(*page);
            e.fingerprint = Some(fingerprint.clone());
            e.details = web_url.as_ref().map(|url| format!("web_url={url}"));
            e
        }
        ActivityEvent::PageChanged { from, to } => {
            let mut e = LogEntry::new(EventType::PageChanged, Severity::Info);
            e.page = Some(*to);
            e.details = Some(format!("from={from}"));
            e
        }
        ActivityEvent::ActionInvoked {
            command,
            parameter,
            ok,
            error_code,
            error_message,
        } => {
            let severity = if *ok { Severity::Info } else { Severity::Warning };
            let mut e = LogEntry::new(EventType::ActionInvoked, severity);
            e.command = Some(command.clone());
            e.parameter = parameter.clone();
            e.ok = Some(*ok);
            e.error_code = error_code.clone();
            e.error_message = error_message.clone();
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Error);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::PanelStop, Severity::Info),
    }
}
