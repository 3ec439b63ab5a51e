//! Headless host: records every surface operation and takes input from a
//! channel. Used by `deckmaster run --headless` and by tests.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::errors::Result;
use crate::host::{Host, HostEvent};
use crate::reconcile::notices::Notice;
use crate::reconcile::surface::{ElementId, Surface};
use crate::store::model::ButtonConfig;

/// One recorded surface call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SurfaceOp {
    Create {
        id: ElementId,
        label: String,
        x: i32,
        y: i32,
        action: Option<String>,
    },
    Destroy {
        id: ElementId,
    },
    Background {
        color: String,
    },
    LoadWeb {
        url: String,
    },
    ShowWeb,
    HideWeb,
    Notices {
        messages: Vec<String>,
    },
}

impl SurfaceOp {
    #[must_use]
    pub const fn is_element_op(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Destroy { .. })
    }

    #[must_use]
    pub const fn is_page_op(&self) -> bool {
        matches!(
            self,
            Self::Background { .. } | Self::LoadWeb { .. } | Self::ShowWeb | Self::HideWeb
        )
    }
}

/// Test and CLI side of a headless host: inject events, read the op log.
#[derive(Clone)]
pub struct HeadlessController {
    events: Sender<HostEvent>,
    ops: Arc<Mutex<Vec<SurfaceOp>>>,
    alive: Arc<AtomicBool>,
}

impl HeadlessController {
    pub fn send(&self, event: HostEvent) {
        let _ = self.events.send(event);
    }

    /// Copy of every op recorded so far.
    #[must_use]
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops.lock().clone()
    }

    /// Take and clear the op log.
    #[must_use]
    pub fn drain_ops(&self) -> Vec<SurfaceOp> {
        std::mem::take(&mut *self.ops.lock())
    }

    /// Simulate the window going away.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }
}

pub struct HeadlessSurface {
    next_id: ElementId,
    live: Vec<ElementId>,
    ops: Arc<Mutex<Vec<SurfaceOp>>>,
    events: Receiver<HostEvent>,
    alive: Arc<AtomicBool>,
    echo: bool,
}

impl HeadlessSurface {
    /// `echo` prints each op to stdout as a JSON line.
    #[must_use]
    pub fn new(echo: bool) -> (Self, HeadlessController) {
        let (tx, rx) = unbounded();
        let ops = Arc::new(Mutex::new(Vec::new()));
        let alive = Arc::new(AtomicBool::new(true));
        let surface = Self {
            next_id: 0,
            live: Vec::new(),
            ops: Arc::clone(&ops),
            events: rx,
            alive: Arc::clone(&alive),
            echo,
        };
        let controller = HeadlessController {
            events: tx,
            ops,
            alive,
        };
        (surface, controller)
    }

    /// Ids of elements created and not yet destroyed, in creation order.
    #[must_use]
    pub fn live_elements(&self) -> &[ElementId] {
        &self.live
    }

    fn record(&self, op: SurfaceOp) {
        if self.echo
            && let Ok(line) = serde_json::to_string(&op)
        {
            println!("{line}");
        }
        self.ops.lock().push(op);
    }
}

impl Surface for HeadlessSurface {
    fn create_button(&mut self, button: &ButtonConfig) -> Result<ElementId> {
        self.next_id += 1;
        let id = self.next_id;
        self.live.push(id);
        self.record(SurfaceOp::Create {
            id,
            label: button.label.clone(),
            x: button.x,
            y: button.y,
            action: button.action.clone(),
        });
        Ok(id)
    }

    fn destroy_element(&mut self, id: ElementId) {
        self.live.retain(|live| *live != id);
        self.record(SurfaceOp::Destroy { id });
    }

    fn set_background(&mut self, color: &str) {
        self.record(SurfaceOp::Background {
            color: color.to_string(),
        });
    }

    fn load_web_view(&mut self, url: &str) {
        self.record(SurfaceOp::LoadWeb {
            url: url.to_string(),
        });
    }

    fn show_web_view(&mut self) {
        self.record(SurfaceOp::ShowWeb);
    }

    fn hide_web_view(&mut self) {
        self.record(SurfaceOp::HideWeb);
    }

    fn show_notices(&mut self, notices: &[Notice]) {
        self.record(SurfaceOp::Notices {
            messages: notices.iter().map(|n| n.message.clone()).collect(),
        });
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

impl Host for HeadlessSurface {
    fn poll_events(&mut self, timeout: Duration) -> Result<Vec<HostEvent>> {
        let mut events = Vec::new();
        match self.events.recv_timeout(timeout) {
            Ok(event) => events.push(event),
            Err(RecvTimeoutError::Timeout) => return Ok(events),
            // Nobody can send anymore; behave like an idle window.
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                return Ok(events);
            }
        }
        events.extend(self.events.try_iter());
        Ok(events)
    }

    fn close(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
    }
}
