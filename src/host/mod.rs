//! Display hosts: a surface plus an input event source.

pub mod headless;
#[cfg(feature = "terminal")]
pub mod terminal;

use std::time::Duration;

use crate::core::config::DisplayConfig;
use crate::core::errors::Result;
use crate::daemon::scheduler::Navigation;
use crate::reconcile::surface::{ElementId, Surface};

/// Input the panel runtime reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// A materialized button was pressed.
    Click(ElementId),
    /// One of the host-owned navigation controls, or a key binding.
    Navigate(Navigation),
    Resize,
    Quit,
}

pub trait Host: Surface {
    /// Wait up to `timeout` for input. An empty vec means nothing happened.
    fn poll_events(&mut self, timeout: Duration) -> Result<Vec<HostEvent>>;

    /// Release host resources. Called once by the runtime on exit.
    fn close(&mut self) {}
}

/// Pixel geometry of the reference panel layout.
pub const DESIGN_WIDTH: u32 = 1280;
pub const DESIGN_HEIGHT: u32 = 720;

/// Screen position of a layout coordinate: stored coordinates are shifted by
/// the display offsets when placed.
#[must_use]
pub const fn placed(display: &DisplayConfig, x: i32, y: i32) -> (i32, i32) {
    (
        x.saturating_add(display.offset_x),
        y.saturating_add(display.offset_y),
    )
}

/// Which nav control, if any, covers a screen pixel.
#[must_use]
pub fn nav_hit(display: &DisplayConfig, x: i32, y: i32) -> Option<Navigation> {
    let hit = |(nx, ny): (i32, i32)| {
        let (nx, ny) = placed(display, nx, ny);
        let w = i32::try_from(display.button_width).unwrap_or(i32::MAX);
        let h = i32::try_from(display.button_height).unwrap_or(i32::MAX);
        x >= nx && x < nx.saturating_add(w) && y >= ny && y < ny.saturating_add(h)
    };
    if hit(display.nav_left) {
        Some(Navigation::Previous)
    } else if hit(display.nav_right) {
        Some(Navigation::Next)
    } else {
        None
    }
}
