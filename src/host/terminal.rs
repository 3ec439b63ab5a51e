//! Full-screen terminal host backed by `crossterm`.
//!
//! Panel pixel coordinates are scaled onto the terminal grid. Buttons render as
//! filled label boxes; image references render as their label. The web view is
//! a one-line placeholder showing the loaded URL. Surface calls only mark the
//! frame dirty; painting happens once per `poll_events`.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseButton, MouseEventKind,
};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};

use crate::core::config::DisplayConfig;
use crate::core::errors::{DeckError, Result};
use crate::daemon::scheduler::Navigation;
use crate::host::{DESIGN_HEIGHT, DESIGN_WIDTH, Host, HostEvent, nav_hit, placed};
use crate::reconcile::notices::{Notice, NoticeLevel};
use crate::reconcile::surface::{ElementId, Surface};
use crate::store::model::ButtonConfig;

#[derive(Debug, Clone)]
struct PaintedButton {
    label: String,
    x: i32,
    y: i32,
    background: Color,
    foreground: Color,
}

/// Cell rectangle: column, row, width, height.
type CellRect = (u16, u16, u16, u16);

pub struct TerminalSurface {
    display: DisplayConfig,
    buttons: BTreeMap<ElementId, PaintedButton>,
    next_id: ElementId,
    background: Color,
    web_url: Option<String>,
    web_visible: bool,
    notices: Vec<(NoticeLevel, String)>,
    size: (u16, u16),
    dirty: bool,
    alive: bool,
    out: io::Stdout,
}

impl TerminalSurface {
    /// Enter raw mode and the alternate screen. The terminal is restored on drop.
    pub fn open(display: DisplayConfig) -> Result<Self> {
        let mut out = io::stdout();
        terminal::enable_raw_mode().map_err(|e| tty_error("enable raw mode", &e))?;
        if let Err(e) = execute!(out, EnterAlternateScreen, Hide, EnableMouseCapture) {
            let _ = terminal::disable_raw_mode();
            return Err(tty_error("enter alternate screen", &e));
        }
        let size = terminal::size().unwrap_or((80, 24));
        let background = parse_color(&display.default_background).unwrap_or(Color::Black);
        Ok(Self {
            display,
            buttons: BTreeMap::new(),
            next_id: 0,
            background,
            web_url: None,
            web_visible: false,
            notices: Vec::new(),
            size,
            dirty: true,
            alive: true,
            out,
        })
    }

    fn scale(&self, x: i32, y: i32) -> (u16, u16) {
        let (cols, rows) = self.size;
        let sx = i64::from(x.max(0)) * i64::from(cols) / i64::from(DESIGN_WIDTH);
        let sy = i64::from(y.max(0)) * i64::from(rows) / i64::from(DESIGN_HEIGHT);
        (
            u16::try_from(sx).unwrap_or(u16::MAX).min(cols.saturating_sub(1)),
            u16::try_from(sy).unwrap_or(u16::MAX).min(rows.saturating_sub(1)),
        )
    }

    /// Cells covered by a control whose stored layout position is `(x, y)`.
    fn rect(&self, x: i32, y: i32) -> CellRect {
        let (cols, rows) = self.size;
        let (x, y) = placed(&self.display, x, y);
        let (col, row) = self.scale(x, y);
        let w = u64::from(self.display.button_width) * u64::from(cols) / u64::from(DESIGN_WIDTH);
        let h = u64::from(self.display.button_height) * u64::from(rows) / u64::from(DESIGN_HEIGHT);
        let w = u16::try_from(w).unwrap_or(u16::MAX).max(3);
        let h = u16::try_from(h).unwrap_or(u16::MAX).max(1);
        (
            col,
            row,
            w.min(cols.saturating_sub(col)),
            h.min(rows.saturating_sub(row)),
        )
    }

    /// Map a terminal cell back to design pixels (cell centre).
    fn unscale(&self, col: u16, row: u16) -> (i32, i32) {
        let (cols, rows) = self.size;
        let px = (u32::from(col) * 2 + 1) * DESIGN_WIDTH / (u32::from(cols.max(1)) * 2);
        let py = (u32::from(row) * 2 + 1) * DESIGN_HEIGHT / (u32::from(rows.max(1)) * 2);
        (
            i32::try_from(px).unwrap_or(i32::MAX),
            i32::try_from(py).unwrap_or(i32::MAX),
        )
    }

    fn hit_test(&self, col: u16, row: u16) -> Option<HostEvent> {
        let (px, py) = self.unscale(col, row);
        if let Some(nav) = nav_hit(&self.display, px, py) {
            return Some(HostEvent::Navigate(nav));
        }
        // Later buttons paint over earlier ones.
        self.buttons.iter().rev().find_map(|(id, button)| {
            let (c, r, w, h) = self.rect(button.x, button.y);
            (col >= c && col < c + w && row >= r && row < r + h).then_some(HostEvent::Click(*id))
        })
    }

    fn paint(&mut self) -> io::Result<()> {
        let (cols, rows) = self.size;
        let blank = " ".repeat(usize::from(cols));
        queue!(self.out, SetBackgroundColor(self.background))?;
        for row in 0..rows {
            queue!(self.out, MoveTo(0, row), Print(&blank))?;
        }

        for button in self.buttons.values() {
            let (c, r, w, h) = self.rect(button.x, button.y);
            queue!(
                self.out,
                SetBackgroundColor(button.background),
                SetForegroundColor(button.foreground)
            )?;
            let fill = " ".repeat(usize::from(w));
            for dy in 0..h {
                queue!(self.out, MoveTo(c, r + dy), Print(&fill))?;
            }
            let label = fit(&button.label, usize::from(w));
            let pad = (usize::from(w).saturating_sub(label.chars().count()) / 2) as u16;
            queue!(self.out, MoveTo(c + pad, r + h / 2), Print(label))?;
        }

        for (label, (x, y)) in [("◀", self.display.nav_left), ("▶", self.display.nav_right)] {
            let (c, r, w, h) = self.rect(x, y);
            queue!(
                self.out,
                SetBackgroundColor(Color::DarkGrey),
                SetForegroundColor(Color::White),
                MoveTo(c + w / 2, r + h / 2),
                Print(label)
            )?;
        }

        if self.web_visible
            && let Some(url) = &self.web_url
        {
            queue!(
                self.out,
                SetBackgroundColor(Color::Black),
                SetForegroundColor(Color::Cyan),
                MoveTo(0, 0),
                Print(fit(&format!("[web] {url}"), usize::from(cols)))
            )?;
        }

        let first_notice_row = rows.saturating_sub(u16::try_from(self.notices.len()).unwrap_or(0));
        for (i, (level, message)) in self.notices.iter().enumerate() {
            let color = match level {
                NoticeLevel::Info => Color::Blue,
                NoticeLevel::Warning => Color::DarkYellow,
                NoticeLevel::Error => Color::DarkRed,
            };
            let row = first_notice_row + u16::try_from(i).unwrap_or(0);
            queue!(
                self.out,
                SetBackgroundColor(color),
                SetForegroundColor(Color::White),
                MoveTo(0, row),
                Print(fit(message, usize::from(cols)))
            )?;
        }

        queue!(self.out, ResetColor)?;
        self.out.flush()?;
        self.dirty = false;
        Ok(())
    }

    fn restore(&mut self) {
        let _ = execute!(self.out, DisableMouseCapture, ResetColor, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Surface for TerminalSurface {
    fn create_button(&mut self, button: &ButtonConfig) -> Result<ElementId> {
        self.next_id += 1;
        let id = self.next_id;
        self.buttons.insert(
            id,
            PaintedButton {
                label: button.label.clone(),
                x: button.x,
                y: button.y,
                background: parse_color(&button.background).unwrap_or(Color::Grey),
                foreground: parse_color(&button.foreground).unwrap_or(Color::Black),
            },
        );
        self.dirty = true;
        Ok(id)
    }

    fn destroy_element(&mut self, id: ElementId) {
        if self.buttons.remove(&id).is_some() {
            self.dirty = true;
        }
    }

    fn set_background(&mut self, color: &str) {
        self.background = parse_color(color)
            .or_else(|| parse_color(&self.display.default_background))
            .unwrap_or(Color::Black);
        self.dirty = true;
    }

    fn load_web_view(&mut self, url: &str) {
        self.web_url = Some(url.to_string());
        self.dirty = true;
    }

    fn show_web_view(&mut self) {
        self.web_visible = true;
        self.dirty = true;
    }

    fn hide_web_view(&mut self) {
        self.web_visible = false;
        self.dirty = true;
    }

    fn show_notices(&mut self, notices: &[Notice]) {
        self.notices = notices
            .iter()
            .map(|n| (n.level, n.message.clone()))
            .collect();
        self.dirty = true;
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}

impl Host for TerminalSurface {
    fn poll_events(&mut self, timeout: Duration) -> Result<Vec<HostEvent>> {
        if self.dirty && self.alive {
            self.paint().map_err(|e| tty_error("paint", &e))?;
        }

        let mut events = Vec::new();
        let mut wait = timeout;
        while event::poll(wait).map_err(|e| tty_error("poll", &e))? {
            wait = Duration::ZERO;
            match event::read().map_err(|e| tty_error("read", &e))? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q' | 'Q') | KeyCode::Esc => events.push(HostEvent::Quit),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        events.push(HostEvent::Quit);
                    }
                    KeyCode::Left => events.push(HostEvent::Navigate(Navigation::Previous)),
                    KeyCode::Right => events.push(HostEvent::Navigate(Navigation::Next)),
                    KeyCode::Home => events.push(HostEvent::Navigate(Navigation::To(1))),
                    _ => {}
                },
                Event::Mouse(mouse) if mouse.kind == MouseEventKind::Down(MouseButton::Left) => {
                    if let Some(hit) = self.hit_test(mouse.column, mouse.row) {
                        events.push(hit);
                    }
                }
                Event::Resize(cols, rows) => {
                    self.size = (cols, rows);
                    self.dirty = true;
                    events.push(HostEvent::Resize);
                }
                _ => {}
            }
        }
        Ok(events)
    }

    fn close(&mut self) {
        if self.alive {
            self.alive = false;
            self.restore();
        }
    }
}

impl Drop for TerminalSurface {
    fn drop(&mut self) {
        self.close();
    }
}

/// `#rgb`, `#rrggbb`, or a crossterm color name (`red`, `dark_grey`, ...).
fn parse_color(raw: &str) -> Option<Color> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
                Some(Color::Rgb {
                    r: expand(0)?,
                    g: expand(1)?,
                    b: expand(2)?,
                })
            }
            6 => Some(Color::Rgb {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            _ => None,
        };
    }
    Color::try_from(raw.to_ascii_lowercase().as_str()).ok()
}

fn fit(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn tty_error(context: &str, err: &io::Error) -> DeckError {
    DeckError::Runtime {
        details: format!("terminal {context}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_color_forms() {
        assert_eq!(
            parse_color("#1e1e1e"),
            Some(Color::Rgb {
                r: 0x1e,
                g: 0x1e,
                b: 0x1e
            })
        );
        assert_eq!(
            parse_color("#fff"),
            Some(Color::Rgb {
                r: 255,
                g: 255,
                b: 255
            })
        );
        assert_eq!(parse_color("Red"), Some(Color::Red));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("#gggggg"), None);
    }

    #[test]
    fn fit_truncates_on_chars() {
        assert_eq!(fit("Lights ▶ on", 8), "Lights ▶");
        assert_eq!(fit("ok", 10), "ok");
    }

    fn offscreen(size: (u16, u16)) -> TerminalSurface {
        TerminalSurface {
            display: DisplayConfig::default(),
            buttons: BTreeMap::new(),
            next_id: 0,
            background: Color::Black,
            web_url: None,
            web_visible: false,
            notices: Vec::new(),
            size,
            dirty: false,
            // Not alive: drop must not touch the real terminal.
            alive: false,
            out: io::stdout(),
        }
    }

    #[test]
    fn hit_test_prefers_nav_then_topmost_button() {
        let mut surface = offscreen((128, 72));
        surface.buttons.insert(
            1,
            PaintedButton {
                label: "under".to_string(),
                x: 0,
                y: 0,
                background: Color::Grey,
                foreground: Color::Black,
            },
        );
        surface.buttons.insert(
            2,
            PaintedButton {
                label: "over".to_string(),
                x: 0,
                y: 0,
                background: Color::Grey,
                foreground: Color::Black,
            },
        );
        // (20, 7) px sits in cell (2, 0) at 10 px per cell.
        assert_eq!(surface.hit_test(3, 1), Some(HostEvent::Click(2)));
        assert_eq!(
            surface.hit_test(101, 67),
            Some(HostEvent::Navigate(Navigation::Previous))
        );
        assert_eq!(surface.hit_test(60, 40), None);
    }

    #[test]
    fn scale_clamps_to_grid() {
        let surface = offscreen((80, 24));
        assert_eq!(surface.scale(0, 0), (0, 0));
        assert_eq!(surface.scale(1280, 720), (79, 23));
        assert_eq!(surface.scale(-50, -50), (0, 0));
    }
}
