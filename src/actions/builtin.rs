//! Navigation commands every panel has: `switch_page`, `next_page`,
//! `previous_page`, `refresh`.

use crate::actions::registry::{CommandPlugin, CommandRegistry, Handler, PanelControl};
use crate::core::errors::{DeckError, Result};

/// Registers the built-in navigation commands.
pub struct NavigationPlugin;

impl CommandPlugin for NavigationPlugin {
    fn name(&self) -> &str {
        "navigation"
    }

    fn register(&self, registry: &mut CommandRegistry) {
        registry.register("switch_page", Handler::with_context(switch_page));
        registry.register(
            "next_page",
            Handler::with_context(|_, panel| {
                panel.next_page();
                Ok(())
            }),
        );
        registry.register(
            "previous_page",
            Handler::with_context(|_, panel| {
                panel.previous_page();
                Ok(())
            }),
        );
        registry.register(
            "refresh",
            Handler::with_context(|_, panel| {
                panel.request_refresh();
                Ok(())
            }),
        );
    }
}

/// `switch_page:<n>` or `switch_page:home`.
pub fn switch_page(parameter: Option<&str>, panel: &mut dyn PanelControl) -> Result<()> {
    let page = parse_page(parameter)?;
    panel.switch_page(page);
    Ok(())
}

/// Page argument: a positive integer, or `home` for page 1.
pub fn parse_page(parameter: Option<&str>) -> Result<u32> {
    let invalid = |details: String| DeckError::InvalidParameter {
        command: "switch_page".to_string(),
        details,
    };
    let raw = parameter
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| invalid("missing page number".to_string()))?;

    if raw.eq_ignore_ascii_case("home") {
        return Ok(1);
    }
    let page: i64 = raw
        .parse()
        .map_err(|_| invalid(format!("'{raw}' is not a page number")))?;
    if page < 1 {
        return Err(invalid(format!("page must be >= 1, got {page}")));
    }
    u32::try_from(page).map_err(|_| invalid(format!("page {page} out of range")))
}

/// Stand-in context when no panel is running (`deckmaster exec`). Records
/// navigation so callers can report where the panel would have gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedPanel {
    pub page: u32,
    pub refresh_requested: bool,
}

impl DetachedPanel {
    #[must_use]
    pub fn new(page: u32) -> Self {
        Self {
            page: page.max(1),
            refresh_requested: false,
        }
    }
}

impl PanelControl for DetachedPanel {
    fn current_page(&self) -> u32 {
        self.page
    }

    fn switch_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    fn next_page(&mut self) {
        self.page = self.page.saturating_add(1);
    }

    fn previous_page(&mut self) {
        self.page = self.page.saturating_sub(1).max(1);
    }

    fn request_refresh(&mut self) {
        self.refresh_requested = true;
    }
}
