//! Reconciliation engine: applies fetched snapshots to a surface, rebuilding
//! only the components whose fingerprint changed.
//!
//! Buttons and page presentation are tracked separately. A failed or unchanged
//! component leaves whatever is on screen untouched; the screen is never
//! cleared because a query failed.

use serde::Serialize;

use crate::core::errors::DeckError;
use crate::reconcile::fingerprint::{Fingerprint, buttons_fingerprint, page_fingerprint};
use crate::reconcile::surface::{ElementId, Surface};
use crate::store::model::{ButtonConfig, ButtonRow, PageConfig};
use crate::store::{ConfigStore, FetchOutcome, SnapshotFetcher};

/// What a click on a materialized button should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonBinding {
    /// Label, for logs and notices.
    pub label: String,
    /// Expression as it was when the button was created.
    pub action: Option<String>,
}

/// A button currently on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedButton {
    /// Surface handle.
    pub id: ElementId,
    /// What a click runs.
    pub binding: ButtonBinding,
}

/// Result of one component's reconcile step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum ComponentOutcome {
    /// Fingerprint matched; no surface calls.
    Unchanged,
    /// Rebuilt from the new snapshot.
    Applied,
    /// The fetch or fingerprint failed; the previous state stays on screen.
    Skipped(&'static str),
    /// Engine torn down or surface gone; nothing was attempted.
    Detached,
}

/// What one apply did.
#[derive(Debug)]
pub struct TickReport {
    /// Page the snapshot was for.
    pub page_number: u32,
    /// Button set outcome.
    pub buttons: ComponentOutcome,
    /// Background and web view outcome.
    pub page: ComponentOutcome,
    /// Elements created.
    pub created: usize,
    /// Elements destroyed.
    pub destroyed: usize,
    /// Rows skipped for missing required fields.
    pub malformed: usize,
    /// Everything that should be surfaced as a notice, in occurrence order.
    pub problems: Vec<DeckError>,
}

impl TickReport {
    fn detached(page_number: u32) -> Self {
        Self {
            page_number,
            buttons: ComponentOutcome::Detached,
            page: ComponentOutcome::Detached,
            created: 0,
            destroyed: 0,
            malformed: 0,
            problems: Vec::new(),
        }
    }

    /// No surface calls were made for either component.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created == 0
            && self.destroyed == 0
            && !matches!(self.page, ComponentOutcome::Applied)
            && !matches!(self.buttons, ComponentOutcome::Applied)
    }
}

/// Owns what is on the surface and the fingerprints it was built from.
#[derive(Debug)]
pub struct ReconcileEngine {
    default_background: String,
    last_buttons: Option<Fingerprint>,
    last_page: Option<Fingerprint>,
    materialized: Vec<MaterializedButton>,
    current_page: Option<PageConfig>,
    loaded_url: Option<String>,
    torn_down: bool,
}

impl ReconcileEngine {
    /// `default_background` is used when a page has no background.
    #[must_use]
    pub fn new(default_background: impl Into<String>) -> Self {
        Self {
            default_background: default_background.into(),
            last_buttons: None,
            last_page: None,
            materialized: Vec::new(),
            current_page: None,
            loaded_url: None,
            torn_down: false,
        }
    }

    /// Fetch and apply in one step on the calling thread.
    pub fn tick<S: ConfigStore>(
        &mut self,
        fetcher: &mut SnapshotFetcher<S>,
        page_number: u32,
        surface: &mut dyn Surface,
    ) -> TickReport {
        if self.torn_down || !surface.is_alive() {
            return TickReport::detached(page_number);
        }
        let outcome = fetcher.fetch(page_number);
        self.apply(outcome, surface)
    }

    /// Apply a completed fetch. Must run on the thread that owns the surface.
    pub fn apply(&mut self, outcome: FetchOutcome, surface: &mut dyn Surface) -> TickReport {
        let page_number = outcome.page_number;
        if self.torn_down || !surface.is_alive() {
            return TickReport::detached(page_number);
        }

        let mut report = TickReport {
            page_number,
            buttons: ComponentOutcome::Unchanged,
            page: ComponentOutcome::Unchanged,
            created: 0,
            destroyed: 0,
            malformed: 0,
            problems: Vec::new(),
        };

        report.buttons = match outcome.buttons {
            Ok(rows) => self.reconcile_buttons(&rows, surface, &mut report),
            Err(err) => skip(err, &mut report.problems),
        };
        report.page = match outcome.page {
            Ok(page) => self.reconcile_page(page, surface, &mut report.problems),
            Err(err) => skip(err, &mut report.problems),
        };

        if !report.is_noop() {
            eprintln!(
                "[DM-RECONCILE] page {page_number}: buttons={:?} page={:?} +{} -{} malformed={}",
                report.buttons, report.page, report.created, report.destroyed, report.malformed
            );
        }
        report
    }

    fn reconcile_buttons(
        &mut self,
        rows: &[ButtonRow],
        surface: &mut dyn Surface,
        report: &mut TickReport,
    ) -> ComponentOutcome {
        let fp = match buttons_fingerprint(rows) {
            Ok(fp) => fp,
            Err(err) => return skip(err, &mut report.problems),
        };
        if self.last_buttons == Some(fp) {
            return ComponentOutcome::Unchanged;
        }

        report.destroyed = self.destroy_all(surface);
        let mut create_failed = false;
        for row in rows {
            let button = match ButtonConfig::from_row(row) {
                Ok(button) => button,
                Err(err) => {
                    report.malformed += 1;
                    report.problems.push(err);
                    continue;
                }
            };
            match surface.create_button(&button) {
                Ok(id) => {
                    report.created += 1;
                    self.materialized.push(MaterializedButton {
                        id,
                        binding: ButtonBinding {
                            label: button.label,
                            action: button.action,
                        },
                    });
                }
                Err(err) => {
                    create_failed = true;
                    report.problems.push(err);
                }
            }
        }
        // A partial set is rebuilt on the next tick.
        self.last_buttons = if create_failed { None } else { Some(fp) };
        ComponentOutcome::Applied
    }

    fn reconcile_page(
        &mut self,
        page: Option<PageConfig>,
        surface: &mut dyn Surface,
        problems: &mut Vec<DeckError>,
    ) -> ComponentOutcome {
        let fp = match page_fingerprint(page.as_ref()) {
            Ok(fp) => fp,
            Err(err) => return skip(err, problems),
        };
        if self.last_page == Some(fp) {
            return ComponentOutcome::Unchanged;
        }

        let background = page
            .as_ref()
            .and_then(|p| p.background.as_deref())
            .map(str::trim)
            .filter(|bg| !bg.is_empty())
            .unwrap_or(self.default_background.as_str());
        surface.set_background(background);

        match page.as_ref().and_then(PageConfig::visible_web_url) {
            Some(url) => {
                if self.loaded_url.as_deref() != Some(url) {
                    surface.load_web_view(url);
                    self.loaded_url = Some(url.to_string());
                }
                surface.show_web_view();
            }
            None => surface.hide_web_view(),
        }

        self.current_page = page;
        self.last_page = Some(fp);
        ComponentOutcome::Applied
    }

    fn destroy_all(&mut self, surface: &mut dyn Surface) -> usize {
        let count = self.materialized.len();
        for element in self.materialized.drain(..) {
            surface.destroy_element(element.id);
        }
        count
    }

    /// Forget both fingerprints so the next apply rebuilds everything.
    pub fn reset(&mut self) {
        self.last_buttons = None;
        self.last_page = None;
    }

    /// Destroy every materialized button. Later applies do nothing.
    pub fn teardown(&mut self, surface: &mut dyn Surface) {
        if self.torn_down {
            return;
        }
        if surface.is_alive() {
            self.destroy_all(surface);
        } else {
            self.materialized.clear();
        }
        self.torn_down = true;
        self.reset();
    }

    /// Buttons on the surface, in creation order.
    #[must_use]
    pub fn materialized(&self) -> &[MaterializedButton] {
        &self.materialized
    }

    /// Binding of a materialized button, `None` for unknown or stale ids.
    #[must_use]
    pub fn binding(&self, id: ElementId) -> Option<&ButtonBinding> {
        self.materialized
            .iter()
            .find(|m| m.id == id)
            .map(|m| &m.binding)
    }

    /// Page row last applied.
    #[must_use]
    pub const fn current_page(&self) -> Option<&PageConfig> {
        self.current_page.as_ref()
    }

    /// URL currently loaded into the web view.
    #[must_use]
    pub fn loaded_url(&self) -> Option<&str> {
        self.loaded_url.as_deref()
    }

    /// Fingerprint of the button set on screen, `None` until a complete build.
    #[must_use]
    pub const fn buttons_fingerprint(&self) -> Option<Fingerprint> {
        self.last_buttons
    }

    /// Fingerprint of the page presentation on screen.
    #[must_use]
    pub const fn page_fingerprint(&self) -> Option<Fingerprint> {
        self.last_page
    }

    /// Set by [`Self::teardown`].
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

fn skip(err: DeckError, problems: &mut Vec<DeckError>) -> ComponentOutcome {
    let code = err.code();
    problems.push(err);
    ComponentOutcome::Skipped(code)
}
