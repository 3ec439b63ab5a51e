//! Configuration store boundary: the read-only queries the panel depends on.
//!
//! A store answers two questions per page number: the page descriptor and the
//! ordered button rows. "No such page" is `None` / an empty list, never an error;
//! only transport or query failures surface as [`DeckError::Connectivity`].
//!
//! [`DeckError::Connectivity`]: crate::core::errors::DeckError::Connectivity

pub mod model;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::time::SystemTime;

use crate::core::errors::Result;
use crate::store::model::{ButtonRow, ConfigSnapshot, PageConfig};

/// Read-only query surface of a configuration store.
///
/// Implementations must not cache: every call reflects the store as of now.
pub trait ConfigStore: Send {
    /// Page descriptor for `page`, or `None` when the page has no row.
    fn fetch_page(&mut self, page: u32) -> Result<Option<PageConfig>>;

    /// Button rows that belong to `page`, in store order.
    fn fetch_buttons(&mut self, page: u32) -> Result<Vec<ButtonRow>>;
}

impl<S: ConfigStore + ?Sized> ConfigStore for Box<S> {
    fn fetch_page(&mut self, page: u32) -> Result<Option<PageConfig>> {
        (**self).fetch_page(page)
    }

    fn fetch_buttons(&mut self, page: u32) -> Result<Vec<ButtonRow>> {
        (**self).fetch_buttons(page)
    }
}

/// Result of one fetch. The halves fail independently so a reachable buttons
/// query still updates the grid when the page query fails, and vice versa.
#[derive(Debug)]
pub struct FetchOutcome {
    pub page_number: u32,
    pub page: Result<Option<PageConfig>>,
    pub buttons: Result<Vec<ButtonRow>>,
    pub fetched_at: SystemTime,
}

impl FetchOutcome {
    /// Full snapshot when both halves succeeded.
    #[must_use]
    pub fn snapshot(&self) -> Option<ConfigSnapshot> {
        match (&self.page, &self.buttons) {
            (Ok(page), Ok(buttons)) => Some(ConfigSnapshot {
                page_number: self.page_number,
                page: page.clone(),
                buttons: buttons.clone(),
            }),
            _ => None,
        }
    }
}

/// Thin wrapper that performs both queries for a page.
pub struct SnapshotFetcher<S> {
    store: S,
}

impl<S: ConfigStore> SnapshotFetcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Query page and buttons for `page_number`. Never fails as a whole.
    pub fn fetch(&mut self, page_number: u32) -> FetchOutcome {
        let page = self.store.fetch_page(page_number);
        let buttons = self.store.fetch_buttons(page_number);
        FetchOutcome {
            page_number,
            page,
            buttons,
            fetched_at: SystemTime::now(),
        }
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
