//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use deckmaster::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DeckError, Result};

// Store
pub use crate::store::model::{ButtonConfig, ButtonRow, ConfigSnapshot, PageConfig, PageSet};
pub use crate::store::{ConfigStore, FetchOutcome, SnapshotFetcher};
#[cfg(feature = "sqlite")]
pub use crate::store::sqlite::SqliteStore;

// Actions
pub use crate::actions::registry::{Arity, CommandPlugin, CommandRegistry, Handler, PanelControl};
pub use crate::actions::resolver::{ActionResolver, ExecutionReport};

// Reconcile
pub use crate::reconcile::engine::{ComponentOutcome, ReconcileEngine, TickReport};
pub use crate::reconcile::fingerprint::Fingerprint;
pub use crate::reconcile::notices::{Notice, NoticeCenter, NoticeLevel};
pub use crate::reconcile::surface::{ElementId, Surface};

// Runtime
#[cfg(feature = "daemon")]
pub use crate::daemon::runtime::{PanelRuntime, StopReason};
pub use crate::daemon::scheduler::{Navigation, Scheduler};
pub use crate::host::{Host, HostEvent};
