//! Snapshot reconciliation: fingerprints, the surface capability trait, notices,
//! and the engine that ties them together.

pub mod engine;
pub mod fingerprint;
pub mod notices;
pub mod surface;

pub use engine::{ButtonBinding, ComponentOutcome, ReconcileEngine, TickReport};
pub use fingerprint::Fingerprint;
pub use notices::{Notice, NoticeCenter, NoticeLevel};
pub use surface::{ElementId, Surface};
