//! Panel runtime: tick scheduling, the UI/fetch thread pair, signal handling,
//! and the status state file.

#[cfg(feature = "daemon")]
pub mod runtime;
pub mod scheduler;
#[cfg(feature = "daemon")]
pub mod signals;
pub mod state;
