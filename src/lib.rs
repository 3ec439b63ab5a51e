#![forbid(unsafe_code)]

//! deckmaster — data-driven control panel.
//!
//! A configuration store holds pages and buttons. The panel polls it, rebuilds
//! only what changed on screen, and runs each button's action expression
//! (`cmd:param && cmd2`) through a registry of pluggable command handlers.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use deckmaster::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use deckmaster::core::config::Config;
//! use deckmaster::reconcile::engine::ReconcileEngine;
//! ```

pub mod prelude;

pub mod actions;
pub mod core;
pub mod daemon;
pub mod host;
pub mod logger;
pub mod reconcile;
pub mod store;
