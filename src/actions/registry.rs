//! Command registry: name → handler lookup, populated once at startup.
//!
//! Handlers declare their arity at registration through [`Handler`]. The registry
//! does not validate what a handler does; it is a pure lookup table. After
//! construction it is shared behind an `Arc` and never mutated again.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::errors::Result;

/// Hosting application surface handed to [`Handler::WithContext`] handlers.
pub trait PanelControl {
    /// Page currently displayed (always >= 1).
    fn current_page(&self) -> u32;

    /// Navigate to `page`. Values below 1 clamp to 1.
    fn switch_page(&mut self, page: u32);

    /// Advance one page.
    fn next_page(&mut self);

    /// Go back one page, stopping at 1.
    fn previous_page(&mut self);

    /// Force a reconcile on the next loop iteration, even if nothing is due.
    fn request_refresh(&mut self);
}

/// Handler body taking no arguments.
pub type NullaryFn = dyn Fn() -> Result<()> + Send + Sync;
/// Handler body taking the token parameter.
pub type UnaryFn = dyn Fn(Option<&str>) -> Result<()> + Send + Sync;
/// Handler body taking the parameter and the panel.
pub type ContextFn = dyn Fn(Option<&str>, &mut dyn PanelControl) -> Result<()> + Send + Sync;

/// A registered command implementation, tagged with its arity.
#[derive(Clone)]
pub enum Handler {
    /// Takes nothing. A parameter present in the expression is ignored.
    Nullary(Arc<NullaryFn>),
    /// Takes the token's parameter (`None` when the token had no `:`).
    Unary(Arc<UnaryFn>),
    /// Takes the parameter plus the hosting panel.
    WithContext(Arc<ContextFn>),
}

/// Arity tag, for listings and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    /// See [`Handler::Nullary`].
    Nullary,
    /// See [`Handler::Unary`].
    Unary,
    /// See [`Handler::WithContext`].
    WithContext,
}

impl Arity {
    /// Snake-case name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nullary => "nullary",
            Self::Unary => "unary",
            Self::WithContext => "with_context",
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Handler {
    /// Wrap a closure that takes no arguments.
    pub fn nullary<F>(f: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self::Nullary(Arc::new(f))
    }

    /// Wrap a closure that takes the parameter.
    pub fn unary<F>(f: F) -> Self
    where
        F: Fn(Option<&str>) -> Result<()> + Send + Sync + 'static,
    {
        Self::Unary(Arc::new(f))
    }

    /// Wrap a closure that takes the parameter and the panel.
    pub fn with_context<F>(f: F) -> Self
    where
        F: Fn(Option<&str>, &mut dyn PanelControl) -> Result<()> + Send + Sync + 'static,
    {
        Self::WithContext(Arc::new(f))
    }

    /// Arity tag of this handler.
    #[must_use]
    pub const fn arity(&self) -> Arity {
        match self {
            Self::Nullary(_) => Arity::Nullary,
            Self::Unary(_) => Arity::Unary,
            Self::WithContext(_) => Arity::WithContext,
        }
    }

    /// Call the handler with the arguments its arity asks for.
    pub fn invoke(&self, parameter: Option<&str>, panel: &mut dyn PanelControl) -> Result<()> {
        match self {
            Self::Nullary(f) => f(),
            Self::Unary(f) => f(parameter),
            Self::WithContext(f) => f(parameter, panel),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}", self.arity())
    }
}

// ──────────────────── registry ────────────────────

/// Name → handler table. Names are opaque; no namespacing.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl CommandRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`. An existing binding is replaced silently and
    /// returned.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) -> Option<Handler> {
        self.handlers.insert(name.into(), handler)
    }

    /// Handler bound to `name`. Lookup is exact and case-sensitive.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names with their arity, sorted by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Arity)> + '_ {
        self.handlers
            .iter()
            .map(|(name, handler)| (name.as_str(), handler.arity()))
    }

    /// Number of bound names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ──────────────────── plugin discovery ────────────────────

/// A bundle of commands that registers itself at startup.
pub trait CommandPlugin {
    /// Stable plugin name; discovery order is derived from it.
    fn name(&self) -> &str;

    /// Add this plugin's commands.
    fn register(&self, registry: &mut CommandRegistry);
}

/// Build a registry from plugins.
///
/// Plugins register in ascending order of [`CommandPlugin::name`], so when two
/// plugins claim the same command the alphabetically later plugin wins. This
/// order is an implementation detail: callers must not rely on which plugin
/// wins a conflict.
#[must_use]
pub fn discover(mut plugins: Vec<Box<dyn CommandPlugin>>) -> CommandRegistry {
    plugins.sort_by(|a, b| a.name().cmp(b.name()));
    let mut registry = CommandRegistry::new();
    for plugin in &plugins {
        let before = registry.len();
        plugin.register(&mut registry);
        eprintln!(
            "[DM-ACTION] plugin '{}' registered ({} commands total, +{})",
            plugin.name(),
            registry.len(),
            registry.len().saturating_sub(before)
        );
    }
    registry
}
