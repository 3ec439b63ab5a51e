//! Action dispatch: registry, expression resolver, and the stock command plugins.

pub mod builtin;
pub mod process;
pub mod registry;
pub mod resolver;

use crate::core::config::Config;

pub use registry::{Arity, CommandPlugin, CommandRegistry, Handler, PanelControl};
pub use resolver::{ActionResolver, ExecutionReport, TokenOutcome, TokenReport};

/// Plugins every panel loads: navigation plus the configured process commands.
#[must_use]
pub fn default_plugins(config: &Config) -> Vec<Box<dyn CommandPlugin>> {
    vec![
        Box::new(builtin::NavigationPlugin),
        Box::new(process::ProcessCommandPlugin::new(
            config.commands.process.clone(),
        )),
    ]
}

/// Registry built from [`default_plugins`].
#[must_use]
pub fn standard_registry(config: &Config) -> CommandRegistry {
    registry::discover(default_plugins(config))
}
