//! Config-declared commands that launch an external program.
//!
//! ```toml
//! [[commands.process]]
//! name = "lights"
//! program = "/usr/bin/curl"
//! args = ["-X", "POST", "http://hub.local/api/scene/{param}"]
//! ```
//!
//! A command whose args mention `{param}` is unary and requires a parameter;
//! otherwise it is nullary. The UI thread never waits on a child; only a failed
//! spawn is reported. Finished children are reaped on the next invocation.

#![allow(missing_docs)]

use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::actions::registry::{CommandPlugin, CommandRegistry, Handler};
use crate::actions::resolver::CHAIN_DELIMITER;
use crate::core::errors::{DeckError, Result};

/// Placeholder replaced by the token's parameter.
pub const PARAM_PLACEHOLDER: &str = "{param}";

/// Children launched by a command that may not have exited yet.
#[derive(Debug, Default)]
pub struct ChildTracker {
    children: Mutex<Vec<Child>>,
}

impl ChildTracker {
    fn track(&self, child: Child) {
        self.children.lock().push(child);
    }

    /// Wait on every child that has exited. Returns how many are still running.
    pub fn reap(&self) -> usize {
        let mut children = self.children.lock();
        children.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
        children.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessCommandSpec {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProcessCommandSpec {
    /// Reject names the expression grammar could not address.
    pub fn validate(&self) -> Result<()> {
        let name = self.name.as_str();
        if name.trim().is_empty() {
            return Err(DeckError::InvalidConfig {
                details: "commands.process entry has an empty name".to_string(),
            });
        }
        if name.contains(':') || name.contains(CHAIN_DELIMITER) || name.trim() != name {
            return Err(DeckError::InvalidConfig {
                details: format!(
                    "commands.process name {name:?} may not contain ':', '{CHAIN_DELIMITER}' or surrounding whitespace"
                ),
            });
        }
        if self.program.trim().is_empty() {
            return Err(DeckError::InvalidConfig {
                details: format!("commands.process '{name}' has an empty program"),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn takes_parameter(&self) -> bool {
        self.args.iter().any(|arg| arg.contains(PARAM_PLACEHOLDER))
    }

    /// Arguments with `{param}` substituted.
    pub fn render_args(&self, parameter: Option<&str>) -> Result<Vec<String>> {
        if !self.takes_parameter() {
            return Ok(self.args.clone());
        }
        let Some(parameter) = parameter else {
            return Err(DeckError::InvalidParameter {
                command: self.name.clone(),
                details: "requires a parameter".to_string(),
            });
        };
        Ok(self
            .args
            .iter()
            .map(|arg| arg.replace(PARAM_PLACEHOLDER, parameter))
            .collect())
    }

    fn spawn(&self, parameter: Option<&str>, tracker: &ChildTracker) -> Result<()> {
        tracker.reap();
        let args = self.render_args(parameter)?;
        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                DeckError::handler(&self.name, format!("spawn {}: {err}", self.program))
            })?;
        tracker.track(child);
        Ok(())
    }

    #[must_use]
    pub fn handler(&self) -> Handler {
        self.handler_with(Arc::new(ChildTracker::default()))
    }

    /// Handler whose children are recorded in `tracker`.
    #[must_use]
    pub fn handler_with(&self, tracker: Arc<ChildTracker>) -> Handler {
        let spec = self.clone();
        if self.takes_parameter() {
            Handler::unary(move |parameter| spec.spawn(parameter, &tracker))
        } else {
            Handler::nullary(move || spec.spawn(None, &tracker))
        }
    }
}

/// Registers every `[[commands.process]]` entry.
pub struct ProcessCommandPlugin {
    specs: Vec<ProcessCommandSpec>,
}

impl ProcessCommandPlugin {
    #[must_use]
    pub const fn new(specs: Vec<ProcessCommandSpec>) -> Self {
        Self { specs }
    }
}

impl CommandPlugin for ProcessCommandPlugin {
    fn name(&self) -> &str {
        "process"
    }

    fn register(&self, registry: &mut CommandRegistry) {
        for spec in &self.specs {
            registry.register(spec.name.clone(), spec.handler());
        }
    }
}
