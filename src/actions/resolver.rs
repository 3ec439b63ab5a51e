//! Action expressions: `command[:parameter][ && command[:parameter] ...]`.
//!
//! Expressions are parsed on every execution. Each token is attempted in order
//! regardless of what happened to the previous one; failures are collected in
//! the [`ExecutionReport`] instead of aborting the chain.

#![allow(missing_docs)]

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::actions::registry::{Arity, CommandRegistry, PanelControl};
use crate::core::errors::DeckError;

/// Separator between chained tokens.
pub const CHAIN_DELIMITER: &str = "&&";

/// One `command[:parameter]` element of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionToken<'a> {
    pub command: &'a str,
    pub parameter: Option<&'a str>,
}

/// Split an expression into tokens. Empty and whitespace-only tokens are dropped.
#[must_use]
pub fn parse(expression: &str) -> Vec<ActionToken<'_>> {
    expression
        .split(CHAIN_DELIMITER)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| match token.split_once(':') {
            Some((command, parameter)) => ActionToken {
                command: command.trim(),
                parameter: Some(parameter.trim()),
            },
            None => ActionToken {
                command: token,
                parameter: None,
            },
        })
        .collect()
}

/// What happened to one token.
#[derive(Debug)]
pub enum TokenOutcome {
    Invoked(Arity),
    Unresolved(DeckError),
    Failed(DeckError),
}

#[derive(Debug)]
pub struct TokenReport {
    pub command: String,
    pub parameter: Option<String>,
    pub outcome: TokenOutcome,
}

impl TokenReport {
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self.outcome {
            TokenOutcome::Invoked(_) => "invoked",
            TokenOutcome::Unresolved(_) => "unresolved",
            TokenOutcome::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&DeckError> {
        match &self.outcome {
            TokenOutcome::Invoked(_) => None,
            TokenOutcome::Unresolved(err) | TokenOutcome::Failed(err) => Some(err),
        }
    }
}

/// Per-token results of one `execute` call, in expression order.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub tokens: Vec<TokenReport>,
}

impl ExecutionReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &DeckError> + '_ {
        self.tokens.iter().filter_map(TokenReport::error)
    }

    #[must_use]
    pub fn invoked(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t.outcome, TokenOutcome::Invoked(_)))
            .count()
    }
}

/// Executes action expressions against a shared registry.
#[derive(Debug, Clone)]
pub struct ActionResolver {
    registry: Arc<CommandRegistry>,
}

impl ActionResolver {
    #[must_use]
    pub const fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run every token of `expression` in order. `None` or blank is a no-op.
    pub fn execute(
        &self,
        expression: Option<&str>,
        panel: &mut dyn PanelControl,
    ) -> ExecutionReport {
        let Some(expression) = expression else {
            return ExecutionReport::default();
        };

        let mut report = ExecutionReport::default();
        for token in parse(expression) {
            let outcome = self.run_token(token, panel);
            match &outcome {
                TokenOutcome::Invoked(_) => {}
                TokenOutcome::Unresolved(err) | TokenOutcome::Failed(err) => {
                    eprintln!("[DM-ACTION] {err}");
                }
            }
            report.tokens.push(TokenReport {
                command: token.command.to_string(),
                parameter: token.parameter.map(str::to_string),
                outcome,
            });
        }
        report
    }

    fn run_token(&self, token: ActionToken<'_>, panel: &mut dyn PanelControl) -> TokenOutcome {
        let Some(handler) = self.registry.resolve(token.command) else {
            return TokenOutcome::Unresolved(DeckError::UnresolvedCommand {
                command: token.command.to_string(),
            });
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            handler.invoke(token.parameter, &mut *panel)
        }));
        match result {
            Ok(Ok(())) => TokenOutcome::Invoked(handler.arity()),
            Ok(Err(err)) => TokenOutcome::Failed(err),
            Err(payload) => TokenOutcome::Failed(DeckError::handler(
                token.command,
                format!("panicked: {}", panic_message(payload.as_ref())),
            )),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::registry::Handler;
    use parking_lot::Mutex;

    struct StubPanel(u32);

    impl PanelControl for StubPanel {
        fn current_page(&self) -> u32 {
            self.0
        }
        fn switch_page(&mut self, page: u32) {
            self.0 = page.max(1);
        }
        fn next_page(&mut self) {
            self.0 += 1;
        }
        fn previous_page(&mut self) {
            self.0 = self.0.saturating_sub(1).max(1);
        }
        fn request_refresh(&mut self) {}
    }

    fn recording_registry(log: &Arc<Mutex<Vec<String>>>) -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        let l = Arc::clone(log);
        registry.register(
            "change_scene",
            Handler::unary(move |p| {
                l.lock().push(format!("change_scene({})", p.unwrap_or("-")));
                Ok(())
            }),
        );
        let l = Arc::clone(log);
        registry.register(
            "fail",
            Handler::nullary(move || {
                l.lock().push("fail".to_string());
                Err(DeckError::handler("fail", "socket closed"))
            }),
        );
        registry.register("explode", Handler::nullary(|| panic!("handler bug")));
        registry
    }

    #[test]
    fn parse_splits_trims_and_drops_empty_tokens() {
        let tokens = parse("  a &&b:1&&  && c : x y ");
        assert_eq!(
            tokens,
            vec![
                ActionToken {
                    command: "a",
                    parameter: None
                },
                ActionToken {
                    command: "b",
                    parameter: Some("1")
                },
                ActionToken {
                    command: "c",
                    parameter: Some("x y")
                },
            ]
        );
    }

    #[test]
    fn parse_splits_on_first_colon_only() {
        let tokens = parse("request:http://hub.local:8123/api");
        assert_eq!(tokens[0].command, "request");
        assert_eq!(tokens[0].parameter, Some("http://hub.local:8123/api"));
    }

    #[test]
    fn empty_expression_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let resolver = ActionResolver::new(Arc::new(recording_registry(&log)));
        let mut panel = StubPanel(1);
        assert!(resolver.execute(None, &mut panel).is_empty());
        assert!(resolver.execute(Some("   "), &mut panel).is_empty());
        assert!(resolver.execute(Some("&&"), &mut panel).is_empty());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn unresolved_token_does_not_abort_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let resolver = ActionResolver::new(Arc::new(recording_registry(&log)));
        let mut panel = StubPanel(1);

        let report = resolver.execute(Some("start_recording && change_scene:Intro"), &mut panel);

        assert_eq!(report.tokens.len(), 2);
        assert_eq!(report.tokens[0].command, "start_recording");
        assert_eq!(report.tokens[0].parameter, None);
        assert_eq!(report.tokens[0].status(), "unresolved");
        assert_eq!(report.tokens[0].error().map(DeckError::code), Some("DM-3001"));
        assert_eq!(report.tokens[1].status(), "invoked");
        assert_eq!(*log.lock(), vec!["change_scene(Intro)"]);
    }

    #[test]
    fn handler_error_and_panic_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let resolver = ActionResolver::new(Arc::new(recording_registry(&log)));
        let mut panel = StubPanel(1);

        let report = resolver.execute(Some("fail && explode && change_scene:Outro"), &mut panel);

        let statuses: Vec<_> = report.tokens.iter().map(TokenReport::status).collect();
        assert_eq!(statuses, vec!["failed", "failed", "invoked"]);
        assert_eq!(report.errors().count(), 2);
        assert_eq!(report.invoked(), 1);
        let panic_err = report.tokens[1].error().unwrap().to_string();
        assert!(panic_err.contains("handler bug"), "{panic_err}");
        assert_eq!(*log.lock(), vec!["fail", "change_scene(Outro)"]);
    }

    #[test]
    fn colon_with_empty_parameter_is_present_but_empty() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let resolver = ActionResolver::new(Arc::new(recording_registry(&log)));
        let mut panel = StubPanel(1);
        let report = resolver.execute(Some("change_scene:"), &mut panel);
        assert_eq!(report.tokens[0].parameter.as_deref(), Some(""));
        assert_eq!(*log.lock(), vec!["change_scene()"]);
    }
}
