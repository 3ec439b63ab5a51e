//! DM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DeckError>;

/// Top-level error type for the control panel.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("[DM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DM-2001] configuration store unreachable in {context}: {details}")]
    Connectivity {
        context: &'static str,
        details: String,
    },

    #[error("[DM-2002] malformed button record ({populated} of 5 required fields): {details}")]
    MalformedRecord { populated: usize, details: String },

    #[error("[DM-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DM-3001] no handler registered for command '{command}'")]
    UnresolvedCommand { command: String },

    #[error("[DM-3002] handler '{command}' failed: {details}")]
    HandlerExecution { command: String, details: String },

    #[error("[DM-3003] invalid parameter for '{command}': {details}")]
    InvalidParameter { command: String, details: String },

    #[error("[DM-3101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DM-3102] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DeckError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DM-1001",
            Self::MissingConfig { .. } => "DM-1002",
            Self::ConfigParse { .. } => "DM-1003",
            Self::Connectivity { .. } => "DM-2001",
            Self::MalformedRecord { .. } => "DM-2002",
            Self::Serialization { .. } => "DM-2101",
            Self::UnresolvedCommand { .. } => "DM-3001",
            Self::HandlerExecution { .. } => "DM-3002",
            Self::InvalidParameter { .. } => "DM-3003",
            Self::Io { .. } => "DM-3101",
            Self::ChannelClosed { .. } => "DM-3102",
            Self::Runtime { .. } => "DM-3900",
        }
    }

    /// Whether retrying (typically on the next tick) might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. }
                | Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for handler failures.
    #[must_use]
    pub fn handler(command: impl Into<String>, details: impl Into<String>) -> Self {
        Self::HandlerExecution {
            command: command.into(),
            details: details.into(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DeckError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Connectivity {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DeckError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DeckError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<DeckError> {
        vec![
            DeckError::InvalidConfig {
                details: String::new(),
            },
            DeckError::MissingConfig {
                path: PathBuf::new(),
            },
            DeckError::ConfigParse {
                context: "",
                details: String::new(),
            },
            DeckError::Connectivity {
                context: "",
                details: String::new(),
            },
            DeckError::MalformedRecord {
                populated: 3,
                details: String::new(),
            },
            DeckError::Serialization {
                context: "",
                details: String::new(),
            },
            DeckError::UnresolvedCommand {
                command: String::new(),
            },
            DeckError::HandlerExecution {
                command: String::new(),
                details: String::new(),
            },
            DeckError::InvalidParameter {
                command: String::new(),
                details: String::new(),
            },
            DeckError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            DeckError::ChannelClosed { component: "" },
            DeckError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let codes: Vec<&str> = all_variants().iter().map(DeckError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_embeds_code() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain {}: {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn connectivity_is_retryable_but_record_errors_are_not() {
        assert!(
            DeckError::Connectivity {
                context: "test",
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !DeckError::MalformedRecord {
                populated: 2,
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !DeckError::UnresolvedCommand {
                command: "x".to_string()
            }
            .is_retryable()
        );
        assert!(!DeckError::handler("x", "boom").is_retryable());
    }

    #[test]
    fn handler_constructor_sets_fields() {
        let err = DeckError::handler("change_scene", "socket closed");
        assert_eq!(err.code(), "DM-3002");
        assert!(err.to_string().contains("change_scene"));
        assert!(err.to_string().contains("socket closed"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn from_rusqlite_error_is_connectivity() {
        let sql_err =
            rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some("test".to_string()));
        let err: DeckError = sql_err.into();
        assert_eq!(err.code(), "DM-2001");
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: DeckError = json_err.into();
        assert_eq!(err.code(), "DM-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: DeckError = toml_err.into();
        assert_eq!(err.code(), "DM-1003");
    }
}
