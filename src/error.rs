//! Custom error types for Vantage
//!
//! Provides structured error handling and user-friendly error messages.

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError { path: String, source: std::io::Error },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Configuration file not found: {0}")]
    NotFound(String),
}

/// Errors raised by a scan module while processing a transaction
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Invalid pattern for keyword '{keyword}': {reason}")]
    Pattern { keyword: String, reason: String },

    #[error("Module '{module}' failed: {reason}")]
    Failed { module: String, reason: String },

    #[error("Module '{module}' panicked: {message}")]
    Panicked { module: String, message: String },
}

/// Module registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),
}

/// Alert sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Alert queue stayed full for {waited_ms}ms (capacity: {capacity})")]
    Timeout { capacity: usize, waited_ms: u64 },

    #[error("Alert sink is closed")]
    Closed,

    #[error("Failed to serialize alert: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write alert: {0}")]
    Write(#[from] std::io::Error),
}

/// Trait for providing user-friendly hints
pub trait UserHint {
    fn user_hint(&self) -> String;
}

impl UserHint for ConfigError {
    fn user_hint(&self) -> String {
        match self {
            ConfigError::ReadError { path, .. } => {
                format!(
                    "Could not read '{}'. Check if the file exists and you have read permissions.",
                    path
                )
            }
            ConfigError::ParseError(_) => {
                "The configuration file has invalid syntax. Check for TOML formatting errors."
                    .into()
            }
            ConfigError::ValidationError { field, reason } => {
                format!("Invalid value for '{}': {}", field, reason)
            }
            ConfigError::NotFound(path) => {
                format!(
                    "Configuration file '{}' not found. Run with --generate-config to create one.",
                    path
                )
            }
        }
    }
}

impl UserHint for RegistryError {
    fn user_hint(&self) -> String {
        match self {
            RegistryError::DuplicateModule(name) => {
                format!("A module named '{}' is already loaded.", name)
            }
            RegistryError::UnknownModule(name) => {
                format!(
                    "No module named '{}'. Run with --list-modules to see available modules.",
                    name
                )
            }
        }
    }
}

/// Get a user-friendly message for an error reaching the command line
///
/// Uses the hint of the first known error in the chain, falling back to the
/// full context chain.
pub fn user_message(err: &anyhow::Error) -> String {
    err.chain()
        .find_map(|cause| {
            if let Some(e) = cause.downcast_ref::<ConfigError>() {
                Some(format!("Configuration problem: {}", e.user_hint()))
            } else {
                cause
                    .downcast_ref::<RegistryError>()
                    .map(|e| format!("Module registry issue: {}", e.user_hint()))
            }
        })
        .unwrap_or_else(|| format!("{:#}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_user_message_for_registry_error() {
        let err = anyhow::Error::from(RegistryError::UnknownModule("vinfo-nope".into()));
        let message = user_message(&err);
        assert!(message.starts_with("Module registry issue"));
        assert!(message.contains("--list-modules"));
    }

    #[test]
    fn test_user_message_finds_config_error_under_context() {
        let result: Result<(), ConfigError> = Err(ConfigError::NotFound("/tmp/x.toml".into()));
        let err = result.context("Loading configuration").unwrap_err();
        assert!(user_message(&err).contains("--generate-config"));
    }

    #[test]
    fn test_user_message_falls_back_to_chain() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = result.context("Opening capture").unwrap_err();
        assert_eq!(user_message(&err), "Opening capture: gone");
    }
}
