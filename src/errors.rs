// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("execution registry is closed; no new commands are accepted")]
    RegistryClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A component failed to close within its shutdown budget.
///
/// This is reported and logged by the shutdown coordinator but never treated
/// as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{component} did not close within {timeout:?}")]
pub struct CloseError {
    pub component: &'static str,
    pub timeout: Duration,
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ExecutorError>;
