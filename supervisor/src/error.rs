//! Error types for the stagehand supervisor.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can alter the outcome of a supervisor run.
#[derive(Error, Debug)]
pub enum Error {
    /// A descriptor's invocation could not be started
    #[error("Failed to spawn {name} ({program}): {source}")]
    Spawn {
        name: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The descriptor table is not usable
    #[error("Invalid service stack: {0}")]
    InvalidStack(String),

    /// A toggle referred to a service that is not in the table
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// Stack file could not be read or parsed
    #[error("Configuration error: {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Termination signals could not be installed or were lost
    #[error("Signal error: {0}")]
    Signal(String),

    /// The one-shot shutdown was claimed outside this run, so this run's
    /// children were never stopped by it
    #[error("Shutdown was already claimed elsewhere; services may still be running")]
    ShutdownClaimed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML rendering error
    #[error("TOML rendering error: {0}")]
    TomlRender(#[from] toml::ser::Error),
}

impl Error {
    /// Short stable label used in structured log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Spawn { .. } => "spawn_failed",
            Error::InvalidStack(_) => "invalid_stack",
            Error::UnknownService(_) => "unknown_service",
            Error::Config { .. } => "config",
            Error::Signal(_) => "signal",
            Error::ShutdownClaimed => "shutdown_claimed",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::TomlParse(_) | Error::TomlRender(_) => "toml",
        }
    }
}

/// A termination or kill request could not be delivered to one entry.
///
/// Never propagated out of the shutdown coordinator; collected per entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not deliver {signal} to {name} (pid {pid:?}): {reason}")]
pub struct SignalDeliveryError {
    pub name: String,
    pub pid: Option<u32>,
    pub signal: &'static str,
    pub reason: String,
}

impl SignalDeliveryError {
    pub fn new(
        name: impl Into<String>,
        pid: Option<u32>,
        signal: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pid,
            signal,
            reason: reason.into(),
        }
    }
}
