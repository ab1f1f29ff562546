//! Error types for handlers, sources, registration, lifecycle and config.

use thiserror::Error;

/// Error raised inside a command handler.
///
/// Never crosses the `handle` boundary: it is folded into a failed
/// [`CommandResult`](crate::CommandResult) first.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Payload decode / deserialization failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// Business logic rejected the command.
    #[error("rejected: {0}")]
    Rejected(String),
    /// A resource the handler depends on is not available.
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("handler error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::DecodeFailed(err.to_string())
    }
}

/// Error raised by a message source, at start time or while running.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to start: {0}")]
    StartFailed(String),
    /// Transport connection dropped; the source may try to recover.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The source gave up reconnecting and stopped producing.
    #[error("gave up after {attempts} reconnect attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },
    /// A source tried to emit a message that violates message invariants.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    /// The receiving side of the source channel is gone.
    #[error("source channel closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("source error: {0}")]
    Other(String),
}

/// Error returned by the `register_*` operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),
}

/// Error returned by `start()` / `stop()`.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A source failed to start and the start was rolled back.
    #[error("message source '{source_name}' failed to start: {error}")]
    SourceStart {
        source_name: String,
        #[source]
        error: SourceError,
    },
    /// Some sources failed to start; the others were left running.
    #[error("{} message source(s) failed to start: {}", .failed.len(), join_names(.failed))]
    PartialStart { failed: Vec<(String, SourceError)> },
    /// Some sources reported an error while stopping.
    #[error("{} message source(s) failed to stop: {}", .failed.len(), join_names(.failed))]
    SourceStop { failed: Vec<(String, SourceError)> },
}

fn join_names(failed: &[(String, SourceError)]) -> String {
    failed
        .iter()
        .map(|(name, e)| format!("{name} ({e})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {error}")]
    Read {
        path: String,
        #[source]
        error: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
