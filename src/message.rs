//! Message and result types shared by sources, handlers and the service.
//!
//! Sources produce [`RawMessage`]s. The service normalizes each one into an
//! immutable [`Message`] (assigning `id` and `timestamp`, stamping the
//! registered source name) before routing it to a handler, which answers
//! with a [`CommandResult`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::HandlerError;

/// Classification tag describing what kind of channel produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Platform intent / event feed.
    Intent,
    /// Pub/sub broker connection.
    Broker,
    /// HTTP endpoint.
    Rest,
    /// Commands raised from inside the process.
    Internal,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Intent => "intent",
            MessageKind::Broker => "broker",
            MessageKind::Rest => "rest",
            MessageKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// An inbound event as emitted by a source, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Command name used for routing.
    pub command: String,
    /// Source-defined classification.
    pub kind: MessageKind,
    /// Opaque payload, interpreted only by the handler.
    pub payload: Value,
    /// Transport details (topic, headers, confidence, ...).
    pub metadata: Map<String, Value>,
}

impl RawMessage {
    /// Create a raw message with empty metadata.
    pub fn new(command: impl Into<String>, kind: MessageKind, payload: Value) -> Self {
        Self {
            command: command.into(),
            kind,
            payload,
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A normalized, immutable inbound message.
///
/// Fields are private so the `source`/`command` non-empty invariant and the
/// service-assigned `id` cannot be tampered with after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: String,
    source: String,
    command: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    payload: Value,
    metadata: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Normalize a raw message emitted by `source`.
    ///
    /// Assigns a fresh v4 UUID and the current instant.
    pub(crate) fn ingest(source: &str, raw: RawMessage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            command: raw.command,
            kind: raw.kind,
            payload: raw.payload,
            metadata: raw.metadata,
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the registered source that emitted this message.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Deserialize the payload into a typed struct.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| HandlerError::DecodeFailed(e.to_string()))
    }
}

/// Outcome of one handler invocation.
///
/// Exactly one of `data` / `error` is meaningful, selected by `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    /// A successful result carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed result. An empty description is replaced so `error` is
    /// never blank.
    pub fn failure(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "command failed".to_string();
        }
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    /// The error description of a failed result.
    pub fn error_message(&self) -> Option<&str> {
        if self.success {
            None
        } else {
            self.error.as_deref()
        }
    }
}

impl From<Result<Value, HandlerError>> for CommandResult {
    fn from(result: Result<Value, HandlerError>) -> Self {
        match result {
            Ok(data) => CommandResult::ok(data),
            Err(e) => CommandResult::failure(e.to_string()),
        }
    }
}
