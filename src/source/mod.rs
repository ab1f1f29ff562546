//! Message sources: independent producers of inbound messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  ┌───────────────┐  ┌───────────────┐
//! │ IntentSource  │  │ BrokerSource  │  │  RestSource   │
//! │ (in-process)  │  │ (bus client)  │  │ (axum, http)  │
//! └───────┬───────┘  └───────┬───────┘  └───────┬───────┘
//!         │ SourceSink       │                  │
//!         ▼                  ▼                  ▼
//! ┌─────────────────────────────────────────────────────┐
//! │   one ordered channel per source → service routing  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! `start(sink)` hands the source a [`SourceSink`]; from then on the source
//! pushes [`RawMessage`]s through it in arrival order until `stop()`. A
//! source that loses its transport reports it with [`SourceSink::fail`]
//! instead of going quiet.

#[cfg(feature = "bus")]
mod broker;
#[cfg(feature = "http")]
mod http;
mod intent;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SourceError;
use crate::message::{MessageKind, RawMessage};

#[cfg(feature = "bus")]
pub use broker::{BrokerMessageSource, BrokerStats};
#[cfg(feature = "http")]
pub use http::RestMessageSource;
pub use intent::IntentMessageSource;

/// A producer of inbound messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Classification stamped on the messages this source emits.
    fn kind(&self) -> MessageKind;

    /// Begin producing messages into `sink`.
    async fn start(&self, sink: SourceSink) -> Result<(), SourceError>;

    /// Stop producing and release resources.
    ///
    /// Must be a no-op when never started, and idempotent.
    async fn stop(&self) -> Result<(), SourceError>;

    /// Whether the underlying transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// What a source pushes towards the service.
#[derive(Debug)]
pub enum SourceEvent {
    Message(RawMessage),
    /// A runtime fault. `fatal` means the source stopped producing.
    Error { error: SourceError, fatal: bool },
}

/// The sending half a source uses to deliver messages.
///
/// Cheap to clone; every clone feeds the same ordered channel.
#[derive(Debug, Clone)]
pub struct SourceSink {
    tx: mpsc::UnboundedSender<SourceEvent>,
}

impl SourceSink {
    /// Create a sink and the receiver the service reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Push a message. Messages with an empty command are refused.
    pub fn emit(&self, message: RawMessage) -> Result<(), SourceError> {
        if message.command.trim().is_empty() {
            return Err(SourceError::InvalidMessage("command is empty".into()));
        }
        self.tx
            .send(SourceEvent::Message(message))
            .map_err(|_| SourceError::Closed)
    }

    /// Report a runtime fault.
    pub fn fail(&self, error: SourceError, fatal: bool) -> Result<(), SourceError> {
        self.tx
            .send(SourceEvent::Error { error, fatal })
            .map_err(|_| SourceError::Closed)
    }

    /// Whether the service has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
