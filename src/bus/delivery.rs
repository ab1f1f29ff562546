//! Broker deliveries and the publishing side of the bus.

use thiserror::Error;

/// A message as delivered by a broker on a topic.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    /// Broker-assigned identifier, used for ack / nack.
    pub id: String,
    /// Topic the message was published on (e.g. `commands/notify`).
    pub topic: String,
    /// Raw payload, usually JSON.
    pub payload: Vec<u8>,
    /// Optional broker headers / properties.
    pub metadata: Option<Vec<(String, String)>>,
}

impl Delivery {
    pub fn new(id: impl Into<String>, topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            payload,
            metadata: None,
        }
    }

    /// Create a delivery with a string payload.
    pub fn with_string_payload(
        id: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, topic, payload.into().into_bytes())
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// The payload as a string, if valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Error type for broker operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Connection to the broker failed or dropped.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The broker refused the request (bad filter, unauthorized, ...).
    #[error("rejected by broker: {0}")]
    Rejected(String),
    #[error("broker timeout")]
    Timeout,
    #[error("broker error: {0}")]
    Other(String),
}

impl BusError {
    /// Whether the error means the connection must be re-established.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BusError::ConnectionFailed(_) | BusError::Timeout)
    }
}

/// Trait for publishing messages to a broker.
pub trait Publisher: Send + Sync {
    fn publish(&self, delivery: Delivery) -> Result<(), BusError>;

    /// Publish several messages. Default implementation publishes sequentially.
    fn publish_batch(&self, deliveries: Vec<Delivery>) -> Result<(), BusError> {
        for delivery in deliveries {
            self.publish(delivery)?;
        }
        Ok(())
    }
}
