//! Subscribing side of the bus.

use super::delivery::{BusError, Delivery};

/// Connection parameters handed to a broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub url: String,
    pub client_id: String,
    /// Discard any session state (queued messages, subscriptions) on connect.
    pub clean_session: bool,
}

/// A pull-based broker client.
///
/// Calls are blocking; the broker source drives them from a dedicated
/// poll thread.
pub trait Subscriber: Send + Sync {
    /// Open (or re-open) the connection.
    fn connect(&self, options: &ConnectOptions) -> Result<(), BusError>;

    /// Close the connection. Must be safe to call when not connected.
    fn disconnect(&self);

    /// Subscribe to topic filters (`+` / `#` wildcards allowed).
    fn subscribe(&self, filters: &[String]) -> Result<(), BusError>;

    /// Wait up to `timeout_ms` for the next delivery.
    fn poll(&self, timeout_ms: u64) -> Result<Option<Delivery>, BusError>;

    /// Acknowledge a delivery.
    fn ack(&self, delivery_id: &str) -> Result<(), BusError>;

    /// Reject a delivery.
    fn nack(&self, delivery_id: &str, reason: &str) -> Result<(), BusError>;
}
