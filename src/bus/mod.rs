//! Broker client abstraction used by the broker-backed message source.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                BrokerMessageSource (per broker)             │
//! │  - poll thread: poll() → emit → ack / nack                  │
//! │  - reconnect policy on ConnectionFailed                     │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Publisher + Subscriber Traits               │
//! │  Publisher: publish(delivery) / publish_batch(deliveries)   │
//! │  Subscriber: connect / subscribe(filters) / poll / ack      │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌──────────────┐    ┌─────────────┐    ┌─────────────────────┐
//! │InMemoryBroker│    │ MqttClient  │    │  other pub/sub      │
//! │  (included)  │    │ (external)  │    │    (external)       │
//! └──────────────┘    └─────────────┘    └─────────────────────┘
//! ```
//!
//! Concrete network clients live outside this crate; they only need to
//! implement [`Subscriber`].

mod delivery;
mod in_memory;
mod subscriber;
mod topic;

pub use delivery::{BusError, Delivery, Publisher};
pub use in_memory::InMemoryBroker;
pub use subscriber::{ConnectOptions, Subscriber};
pub use topic::topic_matches;
