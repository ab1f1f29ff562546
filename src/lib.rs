//! Message dispatch core.
//!
//! Pluggable [`MessageSource`]s feed a [`MessageHandlingService`], which
//! routes each message to the [`CommandHandler`] registered for its command
//! and reports the outcome to [`Observers`] as a [`Notification`].

#[cfg(feature = "bus")]
pub mod bootstrap;
#[cfg(feature = "bus")]
pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod observer;
pub mod service;
pub mod source;

#[cfg(feature = "bus")]
pub use bootstrap::Bootstrap;
pub use config::{BrokerConfig, DrainPolicy, RestConfig, ServiceConfig, StartPolicy};
pub use error::{ConfigError, HandlerError, LifecycleError, RegistrationError, SourceError};
pub use handler::{
    CommandHandler, FnHandler, NotificationCommandHandler, NotificationRequest,
    StatusCommandHandler,
};
pub use message::{CommandResult, Message, MessageKind, RawMessage};
pub use observer::{Notification, NotificationSink, ObserverId, Observers, TracingSink};
pub use service::{DispatchStats, LifecycleState, MessageHandlingService, SourceStatus};
#[cfg(feature = "bus")]
pub use source::{BrokerMessageSource, BrokerStats};
#[cfg(feature = "http")]
pub use source::RestMessageSource;
pub use source::{IntentMessageSource, MessageSource, SourceEvent, SourceSink};
