//! Message handling service: source and handler registration, lifecycle
//! and routing.
//!
//! `MessageHandlingService` owns a registry of named [`MessageSource`]s and a
//! registry of [`CommandHandler`]s keyed by command name. While running, every
//! message a source emits is normalized into a [`Message`], routed to the
//! handler registered for its command on its own task, and reported to
//! observers as exactly one terminal [`Notification`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use msg_dispatch::{MessageHandlingService, IntentMessageSource, TracingSink};
//!
//! let service = MessageHandlingService::new();
//! let intents = Arc::new(IntentMessageSource::new());
//! service.register_message_source("intent", intents.clone())?;
//! service.command("ping", |_msg| async { Ok(json!("pong")) })?;
//! service.observers().subscribe(TracingSink);
//!
//! service.start().await?;
//! intents.send("ping", json!({}));
//! ```
//!
//! [`MessageSource`]: crate::source::MessageSource
//! [`CommandHandler`]: crate::handler::CommandHandler
//! [`Message`]: crate::message::Message
//! [`Notification`]: crate::observer::Notification

mod lifecycle;
mod message_service;
mod registry;
mod router;
mod stats;

pub use lifecycle::LifecycleState;
pub use message_service::{MessageHandlingService, SourceStatus};
pub use stats::DispatchStats;
