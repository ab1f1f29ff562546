//! Command handlers: one command name, one asynchronous action.
//!
//! A handler answers a [`Message`] with a [`CommandResult`]. Internal faults
//! are converted to `CommandResult { success: false, .. }`; handlers never
//! propagate errors across the `handle` call. The easiest way to get that
//! right is to write the body as `Result<Value, HandlerError>` and convert:
//!
//! ```ignore
//! #[async_trait]
//! impl CommandHandler for Ping {
//!     fn command(&self) -> &str { "ping" }
//!
//!     async fn handle(&self, message: &Message) -> CommandResult {
//!         self.pong(message).await.into()
//!     }
//! }
//! ```
//!
//! For small handlers, [`FnHandler`] wraps an async closure.

mod notify;
mod status;

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::message::{CommandResult, Message};

pub use notify::{NotificationCommandHandler, NotificationRequest};
pub use status::StatusCommandHandler;

/// A handler for one command name.
///
/// Handlers own whatever state they need; the service shares nothing
/// mutable with them.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The command this handler is intended for.
    ///
    /// Routing uses the name given at registration, which normally matches.
    fn command(&self) -> &str;

    /// One-line human-readable description.
    fn description(&self) -> &str {
        ""
    }

    async fn handle(&self, message: &Message) -> CommandResult;
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// A handler backed by an async closure.
///
/// The closure gets an owned clone of the message and returns
/// `Result<Value, HandlerError>`, which is folded into a `CommandResult`.
pub struct FnHandler {
    command: String,
    description: String,
    handle: Box<dyn Fn(Message) -> BoxFuture + Send + Sync>,
}

impl FnHandler {
    pub fn new<F, Fut>(command: impl Into<String>, handle: F) -> Self
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self {
            command: command.into(),
            description: String::new(),
            handle: Box::new(move |message| Box::pin(handle(message))),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl CommandHandler for FnHandler {
    fn command(&self) -> &str {
        &self.command
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn handle(&self, message: &Message) -> CommandResult {
        (self.handle)(message.clone()).await.into()
    }
}
