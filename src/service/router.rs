//! Routing: one task per message, one terminal notification per message.

use std::any::Any;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::registry::Registry;
use super::stats::StatsCounters;
use crate::error::SourceError;
use crate::handler::CommandHandler;
use crate::message::{Message, RawMessage};
use crate::observer::{Notification, Observers};
use crate::source::SourceEvent;

pub(crate) type HandlerRegistry = Registry<Arc<dyn CommandHandler>>;

/// Everything a routing task needs, cheap to clone into spawned tasks.
#[derive(Clone)]
pub(crate) struct Router {
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) observers: Arc<Observers>,
    pub(crate) stats: Arc<StatsCounters>,
    pub(crate) tracker: TaskTracker,
}

impl Router {
    /// Normalize `raw` and route it on its own task.
    ///
    /// Returns as soon as the task is spawned, so callers that dispatch in
    /// order fire handlers in order without waiting on completions.
    pub(crate) fn dispatch(&self, source: &str, raw: RawMessage) -> Message {
        let message = Message::ingest(source, raw);
        self.stats.received();
        debug!(
            message_id = message.id(),
            command = message.command(),
            source = message.source(),
            "processing message"
        );

        let router = self.clone();
        let routed = message.clone();
        self.tracker.spawn(async move {
            router.route(routed).await;
        });
        message
    }

    /// Route one message to completion and emit its terminal notification.
    pub(crate) async fn route(&self, message: Message) -> Notification {
        let notification = match self.handlers.get(message.command()) {
            None => {
                self.stats.unhandled();
                Notification::UnhandledCommand { message }
            }
            Some(handler) => self.invoke(handler, message).await,
        };
        self.observers.emit(&notification);
        notification
    }

    /// Run the handler on a separate task so a panic is contained and
    /// reported instead of tearing down routing.
    async fn invoke(&self, handler: Arc<dyn CommandHandler>, message: Message) -> Notification {
        let input = message.clone();
        let outcome = tokio::spawn(async move { handler.handle(&input).await }).await;

        match outcome {
            Ok(result) if result.success => {
                self.stats.processed();
                Notification::MessageProcessed { message, result }
            }
            Ok(result) => {
                self.stats.failed();
                let error = result
                    .error_message()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or("command failed")
                    .to_string();
                Notification::MessageError { message, error }
            }
            Err(join_error) => {
                self.stats.failed();
                let error = if join_error.is_panic() {
                    format!("handler panicked: {}", panic_text(join_error.into_panic()))
                } else {
                    "handler task was cancelled".to_string()
                };
                warn!(
                    message_id = message.id(),
                    command = message.command(),
                    error = %error,
                    "command handler fault"
                );
                Notification::MessageError { message, error }
            }
        }
    }

    pub(crate) fn source_error(&self, source: &str, error: &SourceError, fatal: bool) {
        self.stats.source_error();
        self.observers.emit(&Notification::SourceError {
            source: source.to_string(),
            error: error.to_string(),
            fatal,
        });
    }

    /// Forward events from one source, in order, until the source hangs up
    /// or `cancel` fires. Buffered events are drained before cancelling.
    pub(crate) async fn pump(
        self,
        source: String,
        mut events: mpsc::UnboundedReceiver<SourceEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(SourceEvent::Message(raw)) => {
                        self.dispatch(&source, raw);
                    }
                    Some(SourceEvent::Error { error, fatal }) => {
                        self.source_error(&source, &error, fatal);
                    }
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
        debug!(source = %source, "routing pump finished");
    }
}

fn panic_text(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
