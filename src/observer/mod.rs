//! Outcome notifications and the observer registry that fans them out.
//!
//! The service emits exactly one terminal [`Notification`] per routed
//! message (`MessageProcessed`, `MessageError` or `UnhandledCommand`), plus
//! `SourceError` for runtime source faults and `LifecycleChanged` for every
//! state transition. Observers are registered on an [`Observers`] list owned
//! by the service; there is no global sink.
//!
//! ```ignore
//! let id = service.observers().subscribe(|n: &Notification| {
//!     if let Notification::UnhandledCommand { message } = n {
//!         eprintln!("nobody handles {}", message.command());
//!     }
//! });
//! service.observers().unsubscribe(id);
//! ```

mod tracing_sink;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::message::{CommandResult, Message};
use crate::service::LifecycleState;

pub use tracing_sink::TracingSink;

/// Something observable that happened inside the service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notification {
    /// The handler returned a successful result.
    MessageProcessed { message: Message, result: CommandResult },
    /// The handler returned a failed result or panicked.
    MessageError { message: Message, error: String },
    /// No handler is registered for the message's command.
    UnhandledCommand { message: Message },
    /// A running source reported a fault. `fatal` means it stopped producing.
    SourceError {
        source: String,
        error: String,
        fatal: bool,
    },
    /// The service lifecycle state changed.
    LifecycleChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
}

impl Notification {
    /// Channel name of this notification.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::MessageProcessed { .. } => "messageProcessed",
            Notification::MessageError { .. } => "messageError",
            Notification::UnhandledCommand { .. } => "unhandledCommand",
            Notification::SourceError { .. } => "sourceError",
            Notification::LifecycleChanged { .. } => "lifecycleChanged",
        }
    }

    /// The message this notification is about, for the per-message outcomes.
    pub fn message(&self) -> Option<&Message> {
        match self {
            Notification::MessageProcessed { message, .. }
            | Notification::MessageError { message, .. }
            | Notification::UnhandledCommand { message } => Some(message),
            _ => None,
        }
    }

    /// Whether this is a terminal outcome of one message.
    pub fn is_terminal(&self) -> bool {
        self.message().is_some()
    }
}

/// A consumer of service notifications.
///
/// Called synchronously from the task that produced the outcome, so
/// implementations should hand slow work off elsewhere.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);

    /// A closed sink is dropped from the list on the next emit.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> NotificationSink for F
where
    F: Fn(&Notification) + Send + Sync,
{
    fn notify(&self, notification: &Notification) {
        self(notification)
    }
}

/// Handle returned by [`Observers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registry of notification sinks.
#[derive(Default)]
pub struct Observers {
    sinks: RwLock<Vec<(ObserverId, Arc<dyn NotificationSink>)>>,
    next_id: AtomicU64,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink. Returns an id for later removal.
    pub fn subscribe<S>(&self, sink: S) -> ObserverId
    where
        S: NotificationSink + 'static,
    {
        self.subscribe_arc(Arc::new(sink))
    }

    /// Register a shared sink.
    pub fn subscribe_arc(&self, sink: Arc<dyn NotificationSink>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().push((id, sink));
        id
    }

    /// Remove a sink. Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(sink_id, _)| *sink_id != id);
        sinks.len() != before
    }

    /// Subscribe a channel and return its receiving end.
    ///
    /// Dropping the receiver unsubscribes the channel on the next emit.
    pub fn channel(&self) -> (ObserverId, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(ChannelSink { tx });
        (id, rx)
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    /// Deliver a notification to every registered sink.
    ///
    /// The sink list is snapshotted first so a sink may (un)subscribe from
    /// inside `notify` without deadlocking.
    pub fn emit(&self, notification: &Notification) {
        let sinks: Vec<(ObserverId, Arc<dyn NotificationSink>)> = self
            .sinks
            .read()
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();

        let mut closed = Vec::new();
        for (id, sink) in sinks {
            if sink.is_closed() {
                closed.push(id);
            } else {
                sink.notify(notification);
            }
        }

        if !closed.is_empty() {
            self.sinks.write().retain(|(id, _)| !closed.contains(id));
        }
    }
}

/// Forwards clones into an unbounded channel.
struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        let _ = self.tx.send(notification.clone());
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
