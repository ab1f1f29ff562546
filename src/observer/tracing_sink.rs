//! Log-backed notification sink.

use tracing::{debug, error, info, warn};

use super::{Notification, NotificationSink};
use crate::service::LifecycleState;

/// Writes every notification to the `tracing` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::MessageProcessed { message, result } => info!(
                message_id = message.id(),
                command = message.command(),
                source = message.source(),
                success = result.success,
                "message processed"
            ),
            Notification::MessageError { message, error } => warn!(
                message_id = message.id(),
                command = message.command(),
                source = message.source(),
                error = %error,
                "message processing failed"
            ),
            Notification::UnhandledCommand { message } => warn!(
                message_id = message.id(),
                command = message.command(),
                source = message.source(),
                "unhandled command"
            ),
            Notification::SourceError {
                source,
                error,
                fatal,
            } => error!(source = %source, error = %error, fatal, "message source error"),
            Notification::LifecycleChanged { from, to } => match to {
                LifecycleState::Running | LifecycleState::Stopped => {
                    info!(%from, %to, "message handling service {}", to)
                }
                _ => debug!(%from, %to, "lifecycle transition"),
            },
        }
    }
}
