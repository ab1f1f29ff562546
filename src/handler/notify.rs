//! `notify`: accept a notification request and hand back its identifier.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::CommandHandler;
use crate::error::HandlerError;
use crate::message::{CommandResult, Message};

/// Payload accepted by the `notify` command.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Absent means everyone.
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
}

impl NotificationRequest {
    /// Recipients, `["all"]` when absent. An explicit empty list stays empty.
    pub fn recipients(&self) -> Vec<String> {
        match &self.recipients {
            Some(list) => list.clone(),
            None => vec!["all".to_string()],
        }
    }
}

/// Handles `notify` commands.
#[derive(Debug, Default)]
pub struct NotificationCommandHandler {
    sequence: AtomicU64,
}

impl NotificationCommandHandler {
    pub const COMMAND: &'static str = "notify";

    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, message: &Message) -> Result<Value, HandlerError> {
        let request: NotificationRequest = message.decode()?;
        let recipients = request.recipients();
        let sent_at = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        info!(
            title = request.title.as_deref().unwrap_or_default(),
            body = request.body.as_deref().unwrap_or_default(),
            recipients = %recipients.join(", "),
            "sending notification"
        );

        Ok(json!({
            "notificationId": format!("notif_{}_{}", sent_at.timestamp_millis(), seq),
            "sentAt": sent_at,
            "recipients": recipients,
        }))
    }
}

#[async_trait]
impl CommandHandler for NotificationCommandHandler {
    fn command(&self) -> &str {
        Self::COMMAND
    }

    fn description(&self) -> &str {
        "Send notifications to users"
    }

    async fn handle(&self, message: &Message) -> CommandResult {
        match self.send(message) {
            Ok(data) => CommandResult::ok(data),
            Err(e) => CommandResult::failure(format!("Failed to send notification: {e}")),
        }
    }
}
