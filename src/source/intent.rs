//! In-process source fed by the platform's intent / event feed.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{MessageSource, SourceSink};
use crate::error::SourceError;
use crate::message::{MessageKind, RawMessage};

/// A source that other components push into directly.
///
/// Emissions are only forwarded while the source is started; anything
/// pushed before `start()` or after `stop()` is dropped and the push
/// method returns `false`.
#[derive(Debug, Default)]
pub struct IntentMessageSource {
    sink: Mutex<Option<SourceSink>>,
}

impl IntentMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward a detected intent as a command.
    ///
    /// The intent name is the command; confidence and entities become the
    /// payload and are summarized in metadata.
    pub fn handle_intent(&self, intent: &str, confidence: f64, entities: Vec<Value>) -> bool {
        let entity_count = entities.len();
        let raw = RawMessage::new(
            intent,
            MessageKind::Intent,
            json!({ "confidence": confidence, "entities": entities }),
        )
        .with_metadata("intentConfidence", confidence)
        .with_metadata("entityCount", entity_count);
        self.push(raw)
    }

    /// Forward an internal command with an arbitrary payload.
    pub fn send(&self, command: &str, payload: Value) -> bool {
        self.push(RawMessage::new(command, MessageKind::Internal, payload))
    }

    fn push(&self, raw: RawMessage) -> bool {
        let guard = self.sink.lock();
        let Some(sink) = guard.as_ref() else {
            debug!(command = %raw.command, "intent source inactive, dropping message");
            return false;
        };
        match sink.emit(raw) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "intent source could not emit");
                false
            }
        }
    }
}

#[async_trait]
impl MessageSource for IntentMessageSource {
    fn kind(&self) -> MessageKind {
        MessageKind::Intent
    }

    async fn start(&self, sink: SourceSink) -> Result<(), SourceError> {
        *self.sink.lock() = Some(sink);
        info!("intent message source started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        if self.sink.lock().take().is_some() {
            info!("intent message source stopped");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.sink.lock().is_some()
    }
}
