//! Shared helpers for the dispatch tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use msg_dispatch::{MessageKind, MessageSource, Notification, RawMessage, SourceError, SourceSink};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn raw(command: &str, payload: Value) -> RawMessage {
    RawMessage::new(command, MessageKind::Internal, payload)
}

/// Next per-message outcome, skipping lifecycle and source notifications.
pub async fn next_terminal(rx: &mut UnboundedReceiver<Notification>) -> Notification {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Some(n) if n.is_terminal() => return n,
                Some(_) => continue,
                None => panic!("notification channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for a terminal notification")
}

/// Collect exactly `n` terminal notifications.
pub async fn terminals(rx: &mut UnboundedReceiver<Notification>, n: usize) -> Vec<Notification> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(next_terminal(rx).await);
    }
    out
}

/// Next `SourceError` notification as `(source, error, fatal)`.
pub async fn next_source_error(rx: &mut UnboundedReceiver<Notification>) -> (String, String, bool) {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Some(Notification::SourceError { source, error, fatal }) => {
                    return (source, error, fatal)
                }
                Some(_) => continue,
                None => panic!("notification channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for a source error")
}

/// Whatever is already queued, without waiting.
pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// Poll `cond` until it holds or the wait runs out.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true")
}

/// A source that counts lifecycle calls and can be told to refuse to start.
#[derive(Default)]
pub struct ScriptedSource {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub refuse_start: bool,
    sink: Mutex<Option<SourceSink>>,
}

impl ScriptedSource {
    pub fn refusing() -> Self {
        Self {
            refuse_start: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Emit through the sink captured at start.
    pub fn emit(&self, command: &str, payload: Value) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.emit(raw(command, payload)).is_ok(),
            None => false,
        }
    }

    /// Report a runtime fault through the sink captured at start.
    pub fn fail(&self, error: SourceError, fatal: bool) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.fail(error, fatal).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    fn kind(&self) -> MessageKind {
        MessageKind::Internal
    }

    async fn start(&self, sink: SourceSink) -> Result<(), SourceError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_start {
            return Err(SourceError::StartFailed("scripted refusal".into()));
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.sink.lock().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.sink.lock().is_some()
    }
}
