//! Broker-backed message source.
//!
//! Polls a [`Subscriber`] on a dedicated thread, turns each delivery into a
//! message and acks it. Connection loss is reported through the sink, then
//! the source reconnects every `reconnect_interval` until it succeeds or runs
//! out of attempts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::{MessageSource, SourceSink};
use crate::bus::{BusError, ConnectOptions, Delivery, Subscriber};
use crate::config::BrokerConfig;
use crate::error::SourceError;
use crate::message::{MessageKind, RawMessage};

/// Counters from the poll thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BrokerStats {
    /// Deliveries forwarded to the service.
    pub forwarded: usize,
    /// Deliveries rejected because no command could be derived.
    pub rejected: usize,
    /// Successful reconnects.
    pub reconnects: usize,
    /// Poll cycles completed.
    pub polls: usize,
}

/// Handle to the running poll thread.
struct PollThread {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

/// A source fed by a pub/sub broker client.
pub struct BrokerMessageSource<C> {
    client: Arc<C>,
    config: BrokerConfig,
    client_id: String,
    connected: Arc<AtomicBool>,
    stats: Arc<Mutex<BrokerStats>>,
    poller: Mutex<Option<PollThread>>,
}

impl<C: Subscriber + 'static> BrokerMessageSource<C> {
    /// Create a source for `client`, generating a client id from `config`.
    pub fn new(client: C, config: BrokerConfig) -> Self {
        let client_id = config.generate_client_id();
        Self {
            client: Arc::new(client),
            config,
            client_id,
            connected: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(BrokerStats::default())),
            poller: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn stats(&self) -> BrokerStats {
        self.stats.lock().clone()
    }

    fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            url: self.config.url.clone(),
            client_id: self.client_id.clone(),
            clean_session: self.config.clean_session,
        }
    }
}

#[async_trait]
impl<C: Subscriber + 'static> MessageSource for BrokerMessageSource<C> {
    fn kind(&self) -> MessageKind {
        MessageKind::Broker
    }

    async fn start(&self, sink: SourceSink) -> Result<(), SourceError> {
        if self.poller.lock().is_some() {
            return Ok(());
        }

        // Client calls block; keep them off the async workers.
        let options = self.connect_options();
        let client = Arc::clone(&self.client);
        let connect_options = options.clone();
        let topics = self.config.topics.clone();
        tokio::task::spawn_blocking(move || {
            connect_and_subscribe(client.as_ref(), &connect_options, &topics)
        })
        .await
        .map_err(|e| SourceError::StartFailed(e.to_string()))?
        .map_err(|e| SourceError::StartFailed(e.to_string()))?;

        let mut poller = self.poller.lock();
        if poller.is_some() {
            return Ok(());
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(url = %options.url, client_id = %options.client_id, "broker client connected");

        let (stop_tx, stop_rx) = mpsc::channel();
        let worker = PollWorker {
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            options,
            sink,
            connected: Arc::clone(&self.connected),
            stats: Arc::clone(&self.stats),
            stop_rx,
        };
        let handle = thread::Builder::new()
            .name(format!("broker-poll-{}", self.client_id))
            .spawn(move || worker.run())?;

        *poller = Some(PollThread {
            stop_tx,
            handle: Some(handle),
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        let Some(mut poller) = self.poller.lock().take() else {
            return Ok(());
        };
        let _ = poller.stop_tx.send(());
        if let Some(handle) = poller.handle.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| SourceError::Other(e.to_string()))?
                .map_err(|_| SourceError::Other("broker poll thread panicked".into()))?;
        }
        info!(client_id = %self.client_id, "broker message source stopped");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl<C> Drop for BrokerMessageSource<C> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().as_ref() {
            let _ = poller.stop_tx.send(());
        }
    }
}

fn connect_and_subscribe<C: Subscriber>(
    client: &C,
    options: &ConnectOptions,
    topics: &[String],
) -> Result<(), BusError> {
    client.connect(options)?;
    client.subscribe(topics)
}

/// State moved onto the poll thread.
struct PollWorker<C> {
    client: Arc<C>,
    config: BrokerConfig,
    options: ConnectOptions,
    sink: SourceSink,
    connected: Arc<AtomicBool>,
    stats: Arc<Mutex<BrokerStats>>,
    stop_rx: mpsc::Receiver<()>,
}

enum Flow {
    Continue,
    Exit,
}

impl<C: Subscriber> PollWorker<C> {
    fn run(self) {
        let poll_ms = self.config.poll_interval_ms;

        loop {
            match self.stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            self.stats.lock().polls += 1;

            let flow = match self.client.poll(poll_ms) {
                Ok(Some(delivery)) => self.forward(&delivery),
                Ok(None) => Flow::Continue,
                Err(e) if e.is_connection_error() => self.recover(e),
                Err(e) => {
                    debug!(error = %e, "broker poll error");
                    Flow::Continue
                }
            };
            if let Flow::Exit = flow {
                break;
            }
        }

        self.client.disconnect();
        self.connected.store(false, Ordering::SeqCst);
    }

    fn forward(&self, delivery: &Delivery) -> Flow {
        let Some(raw) = to_raw_message(delivery) else {
            warn!(topic = %delivery.topic, "no command found in broker message");
            let _ = self.client.nack(&delivery.id, "no command");
            self.stats.lock().rejected += 1;
            return Flow::Continue;
        };

        match self.sink.emit(raw) {
            Ok(()) => {
                let _ = self.client.ack(&delivery.id);
                self.stats.lock().forwarded += 1;
                Flow::Continue
            }
            Err(SourceError::Closed) => {
                let _ = self.client.nack(&delivery.id, "service not listening");
                Flow::Exit
            }
            Err(e) => {
                let _ = self.client.nack(&delivery.id, &e.to_string());
                self.stats.lock().rejected += 1;
                Flow::Continue
            }
        }
    }

    /// Reconnect after a connection failure. `Exit` when stopped or when
    /// attempts are exhausted.
    fn recover(&self, error: BusError) -> Flow {
        self.connected.store(false, Ordering::SeqCst);
        warn!(error = %error, "broker connection lost");
        if self
            .sink
            .fail(SourceError::ConnectionLost(error.to_string()), false)
            .is_err()
        {
            return Flow::Exit;
        }

        let mut attempts = 0u32;
        let mut last_error = error.to_string();
        loop {
            if let Some(max) = self.config.max_reconnect_attempts {
                if attempts >= max {
                    let _ = self.sink.fail(
                        SourceError::ReconnectExhausted {
                            attempts,
                            last_error,
                        },
                        true,
                    );
                    return Flow::Exit;
                }
            }

            match self.stop_rx.recv_timeout(self.config.reconnect_interval()) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Flow::Exit,
                Err(RecvTimeoutError::Timeout) => {}
            }

            attempts += 1;
            match connect_and_subscribe(self.client.as_ref(), &self.options, &self.config.topics) {
                Ok(()) => {
                    self.connected.store(true, Ordering::SeqCst);
                    self.stats.lock().reconnects += 1;
                    info!(attempts, "broker client reconnected");
                    return Flow::Continue;
                }
                Err(e) => {
                    debug!(attempts, error = %e, "broker reconnect failed");
                    last_error = e.to_string();
                }
            }
        }
    }
}

/// Build a raw message from a delivery.
///
/// The command is the second topic level (`commands/notify` → `notify`),
/// falling back to the payload's `command` field. Non-JSON payloads are
/// wrapped as `{"rawMessage": text}`.
fn to_raw_message(delivery: &Delivery) -> Option<RawMessage> {
    let payload = parse_payload(delivery);

    let command = delivery
        .topic
        .split('/')
        .nth(1)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            payload
                .get("command")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })?;

    let mut raw = RawMessage::new(command, MessageKind::Broker, payload)
        .with_metadata("topic", delivery.topic.clone())
        .with_metadata("qos", 0);
    if let Some(headers) = &delivery.metadata {
        let headers: Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        raw = raw.with_metadata("headers", headers);
    }
    Some(raw)
}

fn parse_payload(delivery: &Delivery) -> Value {
    if let Ok(value) = serde_json::from_slice::<Value>(&delivery.payload) {
        return value;
    }
    match delivery.payload_str() {
        Some(s) => json!({ "rawMessage": s }),
        None => Value::Null,
    }
}
