//! In-memory broker for tests and single-process setups.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::delivery::{BusError, Delivery, Publisher};
use super::subscriber::{ConnectOptions, Subscriber};
use super::topic::topic_matches;

/// Per-client session: read position, filters, acks.
#[derive(Default)]
struct Session {
    connected: bool,
    client_id: Option<String>,
    position: usize,
    filters: Vec<String>,
    acked: Vec<String>,
    nacked: Vec<(String, String)>,
}

/// In-memory broker.
///
/// Features:
/// - Thread-safe (clones share the same log and session)
/// - Independent clients via `new_client()`
/// - MQTT-style topic filters
/// - Broker outage simulation via `set_online(false)`
///
/// Clean-session connects skip everything already in the log; persistent
/// sessions resume from where the client left off.
///
/// ## Example
///
/// ```
/// use msg_dispatch::bus::{ConnectOptions, Delivery, InMemoryBroker, Publisher, Subscriber};
///
/// let broker = InMemoryBroker::new();
/// let client = broker.new_client();
/// client.connect(&ConnectOptions {
///     url: "memory://".into(),
///     client_id: "c1".into(),
///     clean_session: true,
/// }).unwrap();
/// client.subscribe(&["commands/+".to_string()]).unwrap();
///
/// broker.publish(Delivery::with_string_payload("d-1", "commands/notify", "{}")).unwrap();
/// assert_eq!(client.poll(100).unwrap().unwrap().topic, "commands/notify");
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    log: Arc<RwLock<Vec<Delivery>>>,
    online: Arc<AtomicBool>,
    session: Arc<Mutex<Session>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            online: Arc::new(AtomicBool::new(true)),
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    /// A new client sharing the same log and availability, with its own session.
    pub fn new_client(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            online: Arc::clone(&self.online),
            session: Arc::new(Mutex::new(Session::default())),
        }
    }

    /// Simulate the broker going down (`false`) or coming back (`true`).
    ///
    /// Going down drops every client's connection on its next operation.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether this client is connected.
    pub fn is_connected(&self) -> bool {
        self.session.lock().connected && self.is_online()
    }

    /// Client id used on the last connect.
    pub fn client_id(&self) -> Option<String> {
        self.session.lock().client_id.clone()
    }

    /// Publish a string payload with a generated id.
    pub fn publish_str(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        let id = format!("d-{}", self.len() + 1);
        self.publish(Delivery::with_string_payload(id, topic, payload))
    }

    /// All deliveries in the log.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.log.read().clone()
    }

    pub fn len(&self) -> usize {
        self.log.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }

    /// Delivery ids this client acknowledged.
    pub fn acknowledged(&self) -> Vec<String> {
        self.session.lock().acked.clone()
    }

    /// Delivery ids this client rejected, with reasons.
    pub fn rejected(&self) -> Vec<(String, String)> {
        self.session.lock().nacked.clone()
    }

    fn ensure_connected(&self, session: &mut Session) -> Result<(), BusError> {
        if !self.is_online() {
            session.connected = false;
            return Err(BusError::ConnectionFailed("broker unavailable".into()));
        }
        if !session.connected {
            return Err(BusError::ConnectionFailed("not connected".into()));
        }
        Ok(())
    }
}

impl Publisher for InMemoryBroker {
    fn publish(&self, delivery: Delivery) -> Result<(), BusError> {
        self.log.write().push(delivery);
        Ok(())
    }

    fn publish_batch(&self, deliveries: Vec<Delivery>) -> Result<(), BusError> {
        self.log.write().extend(deliveries);
        Ok(())
    }
}

impl Subscriber for InMemoryBroker {
    fn connect(&self, options: &ConnectOptions) -> Result<(), BusError> {
        if !self.is_online() {
            return Err(BusError::ConnectionFailed(format!(
                "{} unreachable",
                options.url
            )));
        }
        let mut session = self.session.lock();
        if options.clean_session {
            session.position = self.log.read().len();
            session.filters.clear();
        }
        session.client_id = Some(options.client_id.clone());
        session.connected = true;
        Ok(())
    }

    fn disconnect(&self) {
        self.session.lock().connected = false;
    }

    fn subscribe(&self, filters: &[String]) -> Result<(), BusError> {
        if let Some(bad) = filters.iter().find(|f| f.is_empty()) {
            return Err(BusError::Rejected(format!("invalid filter '{bad}'")));
        }
        let mut session = self.session.lock();
        self.ensure_connected(&mut session)?;
        for filter in filters {
            if !session.filters.contains(filter) {
                session.filters.push(filter.clone());
            }
        }
        Ok(())
    }

    fn poll(&self, timeout_ms: u64) -> Result<Option<Delivery>, BusError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            {
                let mut session = self.session.lock();
                self.ensure_connected(&mut session)?;

                let log = self.log.read();
                while session.position < log.len() {
                    let delivery = &log[session.position];
                    session.position += 1;
                    if session.filters.iter().any(|f| topic_matches(f, &delivery.topic)) {
                        return Ok(Some(delivery.clone()));
                    }
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Small sleep to avoid busy-waiting
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ack(&self, delivery_id: &str) -> Result<(), BusError> {
        self.session.lock().acked.push(delivery_id.to_string());
        Ok(())
    }

    fn nack(&self, delivery_id: &str, reason: &str) -> Result<(), BusError> {
        self.session
            .lock()
            .nacked
            .push((delivery_id.to_string(), reason.to_string()));
        Ok(())
    }
}
