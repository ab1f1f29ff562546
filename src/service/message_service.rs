//! The message handling service: registries, lifecycle and routing.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::lifecycle::LifecycleState;
use super::registry::Registry;
use super::router::Router;
use super::stats::{DispatchStats, StatsCounters};
use crate::config::{DrainPolicy, ServiceConfig, StartPolicy};
use crate::error::{HandlerError, LifecycleError, RegistrationError, SourceError};
use crate::handler::{CommandHandler, FnHandler};
use crate::message::{Message, RawMessage};
use crate::observer::{Notification, Observers};
use crate::source::{MessageSource, SourceSink};

#[derive(Clone)]
struct SourceEntry {
    source: Arc<dyn MessageSource>,
    running: bool,
}

/// Observable status of one registered source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub name: String,
    /// Started by this service and not yet stopped.
    pub running: bool,
    /// The source's own view of its transport.
    pub connected: bool,
}

/// What exists only while the service is running.
struct RunningSet {
    started: Vec<(String, Arc<dyn MessageSource>)>,
    cancel: CancellationToken,
    pumps: Vec<JoinHandle<()>>,
}

/// Routes messages from registered sources to registered command handlers.
///
/// ## Example
///
/// ```ignore
/// let service = MessageHandlingService::new();
/// let intents = Arc::new(IntentMessageSource::new());
/// service.register_message_source("intent", intents.clone())?;
/// service.register_command_handler("status", Arc::new(StatusCommandHandler::new()))?;
/// service.observers().subscribe(TracingSink);
///
/// service.start().await?;
/// intents.send("status", json!({}));
/// service.stop().await?;
/// ```
///
/// ## Lifecycle
///
/// `start()` and `stop()` serialize on an internal lock: a call made while
/// another transition is in progress waits for it, then acts on the settled
/// state. Starting a running service and stopping a stopped one are no-ops.
///
/// `stop()` stops every source and waits for the per-source pumps to drain
/// what was already queued. With [`DrainPolicy::Detach`] handler invocations
/// still in flight keep running in the background; with
/// [`DrainPolicy::Wait`] `stop()` waits for them up to the given time.
pub struct MessageHandlingService {
    sources: Registry<SourceEntry>,
    router: Router,
    state: RwLock<LifecycleState>,
    transition: Mutex<Option<RunningSet>>,
    start_policy: StartPolicy,
    drain_policy: DrainPolicy,
}

impl Default for MessageHandlingService {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandlingService {
    /// A stopped service with no sources, handlers or observers.
    pub fn new() -> Self {
        Self {
            sources: Registry::new(),
            router: Router {
                handlers: Arc::new(Registry::new()),
                observers: Arc::new(Observers::new()),
                stats: Arc::new(StatsCounters::default()),
                tracker: TaskTracker::new(),
            },
            state: RwLock::new(LifecycleState::Stopped),
            transition: Mutex::new(None),
            start_policy: StartPolicy::default(),
            drain_policy: DrainPolicy::default(),
        }
    }

    /// A service using the policies from `config`.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new()
            .with_start_policy(config.start_policy)
            .with_drain_policy(config.drain_policy())
    }

    pub fn with_start_policy(mut self, policy: StartPolicy) -> Self {
        self.start_policy = policy;
        self
    }

    pub fn with_drain_policy(mut self, policy: DrainPolicy) -> Self {
        self.drain_policy = policy;
        self
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register `source` under `name`, replacing any previous entry.
    ///
    /// Does not start the source. A replaced source is returned and is not
    /// stopped here; stop it before replacing it.
    pub fn register_message_source(
        &self,
        name: impl Into<String>,
        source: Arc<dyn MessageSource>,
    ) -> Result<Option<Arc<dyn MessageSource>>, RegistrationError> {
        let name = non_empty(name.into(), "source")?;
        let previous = self.sources.insert(
            name.clone(),
            SourceEntry {
                source,
                running: false,
            },
        );
        info!(source = %name, replaced = previous.is_some(), "registered message source");
        Ok(previous.map(|entry| entry.source))
    }

    /// Register `handler` for `command`. The last registration wins.
    pub fn register_command_handler(
        &self,
        command: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<Option<Arc<dyn CommandHandler>>, RegistrationError> {
        let command = non_empty(command.into(), "command")?;
        let previous = self.router.handlers.insert(command.clone(), handler);
        info!(command = %command, replaced = previous.is_some(), "registered command handler");
        Ok(previous)
    }

    /// Register an async closure as the handler for `command`.
    pub fn command<F, Fut>(&self, command: &str, handle: F) -> Result<(), RegistrationError>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register_command_handler(command, Arc::new(FnHandler::new(command, handle)))
            .map(|_| ())
    }

    /// Registered source names, sorted.
    pub fn registered_sources(&self) -> Vec<String> {
        self.sources.names()
    }

    /// Registered command names, sorted.
    pub fn registered_commands(&self) -> Vec<String> {
        self.router.handlers.names()
    }

    /// `(command, description)` pairs, sorted by command.
    pub fn command_descriptions(&self) -> Vec<(String, String)> {
        self.router
            .handlers
            .entries()
            .into_iter()
            .map(|(command, handler)| (command, handler.description().to_string()))
            .collect()
    }

    /// Running / connected status of every registered source.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        self.sources
            .entries()
            .into_iter()
            .map(|(name, entry)| SourceStatus {
                name,
                running: entry.running,
                connected: entry.source.is_connected(),
            })
            .collect()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// The observer list notifications are delivered to.
    pub fn observers(&self) -> &Observers {
        &self.router.observers
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn stats(&self) -> DispatchStats {
        self.router.stats.snapshot()
    }

    /// Handler invocations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.router.tracker.len()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start every registered source and begin routing.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let mut running = self.transition.lock().await;
        if running.is_some() {
            debug!("message handling service already running");
            return Ok(());
        }

        info!("starting message handling service");
        self.set_state(LifecycleState::Starting);

        let cancel = CancellationToken::new();
        let mut set = RunningSet {
            started: Vec::new(),
            cancel: cancel.clone(),
            pumps: Vec::new(),
        };
        let mut failed = Vec::new();

        for (name, entry) in self.sources.entries() {
            let (sink, events) = SourceSink::channel();
            match entry.source.start(sink).await {
                Ok(()) => {
                    info!(source = %name, "message source started");
                    self.sources.update(&name, |e| e.running = true);
                    let pump = self.router.clone().pump(name.clone(), events, cancel.clone());
                    set.pumps.push(tokio::spawn(pump));
                    set.started.push((name, entry.source));
                }
                Err(err) => {
                    error!(source = %name, error = %err, "failed to start message source");
                    match self.start_policy {
                        StartPolicy::AllOrNothing => {
                            self.rollback(set).await;
                            self.set_state(LifecycleState::Stopped);
                            return Err(LifecycleError::SourceStart {
                                source_name: name,
                                error: err,
                            });
                        }
                        StartPolicy::BestEffort => {
                            self.router.source_error(&name, &err, true);
                            failed.push((name, err));
                        }
                    }
                }
            }
        }

        *running = Some(set);
        self.set_state(LifecycleState::Running);
        info!(
            sources = ?self.registered_sources(),
            commands = ?self.registered_commands(),
            "message handling service started"
        );

        if failed.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::PartialStart { failed })
        }
    }

    /// Stop every started source and stop routing.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let mut running = self.transition.lock().await;
        let Some(set) = running.take() else {
            debug!("message handling service already stopped");
            return Ok(());
        };

        info!("stopping message handling service");
        self.set_state(LifecycleState::Stopping);

        let mut failed = Vec::new();
        for (name, source) in &set.started {
            match source.stop().await {
                Ok(()) => info!(source = %name, "message source stopped"),
                Err(err) => {
                    warn!(source = %name, error = %err, "failed to stop message source");
                    failed.push((name.clone(), err));
                }
            }
            self.sources.update(name, |e| e.running = false);
        }

        set.cancel.cancel();
        for pump in set.pumps {
            let _ = pump.await;
        }

        if let DrainPolicy::Wait(timeout) = self.drain_policy {
            self.drain(timeout).await;
        }

        self.set_state(LifecycleState::Stopped);

        if failed.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::SourceStop { failed })
        }
    }

    /// Stop what a failed all-or-nothing start already started.
    async fn rollback(&self, set: RunningSet) {
        set.cancel.cancel();
        for (name, source) in set.started.iter().rev() {
            if let Err(err) = source.stop().await {
                warn!(source = %name, error = %err, "failed to stop message source during rollback");
            }
            self.sources.update(name, |e| e.running = false);
        }
        for pump in set.pumps {
            let _ = pump.await;
        }
    }

    /// Wait for in-flight handler tasks, at most `timeout`.
    async fn drain(&self, timeout: std::time::Duration) {
        let tracker = &self.router.tracker;
        tracker.close();
        if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
            warn!(
                in_flight = tracker.len(),
                "in-flight handlers still running after drain timeout"
            );
        }
        tracker.reopen();
    }

    fn set_state(&self, to: LifecycleState) {
        let from = {
            let mut state = self.state.write();
            let from = *state;
            debug_assert!(from.can_transition_to(to), "invalid transition {from} -> {to}");
            *state = to;
            from
        };
        self.router
            .observers
            .emit(&Notification::LifecycleChanged { from, to });
    }

    // =========================================================================
    // Direct dispatch
    // =========================================================================

    /// Route a message as if `source` had emitted it, without waiting.
    ///
    /// Works in any lifecycle state; useful for internal commands.
    pub fn dispatch(&self, source: &str, raw: RawMessage) -> Result<Message, SourceError> {
        validate(source, &raw)?;
        Ok(self.router.dispatch(source, raw))
    }

    /// Route a message and wait for its terminal notification.
    pub async fn process(&self, source: &str, raw: RawMessage) -> Result<Notification, SourceError> {
        validate(source, &raw)?;
        let message = Message::ingest(source, raw);
        self.router.stats.received();
        Ok(self.router.route(message).await)
    }
}

fn non_empty(name: String, what: &'static str) -> Result<String, RegistrationError> {
    if name.trim().is_empty() {
        Err(RegistrationError::EmptyName(what))
    } else {
        Ok(name)
    }
}

fn validate(source: &str, raw: &RawMessage) -> Result<(), SourceError> {
    if source.trim().is_empty() {
        return Err(SourceError::InvalidMessage("source is empty".into()));
    }
    if raw.command.trim().is_empty() {
        return Err(SourceError::InvalidMessage("command is empty".into()));
    }
    Ok(())
}
