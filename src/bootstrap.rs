//! Standard wiring of the service: broker and intent sources, the built-in
//! `notify` and `status` handlers, and a tracing observer.

use std::sync::Arc;

use tracing::{info, warn};

use crate::bus::{InMemoryBroker, Subscriber};
use crate::config::ServiceConfig;
use crate::error::{LifecycleError, RegistrationError};
use crate::handler::{NotificationCommandHandler, StatusCommandHandler};
use crate::observer::TracingSink;
use crate::service::MessageHandlingService;
use crate::source::{BrokerMessageSource, IntentMessageSource};

/// Source name the broker client is registered under.
pub const BROKER_SOURCE: &str = "mqtt";
/// Source name the in-process intent feed is registered under.
pub const INTENT_SOURCE: &str = "intent";

/// A fully wired [`MessageHandlingService`].
pub struct Bootstrap {
    service: MessageHandlingService,
    intents: Arc<IntentMessageSource>,
}

impl Bootstrap {
    /// Wire a service around `client` using `config`.
    pub fn new<C>(client: C, config: &ServiceConfig) -> Result<Self, RegistrationError>
    where
        C: Subscriber + 'static,
    {
        let service = MessageHandlingService::from_config(config);
        let intents = Arc::new(IntentMessageSource::new());

        service.register_message_source(
            BROKER_SOURCE,
            Arc::new(BrokerMessageSource::new(client, config.broker.clone())),
        )?;
        service.register_message_source(INTENT_SOURCE, intents.clone())?;

        service.register_command_handler(
            NotificationCommandHandler::COMMAND,
            Arc::new(NotificationCommandHandler::new()),
        )?;
        service.register_command_handler(
            StatusCommandHandler::COMMAND,
            Arc::new(StatusCommandHandler::new()),
        )?;

        service.observers().subscribe(TracingSink);

        Ok(Self { service, intents })
    }

    /// Wire a service around a fresh [`InMemoryBroker`], returned for
    /// publishing.
    ///
    /// `broker.url` is not dialled: the in-memory broker is the only
    /// transport in this crate. Topic filters still apply.
    pub fn in_memory(config: &ServiceConfig) -> Result<(Self, InMemoryBroker), RegistrationError> {
        warn!(
            configured_url = %config.broker.url,
            "no network broker client linked; using the in-memory broker"
        );
        let broker = InMemoryBroker::new();
        let bootstrap = Self::new(broker.new_client(), config)?;
        Ok((bootstrap, broker))
    }

    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.service.start().await?;
        info!(
            sources = ?self.service.registered_sources(),
            commands = ?self.service.command_descriptions(),
            "message dispatch ready"
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), LifecycleError> {
        self.service.stop().await
    }

    pub fn service(&self) -> &MessageHandlingService {
        &self.service
    }

    /// The in-process source other components push intents into.
    pub fn intent_source(&self) -> &Arc<IntentMessageSource> {
        &self.intents
    }
}
