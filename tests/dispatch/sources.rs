//! Bundled sources driving the service end to end.

use std::sync::Arc;

use msg_dispatch::bus::{Delivery, InMemoryBroker, Publisher};
use msg_dispatch::{
    Bootstrap, BrokerConfig, BrokerMessageSource, IntentMessageSource, MessageHandlingService,
    MessageKind, MessageSource, Notification, NotificationCommandHandler, ServiceConfig,
    StatusCommandHandler,
};
use serde_json::json;

use crate::support::{eventually, next_source_error, next_terminal};

fn fast_broker_config() -> BrokerConfig {
    BrokerConfig {
        reconnect_interval_ms: 20,
        poll_interval_ms: 5,
        ..BrokerConfig::default()
    }
}

fn broker_service(
    broker: &InMemoryBroker,
    config: BrokerConfig,
) -> (MessageHandlingService, Arc<BrokerMessageSource<InMemoryBroker>>) {
    let service = MessageHandlingService::new();
    let source = Arc::new(BrokerMessageSource::new(broker.new_client(), config));
    service.register_message_source("mqtt", source.clone()).unwrap();
    service
        .register_command_handler("notify", Arc::new(NotificationCommandHandler::new()))
        .unwrap();
    (service, source)
}

// ============================================================================
// Intent source
// ============================================================================

#[tokio::test]
async fn intent_source_routes_detected_intents() {
    let service = MessageHandlingService::new();
    let intents = Arc::new(IntentMessageSource::new());
    service.register_message_source("intent", intents.clone()).unwrap();
    service
        .register_command_handler("status", Arc::new(StatusCommandHandler::new()))
        .unwrap();
    let (_id, mut rx) = service.observers().channel();

    assert!(!intents.handle_intent("status", 0.8, vec![]));

    service.start().await.unwrap();
    assert!(intents.handle_intent("status", 0.8, vec![json!({ "entity": "device" })]));

    match next_terminal(&mut rx).await {
        Notification::MessageProcessed { message, result } => {
            assert_eq!(message.source(), "intent");
            assert_eq!(message.kind(), MessageKind::Intent);
            assert_eq!(message.metadata()["entityCount"], 1);
            let data = result.data.unwrap();
            assert_eq!(data["source"], "intent");
            assert_eq!(data["messageType"], "intent");
        }
        other => panic!("expected messageProcessed, got {}", other.name()),
    }

    service.stop().await.unwrap();
    assert!(!intents.send("status", json!({})));
}

// ============================================================================
// Broker source
// ============================================================================

#[tokio::test]
async fn broker_messages_are_routed_and_acked() {
    let broker = InMemoryBroker::new();
    let (service, source) = broker_service(&broker, fast_broker_config());
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    assert!(source.is_connected());

    broker
        .publish_str("commands/notify", r#"{"title":"Hi","recipients":["a"]}"#)
        .unwrap();

    match next_terminal(&mut rx).await {
        Notification::MessageProcessed { message, result } => {
            assert_eq!(message.source(), "mqtt");
            assert_eq!(message.kind(), MessageKind::Broker);
            assert_eq!(message.metadata()["topic"], "commands/notify");
            assert_eq!(result.data.unwrap()["recipients"], json!(["a"]));
        }
        other => panic!("expected messageProcessed, got {}", other.name()),
    }
    eventually(|| source.client().acknowledged().len() == 1).await;

    service.stop().await.unwrap();
    assert!(!source.is_connected());
}

#[tokio::test]
async fn broker_command_falls_back_to_payload() {
    let broker = InMemoryBroker::new();
    let config = BrokerConfig {
        topics: vec!["inbox".to_string()],
        ..fast_broker_config()
    };
    let (service, source) = broker_service(&broker, config);
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    broker
        .publish(
            Delivery::with_string_payload("d-a", "inbox", r#"{"command":"notify","title":"x"}"#)
                .with_metadata("trace", "abc"),
        )
        .unwrap();
    broker.publish_str("inbox", "plain text, no command").unwrap();

    match next_terminal(&mut rx).await {
        Notification::MessageProcessed { message, .. } => {
            assert_eq!(message.command(), "notify");
            assert_eq!(message.metadata()["headers"]["trace"], "abc");
        }
        other => panic!("expected messageProcessed, got {}", other.name()),
    }
    eventually(|| source.client().rejected().len() == 1).await;
    assert_eq!(source.stats().rejected, 1);

    service.stop().await.unwrap();
}

#[tokio::test]
async fn broker_outage_is_reported_and_recovered() {
    let broker = InMemoryBroker::new();
    let (service, source) = broker_service(&broker, fast_broker_config());
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    broker.set_online(false);

    let (name, error, fatal) = next_source_error(&mut rx).await;
    assert_eq!(name, "mqtt");
    assert!(error.contains("connection lost"));
    assert!(!fatal);
    eventually(|| !source.is_connected()).await;

    broker.set_online(true);
    eventually(|| source.is_connected()).await;
    assert!(source.stats().reconnects >= 1);

    broker.publish_str("commands/notify", r#"{"title":"back"}"#).unwrap();
    assert_eq!(next_terminal(&mut rx).await.name(), "messageProcessed");

    service.stop().await.unwrap();
}

#[tokio::test]
async fn broker_gives_up_after_max_attempts() {
    let broker = InMemoryBroker::new();
    let config = BrokerConfig {
        max_reconnect_attempts: Some(2),
        ..fast_broker_config()
    };
    let (service, source) = broker_service(&broker, config);
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    broker.set_online(false);

    let (_, _, fatal) = next_source_error(&mut rx).await;
    assert!(!fatal);
    let (name, error, fatal) = next_source_error(&mut rx).await;
    assert_eq!(name, "mqtt");
    assert!(fatal);
    assert!(error.contains("2 reconnect attempts"));
    assert!(!source.is_connected());

    // The service itself keeps running.
    assert_eq!(service.state(), msg_dispatch::LifecycleState::Running);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn unreachable_broker_fails_start() {
    let broker = InMemoryBroker::new();
    broker.set_online(false);
    let (service, _source) = broker_service(&broker, fast_broker_config());

    let err = service.start().await.unwrap_err();
    assert!(err.to_string().contains("mqtt"));
    assert_eq!(service.state(), msg_dispatch::LifecycleState::Stopped);
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn bootstrap_serves_broker_and_intents() {
    let broker = InMemoryBroker::new();
    let config = ServiceConfig {
        broker: fast_broker_config(),
        ..ServiceConfig::default()
    };
    let bootstrap = Bootstrap::new(broker.new_client(), &config).unwrap();
    let (_id, mut rx) = bootstrap.service().observers().channel();

    bootstrap.start().await.unwrap();

    broker.publish_str("notifications/notify", r#"{"title":"Hi"}"#).unwrap();
    let n = next_terminal(&mut rx).await;
    assert_eq!(n.name(), "messageProcessed");
    assert_eq!(n.message().unwrap().source(), "mqtt");

    assert!(bootstrap.intent_source().send("status", json!({})));
    let n = next_terminal(&mut rx).await;
    assert_eq!(n.name(), "messageProcessed");
    assert_eq!(n.message().unwrap().command(), "status");

    assert!(bootstrap.intent_source().send("unknown_cmd", json!({})));
    assert_eq!(next_terminal(&mut rx).await.name(), "unhandledCommand");

    bootstrap.stop().await.unwrap();
    let status = bootstrap.service().source_status();
    assert!(status.iter().all(|s| !s.running));
}
