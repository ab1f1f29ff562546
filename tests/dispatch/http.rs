//! HTTP source integration tests.
//!
//! Starts the REST source on an ephemeral port and exercises it with reqwest.

use std::sync::Arc;

use msg_dispatch::{MessageHandlingService, MessageKind, Notification, RestConfig, RestMessageSource};
use serde_json::{json, Value};

use crate::support::next_terminal;

async fn started_service() -> (MessageHandlingService, Arc<RestMessageSource>, String) {
    let service = MessageHandlingService::new();
    let source = Arc::new(RestMessageSource::new(RestConfig {
        bind: "127.0.0.1:0".to_string(),
    }));
    service.register_message_source("rest", source.clone()).unwrap();
    service
        .command("notifications_show", |m| async move { Ok(m.payload().clone()) })
        .unwrap();
    service.start().await.unwrap();

    let addr = source.local_addr().expect("bound address");
    (service, source, format!("http://{addr}"))
}

#[tokio::test]
async fn health_check() {
    let (service, _source, base) = started_service().await;

    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "ok": true, "connected": true }));

    service.stop().await.unwrap();
}

#[tokio::test]
async fn post_routes_endpoint_as_command() {
    let (service, _source, base) = started_service().await;
    let (_id, mut rx) = service.observers().channel();
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/notifications/show"))
        .header("x-request-id", "r-1")
        .json(&json!({ "title": "Hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "accepted": true, "command": "notifications_show" }));

    match next_terminal(&mut rx).await {
        Notification::MessageProcessed { message, result } => {
            assert_eq!(message.source(), "rest");
            assert_eq!(message.kind(), MessageKind::Rest);
            assert_eq!(message.metadata()["endpoint"], "notifications/show");
            assert_eq!(message.metadata()["_headers"]["x-request-id"], "r-1");
            assert_eq!(result.data.unwrap(), json!({ "title": "Hi" }));
        }
        other => panic!("expected messageProcessed, got {}", other.name()),
    }

    service.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_endpoint_is_unhandled() {
    let (service, _source, base) = started_service().await;
    let (_id, mut rx) = service.observers().channel();

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/does/not/exist"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    match next_terminal(&mut rx).await {
        Notification::UnhandledCommand { message } => {
            assert_eq!(message.command(), "does_not_exist");
            assert_eq!(message.payload()["rawMessage"], "not json");
        }
        other => panic!("expected unhandledCommand, got {}", other.name()),
    }

    service.stop().await.unwrap();
}

#[tokio::test]
async fn stop_closes_the_listener() {
    let (service, source, base) = started_service().await;

    service.stop().await.unwrap();
    assert!(source.local_addr().is_none());
    assert!(reqwest::get(format!("{base}/health")).await.is_err());
}
