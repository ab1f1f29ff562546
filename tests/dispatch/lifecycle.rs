//! Lifecycle: idempotent start/stop, start policies and source faults.

use std::sync::Arc;
use std::time::Duration;

use msg_dispatch::{
    DrainPolicy, LifecycleError, LifecycleState, MessageHandlingService, Notification,
    ServiceConfig, SourceError, StartPolicy,
};
use serde_json::json;

use crate::support::{drain, next_source_error, next_terminal, ScriptedSource};

fn lifecycle_states(notifications: &[Notification]) -> Vec<LifecycleState> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::LifecycleChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Test 1: start and stop are idempotent
// ============================================================================

#[tokio::test]
async fn start_and_stop_twice() {
    let service = MessageHandlingService::new();
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    service.start().await.unwrap();
    assert_eq!(source.starts(), 1);
    assert_eq!(service.state(), LifecycleState::Running);

    service.stop().await.unwrap();
    service.stop().await.unwrap();
    assert_eq!(source.stops(), 1);
    assert_eq!(service.state(), LifecycleState::Stopped);

    assert_eq!(
        lifecycle_states(&drain(&mut rx)),
        vec![
            LifecycleState::Starting,
            LifecycleState::Running,
            LifecycleState::Stopping,
            LifecycleState::Stopped,
        ]
    );
}

#[tokio::test]
async fn stop_without_start_is_a_noop() {
    let service = MessageHandlingService::new();
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();

    service.stop().await.unwrap();
    assert_eq!(source.stops(), 0);
    assert_eq!(service.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn service_restarts_after_stop() {
    let service = MessageHandlingService::new();
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();
    service.command("ping", |_m| async { Ok(json!("pong")) }).unwrap();
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    service.stop().await.unwrap();
    service.start().await.unwrap();

    assert_eq!(source.starts(), 2);
    assert!(source.emit("ping", json!({})));
    assert_eq!(next_terminal(&mut rx).await.name(), "messageProcessed");

    service.stop().await.unwrap();
}

#[tokio::test]
async fn concurrent_start_calls_start_sources_once() {
    let service = Arc::new(MessageHandlingService::new());
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();

    let a = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.start().await }
    });
    let b = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.start().await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(source.starts(), 1);
    assert_eq!(service.state(), LifecycleState::Running);
    service.stop().await.unwrap();
}

// ============================================================================
// Test 2: stop() makes sources cease producing
// ============================================================================

#[tokio::test]
async fn stopped_sources_cannot_emit() {
    let service = MessageHandlingService::new();
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();

    service.start().await.unwrap();
    assert!(source.emit("anything", json!({})));
    service.stop().await.unwrap();

    assert!(!source.emit("anything", json!({})));
    assert!(service.source_status().iter().all(|s| !s.running && !s.connected));
}

// ============================================================================
// Test 3: start policies
// ============================================================================

#[tokio::test]
async fn all_or_nothing_start_rolls_back() {
    let service = MessageHandlingService::new();
    let first = Arc::new(ScriptedSource::default());
    let broken = Arc::new(ScriptedSource::refusing());
    service.register_message_source("a", first.clone()).unwrap();
    service.register_message_source("b", broken.clone()).unwrap();

    let err = service.start().await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::SourceStart { ref source_name, .. } if source_name == "b"
    ));
    assert_eq!(first.starts(), 1);
    assert_eq!(first.stops(), 1);
    assert_eq!(service.state(), LifecycleState::Stopped);

    // Nothing is running, so stop has nothing to do.
    service.stop().await.unwrap();
    assert_eq!(first.stops(), 1);
}

#[tokio::test]
async fn best_effort_start_keeps_healthy_sources() {
    let service = MessageHandlingService::new().with_start_policy(StartPolicy::BestEffort);
    let healthy = Arc::new(ScriptedSource::default());
    service.register_message_source("a", healthy.clone()).unwrap();
    service.register_message_source("b", Arc::new(ScriptedSource::refusing())).unwrap();
    service.command("ping", |_m| async { Ok(json!("pong")) }).unwrap();
    let (_id, mut rx) = service.observers().channel();

    match service.start().await {
        Err(LifecycleError::PartialStart { failed }) => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, "b");
        }
        other => panic!("expected PartialStart, got {other:?}"),
    }
    assert_eq!(service.state(), LifecycleState::Running);

    let (source, _error, fatal) = next_source_error(&mut rx).await;
    assert_eq!(source, "b");
    assert!(fatal);

    assert!(healthy.emit("ping", json!({})));
    assert_eq!(next_terminal(&mut rx).await.name(), "messageProcessed");

    service.stop().await.unwrap();
}

#[tokio::test]
async fn policies_come_from_config() {
    let config = ServiceConfig::from_toml_str(
        r#"
        start_policy = "best_effort"
        drain_wait_ms = 250
        "#,
    )
    .unwrap();
    assert_eq!(config.start_policy, StartPolicy::BestEffort);
    assert_eq!(
        config.drain_policy(),
        DrainPolicy::Wait(Duration::from_millis(250))
    );

    let service = MessageHandlingService::from_config(&config);
    service.register_message_source("b", Arc::new(ScriptedSource::refusing())).unwrap();
    assert!(matches!(
        service.start().await,
        Err(LifecycleError::PartialStart { .. })
    ));
    assert_eq!(service.state(), LifecycleState::Running);
    service.stop().await.unwrap();
}

// ============================================================================
// Test 4: post-start source faults surface as sourceError
// ============================================================================

#[tokio::test]
async fn runtime_source_fault_is_reported() {
    let service = MessageHandlingService::new();
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    assert!(source.fail(SourceError::ConnectionLost("socket reset".into()), false));

    let (name, error, fatal) = next_source_error(&mut rx).await;
    assert_eq!(name, "scripted");
    assert!(error.contains("socket reset"));
    assert!(!fatal);
    assert_eq!(service.stats().source_errors, 1);
    assert_eq!(service.state(), LifecycleState::Running);

    service.stop().await.unwrap();
}

// ============================================================================
// Test 5: drain policy
// ============================================================================

#[tokio::test]
async fn detach_returns_before_slow_handlers_finish() {
    let service = MessageHandlingService::new();
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();
    service
        .command("slow", |_m| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("done"))
        })
        .unwrap();
    let (_id, mut rx) = service.observers().channel();

    service.start().await.unwrap();
    assert!(source.emit("slow", json!({})));
    crate::support::eventually(|| service.in_flight() == 1).await;

    service.stop().await.unwrap();
    assert_eq!(service.state(), LifecycleState::Stopped);
    assert_eq!(service.stats().processed, 0);

    // The detached handler still completes and is still reported.
    assert_eq!(next_terminal(&mut rx).await.name(), "messageProcessed");
}

#[tokio::test]
async fn wait_drains_in_flight_handlers() {
    let service = MessageHandlingService::new()
        .with_drain_policy(DrainPolicy::Wait(Duration::from_secs(2)));
    let source = Arc::new(ScriptedSource::default());
    service.register_message_source("scripted", source.clone()).unwrap();
    service
        .command("slow", |_m| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!("done"))
        })
        .unwrap();

    service.start().await.unwrap();
    for _ in 0..3 {
        assert!(source.emit("slow", json!({})));
    }
    service.stop().await.unwrap();

    assert_eq!(service.stats().processed, 3);
    assert_eq!(service.in_flight(), 0);
}
