//! HTTP message source: maps REST calls to commands.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /api/*endpoint`: emit a message. The endpoint becomes the command
//!   (`/api/notifications/show` → `notifications_show`), the body becomes the
//!   payload and request headers go to metadata under `_headers`.
//! - `GET /health`: `{ "ok": true, "connected": bool }`.
//!
//! Routing happens asynchronously, so a call is answered with
//! `202 Accepted` as soon as the message is queued.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{MessageSource, SourceSink};
use crate::config::RestConfig;
use crate::error::SourceError;
use crate::message::{MessageKind, RawMessage};

struct Server {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    addr: SocketAddr,
}

/// A source that accepts commands over HTTP.
pub struct RestMessageSource {
    config: RestConfig,
    sink: Arc<Mutex<Option<SourceSink>>>,
    server: Mutex<Option<Server>>,
}

impl RestMessageSource {
    pub fn new(config: RestConfig) -> Self {
        Self {
            config,
            sink: Arc::new(Mutex::new(None)),
            server: Mutex::new(None),
        }
    }

    /// Address the server is bound to while started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(|s| s.addr)
    }

    /// The router, for composing with other axum routes.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.sink))
    }
}

#[async_trait]
impl MessageSource for RestMessageSource {
    fn kind(&self) -> MessageKind {
        MessageKind::Rest
    }

    async fn start(&self, sink: SourceSink) -> Result<(), SourceError> {
        if self.server.lock().is_some() {
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(&self.config.bind)
            .await
            .map_err(|e| SourceError::StartFailed(format!("bind {}: {e}", self.config.bind)))?;
        let addr = listener.local_addr()?;
        *self.sink.lock() = Some(sink);

        let app = self.router();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "http message source server exited with error");
            }
        });

        *self.server.lock() = Some(Server {
            shutdown,
            task,
            addr,
        });
        info!(%addr, "http message source listening");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        self.sink.lock().take();
        let Some(server) = self.server.lock().take() else {
            return Ok(());
        };
        let _ = server.shutdown.send(());
        server
            .task
            .await
            .map_err(|e| SourceError::Other(e.to_string()))?;
        info!(addr = %server.addr, "http message source stopped");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.server.lock().is_some()
    }
}

type SharedSink = Arc<Mutex<Option<SourceSink>>>;

fn router(sink: SharedSink) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/*endpoint", post(command_handler))
        .with_state(sink)
}

/// `GET /health`
async fn health_handler(State(sink): State<SharedSink>) -> impl IntoResponse {
    let connected = sink.lock().is_some();
    Json(json!({ "ok": true, "connected": connected }))
}

/// `POST /api/*endpoint`
async fn command_handler(
    State(sink): State<SharedSink>,
    Path(endpoint): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let command = command_from_endpoint(&endpoint);
    if command.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing command endpoint" })),
        );
    }

    let raw = RawMessage::new(command.clone(), MessageKind::Rest, parse_body(&body))
        .with_metadata("endpoint", endpoint)
        .with_metadata("_headers", headers_to_map(&headers));

    let emitted = match sink.lock().as_ref() {
        Some(sink) => sink.emit(raw),
        None => Err(SourceError::Closed),
    };
    match emitted {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "command": command })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// `notifications/show` → `notifications_show`.
fn command_from_endpoint(endpoint: &str) -> String {
    endpoint.trim_matches('/').replace('/', "_").to_lowercase()
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(body).unwrap_or_else(|_| {
        json!({ "rawMessage": String::from_utf8_lossy(body) })
    })
}

fn headers_to_map(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect()
}
