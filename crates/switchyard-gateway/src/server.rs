//! Loopback HTTP front door.
//!
//! Exposes Anthropic-compatible endpoints:
//! - `POST /v1/messages` (JSON, or SSE when `stream: true`)
//! - `GET /health`
//!
//! Everything else is `404 {}`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::json;
use switchyard_core::ModelExecutor;
use switchyard_protocol::CanonicalRequest;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::{GatewayConfig, LOOPBACK};
use crate::GatewayError;

/// How long to wait for cancelled handlers to unwind before aborting.
const FORCE_CLOSE_WAIT: Duration = Duration::from_millis(500);

#[derive(Clone)]
struct AppState {
    executor: Arc<ModelExecutor>,
    config: Arc<GatewayConfig>,
    /// Flips to `true` when shutdown gives up on in-flight requests.
    cancel: watch::Receiver<bool>,
}

struct RunningServer {
    addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct GatewayServer {
    executor: Arc<ModelExecutor>,
    config: Arc<GatewayConfig>,
    running: Mutex<Option<RunningServer>>,
}

impl GatewayServer {
    pub fn new(executor: Arc<ModelExecutor>, config: GatewayConfig) -> Self {
        Self {
            executor,
            config: Arc::new(config),
            running: Mutex::new(None),
        }
    }

    fn router(&self, cancel: watch::Receiver<bool>) -> Router {
        let state = AppState {
            executor: self.executor.clone(),
            config: self.config.clone(),
            cancel,
        };
        Router::new()
            .route(
                "/v1/messages",
                post(messages_handler).fallback(method_not_allowed),
            )
            .route("/health", get(health_handler))
            .fallback(not_found)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .with_state(state)
    }

    /// Bind `127.0.0.1` on the configured port (0 = OS assigned) and start
    /// serving in the background.
    pub async fn start(&self) -> Result<SocketAddr, GatewayError> {
        let mut running = self.running.lock();
        if let Some(existing) = running.as_ref() {
            return Err(GatewayError::AlreadyRunning(existing.addr));
        }

        let requested = SocketAddr::new(LOOPBACK, self.config.port);
        let bind_error = |source| GatewayError::Bind {
            addr: requested,
            source,
        };
        let std_listener = std::net::TcpListener::bind(requested).map_err(bind_error)?;
        std_listener.set_nonblocking(true).map_err(bind_error)?;
        let listener = TcpListener::from_std(std_listener).map_err(bind_error)?;
        let addr = listener.local_addr().map_err(bind_error)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let app = self.router(cancel_rx);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "gateway server error");
            }
        });

        tracing::info!(%addr, "gateway listening");
        *running = Some(RunningServer {
            addr,
            shutdown_tx,
            cancel_tx,
            task,
        });
        Ok(addr)
    }

    /// Bound port, 0 when not running.
    pub fn port(&self) -> u16 {
        self.running.lock().as_ref().map_or(0, |r| r.addr.port())
    }

    /// `host:port`, empty when not running.
    pub fn address(&self) -> String {
        self.running
            .lock()
            .as_ref()
            .map(|r| r.addr.to_string())
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stop accepting, give in-flight requests the grace window, cancel
    /// whatever is left, and return once the socket is released. Calling it
    /// while stopped is a no-op.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let RunningServer {
            addr,
            shutdown_tx,
            cancel_tx,
            mut task,
        } = running;

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(self.config.shutdown_grace(), &mut task)
            .await
            .is_err()
        {
            tracing::warn!(%addr, "in-flight requests outlived the grace window, cancelling");
            let _ = cancel_tx.send(true);
            if tokio::time::timeout(FORCE_CLOSE_WAIT, &mut task).await.is_err() {
                task.abort();
                let _ = task.await;
            }
        }
        tracing::info!(%addr, "gateway stopped");
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.cancel_tx.send(true);
            running.task.abort();
        }
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({}))).into_response()
}

async fn method_not_allowed() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn messages_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, GatewayError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge {
                limit: state.config.max_body_bytes,
            }
        } else {
            GatewayError::MalformedRequest(rejection.body_text())
        }
    })?;

    let request: CanonicalRequest = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::MalformedRequest(format!("invalid JSON body: {}", e)))?;

    tracing::debug!(model = %request.model, stream = request.stream, "messages request");

    let fallback = state.config.fallback_enabled;
    let timeout_secs = state.config.request_timeout_secs;
    let mut cancel = state.cancel.clone();

    if request.stream {
        let dispatch = tokio::time::timeout(
            state.config.request_timeout(),
            state.executor.stream(request, fallback),
        );
        let completion = tokio::select! {
            result = dispatch => result.map_err(|_| GatewayError::Timeout(timeout_secs))??,
            _ = cancel.wait_for(|cancelled| *cancelled) => return Err(GatewayError::ShuttingDown),
        };

        let mut stop = state.cancel.clone();
        let frames = completion
            .stream
            .take_until(async move {
                let _ = stop.wait_for(|cancelled| *cancelled).await;
            })
            .map(|frame| frame.map(Bytes::from));

        return Ok((
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(frames),
        )
            .into_response());
    }

    let dispatch = tokio::time::timeout(
        state.config.request_timeout(),
        state.executor.complete(request, fallback),
    );
    let completion = tokio::select! {
        result = dispatch => result.map_err(|_| GatewayError::Timeout(timeout_secs))??,
        _ = cancel.wait_for(|cancelled| *cancelled) => return Err(GatewayError::ShuttingDown),
    };

    tracing::debug!(
        provider = %completion.provider,
        fallback_used = completion.fallback_used,
        "messages request served"
    );
    Ok(Json(completion.response).into_response())
}
