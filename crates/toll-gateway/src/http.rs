//! HTTP surface: `POST /chat`, `POST /chat/approve` and `GET /health`.
//!
//! Segments stream as `data: <json>` frames ending in `data: [DONE]`. Errors
//! before streaming starts are `{ "error": ... }` bodies:
//!
//! - 400: malformed body or a missing required field.
//! - 409: the decision names no parked call, e.g. one already decided. A
//!   repeated decision is a client conflict and leaves server state as is.
//! - 500: the call is parked but no agent under the session's agent holds
//!   it, or another internal failure.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use toll_types::wire::DONE_FRAME;

use crate::error::GatewayError;
use crate::flatten::WireStream;
use crate::{ApproveRequest, ChatRequest, Gateway};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) | ApiError::Gateway(GatewayError::InvalidRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Gateway(GatewayError::StaleApproval { .. }) => StatusCode::CONFLICT,
            ApiError::Gateway(GatewayError::UnresolvableApproval { .. })
            | ApiError::Gateway(GatewayError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub fn router(gateway: Arc<Gateway>, cors_allow_any: bool) -> Router {
    let app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/approve", post(approve))
        .with_state(AppState { gateway })
        .layer(TraceLayer::new_for_http());
    if cors_allow_any {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(gateway: Arc<Gateway>, addr: &str, cors_allow_any: bool) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "tollgate listening");
    axum::serve(listener, router(gateway, cors_allow_any))
        .await
        .context("HTTP server stopped")?;
    Ok(())
}

async fn health(State(st): State<AppState>) -> Json<serde_json::Value> {
    let registry = st.gateway.registry();
    let ids = registry.ids();
    let parked_runs: usize = ids
        .iter()
        .filter_map(|id| registry.get(id))
        .map(|agent| agent.parked_runs())
        .sum();
    Json(json!({
        "status": "ok",
        "agents": ids,
        "pendingApprovals": st.gateway.gate().len(),
        "parkedRuns": parked_runs,
    }))
}

async fn chat(
    State(st): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let events = st.gateway.chat(request)?;
    Ok(sse_response(pump(events)))
}

async fn approve(
    State(st): State<AppState>,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let events = st.gateway.approve(request)?;
    Ok(sse_response(pump(events)))
}

/// Drive a segment on its own task, framing each event for the response body.
///
/// The segment always runs to its end: once the client goes away the
/// remaining events are drained and discarded so the gate and the agents
/// finish their bookkeeping.
fn pump(
    mut events: WireStream,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let (tx, rx) = mpsc::channel::<Bytes>(64);
    tokio::spawn(async move {
        let mut connected = true;
        while let Some(event) = events.next().await {
            if !connected {
                continue;
            }
            let frame = match event.to_sse_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, kind = event.kind(), "failed to serialize wire event");
                    continue;
                }
            };
            if tx.send(Bytes::from(frame)).await.is_err() {
                debug!("client disconnected; draining segment");
                connected = false;
            }
        }
        if connected {
            let _ = tx.send(Bytes::from_static(DONE_FRAME.as_bytes())).await;
        }
    });
    sse_body_stream(rx)
}

fn sse_body_stream(
    mut rx: mpsc::Receiver<Bytes>,
) -> impl futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(chunk);
        }
    }
}

fn sse_response<S>(stream: S) -> Response
where
    S: futures::Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}
