//! HTTP endpoint for the knowledge actions.
//!
//! `POST /api/knowledge` takes the same JSON bodies as `kbase request`.
//! Callers authenticate with `Authorization: Bearer <token>`; tokens are
//! configured under `server.tokens`. The session is checked before the body
//! is read, and every failure comes back as `{error, kind, transient}`.

use anyhow::{bail, Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use kbase_core::{config::AppConfig, AppError};
use kbase_knowledge::{KnowledgeService, Session};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Largest request body accepted by the knowledge endpoint.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct ServerState {
    service: Arc<KnowledgeService>,
    config: Arc<AppConfig>,
}

/// Build the router.
pub fn create_router(service: Arc<KnowledgeService>, config: AppConfig) -> Router {
    let state = ServerState {
        service,
        config: Arc::new(config),
    };

    Router::new()
        .route("/api/knowledge", post(knowledge))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server and run until Ctrl-C.
pub async fn start_server(service: Arc<KnowledgeService>, config: AppConfig) -> Result<()> {
    if config.api_tokens.is_empty() {
        bail!("no API tokens configured; add server.tokens to the config file or set KBASE_API_TOKEN");
    }

    let addr: SocketAddr = config
        .server_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server_addr))?;

    let app = create_router(service, config);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, "Knowledge endpoint listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// GET /health
async fn health() -> StatusCode {
    StatusCode::OK
}

/// POST /api/knowledge
async fn knowledge(State(state): State<ServerState>, headers: HeaderMap, body: Body) -> Response {
    let session = match bearer_token(&headers).and_then(|token| state.config.user_for_token(token)) {
        Some(user) => Session::new(user),
        None => return error_response(&AppError::Unauthorized("missing or unknown API token".to_string())),
    };

    let body = match read_body(body).await {
        Ok(body) => body,
        Err(e) => return error_response(&e),
    };

    match state.service.handle(Some(&session), &body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn read_body(body: Body) -> Result<String, AppError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|_| {
        AppError::InvalidInput(format!("request body exceeds {} bytes", MAX_BODY_BYTES))
    })?;

    String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::InvalidInput("request body is not valid UTF-8".to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn error_response(err: &AppError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        tracing::warn!(error = %err, kind = err.kind(), "Request failed");
    } else {
        tracing::debug!(error = %err, kind = err.kind(), "Request rejected");
    }

    (status, Json(err.to_body())).into_response()
}
