// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP RPC server for thallium-core.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `POST /rpc` | Form fields `type=rpc`, `action`, `messages`; session in `X-Session-Id` |
//! | `GET /health` | Database round trip |
//!
//! Errors are returned as a JSON [`RpcError`] body.

use std::net::SocketAddr;

use axum::{Json, Router};
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use thallium_protocol::RpcError;
use thallium_protocol::rpc::{
    ACTION_RETRIEVE_MESSAGES, ACTION_SUBMIT_MESSAGES, RPC_TYPE, SESSION_HEADER,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};

use crate::error::CoreError;
use crate::persistence::Persistence;
use crate::rpc::{RpcAction, RpcService};

/// Form body of an RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcForm {
    #[serde(rename = "type")]
    pub rpc_type: String,
    pub action: String,
    #[serde(default)]
    pub messages: Option<String>,
}

impl RpcForm {
    /// Map the form onto an action.
    pub fn into_action(self) -> Result<RpcAction, RpcError> {
        if self.rpc_type != RPC_TYPE {
            return Err(unknown_action(format!("unsupported request type '{}'", self.rpc_type)));
        }

        match self.action.as_str() {
            ACTION_SUBMIT_MESSAGES => Ok(RpcAction::SubmitMessages(
                self.messages.unwrap_or_default(),
            )),
            ACTION_RETRIEVE_MESSAGES => Ok(RpcAction::RetrieveMessages),
            other => Err(unknown_action(format!("unsupported action '{}'", other))),
        }
    }
}

fn unknown_action(message: String) -> RpcError {
    RpcError {
        code: "UNKNOWN_ACTION".to_string(),
        message,
    }
}

/// Build the RPC router.
pub fn router(service: RpcService) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

#[instrument(skip_all)]
async fn handle_rpc(
    State(service): State<RpcService>,
    headers: HeaderMap,
    Form(form): Form<RpcForm>,
) -> Response {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let action = match form.into_action() {
        Ok(action) => action,
        Err(error) => return (StatusCode::BAD_REQUEST, Json(error)).into_response(),
    };

    let is_poll = action == RpcAction::RetrieveMessages;
    match service.execute(session_id, action).await {
        Ok(body) if is_poll => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Ok(body) => body.into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_health(State(service): State<RpcService>) -> Response {
    match service.persistence().health_check_db().await {
        Ok(true) => Json(serde_json::json!({"status": "ok"})).into_response(),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "unavailable"})),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(error: &CoreError) -> Response {
    let status = if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    debug!(code = error.error_code(), %status, "RPC request failed");
    (status, Json(error.to_rpc_error())).into_response()
}

/// Serve the RPC router on `bind_addr` until `shutdown_rx` flips to `true`.
pub async fn run_rpc_server(
    bind_addr: SocketAddr,
    service: RpcService,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    serve(listener, service, async move {
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
    })
    .await
}

/// Serve the RPC router on an already bound listener.
pub async fn serve(
    listener: tokio::net::TcpListener,
    service: RpcService,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "RPC server listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("RPC server stopped");
    Ok(())
}
