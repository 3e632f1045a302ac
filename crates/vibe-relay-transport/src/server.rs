//! HTTP server exposing a session client.

use std::{future::Future, io, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use vibe_relay_core::{DialogId, DialogInfo, Item, SessionClient, SessionError};

use crate::protocol::{ErrorBody, MessagesQuery, SendRequest, SendResponse, StatusResponse};

/// Session error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub SessionError);

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(self.0);
        let status =
            StatusCode::from_u16(body.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

fn parse_dialog(raw: &str) -> DialogId {
    let Ok(dialog) = raw.parse::<DialogId>();
    dialog
}

async fn status<C: SessionClient>(
    State(client): State<Arc<C>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let authorized = client.is_authorized().await?;
    // Reaching this point means the session answered.
    Ok(Json(StatusResponse {
        connected: true,
        authorized,
    }))
}

async fn dialogs<C: SessionClient>(
    State(client): State<Arc<C>>,
) -> Result<Json<Vec<DialogInfo>>, ApiError> {
    Ok(Json(client.list_dialogs().await?))
}

async fn messages<C: SessionClient>(
    State(client): State<Arc<C>>,
    Path(dialog): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let dialog = parse_dialog(&dialog);
    Ok(Json(client.fetch_recent(&dialog, query.limit).await?))
}

async fn send<C: SessionClient>(
    State(client): State<Arc<C>>,
    Path(dialog): Path<String>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let dialog = parse_dialog(&dialog);
    client.send_text(&dialog, &request.text).await?;
    tracing::debug!(%dialog, "Message sent");
    Ok(Json(SendResponse { success: true }))
}

/// Router serving the bridge API on top of `client`.
#[must_use]
pub fn router<C>(client: Arc<C>) -> Router
where
    C: SessionClient + 'static,
{
    Router::new()
        .route("/status", get(status::<C>))
        .route("/dialogs", get(dialogs::<C>))
        .route("/dialogs/{dialog}/messages", get(messages::<C>).post(send::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(client)
}

/// Serve the bridge API until `shutdown` resolves.
///
/// # Errors
/// Returns error if the listener fails.
pub async fn serve<C, F>(listener: TcpListener, client: Arc<C>, shutdown: F) -> io::Result<()>
where
    C: SessionClient + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Serving session API");
    }
    axum::serve(listener, router(client))
        .with_graceful_shutdown(shutdown)
        .await
}
