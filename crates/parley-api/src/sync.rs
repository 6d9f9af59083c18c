use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};

use parley_types::api::{
    Claims, SyncMessagesRequest, SyncMessagesResponse, SyncPresenceRequest, SyncPresenceResponse,
};

use crate::auth::AppState;

/// Bulk presence reconciliation for a client that was offline. The merged
/// registry view comes back so the client can replace its snapshot.
pub async fn sync_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SyncPresenceRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    info!(
        "{} submitted a presence snapshot with {} entries",
        claims.username,
        req.entries.len()
    );

    // Run blocking store work off the async runtime
    let reconciler = state.reconciler.clone();
    let merged = tokio::task::spawn_blocking(move || reconciler.sync_presence(req.entries))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(SyncPresenceResponse { entries: merged }))
}

/// Bulk message reconciliation: deduplicating union of the client's
/// offline-accumulated messages into the server log. Safe to retry — the
/// merge is idempotent.
pub async fn sync_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SyncMessagesRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    info!(
        "{} submitted {} offline message(s)",
        claims.username,
        req.messages.len()
    );

    let reconciler = state.reconciler.clone();
    let merged = tokio::task::spawn_blocking(move || reconciler.sync_messages(req.messages))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Message sync for {} failed: {}", claims.username, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(SyncMessagesResponse { messages: merged }))
}
