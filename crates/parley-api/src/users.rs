use axum::{Extension, Json, extract::State, response::IntoResponse};

use parley_types::api::Claims;
use parley_types::models::PresenceEntry;

use crate::auth::AppState;

/// Everyone presence knows about except the caller, with status and
/// last-seen time. Offline users are included — the client renders them
/// with their last-seen timestamp.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> impl IntoResponse {
    let users: Vec<PresenceEntry> = state
        .registry
        .entries()
        .into_iter()
        .filter(|entry| entry.username != claims.username)
        .collect();

    Json(users)
}
