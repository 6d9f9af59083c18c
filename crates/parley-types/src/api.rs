use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, PresenceEntry, SyncMessage};

// -- JWT Claims --

/// JWT claims shared across parley-api (REST middleware) and parley-gateway
/// (WebSocket authentication). Canonical definition lives here in
/// parley-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub username: String,
}

// -- Sync --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncPresenceRequest {
    pub entries: Vec<PresenceEntry>,
}

#[derive(Debug, Serialize)]
pub struct SyncPresenceResponse {
    pub entries: Vec<PresenceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncMessagesRequest {
    pub messages: Vec<SyncMessage>,
}

#[derive(Debug, Serialize)]
pub struct SyncMessagesResponse {
    pub messages: Vec<ChatMessage>,
}
