use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, PresenceEntry};

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection and go online. Must be the
    /// first frame on the socket.
    Register { token: String },

    /// Ask for the presence of both ends of a conversation. Each peer that
    /// is online receives a `UserStatus` event about the other.
    GetUserStatus { sender: String, receiver: String },

    /// Fetch the full conversation between two usernames.
    GetAllMessages { sender: String, receiver: String },

    /// Send a direct message.
    SendMessage {
        sender: String,
        receiver: String,
        body: String,
    },

    /// Replace the body of an existing message. `id` wins when present;
    /// `timestamp` is the legacy identity fallback.
    EditMessage {
        sender: String,
        receiver: String,
        #[serde(default)]
        id: Option<Uuid>,
        #[serde(default)]
        timestamp: Option<i64>,
        body: String,
    },

    /// Remove a single message.
    DeleteMessage {
        sender: String,
        receiver: String,
        #[serde(default)]
        id: Option<Uuid>,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Purge the whole conversation between two usernames.
    DeleteAllMessages { sender: String, receiver: String },

    /// Relay a call-setup payload to a peer.
    Signal {
        receiver: String,
        payload: SignalPayload,
    },
}

/// Events sent FROM server TO client over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication.
    Ready { username: String },

    /// Presence of a queried username.
    UserStatus { entry: PresenceEntry },

    /// Ordered conversation snapshot between `sender` and `receiver`.
    AllMessages {
        sender: String,
        receiver: String,
        messages: Vec<ChatMessage>,
    },

    /// A message was delivered to this conversation (both peers get one,
    /// the sender included).
    ReceiveMessage { message: ChatMessage },

    /// Acknowledgment for an edit request. `is_edited == false` means the
    /// target message was not found.
    MessageEdited { is_edited: bool },

    /// Acknowledgment for a delete request.
    MessageDeleted { is_deleted: bool },

    /// Call-setup payload relayed from a peer.
    Signal {
        sender: String,
        payload: SignalPayload,
    },
}

/// WebRTC call-setup payload relayed between two peers. The server never
/// interprets these and keeps no call state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SignalPayload {
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    IceCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u16>,
    },
    CallRequest {
        call_type: String,
    },
    CallAccept {
        call_type: String,
    },
    CallEnd,
}
