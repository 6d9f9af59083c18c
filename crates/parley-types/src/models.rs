use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Online/offline state of a username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// One username's presence record. At most one entry exists per username;
/// entries are never deleted, so `last_change` doubles as last-seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub username: String,
    pub status: PresenceStatus,
    /// Epoch milliseconds of the last status flip.
    pub last_change: i64,
}

impl PresenceEntry {
    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }
}

/// A stored direct message between two usernames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub body: String,
    /// Epoch milliseconds, non-decreasing in append order.
    pub timestamp: i64,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl ChatMessage {
    /// Symmetric conversation membership: a message from A to B belongs to
    /// both A's and B's view of the pair.
    pub fn in_conversation(&self, a: &str, b: &str) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }
}

/// A message record accumulated by a client while offline. Older clients
/// never assigned ids, so `id` is optional; one is minted when the record
/// is admitted into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub sender: String,
    pub receiver: String,
    pub body: String,
    pub timestamp: i64,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub deleted: bool,
}

/// Identifies a single message for edit/delete. The uuid wins when present;
/// the `(sender, receiver, timestamp)` triple is the legacy fallback and on
/// a timestamp collision matches the first message in append order.
#[derive(Debug, Clone)]
pub struct MessageIdent {
    pub id: Option<Uuid>,
    pub sender: String,
    pub receiver: String,
    pub timestamp: Option<i64>,
}
