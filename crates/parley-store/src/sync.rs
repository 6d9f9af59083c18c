use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use parley_types::models::{ChatMessage, PresenceEntry, SyncMessage};

use crate::StoreError;
use crate::messages::MessageStore;
use crate::presence::PresenceRegistry;

/// Merges state a client accumulated while offline into the server's
/// authoritative state, without duplication.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<MessageStore>,
    registry: Arc<PresenceRegistry>,
}

impl Reconciler {
    pub fn new(store: Arc<MessageStore>, registry: Arc<PresenceRegistry>) -> Self {
        Self { store, registry }
    }

    /// Merge a client's presence snapshot into the registry and return the
    /// merged list. Usernames with a live connection keep their live state.
    pub fn sync_presence(&self, local: Vec<PresenceEntry>) -> Vec<PresenceEntry> {
        let merged = merge_presence(&local, &self.registry.entries());
        for entry in &merged {
            self.registry.absorb(entry.clone());
        }
        // Re-read so entries protected by a live connection come back with
        // their live state rather than the snapshot's.
        self.registry.entries()
    }

    /// Deduplicating union of the client's offline messages into the log.
    /// Idempotent: submitting the same snapshot again admits nothing.
    pub fn sync_messages(&self, local: Vec<SyncMessage>) -> Result<Vec<ChatMessage>, StoreError> {
        let server = self.store.all_messages()?;
        let fresh = unique_local_messages(local, &server);
        debug!("Offline sync: admitting {} new message(s)", fresh.len());
        for record in fresh {
            self.store.absorb(record)?;
        }
        self.store.all_messages()
    }
}

/// Union of a local presence snapshot and the server registry keyed by
/// username: no duplicates, the local snapshot wins on conflict, server-only
/// entries are kept, local-only entries are appended.
pub fn merge_presence(local: &[PresenceEntry], server: &[PresenceEntry]) -> Vec<PresenceEntry> {
    let mut merged: Vec<PresenceEntry> = server.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.username.clone(), i))
        .collect();

    for entry in local {
        match index.get(&entry.username) {
            Some(&i) => merged[i] = entry.clone(),
            None => {
                index.insert(entry.username.clone(), merged.len());
                merged.push(entry.clone());
            }
        }
    }

    merged
}

/// Filter a local snapshot down to records the server has never seen. A
/// record is a duplicate when a server message shares its id or its
/// `(sender, receiver, timestamp)` triple; duplicates inside the snapshot
/// itself are dropped the same way.
fn unique_local_messages(local: Vec<SyncMessage>, server: &[ChatMessage]) -> Vec<SyncMessage> {
    let mut ids: HashSet<Uuid> = server.iter().map(|m| m.id).collect();
    let mut triples: HashSet<(String, String, i64)> = server
        .iter()
        .map(|m| (m.sender.clone(), m.receiver.clone(), m.timestamp))
        .collect();

    let mut fresh = Vec::new();
    for record in local {
        if record.id.is_some_and(|id| ids.contains(&id)) {
            continue;
        }
        let triple = (record.sender.clone(), record.receiver.clone(), record.timestamp);
        if triples.contains(&triple) {
            continue;
        }
        if let Some(id) = record.id {
            ids.insert(id);
        }
        triples.insert(triple);
        fresh.push(record);
    }
    fresh
}
