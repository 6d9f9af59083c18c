use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use parley_db::Database;
use parley_types::models::{ChatMessage, MessageIdent, SyncMessage};

use crate::StoreError;

/// Append-ordered log of direct messages, backed by the durable store.
/// Timestamps assigned at creation never decrease; equal values are
/// tolerated (two messages inside the same millisecond).
pub struct MessageStore {
    db: Arc<Database>,
    /// Last timestamp handed out, seeded from the persisted log.
    clock: Mutex<i64>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>) -> anyhow::Result<Self> {
        let last = db.max_timestamp()?;
        Ok(Self {
            db,
            clock: Mutex::new(last),
        })
    }

    fn next_timestamp(&self) -> i64 {
        let mut last = self.clock.lock().expect("message clock poisoned");
        let ts = Utc::now().timestamp_millis().max(*last);
        *last = ts;
        ts
    }

    fn advance_clock(&self, ts: i64) {
        let mut last = self.clock.lock().expect("message clock poisoned");
        *last = (*last).max(ts);
    }

    /// Append a new message: mints its id, stamps it, persists it.
    pub fn append(&self, sender: &str, receiver: &str, body: &str) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            body: body.to_string(),
            timestamp: self.next_timestamp(),
            edited: false,
            deleted: false,
        };
        self.db.insert_message(&message)?;
        Ok(message)
    }

    /// Admit a record from a client's offline snapshot. The record keeps
    /// its own timestamp; an id is minted if the client never assigned one.
    pub fn absorb(&self, record: SyncMessage) -> Result<ChatMessage, StoreError> {
        let message = ChatMessage {
            id: record.id.unwrap_or_else(Uuid::new_v4),
            sender: record.sender,
            receiver: record.receiver,
            body: record.body,
            timestamp: record.timestamp,
            edited: record.edited,
            deleted: record.deleted,
        };
        self.db.insert_message(&message)?;
        self.advance_clock(message.timestamp);
        Ok(message)
    }

    /// Replace the body of the message matching `ident`. Identity is fixed;
    /// only the body changes and the edited flag is set.
    pub fn edit(&self, ident: &MessageIdent, new_body: &str) -> Result<ChatMessage, StoreError> {
        let seq = self.db.locate_message(ident)?.ok_or(StoreError::NotFound)?;
        self.db.set_message_body(seq, new_body)?;
        self.db.get_message(seq)?.ok_or(StoreError::NotFound)
    }

    /// Logically remove the message matching `ident`. The row is kept with
    /// its `deleted` flag set so a re-synced copy cannot resurrect it.
    pub fn delete(&self, ident: &MessageIdent) -> Result<(), StoreError> {
        let seq = self.db.locate_message(ident)?.ok_or(StoreError::NotFound)?;
        self.db.mark_message_deleted(seq)?;
        Ok(())
    }

    /// Purge every message of the unordered pair. Idempotent.
    pub fn delete_conversation(&self, a: &str, b: &str) -> Result<(), StoreError> {
        self.db.delete_conversation(a, b)?;
        Ok(())
    }

    /// The conversation between two usernames in append order, queried from
    /// either direction.
    pub fn conversation(&self, a: &str, b: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.db.get_conversation(a, b)?)
    }

    /// The full log in append order, logically deleted rows included.
    pub fn all_messages(&self) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.db.all_messages()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MessageStore {
        MessageStore::new(Arc::new(Database::open_in_memory().unwrap())).unwrap()
    }

    fn synced(sender: &str, receiver: &str, ts: i64, body: &str) -> SyncMessage {
        SyncMessage {
            id: None,
            sender: sender.into(),
            receiver: receiver.into(),
            body: body.into(),
            timestamp: ts,
            edited: false,
            deleted: false,
        }
    }

    #[test]
    fn append_is_visible_from_both_directions() {
        let store = store();
        let sent = store.append("alice", "bob", "hi").unwrap();

        let a_view = store.conversation("alice", "bob").unwrap();
        let b_view = store.conversation("bob", "alice").unwrap();
        assert_eq!(a_view.len(), 1);
        assert_eq!(b_view.len(), 1);
        assert_eq!(a_view[0].id, sent.id);
        assert_eq!(b_view[0].id, sent.id);
    }

    #[test]
    fn timestamps_never_decrease() {
        let store = store();
        // Pull the clock far into the future, then append normally.
        store.absorb(synced("alice", "bob", i64::MAX - 1000, "future")).unwrap();

        let next = store.append("alice", "bob", "now").unwrap();
        assert!(next.timestamp >= i64::MAX - 1000);
    }

    #[test]
    fn edit_by_id_sets_flag_and_keeps_identity() {
        let store = store();
        let sent = store.append("alice", "bob", "helo").unwrap();

        let ident = MessageIdent {
            id: Some(sent.id),
            sender: "alice".into(),
            receiver: "bob".into(),
            timestamp: None,
        };
        let updated = store.edit(&ident, "hello").unwrap();
        assert_eq!(updated.id, sent.id);
        assert_eq!(updated.timestamp, sent.timestamp);
        assert_eq!(updated.body, "hello");
        assert!(updated.edited);
    }

    #[test]
    fn edit_by_triple_hits_first_append_order_match() {
        let store = store();
        let first = store.absorb(synced("alice", "bob", 500, "one")).unwrap();
        let second = store.absorb(synced("alice", "bob", 500, "two")).unwrap();

        let ident = MessageIdent {
            id: None,
            sender: "alice".into(),
            receiver: "bob".into(),
            timestamp: Some(500),
        };
        store.edit(&ident, "edited").unwrap();

        let convo = store.conversation("alice", "bob").unwrap();
        let edited: Vec<_> = convo.iter().filter(|m| m.edited).collect();
        assert_eq!(edited.len(), 1);
        assert_eq!(edited[0].id, first.id);
        assert!(convo.iter().any(|m| m.id == second.id && !m.edited));
    }

    #[test]
    fn edit_missing_message_is_not_found() {
        let store = store();
        let ident = MessageIdent {
            id: None,
            sender: "alice".into(),
            receiver: "bob".into(),
            timestamp: Some(42),
        };
        assert!(matches!(store.edit(&ident, "x"), Err(StoreError::NotFound)));
        assert!(matches!(store.delete(&ident), Err(StoreError::NotFound)));
    }

    #[test]
    fn deleted_message_leaves_conversation_but_blocks_reuse() {
        let store = store();
        let sent = store.append("alice", "bob", "oops").unwrap();

        let ident = MessageIdent {
            id: Some(sent.id),
            sender: "alice".into(),
            receiver: "bob".into(),
            timestamp: None,
        };
        store.delete(&ident).unwrap();

        assert!(store.conversation("alice", "bob").unwrap().is_empty());
        // Deleting again: the row is tombstoned, not matchable.
        assert!(matches!(store.delete(&ident), Err(StoreError::NotFound)));
        // The identity is still held in the full log.
        assert_eq!(store.all_messages().unwrap().len(), 1);
    }

    #[test]
    fn delete_conversation_is_idempotent_and_symmetric() {
        let store = store();
        store.append("alice", "bob", "one").unwrap();
        store.append("bob", "alice", "two").unwrap();
        store.append("alice", "carol", "keep").unwrap();

        store.delete_conversation("bob", "alice").unwrap();
        assert!(store.conversation("alice", "bob").unwrap().is_empty());

        store.delete_conversation("bob", "alice").unwrap();
        assert!(store.conversation("alice", "bob").unwrap().is_empty());

        // Unrelated conversations are untouched.
        assert_eq!(store.conversation("alice", "carol").unwrap().len(), 1);
    }
}
