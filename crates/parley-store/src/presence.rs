use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use parley_db::Database;
use parley_types::events::GatewayEvent;
use parley_types::models::{PresenceEntry, PresenceStatus};

/// Identifies one live WebSocket connection. A fresh id is minted per
/// registration so duplicate close notifications and takeovers by a newer
/// connection can be told apart.
pub type ConnectionId = Uuid;

pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;

struct Slot {
    entry: PresenceEntry,
    /// Present iff the entry is online.
    handle: Option<(ConnectionId, EventSender)>,
}

struct RegistryInner {
    by_username: HashMap<String, Slot>,
    /// Reverse index for disconnect teardown, maintained in the same
    /// mutation path as `by_username`.
    by_connection: HashMap<ConnectionId, String>,
}

/// Maps usernames to live connections and online/offline status. Entries
/// are never deleted; an offline entry keeps the time the user was last
/// seen. Every mutation is written through to the durable store before the
/// call returns; write failures are logged and the in-memory state stays
/// authoritative.
pub struct PresenceRegistry {
    inner: RwLock<RegistryInner>,
    db: Arc<Database>,
}

impl PresenceRegistry {
    /// Load persisted presence. Nobody is connected at startup, so every
    /// restored entry comes back offline with its last-seen time intact.
    pub fn new(db: Arc<Database>) -> anyhow::Result<Self> {
        let mut by_username = HashMap::new();
        for mut entry in db.load_presence()? {
            entry.status = PresenceStatus::Offline;
            by_username.insert(entry.username.clone(), Slot { entry, handle: None });
        }

        Ok(Self {
            inner: RwLock::new(RegistryInner {
                by_username,
                by_connection: HashMap::new(),
            }),
            db,
        })
    }

    /// Bring a username online under a fresh connection. Returns the
    /// connection id and the receiving end of the connection's event
    /// channel. A stale connection under the same username is overwritten —
    /// only the latest registration is authoritative.
    pub fn register(&self, username: &str) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let now = now_ms();

        let entry = {
            let mut guard = self.inner.write().expect("presence lock poisoned");
            let RegistryInner { by_username, by_connection } = &mut *guard;

            let slot = by_username
                .entry(username.to_string())
                .or_insert_with(|| Slot {
                    entry: PresenceEntry {
                        username: username.to_string(),
                        status: PresenceStatus::Offline,
                        last_change: now,
                    },
                    handle: None,
                });

            if let Some((stale, _)) = slot.handle.take() {
                by_connection.remove(&stale);
            }

            slot.handle = Some((conn_id, tx));
            slot.entry.status = PresenceStatus::Online;
            slot.entry.last_change = now;
            by_connection.insert(conn_id, username.to_string());
            slot.entry.clone()
        };

        self.persist(&entry);
        (conn_id, rx)
    }

    /// Flip the entry owned by `conn_id` to offline. A no-op when the id is
    /// unknown or a newer connection has already taken the username over,
    /// so duplicate socket-close notifications are harmless.
    pub fn mark_offline(&self, conn_id: ConnectionId) {
        let entry = {
            let mut guard = self.inner.write().expect("presence lock poisoned");
            let RegistryInner { by_username, by_connection } = &mut *guard;

            let Some(username) = by_connection.remove(&conn_id) else {
                return;
            };
            let Some(slot) = by_username.get_mut(&username) else {
                return;
            };

            slot.handle = None;
            slot.entry.status = PresenceStatus::Offline;
            slot.entry.last_change = now_ms();
            slot.entry.clone()
        };

        self.persist(&entry);
    }

    /// Create an offline entry on first reference (account registration,
    /// login, or a status query for a username that never connected).
    /// Leaves a live connection untouched.
    pub fn ensure_entry(&self, username: &str) -> PresenceEntry {
        let (entry, created) = {
            let mut guard = self.inner.write().expect("presence lock poisoned");
            match guard.by_username.get(username) {
                Some(slot) => (slot.entry.clone(), false),
                None => {
                    let entry = PresenceEntry {
                        username: username.to_string(),
                        status: PresenceStatus::Offline,
                        last_change: now_ms(),
                    };
                    guard.by_username.insert(
                        username.to_string(),
                        Slot { entry: entry.clone(), handle: None },
                    );
                    (entry, true)
                }
            }
        };

        if created {
            self.persist(&entry);
        }
        entry
    }

    pub fn lookup(&self, username: &str) -> Option<PresenceEntry> {
        let guard = self.inner.read().expect("presence lock poisoned");
        guard.by_username.get(username).map(|slot| slot.entry.clone())
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.lookup(username)
            .map(|entry| entry.is_online())
            .unwrap_or(false)
    }

    /// The live event channel for a username, if it is online.
    pub fn sender_for(&self, username: &str) -> Option<EventSender> {
        let guard = self.inner.read().expect("presence lock poisoned");
        guard
            .by_username
            .get(username)
            .and_then(|slot| slot.handle.as_ref())
            .map(|(_, tx)| tx.clone())
    }

    /// Snapshot of every entry, ordered by username.
    pub fn entries(&self) -> Vec<PresenceEntry> {
        let guard = self.inner.read().expect("presence lock poisoned");
        let mut entries: Vec<PresenceEntry> = guard
            .by_username
            .values()
            .map(|slot| slot.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.username.cmp(&b.username));
        entries
    }

    /// Accept a merged presence entry from the sync reconciler. A username
    /// with a live connection is skipped — the connection, not the client's
    /// offline snapshot, is authoritative for live routing.
    pub fn absorb(&self, entry: PresenceEntry) {
        let absorbed = {
            let mut guard = self.inner.write().expect("presence lock poisoned");
            match guard.by_username.get_mut(&entry.username) {
                Some(slot) if slot.handle.is_some() => None,
                Some(slot) => {
                    slot.entry = entry.clone();
                    Some(entry)
                }
                None => {
                    guard.by_username.insert(
                        entry.username.clone(),
                        Slot { entry: entry.clone(), handle: None },
                    );
                    Some(entry)
                }
            }
        };

        if let Some(entry) = absorbed {
            self.persist(&entry);
        }
    }

    fn persist(&self, entry: &PresenceEntry) {
        if let Err(e) = self.db.upsert_presence(entry) {
            warn!("Failed to persist presence for {}: {}", entry.username, e);
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(Arc::new(Database::open_in_memory().unwrap())).unwrap()
    }

    #[test]
    fn register_then_offline_then_reregister() {
        let reg = registry();

        let (conn, _rx) = reg.register("alice");
        assert!(reg.is_online("alice"));

        reg.mark_offline(conn);
        assert!(!reg.is_online("alice"));
        // Entry survives going offline, only the handle is gone.
        assert!(reg.lookup("alice").is_some());

        let (_conn2, _rx2) = reg.register("alice");
        assert!(reg.is_online("alice"));
    }

    #[test]
    fn mark_offline_is_idempotent() {
        let reg = registry();
        let (conn, _rx) = reg.register("alice");

        reg.mark_offline(conn);
        reg.mark_offline(conn);
        reg.mark_offline(Uuid::new_v4()); // unknown id

        assert!(!reg.is_online("alice"));
    }

    #[test]
    fn newer_registration_overwrites_stale_connection() {
        let reg = registry();

        let (old_conn, _old_rx) = reg.register("alice");
        let (_new_conn, _new_rx) = reg.register("alice");

        // The stale connection no longer owns the entry; its close event
        // must not knock the new session offline.
        reg.mark_offline(old_conn);
        assert!(reg.is_online("alice"));
    }

    #[test]
    fn ensure_entry_does_not_touch_live_connection() {
        let reg = registry();

        let first = reg.ensure_entry("carol");
        assert_eq!(first.status, PresenceStatus::Offline);

        let (_conn, _rx) = reg.register("carol");
        let again = reg.ensure_entry("carol");
        assert!(again.is_online());
    }

    #[test]
    fn sender_for_requires_online() {
        let reg = registry();
        assert!(reg.sender_for("alice").is_none());

        let (conn, mut rx) = reg.register("alice");
        let tx = reg.sender_for("alice").unwrap();
        tx.send(GatewayEvent::Ready { username: "alice".into() }).unwrap();
        assert!(matches!(rx.try_recv(), Ok(GatewayEvent::Ready { .. })));

        reg.mark_offline(conn);
        assert!(reg.sender_for("alice").is_none());
    }

    #[test]
    fn absorb_skips_live_connections() {
        let reg = registry();
        let (_conn, _rx) = reg.register("alice");

        reg.absorb(PresenceEntry {
            username: "alice".into(),
            status: PresenceStatus::Offline,
            last_change: 1,
        });
        assert!(reg.is_online("alice"));

        reg.absorb(PresenceEntry {
            username: "dave".into(),
            status: PresenceStatus::Offline,
            last_change: 7,
        });
        assert_eq!(reg.lookup("dave").unwrap().last_change, 7);
    }

    #[test]
    fn registry_reloads_persisted_entries_offline() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        {
            let reg = PresenceRegistry::new(db.clone()).unwrap();
            let (_conn, _rx) = reg.register("alice");
            assert!(reg.is_online("alice"));
        }

        // A fresh registry over the same store: alice is known but offline.
        let reg = PresenceRegistry::new(db).unwrap();
        let entry = reg.lookup("alice").unwrap();
        assert_eq!(entry.status, PresenceStatus::Offline);
    }
}
