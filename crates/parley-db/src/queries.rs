use crate::Database;
use crate::models::UserRow;
use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use parley_types::models::{ChatMessage, MessageIdent, PresenceEntry, PresenceStatus};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &ChatMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender, receiver, body, ts, edited, deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    msg.id.to_string(),
                    msg.sender,
                    msg.receiver,
                    msg.body,
                    msg.timestamp,
                    msg.edited,
                    msg.deleted
                ],
            )?;
            Ok(())
        })
    }

    /// Largest timestamp ever assigned, 0 for an empty log. Seeds the
    /// store's monotonic clock on startup.
    pub fn max_timestamp(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let ts: i64 =
                conn.query_row("SELECT COALESCE(MAX(ts), 0) FROM messages", [], |row| {
                    row.get(0)
                })?;
            Ok(ts)
        })
    }

    /// Locate the single message an edit/delete should affect. The uuid wins
    /// when present; otherwise the `(sender, receiver, timestamp)` triple is
    /// matched and the earliest message in append order is chosen.
    pub fn locate_message(&self, ident: &MessageIdent) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let seq = if let Some(id) = ident.id {
                conn.query_row(
                    "SELECT seq FROM messages WHERE id = ?1 AND deleted = 0",
                    [id.to_string()],
                    |row| row.get(0),
                )
                .optional()?
            } else if let Some(ts) = ident.timestamp {
                conn.query_row(
                    "SELECT seq FROM messages
                     WHERE sender = ?1 AND receiver = ?2 AND ts = ?3 AND deleted = 0
                     ORDER BY seq LIMIT 1",
                    rusqlite::params![ident.sender, ident.receiver, ts],
                    |row| row.get(0),
                )
                .optional()?
            } else {
                None
            };
            Ok(seq)
        })
    }

    pub fn get_message(&self, seq: i64) -> Result<Option<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE seq = ?1"
            ))?;
            let row = stmt.query_row([seq], message_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn set_message_body(&self, seq: i64, body: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET body = ?1, edited = 1 WHERE seq = ?2",
                rusqlite::params![body, seq],
            )?;
            Ok(())
        })
    }

    pub fn mark_message_deleted(&self, seq: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE messages SET deleted = 1 WHERE seq = ?1", [seq])?;
            Ok(())
        })
    }

    /// Purge every message of the unordered `{a, b}` pair, in both
    /// directions. Idempotent.
    pub fn delete_conversation(&self, a: &str, b: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM messages
                 WHERE (sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1)",
                rusqlite::params![a, b],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE ((sender = ?1 AND receiver = ?2) OR (sender = ?2 AND receiver = ?1))
                   AND deleted = 0
                 ORDER BY seq"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![a, b], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The full message log in append order, logically deleted rows
    /// included (sync dedup needs their identities).
    pub fn all_messages(&self) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY seq"
            ))?;
            let rows = stmt
                .query_map([], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Presence --

    pub fn upsert_presence(&self, entry: &PresenceEntry) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO presence (username, online, last_change) VALUES (?1, ?2, ?3)
                 ON CONFLICT(username) DO UPDATE SET
                     online = excluded.online,
                     last_change = excluded.last_change",
                rusqlite::params![entry.username, entry.is_online(), entry.last_change],
            )?;
            Ok(())
        })
    }

    pub fn load_presence(&self) -> Result<Vec<PresenceEntry>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT username, online, last_change FROM presence ORDER BY username")?;
            let rows = stmt
                .query_map([], |row| {
                    let online: bool = row.get(1)?;
                    Ok(PresenceEntry {
                        username: row.get(0)?,
                        status: if online {
                            PresenceStatus::Online
                        } else {
                            PresenceStatus::Offline
                        },
                        last_change: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, sender, receiver, body, ts, edited, deleted";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let id: String = row.get(0)?;
    Ok(ChatMessage {
        id: parse_uuid(&id),
        sender: row.get(1)?,
        receiver: row.get(2)?,
        body: row.get(3)?,
        timestamp: row.get(4)?,
        edited: row.get(5)?,
        deleted: row.get(6)?,
    })
}

fn parse_uuid(id: &str) -> Uuid {
    id.parse().unwrap_or_else(|e| {
        warn!("Corrupt message id '{}': {}", id, e);
        Uuid::default()
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
