//! Server-side persistent store.
//!
//! Three tables, exactly the durable state the broker is allowed to hold:
//! `rooms`, `participants` (token hashes only, never raw tokens), and
//! `presence`. Foreign keys cascade so that disbanding a room removes all
//! of its participants and presence rows in one statement.
//!
//! Every time-dependent method takes an explicit unix-seconds timestamp;
//! callers supply the clock. The connection sits behind a mutex, which
//! also makes the purge-then-count liveness query one consistent unit.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::ServerError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS rooms (
    room_hash        TEXT PRIMARY KEY NOT NULL,
    created_at       INTEGER NOT NULL,
    last_activity_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS participants (
    token_hash TEXT PRIMARY KEY NOT NULL,   -- hex sha256 of the bearer token
    room_hash  TEXT NOT NULL,
    joined_at  INTEGER NOT NULL,

    FOREIGN KEY (room_hash) REFERENCES rooms(room_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_participants_room ON participants(room_hash);

CREATE TABLE IF NOT EXISTS presence (
    token_hash TEXT PRIMARY KEY NOT NULL,
    room_hash  TEXT NOT NULL,
    last_seen  INTEGER NOT NULL,

    FOREIGN KEY (token_hash) REFERENCES participants(token_hash) ON DELETE CASCADE,
    FOREIGN KEY (room_hash)  REFERENCES rooms(room_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_presence_room ON presence(room_hash);
"#;

/// Shared handle to the broker's SQLite database.
pub struct ServerStore {
    conn: Mutex<Connection>,
}

impl ServerStore {
    pub fn open_at(path: &Path) -> Result<Self, ServerError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .map_err(|e| ServerError::Internal(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, ServerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, ServerError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, ServerError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn).map_err(ServerError::from)
    }

    // ── rooms ──────────────────────────────────────────────────────────

    /// Create a room if it does not exist. Returns `true` when this call
    /// created it; a concurrent loser simply observes `false`.
    pub fn insert_room(&self, room_hash: &str, now: i64) -> Result<bool, ServerError> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "INSERT OR IGNORE INTO rooms (room_hash, created_at, last_activity_at)
                 VALUES (?1, ?2, ?3)",
                params![room_hash, now, now],
            )?;
            Ok(affected > 0)
        })
    }

    pub fn room_exists(&self, room_hash: &str) -> Result<bool, ServerError> {
        self.with_conn(|conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT room_hash FROM rooms WHERE room_hash = ?1",
                    params![room_hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    pub fn touch_room(&self, room_hash: &str, now: i64) -> Result<(), ServerError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE rooms SET last_activity_at = ?2 WHERE room_hash = ?1",
                params![room_hash, now],
            )?;
            Ok(())
        })
    }

    /// Delete a room; cascades to participants and presence. Idempotent.
    pub fn delete_room(&self, room_hash: &str) -> Result<bool, ServerError> {
        self.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM rooms WHERE room_hash = ?1", params![room_hash])?;
            Ok(affected > 0)
        })
    }

    // ── participants ───────────────────────────────────────────────────

    pub fn insert_participant(
        &self,
        token_hash: &str,
        room_hash: &str,
        now: i64,
    ) -> Result<(), ServerError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO participants (token_hash, room_hash, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![token_hash, room_hash, now],
            )?;
            Ok(())
        })
    }

    /// Membership check by token-hash equality, scoped to the room.
    pub fn participant_in_room(
        &self,
        token_hash: &str,
        room_hash: &str,
    ) -> Result<bool, ServerError> {
        self.with_conn(|conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT token_hash FROM participants
                     WHERE token_hash = ?1 AND room_hash = ?2",
                    params![token_hash, room_hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }

    // ── presence ───────────────────────────────────────────────────────

    pub fn upsert_presence(
        &self,
        token_hash: &str,
        room_hash: &str,
        now: i64,
    ) -> Result<(), ServerError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO presence (token_hash, room_hash, last_seen)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(token_hash) DO UPDATE SET last_seen = ?3",
                params![token_hash, room_hash, now],
            )?;
            Ok(())
        })
    }

    /// Purge every presence row older than `cutoff` (all rooms, lazy
    /// expiry), then count the remaining rows for one room. Runs under a
    /// single lock acquisition so the purge and the count are consistent.
    pub fn purge_and_count_presence(
        &self,
        room_hash: &str,
        cutoff: i64,
    ) -> Result<i64, ServerError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM presence WHERE last_seen < ?1", params![cutoff])?;
            conn.query_row(
                "SELECT COUNT(*) FROM presence
                 WHERE room_hash = ?1 AND last_seen >= ?2",
                params![room_hash, cutoff],
                |row| row.get(0),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ServerStore {
        ServerStore::open_in_memory().unwrap()
    }

    #[test]
    fn insert_room_once() {
        let s = store();
        assert!(s.insert_room("h1", 100).unwrap());
        assert!(!s.insert_room("h1", 200).unwrap());
        assert!(s.room_exists("h1").unwrap());
        assert!(!s.room_exists("h2").unwrap());
    }

    #[test]
    fn delete_room_cascades() {
        let s = store();
        s.insert_room("h1", 100).unwrap();
        s.insert_participant("t1", "h1", 100).unwrap();
        s.upsert_presence("t1", "h1", 100).unwrap();

        assert!(s.delete_room("h1").unwrap());
        assert!(!s.delete_room("h1").unwrap());
        assert!(!s.participant_in_room("t1", "h1").unwrap());
        assert_eq!(s.purge_and_count_presence("h1", 0).unwrap(), 0);
    }

    #[test]
    fn participant_scoped_to_room() {
        let s = store();
        s.insert_room("h1", 100).unwrap();
        s.insert_room("h2", 100).unwrap();
        s.insert_participant("t1", "h1", 100).unwrap();

        assert!(s.participant_in_room("t1", "h1").unwrap());
        assert!(!s.participant_in_room("t1", "h2").unwrap());
        assert!(!s.participant_in_room("t2", "h1").unwrap());
    }

    #[test]
    fn presence_upsert_refreshes() {
        let s = store();
        s.insert_room("h1", 0).unwrap();
        s.insert_participant("t1", "h1", 0).unwrap();

        s.upsert_presence("t1", "h1", 10).unwrap();
        s.upsert_presence("t1", "h1", 30).unwrap();

        // Window cutoff just below the refreshed last_seen keeps the row.
        assert_eq!(s.purge_and_count_presence("h1", 29).unwrap(), 1);
        // A cutoff beyond it purges.
        assert_eq!(s.purge_and_count_presence("h1", 31).unwrap(), 0);
    }

    #[test]
    fn purge_is_global_count_is_scoped() {
        let s = store();
        for h in ["h1", "h2"] {
            s.insert_room(h, 0).unwrap();
        }
        s.insert_participant("t1", "h1", 0).unwrap();
        s.insert_participant("t2", "h2", 0).unwrap();
        s.upsert_presence("t1", "h1", 5).unwrap();
        s.upsert_presence("t2", "h2", 100).unwrap();

        // Purging at cutoff 50 removes t1 (stale) everywhere, counts only h2.
        assert_eq!(s.purge_and_count_presence("h2", 50).unwrap(), 1);
        // t1 is gone even when querying its own room afterwards.
        assert_eq!(s.purge_and_count_presence("h1", 0).unwrap(), 0);
    }
}
