//! v001 -- Initial schema creation.
//!
//! Creates the two client-side tables: `rooms` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Rooms the client knows about
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS rooms (
    room_hash  TEXT PRIMARY KEY NOT NULL,   -- hex SHA-256 room identifier
    secret     TEXT NOT NULL,               -- base64url room secret (share link)
    token      TEXT,                        -- participant bearer token, if admitted
    handle     TEXT,                        -- display handle used in this room
    created_at INTEGER NOT NULL             -- unix seconds
);

-- ----------------------------------------------------------------
-- Decrypted message history, local only
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id        TEXT PRIMARY KEY NOT NULL,    -- wire msg_id
    room_hash TEXT NOT NULL,                -- FK -> rooms(room_hash)
    timestamp INTEGER NOT NULL,             -- unix seconds
    content   TEXT NOT NULL,                -- decrypted display text
    kind      TEXT NOT NULL,                -- 'chat' | 'system'
    direction TEXT NOT NULL,                -- 'in' | 'out'
    from_hash TEXT,                         -- sender token hash, if attributed
    handle    TEXT,                         -- sender handle, if carried

    FOREIGN KEY (room_hash) REFERENCES rooms(room_hash) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_room_ts
    ON messages(room_hash, timestamp);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
