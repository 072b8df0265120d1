use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::{ChatMessage, Direction, MessageKind};

impl Database {
    /// Insert a message, ignoring duplicates by id (idempotent apply).
    ///
    /// Returns `true` if a new row was written.
    pub fn put_message(&self, message: &ChatMessage) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO messages
                 (id, room_hash, timestamp, content, kind, direction, from_hash, handle)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id,
                message.room_hash,
                message.timestamp,
                message.content,
                message.kind.as_str(),
                message.direction.as_str(),
                message.from_hash,
                message.handle,
            ],
        )?;
        Ok(affected > 0)
    }

    /// All messages for a room, ordered by timestamp ascending.
    pub fn messages_for_room(&self, room_hash: &str) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, room_hash, timestamp, content, kind, direction, from_hash, handle
             FROM messages
             WHERE room_hash = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![room_hash], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Wipe a room's local history without forgetting the room itself.
    pub fn clear_room_messages(&self, room_hash: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE room_hash = ?1",
            params![room_hash],
        )?;
        Ok(affected)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let kind: String = row.get(4)?;
    let direction: String = row.get(5)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        room_hash: row.get(1)?,
        timestamp: row.get(2)?,
        content: row.get(3)?,
        kind: MessageKind::from_str(&kind),
        direction: Direction::from_str(&direction),
        from_hash: row.get(6)?,
        handle: row.get(7)?,
    })
}
