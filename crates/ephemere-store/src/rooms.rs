use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::StoredRoom;

impl Database {
    /// Insert or update a room record (upsert by room hash).
    pub fn upsert_room(&self, room: &StoredRoom) -> Result<()> {
        self.conn().execute(
            "INSERT INTO rooms (room_hash, secret, token, handle, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(room_hash) DO UPDATE SET
                 secret = excluded.secret,
                 token = excluded.token,
                 handle = excluded.handle",
            params![
                room.room_hash,
                room.secret,
                room.token,
                room.handle,
                room.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_room(&self, room_hash: &str) -> Result<Option<StoredRoom>> {
        let room = self
            .conn()
            .query_row(
                "SELECT room_hash, secret, token, handle, created_at
                 FROM rooms WHERE room_hash = ?1",
                params![room_hash],
                row_to_room,
            )
            .optional()?;
        Ok(room)
    }

    pub fn list_rooms(&self) -> Result<Vec<StoredRoom>> {
        let mut stmt = self.conn().prepare(
            "SELECT room_hash, secret, token, handle, created_at
             FROM rooms ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_room)?;

        let mut rooms = Vec::new();
        for row in rows {
            rooms.push(row?);
        }
        Ok(rooms)
    }

    /// Store (or clear) the participant token for a room.
    pub fn set_room_token(&self, room_hash: &str, token: Option<&str>) -> Result<()> {
        self.conn().execute(
            "UPDATE rooms SET token = ?2 WHERE room_hash = ?1",
            params![room_hash, token],
        )?;
        Ok(())
    }

    /// Store (or clear) the display handle for a room.
    pub fn set_room_handle(&self, room_hash: &str, handle: Option<&str>) -> Result<()> {
        self.conn().execute(
            "UPDATE rooms SET handle = ?2 WHERE room_hash = ?1",
            params![room_hash, handle],
        )?;
        Ok(())
    }

    /// Delete a room and, via the FK cascade, its message history.
    pub fn delete_room(&self, room_hash: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM rooms WHERE room_hash = ?1", params![room_hash])?;
        Ok(affected > 0)
    }
}

fn row_to_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRoom> {
    Ok(StoredRoom {
        room_hash: row.get(0)?,
        secret: row.get(1)?,
        token: row.get(2)?,
        handle: row.get(3)?,
        created_at: row.get(4)?,
    })
}
