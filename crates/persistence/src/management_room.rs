//! The `management_room` table: which bot owns which management room
//! (§4.5), grounded on `database/managementroom.go`'s three queries.

use crate::error::PersistenceError;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use std::sync::Mutex;
use warden_core::identity::RoomId;

/// Contract for the management-room table: upsert, list by bot, list by room.
#[async_trait]
pub trait ManagementRoomStore: Send + Sync {
    /// Insert or update the bot owning `room_id`.
    async fn put(&self, room_id: &RoomId, bot_username: &str) -> Result<(), PersistenceError>;

    /// Every room managed by `bot_username`.
    async fn get_all_by_bot(&self, bot_username: &str) -> Result<Vec<RoomId>, PersistenceError>;

    /// Every bot username that manages `room_id` (normally at most one).
    async fn get_all_by_room(&self, room_id: &RoomId) -> Result<Vec<String>, PersistenceError>;
}

/// `sqlx`-backed implementation over a SQLite pool.
pub struct SqlxManagementRoomStore {
    pool: SqlitePool,
}

impl SqlxManagementRoomStore {
    /// Wrap an already-connected pool. Callers run [`Self::migrate`] once
    /// before first use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `management_room` table if it does not already exist.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS management_room (
                room_id TEXT PRIMARY KEY,
                bot_username TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ManagementRoomStore for SqlxManagementRoomStore {
    async fn put(&self, room_id: &RoomId, bot_username: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO management_room (room_id, bot_username) VALUES (?1, ?2)
             ON CONFLICT(room_id) DO UPDATE SET bot_username = excluded.bot_username",
        )
        .bind(room_id.as_str())
        .bind(bot_username)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_all_by_bot(&self, bot_username: &str) -> Result<Vec<RoomId>, PersistenceError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT room_id FROM management_room WHERE bot_username = ?1")
                .bind(bot_username)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(room_id,)| RoomId::from(room_id)).collect())
    }

    async fn get_all_by_room(&self, room_id: &RoomId) -> Result<Vec<String>, PersistenceError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT bot_username FROM management_room WHERE room_id = ?1")
                .bind(room_id.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(username,)| username).collect())
    }
}

/// In-memory implementation used by tests and by the evaluator/registry
/// test fixtures that don't want a database.
#[derive(Default)]
pub struct InMemoryManagementRoomStore {
    rows: Mutex<HashMap<RoomId, String>>,
}

impl InMemoryManagementRoomStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManagementRoomStore for InMemoryManagementRoomStore {
    async fn put(&self, room_id: &RoomId, bot_username: &str) -> Result<(), PersistenceError> {
        self.rows.lock().unwrap().insert(room_id.clone(), bot_username.to_string());
        Ok(())
    }

    async fn get_all_by_bot(&self, bot_username: &str) -> Result<Vec<RoomId>, PersistenceError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, owner)| owner.as_str() == bot_username)
            .map(|(room, _)| room.clone())
            .collect())
    }

    async fn get_all_by_room(&self, room_id: &RoomId) -> Result<Vec<String>, PersistenceError> {
        Ok(self.rows.lock().unwrap().get(room_id).cloned().into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_lookup_by_bot_and_room() {
        let store = InMemoryManagementRoomStore::new();
        let room = RoomId::from("!mgmt:example.org");
        store.put(&room, "@bot1:example.org").await.unwrap();

        assert_eq!(store.get_all_by_bot("@bot1:example.org").await.unwrap(), vec![room.clone()]);
        assert_eq!(store.get_all_by_room(&room).await.unwrap(), vec!["@bot1:example.org".to_string()]);
    }

    #[tokio::test]
    async fn put_overwrites_owning_bot() {
        let store = InMemoryManagementRoomStore::new();
        let room = RoomId::from("!mgmt:example.org");
        store.put(&room, "@bot1:example.org").await.unwrap();
        store.put(&room, "@bot2:example.org").await.unwrap();

        assert_eq!(store.get_all_by_room(&room).await.unwrap(), vec!["@bot2:example.org".to_string()]);
        assert!(store.get_all_by_bot("@bot1:example.org").await.unwrap().is_empty());
    }
}
