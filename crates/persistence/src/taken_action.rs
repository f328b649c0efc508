//! The `taken_action` table: a durable receipt of enforcement actions this
//! deployment has performed (§3 "TakenAction", §4.2).

use crate::error::PersistenceError;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::sync::Mutex;
use warden_core::identity::{RoomId, UserId};

/// The kind of enforcement action recorded. Only `Ban` is produced today;
/// the column is a string so a future recommendation kind doesn't need a
/// schema migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// A ban issued on behalf of a rule.
    Ban,
}

impl ActionKind {
    fn as_str(self) -> &'static str {
        match self {
            ActionKind::Ban => "ban",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ban" => Some(ActionKind::Ban),
            _ => None,
        }
    }
}

/// A durable record of one enforcement action taken by this evaluator.
#[derive(Debug, Clone)]
pub struct TakenAction {
    /// The user the action targeted.
    pub target_user: UserId,
    /// The policy-list room the winning rule came from.
    pub source_list: RoomId,
    /// The winning rule's entity pattern, as written.
    pub rule_entity: String,
    /// What kind of action this is.
    pub action_kind: ActionKind,
    /// When the action was taken, milliseconds since epoch.
    pub taken_at_ms: u64,
    /// Protected rooms the action was applied in.
    pub protected_rooms_affected: Vec<RoomId>,
}

/// Contract for the taken-action table, per §4.2.
#[async_trait]
pub trait TakenActionStore: Send + Sync {
    /// Append a new action record. Must be transactional: either the full
    /// record lands or none of it does.
    async fn put(&self, action: &TakenAction) -> Result<(), PersistenceError>;

    /// Every action taken on behalf of `entity` in `list_room`.
    async fn get_all_by_rule_entity(
        &self,
        list_room: &RoomId,
        entity: &str,
    ) -> Result<Vec<TakenAction>, PersistenceError>;

    /// Every action taken on behalf of any rule in `list_room`.
    async fn get_all_by_policy_list(&self, list_room: &RoomId) -> Result<Vec<TakenAction>, PersistenceError>;

    /// Every action ever taken against `target`, across every list. Not one
    /// of §4.2's original four queries; the evaluator's unban-cancellation
    /// path (§4.3 ApplyPolicy) needs to find a previously-taken ban by
    /// target alone, since an unban rule's source list is rarely the list
    /// that issued the ban it is meant to cancel.
    async fn get_all_by_target(&self, target: &UserId) -> Result<Vec<TakenAction>, PersistenceError>;

    /// Remove the action record for `(target, list_room, entity)`, once the
    /// corresponding unban has been issued.
    async fn delete(&self, target: &UserId, list_room: &RoomId, entity: &str) -> Result<(), PersistenceError>;
}

/// `sqlx`-backed implementation over a SQLite pool.
pub struct SqlxTakenActionStore {
    pool: SqlitePool,
}

impl SqlxTakenActionStore {
    /// Wrap an already-connected pool. Callers run [`Self::migrate`] once
    /// before first use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `taken_action` table if it does not already exist.
    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS taken_action (
                target_user TEXT NOT NULL,
                source_list TEXT NOT NULL,
                rule_entity TEXT NOT NULL,
                action_kind TEXT NOT NULL,
                taken_at_ms INTEGER NOT NULL,
                protected_rooms_affected TEXT NOT NULL,
                PRIMARY KEY (target_user, source_list, rule_entity)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS taken_action_by_list ON taken_action (source_list)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_action(
    target_user: String,
    source_list: String,
    rule_entity: String,
    action_kind: String,
    taken_at_ms: i64,
    protected_rooms_affected: String,
) -> Result<TakenAction, PersistenceError> {
    let rooms: Vec<String> = serde_json::from_str(&protected_rooms_affected)?;
    Ok(TakenAction {
        target_user: UserId::from(target_user),
        source_list: RoomId::from(source_list),
        rule_entity,
        action_kind: ActionKind::parse(&action_kind).unwrap_or(ActionKind::Ban),
        taken_at_ms: taken_at_ms as u64,
        protected_rooms_affected: rooms.into_iter().map(RoomId::from).collect(),
    })
}

#[async_trait]
impl TakenActionStore for SqlxTakenActionStore {
    async fn put(&self, action: &TakenAction) -> Result<(), PersistenceError> {
        let rooms = serde_json::to_string(
            &action.protected_rooms_affected.iter().map(RoomId::as_str).collect::<Vec<_>>(),
        )?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO taken_action
                (target_user, source_list, rule_entity, action_kind, taken_at_ms, protected_rooms_affected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(target_user, source_list, rule_entity) DO UPDATE SET
                action_kind = excluded.action_kind,
                taken_at_ms = excluded.taken_at_ms,
                protected_rooms_affected = excluded.protected_rooms_affected",
        )
        .bind(action.target_user.as_str())
        .bind(action.source_list.as_str())
        .bind(&action.rule_entity)
        .bind(action.action_kind.as_str())
        .bind(action.taken_at_ms as i64)
        .bind(rooms)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_all_by_rule_entity(
        &self,
        list_room: &RoomId,
        entity: &str,
    ) -> Result<Vec<TakenAction>, PersistenceError> {
        let rows: Vec<(String, String, String, String, i64, String)> = sqlx::query_as(
            "SELECT target_user, source_list, rule_entity, action_kind, taken_at_ms, protected_rooms_affected
             FROM taken_action WHERE source_list = ?1 AND rule_entity = ?2",
        )
        .bind(list_room.as_str())
        .bind(entity)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(u, l, e, k, t, r)| row_to_action(u, l, e, k, t, r))
            .collect()
    }

    async fn get_all_by_policy_list(&self, list_room: &RoomId) -> Result<Vec<TakenAction>, PersistenceError> {
        let rows: Vec<(String, String, String, String, i64, String)> = sqlx::query_as(
            "SELECT target_user, source_list, rule_entity, action_kind, taken_at_ms, protected_rooms_affected
             FROM taken_action WHERE source_list = ?1",
        )
        .bind(list_room.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(u, l, e, k, t, r)| row_to_action(u, l, e, k, t, r))
            .collect()
    }

    async fn get_all_by_target(&self, target: &UserId) -> Result<Vec<TakenAction>, PersistenceError> {
        let rows: Vec<(String, String, String, String, i64, String)> = sqlx::query_as(
            "SELECT target_user, source_list, rule_entity, action_kind, taken_at_ms, protected_rooms_affected
             FROM taken_action WHERE target_user = ?1",
        )
        .bind(target.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(u, l, e, k, t, r)| row_to_action(u, l, e, k, t, r))
            .collect()
    }

    async fn delete(&self, target: &UserId, list_room: &RoomId, entity: &str) -> Result<(), PersistenceError> {
        sqlx::query(
            "DELETE FROM taken_action WHERE target_user = ?1 AND source_list = ?2 AND rule_entity = ?3",
        )
        .bind(target.as_str())
        .bind(list_room.as_str())
        .bind(entity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory implementation used by tests.
#[derive(Default)]
pub struct InMemoryTakenActionStore {
    rows: Mutex<Vec<TakenAction>>,
}

impl InMemoryTakenActionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn identity_matches(action: &TakenAction, target: &UserId, list_room: &RoomId, entity: &str) -> bool {
    &action.target_user == target && &action.source_list == list_room && action.rule_entity == entity
}

#[async_trait]
impl TakenActionStore for InMemoryTakenActionStore {
    async fn put(&self, action: &TakenAction) -> Result<(), PersistenceError> {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|existing| {
            !identity_matches(existing, &action.target_user, &action.source_list, &action.rule_entity)
        });
        rows.push(action.clone());
        Ok(())
    }

    async fn get_all_by_rule_entity(
        &self,
        list_room: &RoomId,
        entity: &str,
    ) -> Result<Vec<TakenAction>, PersistenceError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|a| &a.source_list == list_room && a.rule_entity == entity)
            .cloned()
            .collect())
    }

    async fn get_all_by_policy_list(&self, list_room: &RoomId) -> Result<Vec<TakenAction>, PersistenceError> {
        Ok(self.rows.lock().unwrap().iter().filter(|a| &a.source_list == list_room).cloned().collect())
    }

    async fn get_all_by_target(&self, target: &UserId) -> Result<Vec<TakenAction>, PersistenceError> {
        Ok(self.rows.lock().unwrap().iter().filter(|a| &a.target_user == target).cloned().collect())
    }

    async fn delete(&self, target: &UserId, list_room: &RoomId, entity: &str) -> Result<(), PersistenceError> {
        self.rows.lock().unwrap().retain(|a| !identity_matches(a, target, list_room, entity));
        Ok(())
    }
}
