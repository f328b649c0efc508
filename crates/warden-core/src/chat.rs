//! Contracts for the external collaborators named in §6: the upstream
//! homeserver client and the end-to-end-encryption helper. Only the
//! interfaces are specified here — implementations live outside this
//! workspace.

use crate::event::MemberState;
use crate::identity::UserId;
use crate::identity::RoomId;
use crate::rule::EntityKind;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors a `ChatClient` call can fail with, classified per §7.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Network/server hiccup; callers retry with backoff.
    #[error("transient homeserver error: {0}")]
    Transient(String),
    /// The bot lacks permission to perform the action.
    #[error("permission error: {0}")]
    Permission(String),
    /// The bot is not joined to the room in question.
    #[error("bot not in room: {0}")]
    NotInRoom(String),
    /// Anything else the client surfaced.
    #[error("homeserver error: {0}")]
    Other(String),
}

/// A room member as returned by `ChatClient::members`.
#[derive(Debug, Clone)]
pub struct RoomMember {
    /// The member's user id.
    pub user_id: UserId,
    /// Their current membership state.
    pub membership: MemberState,
}

/// A minimal view of `m.room.power_levels` content: just enough for the
/// protection-claim protocol (§4.3.1) to compute `ownLevel`/`minLevel`.
#[derive(Debug, Clone, Default)]
pub struct PowerLevels {
    /// Per-user overrides.
    pub users: HashMap<UserId, i64>,
    /// Default level for users not in `users`.
    pub users_default: i64,
    /// Level required to ban.
    pub ban: i64,
    /// Level required to redact.
    pub redact: i64,
}

impl PowerLevels {
    /// The effective power level of `user` in this room.
    pub fn level_of(&self, user: &UserId) -> i64 {
        self.users.get(user).copied().unwrap_or(self.users_default)
    }

    /// `max(ban, redact)`, the minimum level §4.3.1 requires to protect a room.
    pub fn min_enforcement_level(&self) -> i64 {
        self.ban.max(self.redact)
    }
}

/// A policy-rule state event as read directly off room state (rather than
/// from the live event stream), used to back-fill a newly-watched list.
#[derive(Debug, Clone)]
pub struct RawPolicyRule {
    /// Which entity kind this rule's event type carries.
    pub kind: EntityKind,
    /// The state key identifying the rule within its room.
    pub state_key: String,
    /// Raw state content.
    pub content: Value,
    /// The event id that introduced this rule's current content.
    pub event_id: String,
    /// The sender of that event.
    pub sender: UserId,
    /// Origin-server timestamp, milliseconds since epoch.
    pub timestamp_ms: u64,
}

/// The subset of the homeserver client the core engine needs: room joins,
/// state reads, member listings, bans, redactions (§6).
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// This client's own (bot) user id.
    fn own_user_id(&self) -> &UserId;

    /// Join a room the bot has been invited to.
    async fn join_room_by_id(&self, room: &RoomId) -> Result<(), ChatError>;

    /// List rooms the bot currently occupies.
    async fn joined_rooms(&self) -> Result<Vec<RoomId>, ChatError>;

    /// Read `m.room.power_levels` for a room.
    async fn power_levels(&self, room: &RoomId) -> Result<PowerLevels, ChatError>;

    /// List current members of a room.
    async fn members(&self, room: &RoomId) -> Result<Vec<RoomMember>, ChatError>;

    /// Read every live policy-rule state event in `room`, across all
    /// recognized type aliases, for back-filling a newly-watched list.
    async fn policy_rules(&self, room: &RoomId) -> Result<Vec<RawPolicyRule>, ChatError>;

    /// Ban `user` from `room`, citing `reason`.
    async fn ban(&self, room: &RoomId, user: &UserId, reason: &str) -> Result<(), ChatError>;

    /// Unban `user` from `room`.
    async fn unban(&self, room: &RoomId, user: &UserId) -> Result<(), ChatError>;

    /// Send a human-readable notice to a management room.
    async fn send_notice(&self, room: &RoomId, text: &str) -> Result<(), ChatError>;
}

/// Errors from the end-to-end-encryption helper.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No megolm session is available yet to decrypt this event.
    #[error("no session found")]
    NoSessionFound,
    /// Decryption failed for a reason other than a missing session.
    #[error("decrypt failed: {0}")]
    DecryptFailed(String),
}

/// The per-bot crypto helper: one instance per bot, created at bot startup
/// (§C / Open Question (a)), not per encrypted event.
#[async_trait]
pub trait CryptoHelper: Send + Sync {
    /// Attempt to decrypt `content` from `event_id` in `room`.
    async fn decrypt(
        &self,
        room: &RoomId,
        event_id: &str,
        content: &Value,
    ) -> Result<Value, CryptoError>;

    /// Block until a room key for `session_id` arrives, or `timeout` elapses.
    /// Returns whether a key arrived in time.
    async fn wait_for_session(&self, room: &RoomId, session_id: &str, timeout: Duration) -> bool;

    /// Request the missing session from `sender`'s devices.
    async fn request_session(&self, room: &RoomId, session_id: &str, sender: &UserId);
}
