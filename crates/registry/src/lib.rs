//! The process-wide registry (§9 "Global registry"): the bot identity map
//! and the protected-room claim map. Both are initialized once at startup
//! and torn down at shutdown; access is always under the registry lock
//! (here, `DashMap`'s per-shard locking stands in for that single lock,
//! matching `crates/orchestrator`'s `DashMap`-based `RunIndex`).

#![deny(unsafe_code)]

use dashmap::DashMap;
use std::sync::Arc;
use warden_core::chat::{ChatClient, CryptoHelper};
use warden_core::identity::{RoomId, UserId};

/// Anything that can hold the process-wide claim on a protected room.
///
/// Defined here, not in `evaluator`, so this crate never depends on
/// `evaluator` (§9: "do not introduce a back-reference from store to
/// evaluators"). `PolicyEvaluator` implements this trait.
pub trait Claimant: Send + Sync {
    /// The management room this claimant belongs to, used only for
    /// diagnostics (claim identity itself is by `Arc` pointer).
    fn management_room_id(&self) -> &RoomId;
}

/// The result of a claim attempt.
pub enum ClaimOutcome {
    /// The caller now holds the claim (freshly, or it already did).
    Claimed,
    /// Another evaluator holds the claim.
    HeldByOther(Arc<dyn Claimant>),
}

/// The process-wide protected-room -> claimant map (§3 "Protection claim").
#[derive(Default)]
pub struct ProtectionClaims {
    claims: DashMap<RoomId, Arc<dyn Claimant>>,
}

impl ProtectionClaims {
    /// An empty claim map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to claim `room` for `claimant`. Re-claiming a room the same
    /// claimant already holds is a no-op that returns `Claimed`.
    pub fn try_claim(&self, room: &RoomId, claimant: Arc<dyn Claimant>) -> ClaimOutcome {
        match self.claims.entry(room.clone()) {
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(claimant);
                ClaimOutcome::Claimed
            }
            dashmap::mapref::entry::Entry::Occupied(slot) => {
                if Arc::ptr_eq(slot.get(), &claimant) {
                    ClaimOutcome::Claimed
                } else {
                    ClaimOutcome::HeldByOther(slot.get().clone())
                }
            }
        }
    }

    /// Release `room`'s claim, but only if `claimant` is the current holder.
    pub fn release(&self, room: &RoomId, claimant: &Arc<dyn Claimant>) {
        if let Some(entry) = self.claims.get(room) {
            if !Arc::ptr_eq(entry.value(), claimant) {
                tracing::warn!(room = room.as_str(), "release called by non-owning claimant, ignoring");
                return;
            }
        } else {
            return;
        }
        self.claims.remove(room);
    }

    /// The current claimant of `room`, if any.
    pub fn claimant_of(&self, room: &RoomId) -> Option<Arc<dyn Claimant>> {
        self.claims.get(room).map(|entry| entry.value().clone())
    }
}

/// Everything the dispatcher and evaluator need to act as one bot.
#[derive(Clone)]
pub struct BotRecord {
    /// The homeserver client for this bot.
    pub chat_client: Arc<dyn ChatClient>,
    /// The end-to-end-encryption helper for this bot, created once at
    /// startup (§C, Open Question (a)).
    pub crypto_helper: Arc<dyn CryptoHelper>,
    /// If set, enforcement calls are logged but not issued.
    pub dry_run: bool,
    /// The management room this bot answers to.
    pub management_room: RoomId,
}

/// The process-wide bot identity -> bot record map.
#[derive(Default)]
pub struct BotRegistry {
    bots: DashMap<UserId, BotRecord>,
}

impl BotRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the record for `user_id`.
    pub fn register(&self, user_id: UserId, record: BotRecord) {
        self.bots.insert(user_id, record);
    }

    /// Look up a bot's record by its user id.
    pub fn get(&self, user_id: &UserId) -> Option<BotRecord> {
        self.bots.get(user_id).map(|entry| entry.value().clone())
    }

    /// Remove a bot's record, e.g. when its management room is left.
    pub fn remove(&self, user_id: &UserId) {
        self.bots.remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use warden_core::chat::{ChatError, CryptoError, PowerLevels, RoomMember};
    use serde_json::Value;

    struct FakeClaimant(RoomId);

    impl Claimant for FakeClaimant {
        fn management_room_id(&self) -> &RoomId {
            &self.0
        }
    }

    struct FakeChatClient;

    #[async_trait]
    impl ChatClient for FakeChatClient {
        fn own_user_id(&self) -> &UserId {
            unimplemented!("not exercised in these tests")
        }
        async fn join_room_by_id(&self, _room: &RoomId) -> Result<(), ChatError> {
            Ok(())
        }
        async fn joined_rooms(&self) -> Result<Vec<RoomId>, ChatError> {
            Ok(Vec::new())
        }
        async fn power_levels(&self, _room: &RoomId) -> Result<PowerLevels, ChatError> {
            Ok(PowerLevels::default())
        }
        async fn members(&self, _room: &RoomId) -> Result<Vec<RoomMember>, ChatError> {
            Ok(Vec::new())
        }
        async fn policy_rules(
            &self,
            _room: &RoomId,
        ) -> Result<Vec<warden_core::chat::RawPolicyRule>, ChatError> {
            Ok(Vec::new())
        }
        async fn ban(&self, _room: &RoomId, _user: &UserId, _reason: &str) -> Result<(), ChatError> {
            Ok(())
        }
        async fn unban(&self, _room: &RoomId, _user: &UserId) -> Result<(), ChatError> {
            Ok(())
        }
        async fn send_notice(&self, _room: &RoomId, _text: &str) -> Result<(), ChatError> {
            Ok(())
        }
    }

    struct FakeCryptoHelper;

    #[async_trait]
    impl CryptoHelper for FakeCryptoHelper {
        async fn decrypt(&self, _room: &RoomId, _event_id: &str, _content: &Value) -> Result<Value, CryptoError> {
            Err(CryptoError::NoSessionFound)
        }
        async fn wait_for_session(&self, _room: &RoomId, _session_id: &str, _timeout: std::time::Duration) -> bool {
            false
        }
        async fn request_session(&self, _room: &RoomId, _session_id: &str, _sender: &UserId) {}
    }

    #[test]
    fn second_claimant_is_rejected_and_first_keeps_the_claim() {
        let claims = ProtectionClaims::new();
        let room = RoomId::from("!protected:example.org");
        let first: Arc<dyn Claimant> = Arc::new(FakeClaimant(RoomId::from("!mgmt1:example.org")));
        let second: Arc<dyn Claimant> = Arc::new(FakeClaimant(RoomId::from("!mgmt2:example.org")));

        assert!(matches!(claims.try_claim(&room, first.clone()), ClaimOutcome::Claimed));
        assert!(matches!(claims.try_claim(&room, second.clone()), ClaimOutcome::HeldByOther(_)));
        assert!(Arc::ptr_eq(&claims.claimant_of(&room).unwrap(), &first));
    }

    #[test]
    fn reclaim_by_same_claimant_is_a_no_op() {
        let claims = ProtectionClaims::new();
        let room = RoomId::from("!protected:example.org");
        let claimant: Arc<dyn Claimant> = Arc::new(FakeClaimant(RoomId::from("!mgmt:example.org")));

        assert!(matches!(claims.try_claim(&room, claimant.clone()), ClaimOutcome::Claimed));
        assert!(matches!(claims.try_claim(&room, claimant.clone()), ClaimOutcome::Claimed));
    }

    #[test]
    fn release_by_non_owner_is_ignored() {
        let claims = ProtectionClaims::new();
        let room = RoomId::from("!protected:example.org");
        let owner: Arc<dyn Claimant> = Arc::new(FakeClaimant(RoomId::from("!mgmt1:example.org")));
        let impostor: Arc<dyn Claimant> = Arc::new(FakeClaimant(RoomId::from("!mgmt2:example.org")));

        claims.try_claim(&room, owner.clone());
        claims.release(&room, &impostor);
        assert!(claims.claimant_of(&room).is_some());

        claims.release(&room, &owner);
        assert!(claims.claimant_of(&room).is_none());
    }

    #[test]
    fn bot_registry_register_get_remove() {
        let registry = BotRegistry::new();
        let bot_id = UserId::from("@bot:example.org");
        registry.register(
            bot_id.clone(),
            BotRecord {
                chat_client: Arc::new(FakeChatClient),
                crypto_helper: Arc::new(FakeCryptoHelper),
                dry_run: true,
                management_room: RoomId::from("!mgmt:example.org"),
            },
        );

        assert!(registry.get(&bot_id).is_some());
        registry.remove(&bot_id);
        assert!(registry.get(&bot_id).is_none());
    }
}
