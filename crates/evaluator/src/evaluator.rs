//! `PolicyEvaluator`: per-management-room state and constructor (§3).

use crate::state::{MemberIndex, ProtectedState};
use policy_store::PolicyStore;
use registry::{BotRecord, ProtectionClaims};
use persistence::TakenActionStore;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::Semaphore;
use warden_core::chat::ChatClient;
use warden_core::identity::{RoomId, UserId};

/// How many rooms/users a single fan-out (protect-many-rooms,
/// evaluate-all-members) may act on concurrently (§5/§9 "bound the
/// concurrency").
const FANOUT_CONCURRENCY: usize = 8;

/// One evaluator per management room: watched lists, protected rooms,
/// member index, admins, and the previously-taken enforcement actions.
pub struct PolicyEvaluator {
    pub(crate) management_room: RoomId,
    pub(crate) bot_user_id: UserId,
    pub(crate) dry_run: bool,
    pub(crate) store: Arc<PolicyStore>,
    pub(crate) claims: Arc<ProtectionClaims>,
    pub(crate) taken_actions: Arc<dyn TakenActionStore>,
    pub(crate) chat_client: Arc<dyn ChatClient>,
    pub(crate) watched_lists: RwLock<Vec<RoomId>>,
    pub(crate) protected: RwLock<ProtectedState>,
    pub(crate) users: RwLock<MemberIndex>,
    pub(crate) admins: RwLock<HashSet<UserId>>,
    pub(crate) fanout: Arc<Semaphore>,
}

impl PolicyEvaluator {
    /// Construct a fresh evaluator with empty watched lists, protected
    /// rooms, and member index. Always wrapped in an `Arc`: the fan-out
    /// helpers and the protection-claim protocol need to hand out a
    /// `Claimant` handle pointing back at this evaluator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        management_room: RoomId,
        bot_user_id: UserId,
        dry_run: bool,
        store: Arc<PolicyStore>,
        claims: Arc<ProtectionClaims>,
        taken_actions: Arc<dyn TakenActionStore>,
        chat_client: Arc<dyn ChatClient>,
    ) -> Arc<Self> {
        Arc::new(Self {
            management_room,
            bot_user_id,
            dry_run,
            store,
            claims,
            taken_actions,
            chat_client,
            watched_lists: RwLock::new(Vec::new()),
            protected: RwLock::new(ProtectedState::default()),
            users: RwLock::new(MemberIndex::default()),
            admins: RwLock::new(HashSet::new()),
            fanout: Arc::new(Semaphore::new(FANOUT_CONCURRENCY)),
        })
    }

    /// Build from a bot record already installed in the `BotRegistry`.
    pub fn from_bot_record(
        management_room: RoomId,
        record: &BotRecord,
        store: Arc<PolicyStore>,
        claims: Arc<ProtectionClaims>,
        taken_actions: Arc<dyn TakenActionStore>,
    ) -> Arc<Self> {
        Self::new(
            management_room,
            record.chat_client.own_user_id().clone(),
            record.dry_run,
            store,
            claims,
            taken_actions,
            record.chat_client.clone(),
        )
    }

    /// This evaluator's management room id.
    pub fn management_room(&self) -> &RoomId {
        &self.management_room
    }

    /// The bot user id this evaluator acts as.
    pub fn bot_user_id(&self) -> &UserId {
        &self.bot_user_id
    }

    /// The lists this evaluator currently watches.
    pub fn watched_lists(&self) -> Vec<RoomId> {
        self.watched_lists.read().unwrap().clone()
    }

    /// The rooms currently protected (claimed and enforced).
    pub fn protected_rooms(&self) -> HashSet<RoomId> {
        self.protected.read().unwrap().protected.clone()
    }

    /// The rooms configured for protection but not yet enforced.
    pub fn want_to_protect(&self) -> HashSet<RoomId> {
        self.protected.read().unwrap().want_to_protect.clone()
    }

    /// Replace the set of admins allowed to issue commands in this
    /// management room.
    pub fn set_admins(&self, admins: HashSet<UserId>) {
        *self.admins.write().unwrap() = admins;
    }

    /// Whether `user` is allowed to issue commands in this management room.
    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.read().unwrap().contains(user)
    }

    /// Every user id currently tracked in the member index (the union of
    /// all protected rooms' members).
    pub fn known_users(&self) -> Vec<UserId> {
        self.users.read().unwrap().keys().cloned().collect()
    }
}

impl registry::Claimant for PolicyEvaluator {
    fn management_room_id(&self) -> &RoomId {
        &self.management_room
    }
}
