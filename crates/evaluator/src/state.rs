//! The mutable state one `PolicyEvaluator` owns (§3 "PolicyEvaluator").

use std::collections::{HashMap, HashSet};
use warden_core::identity::{RoomId, UserId};

/// Protected-rooms state: rooms currently enforced, and rooms configured
/// for protection but not yet successfully claimed/enforced.
#[derive(Default)]
pub struct ProtectedState {
    /// Rooms this evaluator currently enforces.
    pub protected: HashSet<RoomId>,
    /// Rooms configured for protection but not yet enforced (e.g.
    /// insufficient power level, or claimed by another evaluator).
    pub want_to_protect: HashSet<RoomId>,
}

/// The member index: user id -> protected rooms the user currently
/// occupies (join/invite/knock), per §3's "members" field.
pub type MemberIndex = HashMap<UserId, HashSet<RoomId>>;
