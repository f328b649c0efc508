use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use warden_core::chat::{ChatClient, ChatError, PowerLevels, RawPolicyRule, RoomMember};
use warden_core::event::MemberState;
use warden_core::identity::{RoomId, UserId};

#[derive(Default)]
struct State {
    joined: HashSet<RoomId>,
    members: HashMap<RoomId, Vec<RoomMember>>,
    power_levels: HashMap<RoomId, PowerLevels>,
    banned: HashMap<RoomId, HashSet<UserId>>,
    ban_calls: Vec<(RoomId, UserId)>,
    unban_calls: Vec<(RoomId, UserId)>,
    notices: Vec<(RoomId, String)>,
}

/// An in-memory `ChatClient` fake: fixed room membership and power levels,
/// recording every ban/unban/notice call for assertions.
pub struct FakeChatClient {
    own_user_id: UserId,
    state: Mutex<State>,
}

impl FakeChatClient {
    pub fn new(own_user_id: &str) -> Self {
        Self { own_user_id: UserId::from(own_user_id), state: Mutex::new(State::default()) }
    }

    pub fn join(&self, room: &RoomId) {
        self.state.lock().unwrap().joined.insert(room.clone());
    }

    pub fn set_members(&self, room: &RoomId, members: Vec<(&str, MemberState)>) {
        let members = members
            .into_iter()
            .map(|(user, membership)| RoomMember { user_id: UserId::from(user), membership })
            .collect();
        self.state.lock().unwrap().members.insert(room.clone(), members);
    }

    pub fn set_power_levels(&self, room: &RoomId, own_level: i64, ban: i64, redact: i64) {
        let mut levels = PowerLevels { users_default: 0, ban, redact, ..Default::default() };
        levels.users.insert(self.own_user_id.clone(), own_level);
        self.state.lock().unwrap().power_levels.insert(room.clone(), levels);
    }

    pub fn ban_calls(&self) -> Vec<(RoomId, UserId)> {
        self.state.lock().unwrap().ban_calls.clone()
    }

    pub fn unban_calls(&self) -> Vec<(RoomId, UserId)> {
        self.state.lock().unwrap().unban_calls.clone()
    }

    pub fn notices(&self) -> Vec<(RoomId, String)> {
        self.state.lock().unwrap().notices.clone()
    }

    pub fn is_banned(&self, room: &RoomId, user: &UserId) -> bool {
        self.state.lock().unwrap().banned.get(room).map(|s| s.contains(user)).unwrap_or(false)
    }
}

#[async_trait]
impl ChatClient for FakeChatClient {
    fn own_user_id(&self) -> &UserId {
        &self.own_user_id
    }

    async fn join_room_by_id(&self, room: &RoomId) -> Result<(), ChatError> {
        self.state.lock().unwrap().joined.insert(room.clone());
        Ok(())
    }

    async fn joined_rooms(&self) -> Result<Vec<RoomId>, ChatError> {
        Ok(self.state.lock().unwrap().joined.iter().cloned().collect())
    }

    async fn power_levels(&self, room: &RoomId) -> Result<PowerLevels, ChatError> {
        Ok(self.state.lock().unwrap().power_levels.get(room).cloned().unwrap_or_default())
    }

    async fn members(&self, room: &RoomId) -> Result<Vec<RoomMember>, ChatError> {
        Ok(self.state.lock().unwrap().members.get(room).cloned().unwrap_or_default())
    }

    async fn policy_rules(&self, _room: &RoomId) -> Result<Vec<RawPolicyRule>, ChatError> {
        Ok(Vec::new())
    }

    async fn ban(&self, room: &RoomId, user: &UserId, _reason: &str) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        state.banned.entry(room.clone()).or_default().insert(user.clone());
        state.ban_calls.push((room.clone(), user.clone()));
        Ok(())
    }

    async fn unban(&self, room: &RoomId, user: &UserId) -> Result<(), ChatError> {
        let mut state = self.state.lock().unwrap();
        if let Some(set) = state.banned.get_mut(room) {
            set.remove(user);
        }
        state.unban_calls.push((room.clone(), user.clone()));
        Ok(())
    }

    async fn send_notice(&self, room: &RoomId, text: &str) -> Result<(), ChatError> {
        self.state.lock().unwrap().notices.push((room.clone(), text.to_string()));
        Ok(())
    }
}

pub fn json_ban_rule(entity: &str) -> Value {
    serde_json::json!({"entity": entity, "recommendation": "m.ban"})
}

pub fn json_unban_rule(entity: &str) -> Value {
    serde_json::json!({"entity": entity, "recommendation": "m.unban"})
}
