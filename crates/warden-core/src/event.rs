//! The inbound event tagged union and the recognized event-type tables.
//!
//! The upstream chat library hands events in by type tag (§9 design note:
//! "dynamic event dispatch"). `InboundEvent` is the typed variant the
//! dispatcher matches on; `PolicyEventType`/`ConfigEventType` enumerate the
//! type-name aliases that must be accepted interchangeably (§D.4 of
//! SPEC_FULL.md).

use crate::identity::{RoomId, UserId};
use crate::rule::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A policy-rule event type name, recognized across its current, legacy,
/// and unstable spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEventType {
    /// Which kind of entity this event type carries rules for.
    pub kind: EntityKind,
}

const POLICY_TYPE_NAMES: &[(&str, EntityKind)] = &[
    ("m.policy.rule.user", EntityKind::User),
    ("m.room.rule.user", EntityKind::User),
    ("org.matrix.mjolnir.rule.user", EntityKind::User),
    ("m.policy.rule.room", EntityKind::Room),
    ("m.room.rule.room", EntityKind::Room),
    ("org.matrix.mjolnir.rule.room", EntityKind::Room),
    ("m.policy.rule.server", EntityKind::Server),
    ("m.room.rule.server", EntityKind::Server),
    ("org.matrix.mjolnir.rule.server", EntityKind::Server),
];

/// Resolve a raw Matrix event `type` string to the entity kind it carries,
/// if it is one of the recognized policy-rule aliases.
pub fn policy_event_kind(type_name: &str) -> Option<EntityKind> {
    POLICY_TYPE_NAMES.iter().find(|(name, _)| *name == type_name).map(|(_, kind)| *kind)
}

/// The two management-room configuration state event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEventType {
    /// `fi.mau.meowlnir.watched_lists`-equivalent: which lists this
    /// evaluator subscribes to.
    WatchedLists,
    /// `fi.mau.meowlnir.protected_rooms`-equivalent: which rooms this
    /// evaluator protects.
    ProtectedRooms,
}

/// Content of the watched-lists management-room config event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WatchedListsContent {
    /// Map from policy-list room id to its display metadata.
    pub lists: std::collections::BTreeMap<String, WatchedListEntry>,
}

/// A single entry in `WatchedListsContent::lists`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedListEntry {
    /// Human-readable name for the list, set by the operator.
    pub name: String,
}

/// Content of the protected-rooms management-room config event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProtectedRoomsContent {
    /// Rooms this evaluator should protect.
    pub rooms: Vec<String>,
}

/// Membership state of a `m.room.member` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    /// The user is joined to the room.
    Join,
    /// The user has been invited.
    Invite,
    /// The user has knocked, requesting to join.
    Knock,
    /// The user has left.
    Leave,
    /// The user is banned.
    Ban,
}

impl MemberState {
    /// Membership states treated as "in room" per §3: join, invite, knock.
    pub fn is_in_room(self) -> bool {
        matches!(self, MemberState::Join | MemberState::Invite | MemberState::Knock)
    }
}

/// A raw policy-rule or redaction event, pre-parse: the dispatcher hands
/// this to the policy store, which knows how to interpret each variant.
#[derive(Debug, Clone)]
pub enum PolicyListEvent {
    /// A user/room/server policy-rule state event (possibly empty content,
    /// meaning "rule gone" per §3's lifecycle).
    Rule {
        /// The policy-list room the event was received in.
        room_id: RoomId,
        /// Which entity kind this event type carries rules for.
        kind: EntityKind,
        /// The state key identifying the rule within its room.
        state_key: String,
        /// Raw state content; empty object/`null` means "rule gone".
        content: Value,
        /// The id of this event.
        event_id: String,
        /// The sender of this event.
        sender: UserId,
        /// Origin-server timestamp, milliseconds since epoch.
        timestamp_ms: u64,
    },
    /// A `m.room.redaction` possibly targeting a previously-seen rule event.
    Redaction {
        /// The room the redaction was received in.
        room_id: RoomId,
        /// The event id being redacted.
        redacts: String,
    },
}

/// A management-room or protected-room configuration state event.
#[derive(Debug, Clone)]
pub struct ConfigEvent {
    /// Room the event was received in.
    pub room_id: RoomId,
    /// Which configuration aspect changed.
    pub event_type: ConfigEventType,
    /// Raw state content.
    pub content: Value,
}

/// A power-levels state event in either a management room or a protected room.
#[derive(Debug, Clone)]
pub struct PowerLevelsEvent {
    /// Room the event was received in.
    pub room_id: RoomId,
    /// Raw power-levels content (parsing left to the evaluator, which needs
    /// `users`/`ban`/`redact` semantics the homeserver client already models).
    pub content: Value,
}

/// A `m.room.member` event.
#[derive(Debug, Clone)]
pub struct MemberEvent {
    /// Room the membership applies to.
    pub room_id: RoomId,
    /// The user whose membership changed.
    pub target: UserId,
    /// New membership state.
    pub membership: MemberState,
    /// Sender of the invite/kick/ban, if relevant.
    pub sender: UserId,
}

/// A `m.room.message`/`m.sticker` event in a management or protected room.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Room the message was sent in.
    pub room_id: RoomId,
    /// Sender of the message.
    pub sender: UserId,
    /// Event id, for webhook forwarding/redaction follow-up.
    pub event_id: String,
    /// Plain-text body, if present.
    pub body: Option<String>,
}

/// A `m.room.encrypted` event, not yet decrypted.
#[derive(Debug, Clone)]
pub struct EncryptedEvent {
    /// Room the event was received in.
    pub room_id: RoomId,
    /// Sender of the event.
    pub sender: UserId,
    /// Event id.
    pub event_id: String,
    /// Raw encrypted content, opaque to the dispatcher.
    pub content: Value,
}

/// One-time-key counts for a bot's own device.
#[derive(Debug, Clone)]
pub struct OtkCountEvent {
    /// The bot user id these counts are for.
    pub user_id: UserId,
    /// The device id.
    pub device_id: String,
}

/// A to-device event (room key requests, verification, etc.).
#[derive(Debug, Clone)]
pub struct ToDeviceEvent {
    /// Recipient bot user id.
    pub to_user_id: UserId,
    /// Sender of the to-device event.
    pub sender: UserId,
    /// Raw event type name.
    pub event_type: String,
    /// Raw content.
    pub content: Value,
}

/// The tagged union of everything the upstream event stream can deliver.
///
/// This is the Rust encoding of §9's "dynamic event dispatch" design note:
/// rather than matching on a string type tag at every call site, the
/// stream adapter classifies each event once into one of these variants.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Policy-rule state event or redaction.
    PolicyList(PolicyListEvent),
    /// Watched-lists / protected-rooms config change.
    Config(ConfigEvent),
    /// Power-levels change in a management or protected room.
    PowerLevels(PowerLevelsEvent),
    /// Membership change.
    Member(MemberEvent),
    /// Message or sticker.
    Message(MessageEvent),
    /// Not-yet-decrypted event.
    Encrypted(EncryptedEvent),
    /// One-time-key count update.
    OtkCount(OtkCountEvent),
    /// To-device event (crypto machinery).
    ToDevice(ToDeviceEvent),
}
