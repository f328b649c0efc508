//! Shared primitives for the moderation engine: identifiers, glob patterns,
//! the inbound event tagged union, and the upstream chat/crypto contracts.

#![deny(unsafe_code)]

pub mod chat;
pub mod event;
pub mod ids;
pub mod identity;
pub mod pattern;
pub mod rule;

pub use identity::{Localpart, RoomId, ServerName, UserId};
pub use pattern::Pattern;
pub use rule::{EntityKind, Recommendation, Rule};
