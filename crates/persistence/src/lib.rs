//! Durable storage contracts for the moderation engine (§4.5): which bot
//! owns which management room, and which enforcement actions have already
//! been taken.

#![deny(unsafe_code)]

mod error;
mod management_room;
mod taken_action;

pub use error::PersistenceError;
pub use management_room::{InMemoryManagementRoomStore, ManagementRoomStore, SqlxManagementRoomStore};
pub use taken_action::{ActionKind, InMemoryTakenActionStore, TakenAction, TakenActionStore};
