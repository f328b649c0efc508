//! Errors surfaced by the evaluator, per §7's taxonomy.

use thiserror::Error;

/// Errors an evaluator operation can fail with.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// The homeserver call failed transiently; retried internally where
    /// applicable, surfaced here only once retries are exhausted.
    #[error("transient homeserver error: {0}")]
    Transient(String),
    /// The bot lacks permission to perform the action.
    #[error("permission error: {0}")]
    Permission(String),
    /// The bot is not joined to the room in question.
    #[error("bot not in room: {0}")]
    NotInRoom(String),
    /// Another evaluator already claims this room.
    #[error("room {0} already protected by another evaluator")]
    AlreadyProtected(String),
    /// The bot's power level is below the room's ban/redact threshold.
    #[error("insufficient power level in room {0}")]
    InsufficientPowerLevel(String),
    /// The action-log database rejected a write or read.
    #[error("database error: {0}")]
    Database(#[from] persistence::PersistenceError),
}
