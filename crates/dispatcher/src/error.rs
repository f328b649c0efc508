//! Errors surfaced while routing an inbound event.

use thiserror::Error;

/// Errors a dispatch call can fail with.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// The homeserver call failed (joining a room, reading state, etc.).
    #[error(transparent)]
    Chat(#[from] warden_core::chat::ChatError),
    /// The target evaluator rejected or failed the event.
    #[error(transparent)]
    Evaluator(#[from] evaluator::EvaluatorError),
    /// The management-room table rejected a write.
    #[error(transparent)]
    Persistence(#[from] persistence::PersistenceError),
    /// The webhook forwarder failed to deliver a message.
    #[error("webhook forward failed: {0}")]
    Forward(String),
}
