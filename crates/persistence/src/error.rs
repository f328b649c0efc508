//! Errors from the persistence layer, per §7's "database error" kind.

use thiserror::Error;

/// Errors a persistence store call can fail with.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The underlying SQL driver reported a failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A record could not be serialized/deserialized (e.g. the affected-room list).
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
