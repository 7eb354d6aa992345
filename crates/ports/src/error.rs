//! Error type for store operations.
//!
//! Every [`EventStore`](crate::EventStore) method returns
//! `Result<_, StoreError>`. Drivers map their internal errors into these
//! variants so callers can tell bad input from backend trouble without
//! knowing the concrete backend.

use opsline_core::{EventError, EventId};

/// Error type for all store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The event failed validation and was not stored.
    #[error("invalid event: {0}")]
    Invalid(#[from] EventError),

    /// No event with this id.
    #[error("event {0} not found")]
    NotFound(EventId),

    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend is temporarily unreachable (locked, closed, poisoned).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Convenience constructor for [`StoreError::Backend`].
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns `true` for transient errors worth retrying later.
    ///
    /// Currently only [`Unavailable`](Self::Unavailable).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
