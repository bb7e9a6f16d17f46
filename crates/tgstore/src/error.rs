//! Error types for the session store.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The lookup key has the wrong shape (e.g. a non-integer peer id).
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A username row exists but is older than the freshness window.
    #[error("Expired: {0}")]
    Expired(String),

    /// A stored peer `type` the peer-input conversion does not know.
    #[error("Invalid peer type: {0}")]
    InvalidPeerType(String),

    /// Anything the database or connection layer reported.
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl StoreError {
    /// True for both `NotFound` and `Expired`: neither entry is usable now.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired(_))
    }
}
