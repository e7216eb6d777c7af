//! Error types for wyze-credits storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain type.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record.
        entity: &'static str,
        /// The key that was looked up.
        id: String,
    },

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),
}

impl From<StoreError> for wyze_credits_core::CreditsError {
    fn from(err: StoreError) -> Self {
        Self::Persistence(err.to_string())
    }
}
