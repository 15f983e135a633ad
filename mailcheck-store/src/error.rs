//! Error types for the mailcheck-store crate.

use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedded database returned an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON column failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking database task panicked or was cancelled.
    #[error("store task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Referenced request does not exist.
    #[error("request not found: {0}")]
    NotFound(String),

    /// Referenced request already exists where uniqueness was required.
    #[error("request already exists: {0}")]
    AlreadyExists(String),

    /// A precondition of the store's invariants was violated.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::NotFound("req-1".to_string());
        assert_eq!(err.to_string(), "request not found: req-1");
    }

    #[test]
    fn test_serialization_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
