//! # Bridge Errors
//!
//! Error taxonomy of the reactive bridge. Decode failures and
//! store-reported listener failures reach the caller through one
//! handler channel (`FeedError`); synchronous argument and path
//! problems are `BridgeError` results.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced synchronously by bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Child identifier must be non-empty
    #[error("Child id must be non-empty")]
    EmptyChildId,

    /// Error reported by the store layer, forwarded unmodified
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The completion side of an acknowledged write was dropped
    /// before resolving
    #[error("Write acknowledgement dropped")]
    AckDropped,

    /// Internal bridge failure
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors delivered to a feed's error handler
///
/// A `Store` error is always fatal to the feed. A `Decode` error is
/// fatal only under `DecodePolicy::FailFeed`; under `SkipChild` the
/// malformed child is dropped and logged instead.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The store terminated the underlying listener
    #[error("Listener cancelled: {0}")]
    Store(#[from] StoreError),

    /// A stored child could not be decoded into the subscriber's type
    #[error("Failed to decode child {key}: {source}")]
    Decode {
        /// Key of the malformed child
        key: String,
        /// Underlying deserialization error
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_passes_through() {
        let err = BridgeError::from(StoreError::Disconnected);
        assert!(matches!(err, BridgeError::Store(StoreError::Disconnected)));
    }

    #[test]
    fn test_feed_error_display() {
        let err = FeedError::Store(StoreError::PermissionDenied("posts".to_string()));
        assert_eq!(err.to_string(), "Listener cancelled: Permission denied at posts");
    }
}
