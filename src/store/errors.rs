//! # Store Errors
//!
//! Error types for the store layer. The bridge treats these as opaque:
//! it forwards them to caller-supplied handlers without inspecting them.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    // ==================
    // Path Errors
    // ==================
    /// Reference path is malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ==================
    // Listener Errors
    // ==================
    /// Listener rejected for lack of permission
    #[error("Permission denied at {0}")]
    PermissionDenied(String),

    /// Connection to the store was lost
    #[error("Disconnected from store")]
    Disconnected,

    // ==================
    // Operation Errors
    // ==================
    /// Store is temporarily unable to serve the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Internal store failure
    #[error("Internal store error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StoreError::InvalidPath("a//b".to_string()).to_string(),
            "Invalid path: a//b"
        );
        assert_eq!(
            StoreError::PermissionDenied("users".to_string()).to_string(),
            "Permission denied at users"
        );
        assert_eq!(StoreError::Disconnected.to_string(), "Disconnected from store");
    }
}
