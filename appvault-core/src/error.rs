/*!
Error types for the AppVault core engine.
*/

use thiserror::Error;

/// Result type used throughout the AppVault core.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur during extraction, sealing and restoration.
#[derive(Error, Debug)]
pub enum VaultError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite errors while reading or writing a database
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// The sealed artifact could not be decoded or decrypted
    #[error("Envelope corrupt or undecryptable: {0}")]
    EnvelopeCorrupt(String),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Invalid snapshot format
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A table, column, store or file name that cannot be used safely
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

impl VaultError {
    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new envelope error
    pub fn envelope<S: Into<String>>(msg: S) -> Self {
        Self::EnvelopeCorrupt(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new invalid identifier error
    pub fn invalid_identifier<S: Into<String>>(name: S) -> Self {
        Self::InvalidIdentifier(name.into())
    }

    /// True when the artifact itself is unreadable, as opposed to an
    /// environment failure while handling it.
    pub fn is_envelope_corrupt(&self) -> bool {
        matches!(
            self,
            Self::EnvelopeCorrupt(_)
                | Self::Compression(_)
                | Self::IntegrityCheckFailed { .. }
                | Self::InvalidFormat(_)
                | Self::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let error = VaultError::validation("row_cap must be positive");
        assert_eq!(error.to_string(), "Validation error: row_cap must be positive");

        let error = VaultError::envelope("bad base64");
        assert_eq!(
            error.to_string(),
            "Envelope corrupt or undecryptable: bad base64"
        );

        let error = VaultError::invalid_identifier("users; DROP");
        assert!(error.to_string().contains("users; DROP"));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Access denied");
        match VaultError::from(io_error) {
            VaultError::Io(ref err) => assert_eq!(err.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("Expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(VaultError::from(json_error), VaultError::Json(_)));
    }

    #[test]
    fn test_envelope_classification() {
        assert!(VaultError::envelope("x").is_envelope_corrupt());
        assert!(VaultError::IntegrityCheckFailed {
            expected: "a".to_string(),
            actual: "b".to_string(),
        }
        .is_envelope_corrupt());
        assert!(!VaultError::storage("disk full").is_envelope_corrupt());
        assert!(!VaultError::Io(io::Error::new(io::ErrorKind::Other, "x")).is_envelope_corrupt());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VaultError>();
        assert_sync::<VaultError>();
    }
}
