//! Error types for the cipherbox-core crate

use cipherbox_crypto::CryptoError;
use thiserror::Error;

/// Result type alias using `CoreError`
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in key-hierarchy operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Crypto error, passed through with its generic message
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// One field of a wrapped container bundle failed to unwrap
    #[error("Key unwrapping failed: {field}")]
    FieldUnwrap { field: &'static str },

    /// Document uses a schema version that must be migrated first
    #[error("legacy schema version: {0}")]
    LegacySchema(String),

    /// Document uses a schema version this build does not know
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(String),

    /// A subtree share stopped at the named entry; nothing was shared
    #[error("share aborted at {entry}: {reason}")]
    ShareAborted { entry: String, reason: String },

    /// A rotation plan was stale or incomplete; no grant was discarded
    #[error("rotation refused: {0}")]
    RotationRefused(String),

    /// No grant exists for the recipient
    #[error("no share grant for recipient {0}")]
    GrantNotFound(String),

    /// No device with this id in the registry
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Recovery export could not be read or did not reproduce the vault
    #[error("recovery failed: {0}")]
    Recovery(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Crypto(e) => e.code(),
            Self::FieldUnwrap { .. } => "KEY_UNWRAP_FAILED",
            Self::LegacySchema(_) => "LEGACY_SCHEMA",
            Self::UnsupportedSchema(_) => "UNSUPPORTED_SCHEMA",
            Self::ShareAborted { .. } => "SHARE_ABORTED",
            Self::RotationRefused(_) => "ROTATION_REFUSED",
            Self::GrantNotFound(_) => "GRANT_NOT_FOUND",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::Recovery(_) => "RECOVERY_FAILED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_errors_keep_generic_message() {
        let err: CoreError = CryptoError::DecryptionFailed.into();
        assert_eq!(err.to_string(), "Decryption failed");
        assert_eq!(err.code(), "DECRYPTION_FAILED");
    }

    #[test]
    fn test_field_unwrap_names_field() {
        let err = CoreError::FieldUnwrap { field: "root key" };
        assert_eq!(err.to_string(), "Key unwrapping failed: root key");
    }
}
