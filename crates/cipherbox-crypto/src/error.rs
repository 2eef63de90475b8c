//! Error types for the cipherbox-crypto crate
//!
//! Failures that an adversary could trigger on purpose (decrypting, unwrapping,
//! verifying) carry no detail. Each category has exactly one message so a
//! caller cannot tell a wrong key from a tampered or truncated input.

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key length does not match the primitive
    #[error("Invalid key size")]
    InvalidKeySize,

    /// IV length does not match the primitive
    #[error("Invalid IV size")]
    InvalidIvSize,

    /// Public key has the right length but the wrong prefix or is not on the curve
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Bad range, identifier or other argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Encryption failed
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Decryption failed (wrong key, tampered or truncated input)
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Wrapping a key for a recipient failed
    #[error("Key wrapping failed")]
    KeyWrapFailed,

    /// Unwrapping a key failed
    #[error("Key unwrapping failed")]
    KeyUnwrapFailed,

    /// Re-wrapping a key for a new recipient failed
    #[error("Key re-wrapping failed")]
    KeyRewrapFailed,

    /// Producing a signature failed
    #[error("Signing failed")]
    SigningFailed,

    /// A decrypted document did not match its schema
    #[error("Schema validation failed")]
    SchemaValidationFailed,

    /// An address record could not be decoded or did not verify
    #[error("Invalid address record: {0}")]
    InvalidRecord(&'static str),
}

impl CryptoError {
    /// Stable machine-readable code, shared with the web implementation
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidKeySize => "INVALID_KEY_SIZE",
            Self::InvalidIvSize => "INVALID_IV_SIZE",
            Self::InvalidPublicKey => "INVALID_PUBLIC_KEY",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::EncryptionFailed => "ENCRYPTION_FAILED",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::KeyWrapFailed => "KEY_WRAP_FAILED",
            Self::KeyUnwrapFailed => "KEY_UNWRAP_FAILED",
            Self::KeyRewrapFailed => "KEY_REWRAP_FAILED",
            Self::SigningFailed => "SIGNING_FAILED",
            Self::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            Self::InvalidRecord(_) => "INVALID_RECORD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_messages() {
        assert_eq!(CryptoError::DecryptionFailed.to_string(), "Decryption failed");
        assert_eq!(CryptoError::KeyUnwrapFailed.to_string(), "Key unwrapping failed");
        assert_eq!(CryptoError::KeyRewrapFailed.to_string(), "Key re-wrapping failed");
        assert_eq!(CryptoError::SchemaValidationFailed.to_string(), "Schema validation failed");
    }

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            CryptoError::InvalidKeySize,
            CryptoError::InvalidIvSize,
            CryptoError::InvalidPublicKey,
            CryptoError::InvalidInput(String::new()),
            CryptoError::EncryptionFailed,
            CryptoError::DecryptionFailed,
            CryptoError::KeyWrapFailed,
            CryptoError::KeyUnwrapFailed,
            CryptoError::KeyRewrapFailed,
            CryptoError::SigningFailed,
            CryptoError::SchemaValidationFailed,
            CryptoError::InvalidRecord(""),
        ];
        let mut codes: Vec<_> = all.iter().map(CryptoError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
