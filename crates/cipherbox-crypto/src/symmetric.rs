//! Symmetric encryption using AES-256-GCM
//!
//! This module provides authenticated encryption for file content, container
//! listings and item records:
//! - raw `encrypt_aes_gcm` / `decrypt_aes_gcm` with a caller-supplied IV
//! - self-contained sealed blobs (`iv || ciphertext || tag`)
//! - the JSON `AeadEnvelope` (`{"iv": hex, "data": base64}`)

use crate::{
    encoding,
    keys::{SymmetricKey, KEY_SIZE},
    CryptoError, Result,
};
use aes_gcm::{aead::Aead as AeadTrait, Aes256Gcm, KeyInit};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Size of an AES-GCM IV in bytes (96 bits)
pub const IV_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Smallest sealed blob: an empty plaintext still carries IV and tag
pub const SEALED_MIN_SIZE: usize = IV_SIZE + TAG_SIZE;

/// A 96-bit AES-GCM initialization vector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iv {
    #[serde(with = "encoding::hex_array")]
    bytes: [u8; IV_SIZE],
}

impl Iv {
    /// Generate a random IV
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != IV_SIZE {
            return Err(CryptoError::InvalidIvSize);
        }
        let mut arr = [0u8; IV_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the IV bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.bytes
    }

    /// Encode as lowercase hex (24 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

/// Generate a random IV for AES-GCM
pub fn generate_iv() -> Iv {
    Iv::generate()
}

/// AES-256-GCM bound to a single key
pub struct Aead {
    cipher: Aes256Gcm,
}

impl Aead {
    /// Create a new AEAD instance for the given key
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }

    /// Encrypt, returning `ciphertext || tag`
    pub fn encrypt(&self, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(iv.as_bytes().into(), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt `ciphertext || tag`
    pub fn decrypt(&self, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            tracing::debug!(len = ciphertext.len(), "aes-gcm input shorter than tag");
            return Err(CryptoError::DecryptionFailed);
        }
        self.cipher
            .decrypt(iv.as_bytes().into(), ciphertext)
            .map_err(|_| {
                tracing::debug!("aes-gcm tag mismatch");
                CryptoError::DecryptionFailed
            })
    }
}

/// Encrypt with AES-256-GCM. Key and IV sizes are checked before any
/// cryptographic work is done.
pub fn encrypt_aes_gcm(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let (key, iv) = check_sizes(key, iv)?;
    Aead::new(&key).encrypt(&iv, plaintext)
}

/// Decrypt AES-256-GCM `ciphertext || tag`
pub fn decrypt_aes_gcm(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let (key, iv) = check_sizes(key, iv)?;
    Aead::new(&key).decrypt(&iv, ciphertext)
}

fn check_sizes(key: &[u8], iv: &[u8]) -> Result<(SymmetricKey, Iv)> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeySize);
    }
    let iv = Iv::from_bytes(iv)?;
    Ok((SymmetricKey::from_bytes(key)?, iv))
}

/// Encrypt with a fresh IV, returning `iv || ciphertext || tag`
pub fn seal_aes_gcm(plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    let iv = Iv::generate();
    let ciphertext = Aead::new(key).encrypt(&iv, plaintext)?;
    let mut sealed = Vec::with_capacity(IV_SIZE + ciphertext.len());
    sealed.extend_from_slice(iv.as_bytes());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a blob produced by [`seal_aes_gcm`]
pub fn unseal_aes_gcm(sealed: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if sealed.len() < SEALED_MIN_SIZE {
        tracing::debug!(len = sealed.len(), "sealed blob below minimum size");
        return Err(CryptoError::DecryptionFailed);
    }
    let (iv, ciphertext) = sealed.split_at(IV_SIZE);
    let iv = Iv::from_bytes(iv)?;
    Aead::new(key).decrypt(&iv, ciphertext)
}

/// An AES-GCM ciphertext with its IV, as stored in JSON documents
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AeadEnvelope {
    /// IV, 24 lowercase hex characters on the wire
    pub iv: Iv,
    /// `ciphertext || tag`, standard base64 on the wire
    #[serde(with = "encoding::base64_bytes")]
    pub data: Vec<u8>,
}

impl AeadEnvelope {
    /// Encrypt under a fresh IV
    pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<Self> {
        let iv = Iv::generate();
        let data = Aead::new(key).encrypt(&iv, plaintext)?;
        Ok(Self { iv, data })
    }

    /// Decrypt the envelope
    pub fn decrypt(&self, key: &SymmetricKey) -> Result<Vec<u8>> {
        Aead::new(key).decrypt(&self.iv, &self.data)
    }

    /// Serialize to JSON string for storage
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Deserialize from JSON. Malformed envelopes are reported the same way as
    /// a failed decryption.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            tracing::debug!(error = %e, "malformed aead envelope");
            CryptoError::DecryptionFailed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KAT_KEY: [u8; 32] = [0x42; 32];
    const KAT_IV: [u8; 12] = [0x24; 12];

    #[test]
    fn test_aes_gcm_roundtrip() {
        let key = SymmetricKey::generate();
        let iv = Iv::generate();
        let plaintext = b"Hello, World!";

        let ciphertext = encrypt_aes_gcm(plaintext, key.as_bytes(), iv.as_bytes()).unwrap();
        let decrypted = decrypt_aes_gcm(&ciphertext, key.as_bytes(), iv.as_bytes()).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_hello_cipherbox_lengths() {
        let plaintext = b"Hello, CipherBox!";
        assert_eq!(plaintext.len(), 17);

        let ciphertext = encrypt_aes_gcm(plaintext, &KAT_KEY, &KAT_IV).unwrap();
        assert_eq!(ciphertext.len(), 33);

        let decrypted = decrypt_aes_gcm(&ciphertext, &KAT_KEY, &KAT_IV).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_deterministic_under_fixed_iv() {
        let a = encrypt_aes_gcm(b"same", &KAT_KEY, &KAT_IV).unwrap();
        let b = encrypt_aes_gcm(b"same", &KAT_KEY, &KAT_IV).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_size_checks_before_crypto() {
        assert_eq!(
            encrypt_aes_gcm(b"x", &[0u8; 16], &KAT_IV),
            Err(CryptoError::InvalidKeySize)
        );
        assert_eq!(
            encrypt_aes_gcm(b"x", &KAT_KEY, &[0u8; 16]),
            Err(CryptoError::InvalidIvSize)
        );
        assert_eq!(
            decrypt_aes_gcm(&[0u8; 32], &KAT_KEY, &[0u8; 11]),
            Err(CryptoError::InvalidIvSize)
        );
    }

    #[test]
    fn test_wrong_key_fails_generically() {
        let ciphertext = encrypt_aes_gcm(b"secret", &KAT_KEY, &KAT_IV).unwrap();
        let err = decrypt_aes_gcm(&ciphertext, &[0x43; 32], &KAT_IV).unwrap_err();
        assert_eq!(err.to_string(), "Decryption failed");
    }

    #[test]
    fn test_short_ciphertext_fails_generically() {
        assert_eq!(
            decrypt_aes_gcm(&[0u8; 15], &KAT_KEY, &KAT_IV),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_seal_layout() {
        let key = SymmetricKey::generate();
        let sealed = seal_aes_gcm(b"abc", &key).unwrap();
        assert_eq!(sealed.len(), IV_SIZE + 3 + TAG_SIZE);

        let empty = seal_aes_gcm(b"", &key).unwrap();
        assert_eq!(empty.len(), SEALED_MIN_SIZE);
        assert_eq!(unseal_aes_gcm(&empty, &key).unwrap(), b"");
    }

    #[test]
    fn test_unseal_boundary() {
        let key = SymmetricKey::generate();
        assert_eq!(
            unseal_aes_gcm(&[0u8; SEALED_MIN_SIZE - 1], &key),
            Err(CryptoError::DecryptionFailed)
        );
        // 28 bytes passes the length gate and fails on the tag instead
        assert_eq!(
            unseal_aes_gcm(&[0u8; SEALED_MIN_SIZE], &key),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let key = SymmetricKey::generate();
        let a = seal_aes_gcm(b"same", &key).unwrap();
        let b = seal_aes_gcm(b"same", &key).unwrap();
        assert_ne!(a[..IV_SIZE], b[..IV_SIZE]);
    }

    #[test]
    fn test_envelope_wire_format() {
        let key = SymmetricKey::from_bytes(&KAT_KEY).unwrap();
        let envelope = AeadEnvelope {
            iv: Iv::from_bytes(&KAT_IV).unwrap(),
            data: Aead::new(&key)
                .encrypt(&Iv::from_bytes(&KAT_IV).unwrap(), b"{}")
                .unwrap(),
        };

        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(json["iv"], "242424242424242424242424");
        let data = json["data"].as_str().unwrap();
        assert!(!data.contains('-') && !data.contains('_'));

        let back = AeadEnvelope::from_json(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(back.decrypt(&key).unwrap(), b"{}");
    }

    #[test]
    fn test_envelope_bad_json_is_decryption_failure() {
        assert_eq!(
            AeadEnvelope::from_json(r#"{"iv":"zz","data":"AA=="}"#),
            Err(CryptoError::DecryptionFailed)
        );
    }

    proptest! {
        #[test]
        fn prop_seal_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let key = SymmetricKey::generate();
            let sealed = seal_aes_gcm(&data, &key).unwrap();
            prop_assert_eq!(unseal_aes_gcm(&sealed, &key).unwrap(), data);
        }

        #[test]
        fn prop_any_bit_flip_detected(
            data in proptest::collection::vec(any::<u8>(), 0..256),
            bit in any::<usize>(),
        ) {
            let key = SymmetricKey::generate();
            let mut sealed = seal_aes_gcm(&data, &key).unwrap();
            let bit = bit % (sealed.len() * 8);
            sealed[bit / 8] ^= 1 << (bit % 8);
            prop_assert_eq!(unseal_aes_gcm(&sealed, &key), Err(CryptoError::DecryptionFailed));
        }
    }
}
