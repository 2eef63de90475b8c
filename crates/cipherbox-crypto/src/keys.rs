//! Key material for the CipherBox key hierarchy
//!
//! - `SymmetricKey`: random AES-256 keys for content, listings and containers
//! - `UserKeypair`: the user's long-term secp256k1 key that every container
//!   bundle and content key is ultimately wrapped to

use crate::{CryptoError, Result};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of an uncompressed secp256k1 public key (`0x04 || x || y`)
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Size of a secp256k1 private key
pub const SECRET_KEY_SIZE: usize = 32;

/// SEC1 tag of an uncompressed point
const UNCOMPRESSED_PREFIX: u8 = 0x04;

/// Fill a fresh buffer from the OS CSPRNG
pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// A 256-bit symmetric key, zeroed when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SymmetricKey {
    key: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Create a key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeySize);
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Generate a random key for a single piece of content
pub fn generate_file_key() -> SymmetricKey {
    SymmetricKey::generate()
}

/// A validated, uncompressed secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UserPublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
    point: k256::PublicKey,
}

impl UserPublicKey {
    /// Parse and validate a public key.
    ///
    /// Checks run in a fixed order and each one rejects before the next is
    /// attempted: length, then the `0x04` prefix, then the curve equation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeySize);
        }
        if bytes[0] != UNCOMPRESSED_PREFIX {
            return Err(CryptoError::InvalidPublicKey);
        }
        let point =
            k256::PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr, point })
    }

    /// Decode from lowercase or uppercase hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidKeySize)?;
        Self::from_bytes(&bytes)
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    /// Encode as lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub(crate) fn point(&self) -> &k256::PublicKey {
        &self.point
    }
}

impl serde::Serialize for UserPublicKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for UserPublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(d)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for UserPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserPublicKey({})", self.to_hex())
    }
}

/// The user's long-term secp256k1 keypair
#[derive(Clone)]
pub struct UserKeypair {
    secret: Zeroizing<[u8; SECRET_KEY_SIZE]>,
    public: UserPublicKey,
}

impl UserKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let secret = k256::SecretKey::random(&mut OsRng);
        Self::from_k256(&secret)
    }

    /// Restore a keypair from its 32-byte private key
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = parse_secret_key(bytes)?;
        Ok(Self::from_k256(&secret))
    }

    fn from_k256(secret: &k256::SecretKey) -> Self {
        let mut bytes = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
        bytes.copy_from_slice(&secret.to_bytes());
        let point = secret.public_key();
        let mut public = [0u8; PUBLIC_KEY_SIZE];
        public.copy_from_slice(point.to_encoded_point(false).as_bytes());
        Self {
            secret: bytes,
            public: UserPublicKey { bytes: public, point },
        }
    }

    /// Get the private key bytes
    pub fn secret_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.secret
    }

    /// Get the public key
    pub fn public_key(&self) -> &UserPublicKey {
        &self.public
    }
}

impl std::fmt::Debug for UserKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKeypair")
            .field("secret", &"[REDACTED]")
            .field("public", &self.public)
            .finish()
    }
}

/// Parse a 32-byte secp256k1 private key
pub(crate) fn parse_secret_key(bytes: &[u8]) -> Result<k256::SecretKey> {
    if bytes.len() != SECRET_KEY_SIZE {
        return Err(CryptoError::InvalidKeySize);
    }
    k256::SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidKeySize)
}
