//! Ed25519 signing keys for containers, items and the device registry
//!
//! Signatures are deterministic (RFC 8032), which keeps address records
//! reproducible in tests. Private keys are the 32-byte seed; the 64-byte
//! `seed || public` form exists only for interchange with other clients.

use crate::{CryptoError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Size of an Ed25519 public key
pub const SIGNING_PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 seed
pub const SIGNING_SEED_SIZE: usize = 32;

/// Size of the `seed || public` interchange form
pub const SIGNING_KEYPAIR_SIZE: usize = 64;

/// Size of an Ed25519 signature
pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 keypair. The seed is zeroed on drop.
#[derive(Clone)]
pub struct SigningKeypair {
    key: SigningKey,
}

impl SigningKeypair {
    /// Generate a keypair from 32 bytes of OS randomness
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; SIGNING_SEED_SIZE]);
        OsRng.fill_bytes(&mut seed[..]);
        Self::from_seed(&seed)
    }

    /// Build the keypair for a 32-byte seed
    pub fn from_seed(seed: &[u8; SIGNING_SEED_SIZE]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }

    /// Build a keypair from a seed of unchecked length
    pub fn from_seed_slice(seed: &[u8]) -> Result<Self> {
        let seed: &[u8; SIGNING_SEED_SIZE] =
            seed.try_into().map_err(|_| CryptoError::InvalidKeySize)?;
        Ok(Self::from_seed(seed))
    }

    /// Import the 64-byte `seed || public` form.
    ///
    /// The public half must be the one the seed produces.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; SIGNING_KEYPAIR_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeySize)?;
        let key = SigningKey::from_keypair_bytes(bytes).map_err(|_| {
            tracing::debug!("interchange keypair halves disagree");
            CryptoError::InvalidInput("public half does not match seed".into())
        })?;
        Ok(Self { key })
    }

    /// Export as `seed || public`
    pub fn to_keypair_bytes(&self) -> Zeroizing<[u8; SIGNING_KEYPAIR_SIZE]> {
        Zeroizing::new(self.key.to_keypair_bytes())
    }

    /// The 32-byte seed
    pub fn seed(&self) -> &[u8; SIGNING_SEED_SIZE] {
        self.key.as_bytes()
    }

    /// The 32-byte public key
    pub fn public_key(&self) -> [u8; SIGNING_PUBLIC_KEY_SIZE] {
        self.key.verifying_key().to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.key.sign(message).to_bytes()
    }
}

impl PartialEq for SigningKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.key.to_bytes() == other.key.to_bytes()
    }
}

impl Eq for SigningKeypair {}

impl std::fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("public", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Generate a random Ed25519 keypair
pub fn generate_ed25519_keypair() -> SigningKeypair {
    SigningKeypair::generate()
}

/// Sign `message` with a 32-byte seed
pub fn sign_ed25519(message: &[u8], private_key: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
    let keypair = SigningKeypair::from_seed_slice(private_key)?;
    Ok(keypair.sign(message))
}

/// Check a signature. Malformed keys or signatures are reported as `false`.
pub fn verify_ed25519(signature: &[u8], message: &[u8], public_key: &[u8]) -> bool {
    let Ok(signature) = <&[u8; SIGNATURE_SIZE]>::try_from(signature) else {
        return false;
    };
    let Ok(public_key) = <&[u8; SIGNING_PUBLIC_KEY_SIZE]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    verifying_key
        .verify(message, &Signature::from_bytes(signature))
        .is_ok()
}

/// Public key for a 32-byte seed
pub fn get_public_key(private_key: &[u8]) -> Result<[u8; SIGNING_PUBLIC_KEY_SIZE]> {
    Ok(SigningKeypair::from_seed_slice(private_key)?.public_key())
}
