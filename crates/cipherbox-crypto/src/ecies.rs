//! ECIES key wrapping over secp256k1
//!
//! Wraps short secrets (content keys, container keys, signing seeds) to a
//! user's long-term public key. The byte layout is shared with the web client
//! and with every wrapped key already stored, so it must not change:
//!
//! ```text
//! [ 0..65 ]  ephemeral public key, uncompressed (0x04 || x || y)
//! [65..81 ]  AES-GCM nonce (16 bytes, not the usual 12)
//! [81..97 ]  AES-GCM tag
//! [97..   ]  ciphertext
//! ```
//!
//! The AES key is `HKDF-SHA256(ephemeral_public || shared_point)` with empty
//! salt and info, where `shared_point` is the uncompressed ECDH point.

use crate::{
    derivation::hkdf_sha256,
    keys::{parse_secret_key, UserPublicKey, PUBLIC_KEY_SIZE},
    CryptoError, Result,
};
use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace},
    AesGcm, KeyInit,
};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// AES-256-GCM with a 128-bit nonce
type Aes256Gcm16 = AesGcm<aes::Aes256, U16>;

/// Size of the wrap nonce
pub const WRAP_NONCE_SIZE: usize = 16;

/// Size of the wrap tag
pub const WRAP_TAG_SIZE: usize = 16;

/// Bytes a wrapped key carries on top of its plaintext
pub const WRAP_OVERHEAD: usize = PUBLIC_KEY_SIZE + WRAP_NONCE_SIZE + WRAP_TAG_SIZE;

const NONCE_OFFSET: usize = PUBLIC_KEY_SIZE;
const TAG_OFFSET: usize = NONCE_OFFSET + WRAP_NONCE_SIZE;
const CIPHERTEXT_OFFSET: usize = TAG_OFFSET + WRAP_TAG_SIZE;

/// Uncompressed `secret * public`
fn shared_point(secret: &k256::SecretKey, public: &k256::PublicKey) -> Zeroizing<Vec<u8>> {
    let point = (public.to_projective() * *secret.to_nonzero_scalar()).to_affine();
    Zeroizing::new(point.to_encoded_point(false).as_bytes().to_vec())
}

fn derive_wrap_key(ephemeral_public: &[u8], shared: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(ephemeral_public.len() + shared.len()));
    ikm.extend_from_slice(ephemeral_public);
    ikm.extend_from_slice(shared);
    hkdf_sha256(&ikm, &[], &[])
}

/// Wrap `plaintext` so only the holder of `recipient_public_key`'s private
/// key can recover it.
///
/// The public key is validated before any work is done: length, then the
/// `0x04` prefix, then the curve check.
pub fn wrap_key(plaintext: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>> {
    let recipient = UserPublicKey::from_bytes(recipient_public_key)?;

    let ephemeral = k256::SecretKey::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
    let shared = shared_point(&ephemeral, recipient.point());
    let key = derive_wrap_key(ephemeral_public.as_bytes(), &shared)
        .map_err(|_| CryptoError::KeyWrapFailed)?;

    let mut nonce = [0u8; WRAP_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm16::new(GenericArray::from_slice(&key[..]));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| CryptoError::KeyWrapFailed)?;

    let mut wrapped = Vec::with_capacity(WRAP_OVERHEAD + buffer.len());
    wrapped.extend_from_slice(ephemeral_public.as_bytes());
    wrapped.extend_from_slice(&nonce);
    wrapped.extend_from_slice(&tag);
    wrapped.extend_from_slice(&buffer);
    Ok(wrapped)
}

/// Recover a secret wrapped with [`wrap_key`].
///
/// Every failure after the private-key size check (short input, bad
/// ephemeral point, wrong key, tampering) is the same `KeyUnwrapFailed`.
pub fn unwrap_key(wrapped: &[u8], recipient_private_key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let secret = parse_secret_key(recipient_private_key)?;

    if wrapped.len() < WRAP_OVERHEAD {
        tracing::debug!(len = wrapped.len(), "wrapped key below minimum size");
        return Err(CryptoError::KeyUnwrapFailed);
    }

    let ephemeral_bytes = &wrapped[..NONCE_OFFSET];
    let nonce = &wrapped[NONCE_OFFSET..TAG_OFFSET];
    let tag = &wrapped[TAG_OFFSET..CIPHERTEXT_OFFSET];
    let ciphertext = &wrapped[CIPHERTEXT_OFFSET..];

    let ephemeral = k256::PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| {
        tracing::debug!("wrapped key carries an invalid ephemeral point");
        CryptoError::KeyUnwrapFailed
    })?;
    let shared = shared_point(&secret, &ephemeral);
    let key =
        derive_wrap_key(ephemeral_bytes, &shared).map_err(|_| CryptoError::KeyUnwrapFailed)?;

    let cipher = Aes256Gcm16::new(GenericArray::from_slice(&key[..]));
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| {
            tracing::debug!("wrapped key failed authentication");
            CryptoError::KeyUnwrapFailed
        })?;

    Ok(buffer)
}

/// Re-issue a wrapped secret to a new recipient.
///
/// The intermediate plaintext lives in a zero-on-drop buffer, so it is wiped
/// whether the second wrap succeeds or not. Failures never reveal which half
/// failed.
pub fn rewrap_key(
    wrapped: &[u8],
    owner_private_key: &[u8],
    new_recipient_public_key: &[u8],
) -> Result<Vec<u8>> {
    let plaintext = unwrap_key(wrapped, owner_private_key).map_err(|e| {
        tracing::debug!(cause = e.code(), "re-wrap: unwrap half failed");
        CryptoError::KeyRewrapFailed
    })?;
    let rewrapped = wrap_key(&plaintext, new_recipient_public_key);
    drop(plaintext);

    rewrapped.map_err(|e| {
        tracing::debug!(cause = e.code(), "re-wrap: wrap half failed");
        CryptoError::KeyRewrapFailed
    })
}
