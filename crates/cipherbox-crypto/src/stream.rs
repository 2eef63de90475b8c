//! AES-256-CTR for large content and random-access reads
//!
//! Counter mode has no tag and no padding: output length equals input length.
//! The 16-byte IV is `nonce(8) || counter(8)`; the counter half starts at
//! zero and is incremented big-endian per 16-byte block, which lets a reader
//! decrypt any byte range by jumping straight to the covering block.

use crate::{keys::KEY_SIZE, CryptoError, Result};
use aes::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;

type Aes256Ctr = ctr::Ctr64BE<aes::Aes256>;

/// Size of an AES-CTR IV (one counter block)
pub const CTR_IV_SIZE: usize = 16;

/// AES block size; the counter advances once per block
pub const BLOCK_SIZE: usize = 16;

/// Random half of the IV
const CTR_NONCE_SIZE: usize = 8;

/// Generate `nonce(8 random bytes) || counter(8 zero bytes)`
pub fn generate_ctr_iv() -> [u8; CTR_IV_SIZE] {
    let mut iv = [0u8; CTR_IV_SIZE];
    OsRng.fill_bytes(&mut iv[..CTR_NONCE_SIZE]);
    iv
}

fn check_sizes(key: &[u8], iv: &[u8]) -> Result<()> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeySize);
    }
    if iv.len() != CTR_IV_SIZE {
        return Err(CryptoError::InvalidIvSize);
    }
    Ok(())
}

fn apply_keystream(data: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    let mut cipher = Aes256Ctr::new(key.into(), iv.into());
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    out
}

/// Encrypt with AES-256-CTR
pub fn encrypt_aes_ctr(data: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    check_sizes(key, iv)?;
    Ok(apply_keystream(data, key, iv))
}

/// Decrypt with AES-256-CTR (the same keystream XOR as encryption)
pub fn decrypt_aes_ctr(data: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    check_sizes(key, iv)?;
    Ok(apply_keystream(data, key, iv))
}

/// IV whose counter half has been advanced by `blocks`
fn counter_at(iv: &[u8], blocks: u64) -> [u8; CTR_IV_SIZE] {
    let mut out = [0u8; CTR_IV_SIZE];
    out.copy_from_slice(iv);
    let mut counter = [0u8; 8];
    counter.copy_from_slice(&iv[CTR_NONCE_SIZE..]);
    let advanced = u64::from_be_bytes(counter).wrapping_add(blocks);
    out[CTR_NONCE_SIZE..].copy_from_slice(&advanced.to_be_bytes());
    out
}

/// Decrypt the inclusive byte range `[start, end]` of a CTR ciphertext.
///
/// Only the blocks covering the range are processed. `end` is clamped to the
/// last byte of `ciphertext`; a range starting past the end yields an empty
/// result.
pub fn decrypt_aes_ctr_range(
    ciphertext: &[u8],
    key: &[u8],
    iv: &[u8],
    start: u64,
    end: u64,
) -> Result<Vec<u8>> {
    check_sizes(key, iv)?;
    if start > end {
        return Err(CryptoError::InvalidInput(format!(
            "range start {} is after end {}",
            start, end
        )));
    }

    let len = ciphertext.len() as u64;
    if start >= len {
        return Ok(Vec::new());
    }
    let end = end.min(len - 1);

    let first_block = start / BLOCK_SIZE as u64;
    let block_start = (first_block * BLOCK_SIZE as u64) as usize;
    let block_iv = counter_at(iv, first_block);

    let covering = &ciphertext[block_start..=end as usize];
    let plain = apply_keystream(covering, key, &block_iv);
    let skip = (start as usize) - block_start;
    Ok(plain[skip..].to_vec())
}
