//! # CipherBox Crypto
//!
//! Cryptographic primitives for the CipherBox key hierarchy.
//!
//! This crate provides:
//! - **AES-256-GCM**: content, listing and item-record encryption ([`symmetric`])
//! - **AES-256-CTR**: large content with random-access range reads ([`stream`])
//! - **ECIES (secp256k1)**: wrapping keys to a user's long-term key ([`ecies`])
//! - **Ed25519**: signing keys for address records ([`signing`])
//! - **HKDF derivation**: keypairs recoverable from the master secret ([`derivation`])
//! - **IPNS**: signed address records and address names ([`ipns`])
//!
//! ## Security Model
//!
//! The relay only ever stores ciphertext and wrapped keys:
//! - All encryption happens client-side
//! - Decrypt, unwrap and verify failures carry no detail about their cause
//! - Plaintext key buffers are zeroed on drop
//!
//! ## Example
//!
//! ```rust,ignore
//! use cipherbox_crypto::{wrap_key, unwrap_key, SymmetricKey, UserKeypair};
//!
//! let user = UserKeypair::generate();
//! let folder_key = SymmetricKey::generate();
//!
//! let wrapped = wrap_key(folder_key.as_bytes(), user.public_key().as_bytes())?;
//! let unwrapped = unwrap_key(&wrapped, user.secret_bytes())?;
//! ```

pub mod derivation;
pub mod ecies;
pub mod encoding;
pub mod error;
pub mod ipns;
pub mod keys;
pub mod signing;
pub mod stream;
pub mod symmetric;

pub use derivation::{
    derive_device_registry_keypair, derive_item_keypair, derive_root_container_keypair,
    derive_signing_keypair, DerivedKeypair,
};
pub use ecies::{rewrap_key, unwrap_key, wrap_key, WRAP_OVERHEAD};
pub use error::{CryptoError, Result};
pub use ipns::{
    create_ipns_record, derive_ipns_name, marshal_ipns_record, parse_ipns_name,
    unmarshal_ipns_record, verify_ipns_record, IpnsRecord, IpnsRecordBuilder, RecordVerifier,
};
pub use keys::{generate_file_key, generate_random_bytes, SymmetricKey, UserKeypair, UserPublicKey};
pub use signing::{
    generate_ed25519_keypair, get_public_key, sign_ed25519, verify_ed25519, SigningKeypair,
};
pub use stream::{decrypt_aes_ctr, decrypt_aes_ctr_range, encrypt_aes_ctr, generate_ctr_iv};
pub use symmetric::{
    decrypt_aes_gcm, encrypt_aes_gcm, generate_iv, seal_aes_gcm, unseal_aes_gcm, Aead,
    AeadEnvelope, Iv,
};
