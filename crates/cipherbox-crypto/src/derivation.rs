//! Deterministic Ed25519 keypairs from the user's master secret
//!
//! `HKDF-SHA256(ikm = master secret, salt = "CipherBox-v1", info = domain)`
//! yields a 32-byte Ed25519 seed. Every domain shares the salt and differs in
//! its info string, so keys for the root container, the device registry and
//! each item never collide. Subcontainer keys are random and never derived
//! here.

use crate::{
    ipns::derive_ipns_name,
    keys::KEY_SIZE,
    signing::{SigningKeypair, SIGNING_SEED_SIZE},
    CryptoError, Result,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Application salt shared by every derivation domain
pub const DERIVATION_SALT: &str = "CipherBox-v1";

/// Info string for the root container's signing key
pub const ROOT_CONTAINER_INFO: &str = "cipherbox-vault-ipns-v1";

/// Info string for the device registry's signing key
pub const DEVICE_REGISTRY_INFO: &str = "cipherbox-device-registry-ipns-v1";

/// Prefix of the per-item info string; the item id follows the colon
pub const ITEM_INFO_PREFIX: &str = "cipherbox-file-ipns-v1:";

/// Shortest item id accepted for per-item derivation
pub const MIN_ITEM_ID_LEN: usize = 10;

/// 32 bytes of HKDF-SHA256 output
pub(crate) fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info, okm.as_mut_slice())
        .map_err(|_| CryptoError::InvalidInput("hkdf output length".into()))?;
    Ok(okm)
}

/// A derived signing keypair together with its address name
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKeypair {
    pub keypair: SigningKeypair,
    pub address_name: String,
}

impl std::fmt::Debug for DerivedKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeypair")
            .field("address_name", &self.address_name)
            .finish_non_exhaustive()
    }
}

/// Derive the signing keypair for `info` from a 32-byte master secret
pub fn derive_signing_keypair(master_secret: &[u8], info: &str) -> Result<DerivedKeypair> {
    if master_secret.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeySize);
    }
    let okm = hkdf_sha256(master_secret, DERIVATION_SALT.as_bytes(), info.as_bytes())?;
    let mut seed = Zeroizing::new([0u8; SIGNING_SEED_SIZE]);
    seed.copy_from_slice(&okm[..SIGNING_SEED_SIZE]);

    let keypair = SigningKeypair::from_seed(&seed);
    let address_name = derive_ipns_name(&keypair.public_key())?;
    Ok(DerivedKeypair {
        keypair,
        address_name,
    })
}

/// Info string for an item, rejecting ids too short to separate domains
pub fn item_info(item_id: &str) -> Result<String> {
    if item_id.chars().count() < MIN_ITEM_ID_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "item id must be at least {} characters",
            MIN_ITEM_ID_LEN
        )));
    }
    Ok(format!("{}{}", ITEM_INFO_PREFIX, item_id))
}

/// Signing keypair of the user's root container
pub fn derive_root_container_keypair(master_secret: &[u8]) -> Result<DerivedKeypair> {
    derive_signing_keypair(master_secret, ROOT_CONTAINER_INFO)
}

/// Signing keypair of the user's device registry
pub fn derive_device_registry_keypair(master_secret: &[u8]) -> Result<DerivedKeypair> {
    derive_signing_keypair(master_secret, DEVICE_REGISTRY_INFO)
}

/// Signing keypair of a single item
pub fn derive_item_keypair(master_secret: &[u8], item_id: &str) -> Result<DerivedKeypair> {
    derive_signing_keypair(master_secret, &item_info(item_id)?)
}
