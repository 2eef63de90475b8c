//! Container root bundles
//!
//! Every container (folder) owns a random AES-256 root key, which encrypts
//! its listing and the records of the items inside it, and an Ed25519 key
//! that signs its address record. The user's root container derives that
//! signing key from the master secret so it can be rebuilt with no stored
//! state; nested containers get a random one so each can be rotated alone.

use crate::{CoreError, Result};
use cipherbox_crypto::{
    derive_ipns_name, derive_root_container_keypair,
    encoding::{hex_array, hex_bytes},
    signing::SIGNING_PUBLIC_KEY_SIZE,
    unwrap_key, wrap_key, SigningKeypair, SymmetricKey,
};
use serde::{Deserialize, Serialize};

/// How a container's signing key is obtained
#[derive(Clone, Copy)]
pub enum ContainerTier<'a> {
    /// The user's root container, derived from the master secret
    Root { master_secret: &'a [u8] },
    /// Any container below the root
    Nested,
}

/// Plaintext keys of one container
#[derive(Clone, PartialEq, Eq)]
pub struct ContainerRootBundle {
    root_key: SymmetricKey,
    signing_keypair: SigningKeypair,
}

impl ContainerRootBundle {
    /// Create the keys for a new container
    pub fn init(tier: ContainerTier<'_>) -> Result<Self> {
        let signing_keypair = match tier {
            ContainerTier::Root { master_secret } => {
                derive_root_container_keypair(master_secret)?.keypair
            }
            ContainerTier::Nested => SigningKeypair::generate(),
        };
        Ok(Self {
            root_key: SymmetricKey::generate(),
            signing_keypair,
        })
    }

    /// Assemble a bundle from existing keys
    pub fn from_parts(root_key: SymmetricKey, signing_keypair: SigningKeypair) -> Self {
        Self {
            root_key,
            signing_keypair,
        }
    }

    pub fn root_key(&self) -> &SymmetricKey {
        &self.root_key
    }

    pub fn signing_keypair(&self) -> &SigningKeypair {
        &self.signing_keypair
    }

    /// Address name the container publishes under
    pub fn address_name(&self) -> Result<String> {
        Ok(derive_ipns_name(&self.signing_keypair.public_key())?)
    }

    /// Wrap both secrets to the user's public key.
    ///
    /// The two wraps are independent, each with its own ephemeral key.
    pub fn wrap(&self, user_public_key: &[u8]) -> Result<WrappedContainerBundle> {
        let wrapped_root_key = wrap_key(self.root_key.as_bytes(), user_public_key)?;
        let wrapped_signing_key = wrap_key(self.signing_keypair.seed(), user_public_key)?;
        Ok(WrappedContainerBundle {
            wrapped_root_key,
            wrapped_signing_key,
            signing_public_key: self.signing_keypair.public_key(),
        })
    }
}

impl std::fmt::Debug for ContainerRootBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerRootBundle")
            .field("root_key", &self.root_key)
            .field("signing_keypair", &self.signing_keypair)
            .finish()
    }
}

/// A container bundle as stored: both secrets wrapped, public key in clear
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedContainerBundle {
    #[serde(with = "hex_bytes")]
    pub wrapped_root_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub wrapped_signing_key: Vec<u8>,
    #[serde(with = "hex_array")]
    pub signing_public_key: [u8; SIGNING_PUBLIC_KEY_SIZE],
}

impl WrappedContainerBundle {
    /// Recover the plaintext bundle.
    ///
    /// Errors name the field that failed. The unwrapped signing seed must
    /// reproduce the stored public key.
    pub fn unwrap(&self, user_private_key: &[u8]) -> Result<ContainerRootBundle> {
        let bundle = unwrap_secrets(
            &self.wrapped_root_key,
            &self.wrapped_signing_key,
            user_private_key,
        )?;

        if bundle.signing_keypair.public_key() != self.signing_public_key {
            tracing::debug!("unwrapped signing key does not match stored public key");
            return Err(CoreError::FieldUnwrap {
                field: "signing key",
            });
        }
        Ok(bundle)
    }

    /// Address name derived from the clear public key
    pub fn address_name(&self) -> Result<String> {
        Ok(derive_ipns_name(&self.signing_public_key)?)
    }
}

/// Unwrap both secrets of a bundle, naming the field that failed
pub(crate) fn unwrap_secrets(
    wrapped_root_key: &[u8],
    wrapped_signing_key: &[u8],
    user_private_key: &[u8],
) -> Result<ContainerRootBundle> {
    let root_key = unwrap_key(wrapped_root_key, user_private_key)
        .and_then(|bytes| SymmetricKey::from_bytes(&bytes))
        .map_err(|e| {
            tracing::debug!(cause = e.code(), "root key unwrap failed");
            CoreError::FieldUnwrap { field: "root key" }
        })?;

    let signing_keypair = unwrap_key(wrapped_signing_key, user_private_key)
        .and_then(|seed| SigningKeypair::from_seed_slice(&seed))
        .map_err(|e| {
            tracing::debug!(cause = e.code(), "signing key unwrap failed");
            CoreError::FieldUnwrap {
                field: "signing key",
            }
        })?;

    Ok(ContainerRootBundle {
        root_key,
        signing_keypair,
    })
}
