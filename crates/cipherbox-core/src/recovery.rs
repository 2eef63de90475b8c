//! Vault recovery export
//!
//! A small JSON document that, together with the user's private key, is
//! enough to rebuild the root container bundle without the relay. It holds
//! only wrapped keys and public values.

use crate::{
    container::{unwrap_secrets, ContainerRootBundle},
    CoreError, Result,
};
use chrono::{DateTime, SecondsFormat, Utc};
use cipherbox_crypto::{
    derivation::{DERIVATION_SALT, ROOT_CONTAINER_INFO},
    derive_root_container_keypair,
    encoding::hex_bytes,
};
use serde::{Deserialize, Serialize};

pub const EXPORT_FORMAT: &str = "cipherbox-vault-export";
pub const EXPORT_VERSION: &str = "1.0";

/// HKDF parameters of the root signing key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationInfo {
    pub salt: String,
    pub info: String,
}

impl Default for DerivationInfo {
    fn default() -> Self {
        Self {
            salt: DERIVATION_SALT.to_string(),
            info: ROOT_CONTAINER_INFO.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryExport {
    pub format: String,
    pub version: String,
    /// RFC 3339
    pub exported_at: String,
    pub root_address_name: String,
    #[serde(with = "hex_bytes")]
    pub encrypted_root_folder_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub encrypted_root_signing_key: Vec<u8>,
    pub derivation: DerivationInfo,
}

impl RecoveryExport {
    /// Export a root bundle wrapped to the user's public key
    pub fn export(
        bundle: &ContainerRootBundle,
        user_public_key: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let wrapped = bundle.wrap(user_public_key)?;
        Ok(Self {
            format: EXPORT_FORMAT.to_string(),
            version: EXPORT_VERSION.to_string(),
            exported_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            root_address_name: bundle.address_name()?,
            encrypted_root_folder_key: wrapped.wrapped_root_key,
            encrypted_root_signing_key: wrapped.wrapped_signing_key,
            derivation: DerivationInfo::default(),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Parse an export, rejecting other formats and versions
    pub fn from_json(json: &str) -> Result<Self> {
        let export: Self =
            serde_json::from_str(json).map_err(|e| CoreError::Recovery(e.to_string()))?;
        if export.format != EXPORT_FORMAT {
            return Err(CoreError::Recovery(format!(
                "unknown export format {:?}",
                export.format
            )));
        }
        if export.version != EXPORT_VERSION {
            return Err(CoreError::UnsupportedSchema(export.version));
        }
        Ok(export)
    }

    /// Rebuild the root bundle with the user's private key.
    ///
    /// The recovered signing key must publish under `root_address_name`.
    pub fn recover(&self, user_private_key: &[u8]) -> Result<ContainerRootBundle> {
        let bundle = unwrap_secrets(
            &self.encrypted_root_folder_key,
            &self.encrypted_root_signing_key,
            user_private_key,
        )?;

        if bundle.address_name()? != self.root_address_name {
            return Err(CoreError::Recovery(
                "recovered key does not match rootAddressName".into(),
            ));
        }
        tracing::info!(address = %self.root_address_name, "vault recovered");
        Ok(bundle)
    }

    /// Check that `master_secret` derives the exported root signing key
    pub fn matches_master_secret(&self, master_secret: &[u8]) -> Result<bool> {
        if self.derivation != DerivationInfo::default() {
            return Err(CoreError::Recovery(format!(
                "unsupported derivation {}/{}",
                self.derivation.salt, self.derivation.info
            )));
        }
        let derived = derive_root_container_keypair(master_secret)?;
        Ok(derived.address_name == self.root_address_name)
    }
}
