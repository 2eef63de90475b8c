//! The device registry
//!
//! Lists the devices allowed to act for a user. The whole JSON document is
//! wrapped to the owner's secp256k1 key as a single ECIES blob, so unlike
//! listings there is no envelope and no visible IV.
//!
//! Validation failures are all reported as the same "Schema validation
//! failed" so a tampered registry reveals nothing about which check tripped.

use super::{check, is_hex_of_len, schema_error, to_json, Timestamp};
use crate::{CoreError, Result};
use cipherbox_crypto::{unwrap_key, wrap_key};
use serde::{Deserialize, Serialize};

/// Registry schema written by this crate
pub const DEVICE_REGISTRY_VERSION: &str = "v1";

/// Hex length of a device id (SHA-256 of the device public key)
pub const DEVICE_ID_HEX_LEN: usize = 64;

/// Hex length of an uncompressed secp256k1 public key
pub const DEVICE_PUBLIC_KEY_HEX_LEN: usize = 130;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePlatform {
    Web,
    Macos,
    Windows,
    Linux,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Pending,
    Authorized,
    Revoked,
}

/// One registered device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: String,
    pub public_key: String,
    pub name: String,
    pub platform: DevicePlatform,
    pub app_version: String,
    pub status: DeviceStatus,
    pub created_at: Timestamp,
    pub last_seen_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub revoked_by: Option<String>,
}

impl DeviceRecord {
    fn validate(&self) -> Result<()> {
        check(is_hex_of_len(&self.device_id, DEVICE_ID_HEX_LEN), "deviceId")?;
        check(
            is_hex_of_len(&self.public_key, DEVICE_PUBLIC_KEY_HEX_LEN),
            "publicKey",
        )?;
        check(
            self.revoked_at.is_some() == self.revoked_by.is_some(),
            "revokedAt/revokedBy pairing",
        )?;
        if let Some(by) = &self.revoked_by {
            check(is_hex_of_len(by, DEVICE_ID_HEX_LEN), "revokedBy")?;
        }
        Ok(())
    }
}

/// The decrypted registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistryDoc {
    pub version: String,
    /// Bumped on every change
    pub sequence: u64,
    pub devices: Vec<DeviceRecord>,
}

impl Default for DeviceRegistryDoc {
    fn default() -> Self {
        Self {
            version: DEVICE_REGISTRY_VERSION.to_string(),
            sequence: 0,
            devices: Vec::new(),
        }
    }
}

impl DeviceRegistryDoc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    /// Add a device or replace the one with the same id
    pub fn upsert_device(&mut self, device: DeviceRecord) -> Result<()> {
        device.validate()?;
        match self.devices.iter_mut().find(|d| d.device_id == device.device_id) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
        self.sequence += 1;
        Ok(())
    }

    /// Mark a device revoked by another device
    pub fn revoke_device(&mut self, device_id: &str, revoked_by: &str, now: Timestamp) -> Result<()> {
        check(is_hex_of_len(revoked_by, DEVICE_ID_HEX_LEN), "revokedBy")?;
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.device_id == device_id)
            .ok_or_else(|| CoreError::DeviceNotFound(device_id.to_string()))?;

        device.status = DeviceStatus::Revoked;
        device.revoked_at = Some(now);
        device.revoked_by = Some(revoked_by.to_string());
        self.sequence += 1;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check(self.version == DEVICE_REGISTRY_VERSION, "version")?;
        self.devices.iter().try_for_each(DeviceRecord::validate)
    }
}

/// Wrap the registry to the owner's public key
pub fn encrypt_device_registry(doc: &DeviceRegistryDoc, owner_public_key: &[u8]) -> Result<Vec<u8>> {
    doc.validate()?;
    let json = zeroize::Zeroizing::new(to_json(doc)?);
    Ok(wrap_key(&json, owner_public_key)?)
}

/// Unwrap and validate the registry
pub fn decrypt_device_registry(blob: &[u8], owner_private_key: &[u8]) -> Result<DeviceRegistryDoc> {
    let json = unwrap_key(blob, owner_private_key)?;
    let doc: DeviceRegistryDoc = serde_json::from_slice(&json).map_err(schema_error)?;
    doc.validate()?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherbox_crypto::{CryptoError, UserKeypair};
    use serde_json::json;

    fn device(n: u8) -> DeviceRecord {
        let kp = UserKeypair::generate();
        DeviceRecord {
            device_id: hex::encode([n; 32]),
            public_key: kp.public_key().to_hex(),
            name: format!("laptop-{}", n),
            platform: DevicePlatform::Linux,
            app_version: "0.1.0".into(),
            status: DeviceStatus::Authorized,
            created_at: 1_700_000_000_000,
            last_seen_at: 1_700_000_000_000,
            revoked_at: None,
            revoked_by: None,
        }
    }

    fn registry() -> DeviceRegistryDoc {
        let mut doc = DeviceRegistryDoc::new();
        doc.upsert_device(device(1)).unwrap();
        doc.upsert_device(device(2)).unwrap();
        doc
    }

    #[test]
    fn test_roundtrip_to_owner() {
        let owner = UserKeypair::generate();
        let doc = registry();
        let blob = encrypt_device_registry(&doc, owner.public_key().as_bytes()).unwrap();
        assert_eq!(decrypt_device_registry(&blob, owner.secret_bytes()).unwrap(), doc);
    }

    #[test]
    fn test_other_key_cannot_read() {
        let owner = UserKeypair::generate();
        let blob = encrypt_device_registry(&registry(), owner.public_key().as_bytes()).unwrap();
        assert_eq!(
            decrypt_device_registry(&blob, UserKeypair::generate().secret_bytes()),
            Err(CoreError::Crypto(CryptoError::KeyUnwrapFailed))
        );
    }

    #[test]
    fn test_sequence_bumps() {
        let mut doc = registry();
        assert_eq!(doc.sequence, 2);
        doc.upsert_device(device(1)).unwrap();
        assert_eq!(doc.devices.len(), 2);
        assert_eq!(doc.sequence, 3);
    }

    #[test]
    fn test_revoke_sets_pair() {
        let mut doc = registry();
        let revoker = doc.devices[0].device_id.clone();
        let target = doc.devices[1].device_id.clone();
        doc.revoke_device(&target, &revoker, 1_700_000_100_000).unwrap();

        let revoked = doc.device(&target).unwrap();
        assert_eq!(revoked.status, DeviceStatus::Revoked);
        assert_eq!(revoked.revoked_at, Some(1_700_000_100_000));
        assert_eq!(revoked.revoked_by.as_deref(), Some(revoker.as_str()));
        assert_eq!(doc.sequence, 3);

        assert_eq!(
            doc.revoke_device(&hex::encode([9u8; 32]), &revoker, 0),
            Err(CoreError::DeviceNotFound(hex::encode([9u8; 32])))
        );
    }

    fn assert_rejected(doc: serde_json::Value) {
        let owner = UserKeypair::generate();
        let bytes = doc.to_string().into_bytes();
        let blob = wrap_key(&bytes, owner.public_key().as_bytes()).unwrap();
        let err = decrypt_device_registry(&blob, owner.secret_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "Schema validation failed");
    }

    fn device_json() -> serde_json::Value {
        serde_json::to_value(device(1)).unwrap()
    }

    #[test]
    fn test_bad_device_id_length() {
        let mut d = device_json();
        d["deviceId"] = json!("abcd");
        assert_rejected(json!({"version": "v1", "sequence": 1, "devices": [d]}));
    }

    #[test]
    fn test_bad_public_key_length() {
        let mut d = device_json();
        d["publicKey"] = json!("04".repeat(33));
        assert_rejected(json!({"version": "v1", "sequence": 1, "devices": [d]}));
    }

    #[test]
    fn test_unknown_platform() {
        let mut d = device_json();
        d["platform"] = json!("beos");
        assert_rejected(json!({"version": "v1", "sequence": 1, "devices": [d]}));
    }

    #[test]
    fn test_unpaired_revocation() {
        let mut d = device_json();
        d["revokedAt"] = json!(1_700_000_000_000u64);
        assert_rejected(json!({"version": "v1", "sequence": 1, "devices": [d]}));
    }

    #[test]
    fn test_negative_sequence() {
        assert_rejected(json!({"version": "v1", "sequence": -1, "devices": []}));
    }
}
