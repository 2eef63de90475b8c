//! Encrypted metadata documents
//!
//! - container listings and item records are AES-GCM envelopes under the
//!   owning container's root key
//! - the device registry is one ECIES blob wrapped to the owner's key
//!
//! Every decrypt validates the document shape. Adding an optional field with
//! a default never bumps a document's `version`.

pub mod device;
pub mod item;
pub mod listing;

pub use device::{
    decrypt_device_registry, encrypt_device_registry, DevicePlatform, DeviceRecord,
    DeviceRegistryDoc, DeviceStatus,
};
pub use item::{
    decrypt_item_record, encrypt_item_record, CipherMode, ContentVersion, HistoryEntry,
    ItemRecord, HISTORY_COOLDOWN_MS, MAX_HISTORY_ENTRIES,
};
pub use listing::{
    decrypt_listing, encrypt_listing, ChildRef, ContainerListing, ItemPointerRef, SubcontainerRef,
};

use crate::{CoreError, Result};
use cipherbox_crypto::{CryptoError, WRAP_OVERHEAD};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Fresh id for a listing entry. Long enough to seed an item keypair.
pub fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Just the `version` discriminant of a document
#[derive(Deserialize)]
struct VersionProbe {
    version: String,
}

fn read_version(json: &[u8]) -> Result<String> {
    serde_json::from_slice::<VersionProbe>(json)
        .map(|probe| probe.version)
        .map_err(schema_error)
}

fn to_json<T: Serialize>(doc: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Collapse any shape problem into the one generic schema error
fn schema_error(cause: impl std::fmt::Display) -> CoreError {
    tracing::debug!(%cause, "document failed schema validation");
    CoreError::Crypto(CryptoError::SchemaValidationFailed)
}

fn is_hex_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn check(condition: bool, what: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(schema_error(what))
    }
}

fn check_wrapped_key(wrapped: &[u8], what: &str) -> Result<()> {
    check(wrapped.len() > WRAP_OVERHEAD, what)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_length_check() {
        assert!(is_hex_of_len("00aaFF", 6));
        assert!(!is_hex_of_len("00aaFF", 4));
        assert!(!is_hex_of_len("00aazz", 6));
    }

    #[test]
    fn test_entry_ids_are_unique_and_long() {
        let a = new_entry_id();
        assert_ne!(a, new_entry_id());
        assert!(a.len() >= cipherbox_crypto::derivation::MIN_ITEM_ID_LEN);
    }

    #[test]
    fn test_schema_error_is_generic() {
        assert_eq!(
            schema_error("deviceId length").to_string(),
            "Schema validation failed"
        );
    }
}
