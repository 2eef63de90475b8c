//! Per-item records
//!
//! An item record holds everything needed to read one file: where the
//! ciphertext lives, the content key wrapped to the owner, the IV and the
//! cipher mode. It is encrypted with the *parent* container's root key, so
//! anyone who can read a container can read every item in it.
//!
//! Replaced versions are kept in `history`, newest first, at most
//! [`MAX_HISTORY_ENTRIES`] of them and no closer together than
//! [`HISTORY_COOLDOWN_MS`]. Both limits are shared with the web client.

use super::{check, check_wrapped_key, is_hex_of_len, read_version, schema_error, to_json, Timestamp};
use crate::{CoreError, Result};
use cipherbox_crypto::{encoding::hex_bytes, AeadEnvelope, SymmetricKey};
use serde::{Deserialize, Serialize};

/// Item record schema written by this crate
pub const ITEM_RECORD_VERSION: &str = "v1";

/// Most history entries kept per item
pub const MAX_HISTORY_ENTRIES: usize = 10;

/// Minimum spacing between history entries (15 minutes)
pub const HISTORY_COOLDOWN_MS: u64 = 15 * 60 * 1000;

/// How an item's content is encrypted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherMode {
    /// AES-256-GCM, 12-byte IV
    #[default]
    #[serde(rename = "GCM")]
    Gcm,
    /// AES-256-CTR, 16-byte IV, for streamed and range-read content
    #[serde(rename = "CTR")]
    Ctr,
}

impl CipherMode {
    /// Hex length of this mode's IV
    pub fn iv_hex_len(self) -> usize {
        match self {
            Self::Gcm => 24,
            Self::Ctr => 32,
        }
    }
}

/// A version of an item's content
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentVersion {
    pub content_address: String,
    pub wrapped_content_key: Vec<u8>,
    pub content_iv: String,
    pub size: u64,
    pub cipher_mode: CipherMode,
}

/// A replaced version kept for restore
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub content_address: String,
    #[serde(with = "hex_bytes")]
    pub wrapped_content_key: Vec<u8>,
    pub content_iv: String,
    pub size: u64,
    /// When this version stopped being current
    pub timestamp: Timestamp,
    #[serde(default)]
    pub cipher_mode: CipherMode,
}

impl HistoryEntry {
    fn validate(&self) -> Result<()> {
        check(!self.content_address.is_empty(), "history contentAddress")?;
        check_wrapped_key(&self.wrapped_content_key, "history wrappedContentKey")?;
        check(
            is_hex_of_len(&self.content_iv, self.cipher_mode.iv_hex_len()),
            "history contentIv",
        )
    }
}

/// The decrypted record of one item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub version: String,
    pub content_address: String,
    #[serde(with = "hex_bytes")]
    pub wrapped_content_key: Vec<u8>,
    pub content_iv: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub cipher_mode: CipherMode,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ItemRecord {
    /// A record for freshly uploaded content
    pub fn new(content: ContentVersion, mime_type: impl Into<String>, now: Timestamp) -> Self {
        Self {
            version: ITEM_RECORD_VERSION.to_string(),
            content_address: content.content_address,
            wrapped_content_key: content.wrapped_content_key,
            content_iv: content.content_iv,
            size: content.size,
            mime_type: mime_type.into(),
            cipher_mode: content.cipher_mode,
            created_at: now,
            modified_at: now,
            history: Vec::new(),
        }
    }

    /// The content currently pointed at
    pub fn current(&self) -> ContentVersion {
        ContentVersion {
            content_address: self.content_address.clone(),
            wrapped_content_key: self.wrapped_content_key.clone(),
            content_iv: self.content_iv.clone(),
            size: self.size,
            cipher_mode: self.cipher_mode,
        }
    }

    /// Replace the current content.
    ///
    /// The replaced version goes to the front of `history` unless the newest
    /// entry there is younger than the cooldown. Returns every version that
    /// is no longer referenced (a skipped one, or ones trimmed off the end)
    /// so the caller can release their content.
    pub fn record_new_version(&mut self, next: ContentVersion, now: Timestamp) -> Vec<HistoryEntry> {
        let replaced = HistoryEntry {
            content_address: std::mem::replace(&mut self.content_address, next.content_address),
            wrapped_content_key: std::mem::replace(
                &mut self.wrapped_content_key,
                next.wrapped_content_key,
            ),
            content_iv: std::mem::replace(&mut self.content_iv, next.content_iv),
            size: std::mem::replace(&mut self.size, next.size),
            timestamp: now,
            cipher_mode: std::mem::replace(&mut self.cipher_mode, next.cipher_mode),
        };
        self.modified_at = now;

        let in_cooldown = self
            .history
            .first()
            .is_some_and(|newest| now.saturating_sub(newest.timestamp) < HISTORY_COOLDOWN_MS);
        if in_cooldown {
            tracing::debug!(address = %replaced.content_address, "version replaced within cooldown");
            return vec![replaced];
        }

        self.history.insert(0, replaced);
        if self.history.len() > MAX_HISTORY_ENTRIES {
            self.history.split_off(MAX_HISTORY_ENTRIES)
        } else {
            Vec::new()
        }
    }

    fn validate(&self) -> Result<()> {
        check(!self.content_address.is_empty(), "contentAddress")?;
        check_wrapped_key(&self.wrapped_content_key, "wrappedContentKey")?;
        check(
            is_hex_of_len(&self.content_iv, self.cipher_mode.iv_hex_len()),
            "contentIv",
        )?;
        check(self.history.len() <= MAX_HISTORY_ENTRIES, "history length")?;
        self.history.iter().try_for_each(HistoryEntry::validate)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        to_json(self)
    }

    /// Parse and validate item-record JSON
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let version = read_version(json)?;
        if version != ITEM_RECORD_VERSION {
            return Err(CoreError::UnsupportedSchema(version));
        }
        let record: Self = serde_json::from_slice(json).map_err(schema_error)?;
        record.validate()?;
        Ok(record)
    }
}

/// Encrypt an item record under its parent container's root key
pub fn encrypt_item_record(record: &ItemRecord, parent_key: &SymmetricKey) -> Result<AeadEnvelope> {
    record.validate()?;
    Ok(AeadEnvelope::encrypt(&record.to_json()?, parent_key)?)
}

/// Decrypt and validate an item record
pub fn decrypt_item_record(envelope: &AeadEnvelope, parent_key: &SymmetricKey) -> Result<ItemRecord> {
    let json = zeroize::Zeroizing::new(envelope.decrypt(parent_key)?);
    ItemRecord::from_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherbox_crypto::CryptoError;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    const T0: Timestamp = 1_700_000_000_000;
    const MINUTE: u64 = 60 * 1000;

    fn version(n: u8, mode: CipherMode) -> ContentVersion {
        ContentVersion {
            content_address: format!("bafkreiversion{}", n),
            wrapped_content_key: vec![n; 129],
            content_iv: "ab".repeat(mode.iv_hex_len() / 2),
            size: 1000 + n as u64,
            cipher_mode: mode,
        }
    }

    fn record() -> ItemRecord {
        ItemRecord::new(version(0, CipherMode::Gcm), "application/pdf", T0)
    }

    #[test]
    fn test_roundtrip_under_parent_key() {
        let key = SymmetricKey::generate();
        let mut rec = record();
        rec.record_new_version(version(1, CipherMode::Ctr), T0 + 20 * MINUTE);

        let envelope = encrypt_item_record(&rec, &key).unwrap();
        assert_eq!(decrypt_item_record(&envelope, &key).unwrap(), rec);
    }

    #[test]
    fn test_optional_fields_default() {
        let doc = json!({
            "version": "v1",
            "contentAddress": "bafkreiabc",
            "wrappedContentKey": "00".repeat(129),
            "contentIv": "11".repeat(12),
            "size": 5,
            "mimeType": "text/plain",
            "createdAt": T0,
            "modifiedAt": T0
        });
        let rec = ItemRecord::from_json(doc.to_string().as_bytes()).unwrap();
        assert_eq!(rec.cipher_mode, CipherMode::Gcm);
        assert!(rec.history.is_empty());
    }

    #[rstest]
    #[case(CipherMode::Gcm, 24, true)]
    #[case(CipherMode::Gcm, 32, false)]
    #[case(CipherMode::Ctr, 32, true)]
    #[case(CipherMode::Ctr, 24, false)]
    fn test_iv_length_must_match_mode(
        #[case] mode: CipherMode,
        #[case] iv_hex_len: usize,
        #[case] ok: bool,
    ) {
        let mut rec = record();
        rec.cipher_mode = mode;
        rec.content_iv = "0".repeat(iv_hex_len);
        let json = serde_json::to_vec(&rec).unwrap();
        assert_eq!(ItemRecord::from_json(&json).is_ok(), ok);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut rec = record();
        rec.version = "v2".into();
        let json = serde_json::to_vec(&rec).unwrap();
        assert_eq!(
            ItemRecord::from_json(&json),
            Err(CoreError::UnsupportedSchema("v2".into()))
        );
    }

    #[test]
    fn test_history_over_cap_rejected() {
        let mut rec = record();
        for i in 0..11u8 {
            rec.history.push(HistoryEntry {
                content_address: format!("old{}", i),
                wrapped_content_key: vec![i; 129],
                content_iv: "0".repeat(24),
                size: 1,
                timestamp: T0,
                cipher_mode: CipherMode::Gcm,
            });
        }
        let json = serde_json::to_vec(&rec).unwrap();
        assert_eq!(
            ItemRecord::from_json(&json),
            Err(CoreError::Crypto(CryptoError::SchemaValidationFailed))
        );
    }

    #[test]
    fn test_new_version_goes_to_history() {
        let mut rec = record();
        let released = rec.record_new_version(version(1, CipherMode::Gcm), T0 + MINUTE);

        assert!(released.is_empty());
        assert_eq!(rec.content_address, "bafkreiversion1");
        assert_eq!(rec.history.len(), 1);
        assert_eq!(rec.history[0].content_address, "bafkreiversion0");
        assert_eq!(rec.modified_at, T0 + MINUTE);
    }

    #[test]
    fn test_cooldown_skips_history() {
        let mut rec = record();
        rec.record_new_version(version(1, CipherMode::Gcm), T0);
        let released = rec.record_new_version(version(2, CipherMode::Gcm), T0 + 14 * MINUTE);

        assert_eq!(rec.history.len(), 1);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].content_address, "bafkreiversion1");
        assert_eq!(rec.content_address, "bafkreiversion2");

        rec.record_new_version(version(3, CipherMode::Gcm), T0 + 15 * MINUTE);
        assert_eq!(rec.history.len(), 2);
        assert_eq!(rec.history[0].content_address, "bafkreiversion2");
    }

    #[test]
    fn test_history_trimmed_to_cap() {
        let mut rec = record();
        let mut released = Vec::new();
        for i in 1..=12u8 {
            let now = T0 + i as u64 * 20 * MINUTE;
            released.extend(rec.record_new_version(version(i, CipherMode::Gcm), now));
        }

        assert_eq!(rec.history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(rec.history[0].content_address, "bafkreiversion11");
        let gone: Vec<_> = released.iter().map(|h| h.content_address.as_str()).collect();
        assert_eq!(gone, ["bafkreiversion0", "bafkreiversion1"]);
    }

    proptest! {
        #[test]
        fn prop_record_roundtrip(mime in "[a-z]{1,12}/[a-z0-9.+-]{1,24}", size in any::<u64>()) {
            let key = SymmetricKey::generate();
            let mut rec = record();
            rec.mime_type = mime;
            rec.size = size;

            let envelope = encrypt_item_record(&rec, &key).unwrap();
            prop_assert_eq!(decrypt_item_record(&envelope, &key).unwrap(), rec);
        }

        #[test]
        fn prop_any_bit_flip_rejected(bit in any::<usize>()) {
            let key = SymmetricKey::generate();
            let mut envelope = encrypt_item_record(&record(), &key).unwrap();
            let bit = bit % (envelope.data.len() * 8);
            envelope.data[bit / 8] ^= 1 << (bit % 8);

            prop_assert_eq!(
                decrypt_item_record(&envelope, &key),
                Err(CoreError::Crypto(CryptoError::DecryptionFailed))
            );
        }
    }
}
