//! IPNS address records and address names
//!
//! A record points an address name at a content value, with a sequence
//! number and a validity window. The signed body is DAG-CBOR with the keys
//! `TTL, Value, Sequence, Validity, ValidityType` (already in canonical
//! order); the wire form is the IPNS `IpnsEntry` protobuf.
//!
//! Two signatures are produced:
//! - V2: `sign("ipns-signature:" || cbor_body)`, always present
//! - V1: `sign(value || validity || "EOL")`, present in V1-compatible records
//!
//! Address names are an Ed25519 public key in a libp2p protobuf, inlined in
//! an identity multihash, as a CIDv1 with the `libp2p-key` codec rendered in
//! lowercase base36 (`k51...`).

use crate::{
    signing::{verify_ed25519, SigningKeypair, SIGNATURE_SIZE, SIGNING_PUBLIC_KEY_SIZE},
    CryptoError, Result,
};
use chrono::{DateTime, SecondsFormat, Utc};
use cid::Cid;
use multibase::Base;
use multihash::Multihash;
use prost::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Domain prefix of the V2 signature input
pub const IPNS_SIGNATURE_PREFIX: &[u8] = b"ipns-signature:";

/// Default cache TTL carried in records (5 minutes, in nanoseconds)
pub const DEFAULT_TTL_NS: u64 = 300_000_000_000;

/// Default record lifetime
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Largest record accepted by `unmarshal_ipns_record`
pub const MAX_RECORD_SIZE: usize = 10 * 1024;

/// Multicodec `libp2p-key`
const LIBP2P_KEY_CODEC: u64 = 0x72;

/// Multihash `identity`
const IDENTITY_HASH: u64 = 0x00;

/// The only validity type IPNS defines
const VALIDITY_TYPE_EOL: &[u8] = b"EOL";

mod proto {
    /// `IpnsEntry` from the IPNS record specification
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct IpnsEntry {
        #[prost(bytes = "vec", optional, tag = "1")]
        pub value: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub signature_v1: Option<Vec<u8>>,
        #[prost(enumeration = "ValidityType", optional, tag = "3")]
        pub validity_type: Option<i32>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub validity: Option<Vec<u8>>,
        #[prost(uint64, optional, tag = "5")]
        pub sequence: Option<u64>,
        #[prost(uint64, optional, tag = "6")]
        pub ttl: Option<u64>,
        #[prost(bytes = "vec", optional, tag = "7")]
        pub pub_key: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "8")]
        pub signature_v2: Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "9")]
        pub data: Option<Vec<u8>>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum ValidityType {
        Eol = 0,
    }

    /// libp2p `PublicKey`
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct PublicKey {
        #[prost(enumeration = "KeyType", required, tag = "1")]
        pub key_type: i32,
        #[prost(bytes = "vec", required, tag = "2")]
        pub data: Vec<u8>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum KeyType {
        Rsa = 0,
        Ed25519 = 1,
        Secp256k1 = 2,
        Ecdsa = 3,
    }
}

/// The DAG-CBOR body covered by the V2 signature
#[derive(Debug, Serialize, Deserialize)]
struct RecordData {
    #[serde(rename = "TTL")]
    ttl: u64,
    #[serde(rename = "Value", with = "serde_bytes")]
    value: Vec<u8>,
    #[serde(rename = "Sequence")]
    sequence: u64,
    #[serde(rename = "Validity", with = "serde_bytes")]
    validity: Vec<u8>,
    #[serde(rename = "ValidityType")]
    validity_type: u64,
}

fn libp2p_public_key(public_key: &[u8; SIGNING_PUBLIC_KEY_SIZE]) -> Vec<u8> {
    proto::PublicKey {
        key_type: proto::KeyType::Ed25519 as i32,
        data: public_key.to_vec(),
    }
    .encode_to_vec()
}

/// Address name for a 32-byte Ed25519 public key
pub fn derive_ipns_name(public_key: &[u8]) -> Result<String> {
    let public_key: &[u8; SIGNING_PUBLIC_KEY_SIZE] =
        public_key.try_into().map_err(|_| CryptoError::InvalidKeySize)?;

    let hash = Multihash::<64>::wrap(IDENTITY_HASH, &libp2p_public_key(public_key))
        .map_err(|_| CryptoError::InvalidInput("public key does not fit a multihash".into()))?;
    Cid::new_v1(LIBP2P_KEY_CODEC, hash)
        .to_string_of_base(Base::Base36Lower)
        .map_err(|_| CryptoError::InvalidInput("address name encoding failed".into()))
}

/// Recover the Ed25519 public key inlined in an address name.
///
/// Accepts the bare name or an `/ipns/` path.
pub fn parse_ipns_name(name: &str) -> Result<[u8; SIGNING_PUBLIC_KEY_SIZE]> {
    let name = name.strip_prefix("/ipns/").unwrap_or(name);
    let cid = Cid::try_from(name).map_err(|e| {
        tracing::debug!(error = %e, "address name is not a CID");
        CryptoError::InvalidRecord("malformed address name")
    })?;
    if cid.codec() != LIBP2P_KEY_CODEC || cid.hash().code() != IDENTITY_HASH {
        return Err(CryptoError::InvalidRecord("address name does not inline a key"));
    }

    let key = proto::PublicKey::decode(cid.hash().digest())
        .map_err(|_| CryptoError::InvalidRecord("malformed address name"))?;
    if key.key_type != proto::KeyType::Ed25519 as i32 {
        return Err(CryptoError::InvalidRecord("address name is not an Ed25519 key"));
    }
    key.data
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidRecord("address name is not an Ed25519 key"))
}

fn v2_signing_input(data: &[u8]) -> Vec<u8> {
    [IPNS_SIGNATURE_PREFIX, data].concat()
}

fn v1_signing_input(value: &[u8], validity: &[u8]) -> Vec<u8> {
    [value, validity, VALIDITY_TYPE_EOL].concat()
}

fn format_validity(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// A signed IPNS record.
///
/// Fields are read from the signed body, so a decoded record always agrees
/// with what its V2 signature covers.
#[derive(Clone, PartialEq, Eq)]
pub struct IpnsRecord {
    value: String,
    sequence: u64,
    validity: String,
    ttl: u64,
    signature_v2: [u8; SIGNATURE_SIZE],
    signature_v1: Option<[u8; SIGNATURE_SIZE]>,
    public_key: Option<Vec<u8>>,
    data: Vec<u8>,
}

impl IpnsRecord {
    /// The pointer the record publishes (e.g. `/ipfs/<cid>`)
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// End of validity, RFC 3339 with nanoseconds
    pub fn validity(&self) -> &str {
        &self.validity
    }

    /// End of validity as a timestamp
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.validity)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| CryptoError::InvalidRecord("malformed validity"))
    }

    /// Cache TTL in nanoseconds
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn signature_v2(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.signature_v2
    }

    pub fn signature_v1(&self) -> Option<&[u8; SIGNATURE_SIZE]> {
        self.signature_v1.as_ref()
    }

    /// The DAG-CBOR body
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the record carries the legacy signature and fields
    pub fn is_v1_compatible(&self) -> bool {
        self.signature_v1.is_some()
    }
}

impl std::fmt::Debug for IpnsRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpnsRecord")
            .field("value", &self.value)
            .field("sequence", &self.sequence)
            .field("validity", &self.validity)
            .field("ttl", &self.ttl)
            .field("v1_compatible", &self.is_v1_compatible())
            .finish()
    }
}

/// Builder for signed records
#[derive(Debug, Clone)]
pub struct IpnsRecordBuilder {
    value: String,
    sequence: u64,
    lifetime: Duration,
    ttl_ns: u64,
    v1_compatible: bool,
    issued_at: Option<DateTime<Utc>>,
}

impl IpnsRecordBuilder {
    /// Start a record for `value` at `sequence`
    pub fn new(value: impl Into<String>, sequence: u64) -> Self {
        Self {
            value: value.into(),
            sequence,
            lifetime: DEFAULT_LIFETIME,
            ttl_ns: DEFAULT_TTL_NS,
            v1_compatible: true,
            issued_at: None,
        }
    }

    /// How long the record stays valid after issue
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Cache TTL in nanoseconds
    pub fn ttl_ns(mut self, ttl_ns: u64) -> Self {
        self.ttl_ns = ttl_ns;
        self
    }

    /// Omit the legacy V1 signature and fields
    pub fn v2_only(mut self) -> Self {
        self.v1_compatible = false;
        self
    }

    /// Fix the issue time instead of reading the clock
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = Some(at);
        self
    }

    /// Sign the record
    pub fn sign(self, keypair: &SigningKeypair) -> Result<IpnsRecord> {
        let issued_at = self.issued_at.unwrap_or_else(Utc::now);
        let lifetime = chrono::Duration::from_std(self.lifetime)
            .map_err(|_| CryptoError::InvalidInput("record lifetime out of range".into()))?;
        let expires = issued_at
            .checked_add_signed(lifetime)
            .ok_or_else(|| CryptoError::InvalidInput("record lifetime out of range".into()))?;
        let validity = format_validity(expires);

        let body = RecordData {
            ttl: self.ttl_ns,
            value: self.value.as_bytes().to_vec(),
            sequence: self.sequence,
            validity: validity.as_bytes().to_vec(),
            validity_type: 0,
        };
        let data = serde_ipld_dagcbor::to_vec(&body).map_err(|e| {
            tracing::debug!(error = %e, "record body encoding failed");
            CryptoError::SigningFailed
        })?;

        let signature_v2 = keypair.sign(&v2_signing_input(&data));
        let signature_v1 = self
            .v1_compatible
            .then(|| keypair.sign(&v1_signing_input(self.value.as_bytes(), validity.as_bytes())));

        Ok(IpnsRecord {
            value: self.value,
            sequence: self.sequence,
            validity,
            ttl: self.ttl_ns,
            signature_v2,
            signature_v1,
            public_key: None,
            data,
        })
    }
}

/// Create a V1-compatible record signed with a 32-byte Ed25519 seed
pub fn create_ipns_record(
    signing_private_key: &[u8],
    value: &str,
    sequence: u64,
    lifetime: Duration,
) -> Result<IpnsRecord> {
    let keypair = SigningKeypair::from_seed_slice(signing_private_key)?;
    IpnsRecordBuilder::new(value, sequence)
        .lifetime(lifetime)
        .sign(&keypair)
}

/// Encode a record as an `IpnsEntry` protobuf
pub fn marshal_ipns_record(record: &IpnsRecord) -> Vec<u8> {
    let legacy = record.is_v1_compatible();
    let entry = proto::IpnsEntry {
        value: legacy.then(|| record.value.as_bytes().to_vec()),
        signature_v1: record.signature_v1.map(|sig| sig.to_vec()),
        validity_type: legacy.then_some(proto::ValidityType::Eol as i32),
        validity: legacy.then(|| record.validity.as_bytes().to_vec()),
        sequence: legacy.then_some(record.sequence),
        ttl: legacy.then_some(record.ttl),
        pub_key: record.public_key.clone(),
        signature_v2: Some(record.signature_v2.to_vec()),
        data: Some(record.data.clone()),
    };
    entry.encode_to_vec()
}

fn signature_field(bytes: Vec<u8>) -> Result<[u8; SIGNATURE_SIZE]> {
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidRecord("signature must be 64 bytes"))
}

/// Decode an `IpnsEntry` protobuf.
///
/// Structural checks only; signatures are checked by [`verify_ipns_record`].
/// Legacy fields, when present, must match the signed body.
pub fn unmarshal_ipns_record(bytes: &[u8]) -> Result<IpnsRecord> {
    if bytes.len() > MAX_RECORD_SIZE {
        return Err(CryptoError::InvalidRecord("record exceeds maximum size"));
    }
    let entry = proto::IpnsEntry::decode(bytes).map_err(|e| {
        tracing::debug!(error = %e, "record protobuf decode failed");
        CryptoError::InvalidRecord("malformed record")
    })?;

    let data = entry
        .data
        .ok_or(CryptoError::InvalidRecord("missing signed data"))?;
    let signature_v2 = signature_field(
        entry
            .signature_v2
            .ok_or(CryptoError::InvalidRecord("missing signature"))?,
    )?;
    let signature_v1 = entry.signature_v1.map(signature_field).transpose()?;

    let body: RecordData = serde_ipld_dagcbor::from_slice(&data).map_err(|e| {
        tracing::debug!(error = %e, "record body decode failed");
        CryptoError::InvalidRecord("malformed signed data")
    })?;
    if body.validity_type != 0 {
        return Err(CryptoError::InvalidRecord("unsupported validity type"));
    }

    if signature_v1.is_some() {
        let agrees = entry.value.as_deref() == Some(body.value.as_slice())
            && entry.validity.as_deref() == Some(body.validity.as_slice())
            && entry.validity_type.unwrap_or(0) == 0
            && entry.sequence == Some(body.sequence)
            && entry.ttl == Some(body.ttl);
        if !agrees {
            return Err(CryptoError::InvalidRecord(
                "legacy fields disagree with signed data",
            ));
        }
    }

    let value = String::from_utf8(body.value)
        .map_err(|_| CryptoError::InvalidRecord("value is not UTF-8"))?;
    let validity = String::from_utf8(body.validity)
        .map_err(|_| CryptoError::InvalidRecord("malformed validity"))?;

    let record = IpnsRecord {
        value,
        sequence: body.sequence,
        validity,
        ttl: body.ttl,
        signature_v2,
        signature_v1,
        public_key: entry.pub_key,
        data,
    };
    record.expires_at()?;
    Ok(record)
}

/// Check a record against the address name it was fetched for.
///
/// The V2 signature must verify under the key inlined in `name`, the V1
/// signature must verify when present, and the record must not have expired
/// at `now`. Sequence ordering is tracked by [`RecordVerifier`].
pub fn verify_ipns_record(name: &str, record: &IpnsRecord, now: DateTime<Utc>) -> Result<()> {
    let public_key = parse_ipns_name(name)?;

    if let Some(embedded) = &record.public_key {
        if *embedded != libp2p_public_key(&public_key) {
            return Err(CryptoError::InvalidRecord(
                "embedded public key does not match name",
            ));
        }
    }

    if !verify_ed25519(&record.signature_v2, &v2_signing_input(&record.data), &public_key) {
        tracing::debug!(name, "record signature v2 rejected");
        return Err(CryptoError::InvalidRecord("signature verification failed"));
    }
    if let Some(signature_v1) = &record.signature_v1 {
        let input = v1_signing_input(record.value.as_bytes(), record.validity.as_bytes());
        if !verify_ed25519(signature_v1, &input, &public_key) {
            tracing::debug!(name, "record signature v1 rejected");
            return Err(CryptoError::InvalidRecord("signature verification failed"));
        }
    }

    if record.expires_at()? <= now {
        return Err(CryptoError::InvalidRecord("record expired"));
    }
    Ok(())
}

/// Accepts records per name only when their sequence moves strictly forward
#[derive(Debug, Default)]
pub struct RecordVerifier {
    accepted: HashMap<String, u64>,
}

impl RecordVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of the last record accepted for `name`
    pub fn last_sequence(&self, name: &str) -> Option<u64> {
        self.accepted.get(name).copied()
    }

    /// Verify `record` and, if its sequence is newer, remember it
    pub fn accept(&mut self, name: &str, record: &IpnsRecord, now: DateTime<Utc>) -> Result<()> {
        verify_ipns_record(name, record, now)?;
        if let Some(last) = self.last_sequence(name) {
            if record.sequence <= last {
                tracing::debug!(name, last, got = record.sequence, "stale record");
                return Err(CryptoError::InvalidRecord(
                    "sequence not greater than last accepted",
                ));
            }
        }
        self.accepted.insert(name.to_string(), record.sequence);
        Ok(())
    }
}
