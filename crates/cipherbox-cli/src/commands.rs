//! Subcommand implementations
//!
//! Each command returns the JSON document it prints so it can be tested
//! without capturing stdout.

use crate::config::CliConfig;
use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use cipherbox_core::{
    share_subtree, ContainerRootBundle, ContainerTier, KeyKind, MemorySource, RecoveryExport,
    SubtreeRoot,
};
use cipherbox_crypto::{
    derive_device_registry_keypair, derive_item_keypair, derive_root_container_keypair,
    encoding::hex_bytes, marshal_ipns_record, unmarshal_ipns_record, verify_ipns_record,
    AeadEnvelope, IpnsRecordBuilder, SigningKeypair, UserKeypair, UserPublicKey,
};
use clap::{Subcommand, ValueEnum};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use zeroize::Zeroizing;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a secp256k1 user keypair
    Keygen,

    /// Derive the address name of a signing key from the master secret
    Derive {
        /// 32-byte master secret, hex
        #[arg(long, env = "CIPHERBOX_MASTER_SECRET", hide_env_values = true)]
        master_secret: String,

        #[arg(long, value_enum, default_value = "root")]
        domain: Domain,

        /// Item id, required for `--domain item`
        #[arg(long)]
        item_id: Option<String>,
    },

    /// Create a root container bundle and print its recovery export
    InitVault {
        /// 32-byte master secret, hex
        #[arg(long, env = "CIPHERBOX_MASTER_SECRET", hide_env_values = true)]
        master_secret: String,

        /// User public key (65-byte uncompressed secp256k1), hex
        #[arg(long)]
        public_key: String,
    },

    /// Rebuild the root bundle from a recovery export
    Recover {
        /// Recovery export JSON file
        #[arg(long)]
        export: PathBuf,

        /// User private key, hex
        #[arg(long, env = "CIPHERBOX_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
    },

    /// Re-wrap every key of a folder subtree for another user
    Share {
        /// Snapshot JSON of the fetched, encrypted subtree
        #[arg(long)]
        snapshot: PathBuf,

        /// Owner private key, hex
        #[arg(long, env = "CIPHERBOX_PRIVATE_KEY", hide_env_values = true)]
        private_key: String,

        /// Recipient public key, hex
        #[arg(long)]
        recipient: String,
    },

    /// Address records
    #[command(subcommand)]
    Record(RecordCommand),
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Sign a new record
    Create {
        /// Ed25519 seed, hex
        #[arg(long, env = "CIPHERBOX_SIGNING_SEED", hide_env_values = true)]
        seed: String,

        /// Path the record points at, e.g. /ipfs/<cid>
        #[arg(long)]
        value: String,

        #[arg(long)]
        sequence: u64,

        /// Omit the legacy signature
        #[arg(long)]
        v2_only: bool,
    },

    /// Verify a record against an address name
    Verify {
        #[arg(long)]
        name: String,

        /// Marshaled record, base64
        #[arg(long)]
        record: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Domain {
    Root,
    DeviceRegistry,
    Item,
}

pub fn run(command: Command, config: &CliConfig) -> anyhow::Result<Value> {
    match command {
        Command::Keygen => Ok(keygen()),
        Command::Derive {
            master_secret,
            domain,
            item_id,
        } => derive(&master_secret, domain, item_id.as_deref()),
        Command::InitVault {
            master_secret,
            public_key,
        } => init_vault(&master_secret, &public_key),
        Command::Recover {
            export,
            private_key,
        } => {
            let json = std::fs::read_to_string(&export)
                .with_context(|| format!("reading {}", export.display()))?;
            recover(&json, &private_key)
        }
        Command::Share {
            snapshot,
            private_key,
            recipient,
        } => {
            let json = std::fs::read_to_string(&snapshot)
                .with_context(|| format!("reading {}", snapshot.display()))?;
            share(&json, &private_key, &recipient, config)
        }
        Command::Record(RecordCommand::Create {
            seed,
            value,
            sequence,
            v2_only,
        }) => create_record(&seed, &value, sequence, v2_only, config),
        Command::Record(RecordCommand::Verify { name, record }) => verify_record(&name, &record),
    }
}

fn decode_hex(what: &str, s: &str) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    hex::decode(s.trim())
        .map(Zeroizing::new)
        .with_context(|| format!("{} is not valid hex", what))
}

pub fn keygen() -> Value {
    let user = UserKeypair::generate();
    json!({
        "publicKey": user.public_key().to_hex(),
        "privateKey": hex::encode(user.secret_bytes()),
    })
}

pub fn derive(master_secret: &str, domain: Domain, item_id: Option<&str>) -> anyhow::Result<Value> {
    let master = decode_hex("master secret", master_secret)?;
    let derived = match domain {
        Domain::Root => derive_root_container_keypair(&master)?,
        Domain::DeviceRegistry => derive_device_registry_keypair(&master)?,
        Domain::Item => {
            let Some(item_id) = item_id else {
                bail!("--item-id is required for the item domain");
            };
            derive_item_keypair(&master, item_id)?
        }
    };
    Ok(json!({
        "addressName": derived.address_name,
        "publicKey": hex::encode(derived.keypair.public_key()),
    }))
}

pub fn init_vault(master_secret: &str, public_key: &str) -> anyhow::Result<Value> {
    let master = decode_hex("master secret", master_secret)?;
    let user = UserPublicKey::from_hex(public_key.trim()).context("invalid user public key")?;
    let bundle = ContainerRootBundle::init(ContainerTier::Root {
        master_secret: &master,
    })?;
    let export = RecoveryExport::export(&bundle, user.as_bytes(), Utc::now())?;
    tracing::info!(address = %export.root_address_name, "vault initialised");
    Ok(serde_json::to_value(export)?)
}

pub fn recover(export_json: &str, private_key: &str) -> anyhow::Result<Value> {
    let secret = decode_hex("private key", private_key)?;
    let export = RecoveryExport::from_json(export_json)?;
    let bundle = export.recover(&secret)?;
    Ok(json!({
        "rootAddressName": bundle.address_name()?,
        "signingPublicKey": hex::encode(bundle.signing_keypair().public_key()),
    }))
}

/// Encrypted documents of a subtree, as fetched by a client
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtreeSnapshot {
    pub root_address_name: String,
    #[serde(with = "hex_bytes")]
    pub wrapped_root_key: Vec<u8>,
    pub listings: HashMap<String, AeadEnvelope>,
    #[serde(default)]
    pub item_records: HashMap<String, AeadEnvelope>,
}

pub fn share(
    snapshot_json: &str,
    private_key: &str,
    recipient: &str,
    config: &CliConfig,
) -> anyhow::Result<Value> {
    let snapshot: SubtreeSnapshot =
        serde_json::from_str(snapshot_json).context("invalid subtree snapshot")?;
    let owner = UserKeypair::from_secret_bytes(&decode_hex("private key", private_key)?)?;
    let recipient = UserPublicKey::from_hex(recipient.trim()).context("invalid recipient key")?;

    let mut source = MemorySource::new();
    for (name, envelope) in snapshot.listings {
        source.insert_listing(name, envelope);
    }
    for (name, envelope) in snapshot.item_records {
        source.insert_item_record(name, envelope);
    }
    let root = SubtreeRoot {
        address_name: snapshot.root_address_name,
        wrapped_root_key: snapshot.wrapped_root_key,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let share = runtime.block_on(share_subtree(
        &source,
        &root,
        &owner,
        &recipient,
        config.share_fanout,
    ))?;

    let mut keys: Vec<Value> = share
        .keys
        .iter()
        .map(|key| {
            let kind = match key.kind {
                KeyKind::ContainerKey => "container",
                KeyKind::SigningKey => "signing",
                KeyKind::ContentKey => "content",
            };
            json!({ "entry": key.entry, "kind": kind, "wrapped": hex::encode(&key.wrapped) })
        })
        .collect();
    keys.sort_by(|a, b| a["entry"].as_str().cmp(&b["entry"].as_str()));

    Ok(json!({
        "recipient": share.recipient.to_hex(),
        "keys": keys,
    }))
}

pub fn create_record(
    seed: &str,
    value: &str,
    sequence: u64,
    v2_only: bool,
    config: &CliConfig,
) -> anyhow::Result<Value> {
    let keypair = SigningKeypair::from_seed_slice(&decode_hex("seed", seed)?)?;
    let mut builder = IpnsRecordBuilder::new(value, sequence)
        .lifetime(config.record_lifetime())
        .ttl_ns(config.record_ttl_ns());
    if v2_only {
        builder = builder.v2_only();
    }
    let record = builder.sign(&keypair)?;

    Ok(json!({
        "name": cipherbox_crypto::derive_ipns_name(&keypair.public_key())?,
        "validity": record.validity(),
        "record": STANDARD.encode(marshal_ipns_record(&record)),
    }))
}

pub fn verify_record(name: &str, record_b64: &str) -> anyhow::Result<Value> {
    let bytes = STANDARD
        .decode(record_b64.trim())
        .context("record is not valid base64")?;
    let record = unmarshal_ipns_record(&bytes)?;
    verify_ipns_record(name, &record, Utc::now())?;
    Ok(json!({
        "valid": true,
        "value": record.value(),
        "sequence": record.sequence(),
        "validity": record.validity(),
        "v1Compatible": record.is_v1_compatible(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MASTER: &str = "1717171717171717171717171717171717171717171717171717171717171717";

    #[test]
    fn test_keygen_shape() {
        let keys = keygen();
        assert_eq!(keys["publicKey"].as_str().unwrap().len(), 130);
        assert_eq!(keys["privateKey"].as_str().unwrap().len(), 64);
    }

    #[rstest]
    #[case(Domain::Root, None)]
    #[case(Domain::DeviceRegistry, None)]
    #[case(Domain::Item, Some("item-0123456789"))]
    fn test_derive_is_stable(#[case] domain: Domain, #[case] item_id: Option<&str>) {
        let a = derive(MASTER, domain, item_id).unwrap();
        let b = derive(MASTER, domain, item_id).unwrap();
        assert_eq!(a, b);
        assert!(a["addressName"].as_str().unwrap().starts_with("k51"));
    }

    #[test]
    fn test_derive_item_needs_id() {
        assert!(derive(MASTER, Domain::Item, None).is_err());
        assert!(derive(MASTER, Domain::Item, Some("short")).is_err());
    }

    #[test]
    fn test_init_vault_then_recover() {
        let keys = keygen();
        let export = init_vault(MASTER, keys["publicKey"].as_str().unwrap()).unwrap();
        let recovered = recover(
            &export.to_string(),
            keys["privateKey"].as_str().unwrap(),
        )
        .unwrap();

        let root = derive(MASTER, Domain::Root, None).unwrap();
        assert_eq!(recovered["rootAddressName"], root["addressName"]);
        assert_eq!(recovered["rootAddressName"], export["rootAddressName"]);
    }

    #[test]
    fn test_share_snapshot() {
        use cipherbox_core::{encrypt_listing, ContainerListing};

        let owner = UserKeypair::generate();
        let recipient = UserKeypair::generate();
        let bundle = ContainerRootBundle::init(ContainerTier::Nested).unwrap();
        let wrapped = bundle.wrap(owner.public_key().as_bytes()).unwrap();
        let listing = encrypt_listing(&ContainerListing::new(), bundle.root_key()).unwrap();
        let address = bundle.address_name().unwrap();

        let snapshot = json!({
            "rootAddressName": address,
            "wrappedRootKey": hex::encode(&wrapped.wrapped_root_key),
            "listings": { (address.clone()): listing },
        });
        let out = share(
            &snapshot.to_string(),
            &hex::encode(owner.secret_bytes()),
            &recipient.public_key().to_hex(),
            &CliConfig::default(),
        )
        .unwrap();

        assert_eq!(out["keys"].as_array().unwrap().len(), 1);
        assert_eq!(out["keys"][0]["entry"], "root");
        let shared = hex::decode(out["keys"][0]["wrapped"].as_str().unwrap()).unwrap();
        assert_eq!(
            cipherbox_crypto::unwrap_key(&shared, recipient.secret_bytes())
                .unwrap()
                .as_slice(),
            bundle.root_key().as_bytes()
        );
    }

    #[test]
    fn test_record_create_then_verify() {
        let config = CliConfig::default();
        let seed = hex::encode([9u8; 32]);
        let created = create_record(&seed, "/ipfs/bafkqaaa", 3, false, &config).unwrap();

        let verified = verify_record(
            created["name"].as_str().unwrap(),
            created["record"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(verified["sequence"], 3);
        assert_eq!(verified["value"], "/ipfs/bafkqaaa");
        assert_eq!(verified["v1Compatible"], true);
    }

    #[test]
    fn test_record_verify_rejects_other_name() {
        let config = CliConfig::default();
        let created =
            create_record(&hex::encode([9u8; 32]), "/ipfs/bafkqaaa", 1, true, &config).unwrap();
        let other = create_record(&hex::encode([8u8; 32]), "/ipfs/bafkqaaa", 1, true, &config)
            .unwrap();

        assert!(verify_record(
            other["name"].as_str().unwrap(),
            created["record"].as_str().unwrap()
        )
        .is_err());
    }
}
