//! Sharing containers with other users
//!
//! Sharing one key is a re-wrap from the owner to the recipient. Sharing a
//! container shares its whole subtree: a depth-first walk over already
//! fetched listings and item records collects every descendant key, then all
//! of them are re-wrapped for the recipient in parallel. The share is all or
//! nothing; the first failure aborts it and names the entry.

use crate::{
    metadata::{decrypt_item_record, decrypt_listing},
    CoreError, Result,
};
use cipherbox_crypto::{
    rewrap_key, unwrap_key, AeadEnvelope, CryptoError, SymmetricKey, UserKeypair, UserPublicKey,
};
use futures::{stream, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Default number of re-wraps in flight during a subtree share
pub const DEFAULT_SHARE_FANOUT: usize = 8;

/// Re-wrap a container root key from its owner to a recipient
pub fn share_key(
    owner_private_key: &[u8],
    root_key_wrapped_for_owner: &[u8],
    recipient_public_key: &[u8],
) -> Result<Vec<u8>> {
    Ok(rewrap_key(
        root_key_wrapped_for_owner,
        owner_private_key,
        recipient_public_key,
    )?)
}

/// Encrypted documents the caller has already fetched
pub trait ContainerSource {
    /// Encrypted listing of the container published at `address_name`
    fn listing(&self, address_name: &str) -> Option<&AeadEnvelope>;

    /// Encrypted record of the item published at `item_address_name`
    fn item_record(&self, item_address_name: &str) -> Option<&AeadEnvelope>;
}

/// A `ContainerSource` backed by maps
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    listings: HashMap<String, AeadEnvelope>,
    items: HashMap<String, AeadEnvelope>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_listing(&mut self, address_name: impl Into<String>, envelope: AeadEnvelope) {
        self.listings.insert(address_name.into(), envelope);
    }

    pub fn insert_item_record(&mut self, address_name: impl Into<String>, envelope: AeadEnvelope) {
        self.items.insert(address_name.into(), envelope);
    }
}

impl ContainerSource for MemorySource {
    fn listing(&self, address_name: &str) -> Option<&AeadEnvelope> {
        self.listings.get(address_name)
    }

    fn item_record(&self, item_address_name: &str) -> Option<&AeadEnvelope> {
        self.items.get(item_address_name)
    }
}

/// What a shared key unlocks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// A container's root key
    ContainerKey,
    /// A container's signing seed
    SigningKey,
    /// An item's content key
    ContentKey,
}

/// A key wrapped to the owner, waiting to be re-wrapped
#[derive(Clone, Debug)]
struct ShareTarget {
    entry: String,
    kind: KeyKind,
    wrapped_for_owner: Vec<u8>,
}

/// A key re-wrapped for the recipient
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedKey {
    /// Path-like label, e.g. `root/Photos/item:cat.jpg`
    pub entry: String,
    pub kind: KeyKind,
    pub wrapped: Vec<u8>,
}

/// The container a subtree share starts from
#[derive(Clone, Debug)]
pub struct SubtreeRoot {
    pub address_name: String,
    /// Root key wrapped to the owner
    pub wrapped_root_key: Vec<u8>,
}

/// Every key of a subtree, re-wrapped for one recipient
#[derive(Clone, Debug)]
pub struct SubtreeShare {
    pub recipient: UserPublicKey,
    pub keys: Vec<SharedKey>,
}

impl SubtreeShare {
    /// The shared root key of the subtree
    pub fn root_key(&self) -> Option<&SharedKey> {
        self.keys.iter().find(|k| k.entry == ROOT_ENTRY)
    }
}

const ROOT_ENTRY: &str = "root";

fn aborted(entry: &str, reason: impl Into<String>) -> CoreError {
    CoreError::ShareAborted {
        entry: entry.to_string(),
        reason: reason.into(),
    }
}

/// Run owner-side crypto for `entry` on the blocking pool
async fn run_blocking<T, F>(entry: &str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        tracing::debug!(error = %e, entry = %entry, "blocking task failed");
        aborted(entry, "worker task failed")
    })?
}

/// Depth-first walk collecting every key below `root`
async fn collect_targets<S: ContainerSource + ?Sized>(
    source: &S,
    root: &SubtreeRoot,
    owner_secret: &Arc<Zeroizing<[u8; 32]>>,
) -> Result<Vec<ShareTarget>> {
    let mut targets = vec![ShareTarget {
        entry: ROOT_ENTRY.to_string(),
        kind: KeyKind::ContainerKey,
        wrapped_for_owner: root.wrapped_root_key.clone(),
    }];
    let mut stack = vec![(
        ROOT_ENTRY.to_string(),
        root.address_name.clone(),
        root.wrapped_root_key.clone(),
    )];

    while let Some((path, address_name, wrapped_key)) = stack.pop() {
        let envelope = source
            .listing(&address_name)
            .ok_or_else(|| aborted(&path, "listing not fetched"))?
            .clone();
        let owner = Arc::clone(owner_secret);
        let label = path.clone();
        let (container_key, listing) = run_blocking(&path, move || {
            let container_key = unwrap_key(&wrapped_key, owner.as_slice())
                .and_then(|bytes| SymmetricKey::from_bytes(&bytes))
                .map_err(|e| aborted(&label, e.to_string()))?;
            let listing = decrypt_listing(&envelope, &container_key)
                .map_err(|e| aborted(&label, e.to_string()))?;
            Ok((container_key, listing))
        })
        .await?;

        let files = listing
            .files()
            .map(|file| {
                let entry = format!("{}/item:{}", path, file.name);
                let envelope = source
                    .item_record(&file.item_address_name)
                    .ok_or_else(|| aborted(&entry, "item record not fetched"))?
                    .clone();
                Ok((entry, envelope))
            })
            .collect::<Result<Vec<(String, AeadEnvelope)>>>()?;
        let records = run_blocking(&path, move || {
            files
                .into_iter()
                .map(|(entry, envelope)| {
                    let record = decrypt_item_record(&envelope, &container_key)
                        .map_err(|e| aborted(&entry, e.to_string()))?;
                    Ok((entry, record))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await?;

        for (entry, record) in records {
            for (i, old) in record.history.iter().enumerate() {
                targets.push(ShareTarget {
                    entry: format!("{}@history[{}]", entry, i),
                    kind: KeyKind::ContentKey,
                    wrapped_for_owner: old.wrapped_content_key.clone(),
                });
            }
            targets.push(ShareTarget {
                entry,
                kind: KeyKind::ContentKey,
                wrapped_for_owner: record.wrapped_content_key,
            });
        }

        for folder in listing.folders() {
            let entry = format!("{}/{}", path, folder.name);
            targets.push(ShareTarget {
                entry: format!("{}#signing", entry),
                kind: KeyKind::SigningKey,
                wrapped_for_owner: folder.wrapped_signing_key.clone(),
            });
            targets.push(ShareTarget {
                entry: entry.clone(),
                kind: KeyKind::ContainerKey,
                wrapped_for_owner: folder.wrapped_container_key.clone(),
            });
            stack.push((
                entry,
                folder.address_name.clone(),
                folder.wrapped_container_key.clone(),
            ));
        }
    }

    Ok(targets)
}

/// Share a container and everything below it.
///
/// Owner-side unwraps and decrypts run on the blocking pool, one task per
/// container. Keys are re-wrapped on the blocking pool with at most `fanout` in flight.
/// If any re-wrap fails the share is abandoned and the error names the entry;
/// no partial result is returned.
#[tracing::instrument(skip_all, fields(root = %root.address_name, fanout = fanout))]
pub async fn share_subtree<S: ContainerSource + ?Sized>(
    source: &S,
    root: &SubtreeRoot,
    owner: &UserKeypair,
    recipient: &UserPublicKey,
    fanout: usize,
) -> Result<SubtreeShare> {
    let owner_secret = Arc::new(Zeroizing::new(*owner.secret_bytes()));
    let targets = collect_targets(source, root, &owner_secret).await?;
    tracing::debug!(keys = targets.len(), "collected subtree keys");

    let recipient_key = *recipient;

    let keys: Vec<SharedKey> = stream::iter(targets)
        .map(|target| {
            let owner_secret = Arc::clone(&owner_secret);
            async move {
                let entry = target.entry.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    rewrap_key(
                        &target.wrapped_for_owner,
                        owner_secret.as_slice(),
                        recipient_key.as_bytes(),
                    )
                    .map(|wrapped| SharedKey {
                        entry: target.entry,
                        kind: target.kind,
                        wrapped,
                    })
                })
                .await;

                match joined {
                    Ok(Ok(shared)) => Ok(shared),
                    Ok(Err(e)) => Err(aborted(&entry, e.to_string())),
                    Err(e) => {
                        tracing::debug!(error = %e, entry = %entry, "re-wrap task failed");
                        Err(aborted(&entry, CryptoError::KeyRewrapFailed.to_string()))
                    }
                }
            }
        })
        .buffer_unordered(fanout.max(1))
        .try_collect()
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "subtree share aborted");
            e
        })?;

    tracing::info!(keys = keys.len(), "subtree shared");
    Ok(SubtreeShare {
        recipient: *recipient,
        keys,
    })
}
