//! Share grants and lazy root-key rotation
//!
//! Revoking a recipient only marks their grant. The old root key stays in
//! use until the next structural write to the container, which rotates it:
//!
//! 1. [`prepare_rotation`] builds a fresh root key, re-encrypts the listing
//!    and every item record under it, and wraps it for the owner and every
//!    remaining recipient. Nothing is modified.
//! 2. The caller publishes the re-encrypted documents.
//! 3. [`commit_rotation`] swaps the new wrapped keys in and only then
//!    discards the revoked grants.
//!
//! A plan is tied to the access state it was built from, so a plan that is
//! stale or misses a recipient is refused and no grant is lost. A plan is
//! only built when a record is supplied for every file in the listing.

use crate::{
    metadata::{
        decrypt_item_record, decrypt_listing, encrypt_item_record, encrypt_listing,
        ContainerListing,
    },
    sharing::share_key,
    CoreError, Result,
};
use cipherbox_crypto::{
    encoding::hex_bytes, unwrap_key, wrap_key, AeadEnvelope, SymmetricKey, UserKeypair,
    UserPublicKey,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle of a share grant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GrantState {
    Active,
    /// Revoked, still holding a key that opens the current documents
    Revoked,
    /// Root key rotated past this grant; safe to discard
    RotationComplete,
}

/// A container root key shared with one recipient
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareGrant {
    pub recipient: UserPublicKey,
    pub wrapped_root_key: Vec<u8>,
    pub state: GrantState,
    /// Root-key epoch the wrapped key belongs to
    pub key_epoch: u32,
}

/// Who can open one container, and with which root key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerAccess {
    address_name: String,
    epoch: u32,
    revision: u64,
    owner_wrapped_root_key: Vec<u8>,
    grants: Vec<ShareGrant>,
}

impl ContainerAccess {
    pub fn new(address_name: impl Into<String>, owner_wrapped_root_key: Vec<u8>) -> Self {
        Self {
            address_name: address_name.into(),
            epoch: 0,
            revision: 0,
            owner_wrapped_root_key,
            grants: Vec::new(),
        }
    }

    pub fn address_name(&self) -> &str {
        &self.address_name
    }

    /// Incremented on every rotation
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Incremented on every change to the grants
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn owner_wrapped_root_key(&self) -> &[u8] {
        &self.owner_wrapped_root_key
    }

    pub fn grants(&self) -> &[ShareGrant] {
        &self.grants
    }

    pub fn grant_for(&self, recipient: &UserPublicKey) -> Option<&ShareGrant> {
        self.grants.iter().find(|g| g.recipient == *recipient)
    }

    pub fn active_recipients(&self) -> impl Iterator<Item = &UserPublicKey> {
        self.grants
            .iter()
            .filter(|g| g.state == GrantState::Active)
            .map(|g| &g.recipient)
    }

    /// True while any revoked grant still holds the current root key
    pub fn needs_rotation(&self) -> bool {
        self.grants.iter().any(|g| g.state == GrantState::Revoked)
    }

    /// Share the current root key with `recipient`.
    ///
    /// Granting to a revoked recipient re-activates them with the current key.
    pub fn grant(&mut self, owner: &UserKeypair, recipient: &UserPublicKey) -> Result<&ShareGrant> {
        let wrapped_root_key = share_key(
            owner.secret_bytes(),
            &self.owner_wrapped_root_key,
            recipient.as_bytes(),
        )?;
        let grant = ShareGrant {
            recipient: *recipient,
            wrapped_root_key,
            state: GrantState::Active,
            key_epoch: self.epoch,
        };

        let index = match self.grants.iter().position(|g| g.recipient == *recipient) {
            Some(index) => {
                self.grants[index] = grant;
                index
            }
            None => {
                self.grants.push(grant);
                self.grants.len() - 1
            }
        };
        self.revision += 1;
        tracing::debug!(container = %self.address_name, "share granted");
        Ok(&self.grants[index])
    }

    /// Mark a recipient's grant revoked. The root key is not touched.
    pub fn revoke(&mut self, recipient: &UserPublicKey) -> Result<()> {
        let grant = self
            .grants
            .iter_mut()
            .find(|g| g.recipient == *recipient && g.state == GrantState::Active)
            .ok_or_else(|| CoreError::GrantNotFound(recipient.to_hex()))?;
        grant.state = GrantState::Revoked;
        self.revision += 1;
        tracing::debug!(container = %self.address_name, "share revoked, rotation pending");
        Ok(())
    }
}

/// Everything needed to move a container to a new root key
pub struct RotationPlan {
    address_name: String,
    base_epoch: u32,
    base_revision: u64,
    root_key: SymmetricKey,
    listing: AeadEnvelope,
    item_records: Vec<(String, AeadEnvelope)>,
    owner_wrapped_root_key: Vec<u8>,
    recipient_keys: Vec<(UserPublicKey, Vec<u8>)>,
}

impl RotationPlan {
    pub fn root_key(&self) -> &SymmetricKey {
        &self.root_key
    }

    /// Listing re-encrypted under the new root key
    pub fn listing(&self) -> &AeadEnvelope {
        &self.listing
    }

    /// Item records re-encrypted under the new root key, by address name
    pub fn item_records(&self) -> &[(String, AeadEnvelope)] {
        &self.item_records
    }

    pub fn owner_wrapped_root_key(&self) -> &[u8] {
        &self.owner_wrapped_root_key
    }

    /// New root key wrapped for each remaining recipient
    pub fn recipient_keys(&self) -> &[(UserPublicKey, Vec<u8>)] {
        &self.recipient_keys
    }
}

impl std::fmt::Debug for RotationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationPlan")
            .field("address_name", &self.address_name)
            .field("base_epoch", &self.base_epoch)
            .field("base_revision", &self.base_revision)
            .field("item_records", &self.item_records.len())
            .field("recipients", &self.recipient_keys.len())
            .finish_non_exhaustive()
    }
}

/// Every file in the listing needs exactly one record, and nothing else.
fn check_item_coverage(listing: &ContainerListing, item_records: &[(String, AeadEnvelope)]) -> Result<()> {
    let mut supplied = BTreeSet::new();
    for (address_name, _) in item_records {
        if !supplied.insert(address_name.as_str()) {
            return Err(CoreError::RotationRefused(format!(
                "item record {} supplied twice",
                address_name
            )));
        }
    }

    let listed: BTreeSet<&str> = listing
        .files()
        .map(|file| file.item_address_name.as_str())
        .collect();
    if let Some(missing) = listed.difference(&supplied).next() {
        return Err(CoreError::RotationRefused(format!(
            "item record {} not supplied",
            missing
        )));
    }
    if let Some(extra) = supplied.difference(&listed).next() {
        return Err(CoreError::RotationRefused(format!(
            "item record {} is not in the listing",
            extra
        )));
    }
    Ok(())
}

/// Build a rotation for `access` without changing it.
///
/// `listing` and `item_records` are the container's current documents,
/// encrypted under the current root key. `item_records` must hold one
/// record for every file in the listing, otherwise the plan is refused.
pub fn prepare_rotation(
    access: &ContainerAccess,
    owner: &UserKeypair,
    listing: &AeadEnvelope,
    item_records: &[(String, AeadEnvelope)],
) -> Result<RotationPlan> {
    let old_key = unwrap_key(&access.owner_wrapped_root_key, owner.secret_bytes())
        .and_then(|bytes| SymmetricKey::from_bytes(&bytes))?;
    let root_key = SymmetricKey::generate();

    let listing = decrypt_listing(listing, &old_key)?;
    check_item_coverage(&listing, item_records)?;
    let listing = encrypt_listing(&listing, &root_key)?;
    let item_records = item_records
        .iter()
        .map(|(address_name, envelope)| -> Result<(String, AeadEnvelope)> {
            let record = decrypt_item_record(envelope, &old_key)?;
            Ok((address_name.clone(), encrypt_item_record(&record, &root_key)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let owner_wrapped_root_key = wrap_key(root_key.as_bytes(), owner.public_key().as_bytes())?;
    let recipient_keys = access
        .active_recipients()
        .map(|recipient| -> Result<(UserPublicKey, Vec<u8>)> {
            Ok((*recipient, wrap_key(root_key.as_bytes(), recipient.as_bytes())?))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        container = %access.address_name,
        items = item_records.len(),
        recipients = recipient_keys.len(),
        "rotation prepared"
    );
    Ok(RotationPlan {
        address_name: access.address_name.clone(),
        base_epoch: access.epoch,
        base_revision: access.revision,
        root_key,
        listing,
        item_records,
        owner_wrapped_root_key,
        recipient_keys,
    })
}

/// Apply a published rotation and discard the revoked grants.
///
/// Returns the discarded grants, marked [`GrantState::RotationComplete`].
pub fn commit_rotation(access: &mut ContainerAccess, plan: RotationPlan) -> Result<Vec<ShareGrant>> {
    if plan.address_name != access.address_name
        || plan.base_epoch != access.epoch
        || plan.base_revision != access.revision
    {
        return Err(CoreError::RotationRefused(
            "plan is stale for this container".into(),
        ));
    }

    for recipient in access.active_recipients() {
        if !plan.recipient_keys.iter().any(|(r, _)| r == recipient) {
            return Err(CoreError::RotationRefused(format!(
                "plan does not cover recipient {}",
                recipient.to_hex()
            )));
        }
    }

    let epoch = access.epoch + 1;
    let mut discarded = Vec::new();
    let mut kept = Vec::with_capacity(access.grants.len());
    for mut grant in access.grants.drain(..) {
        match grant.state {
            GrantState::Active => {
                if let Some((_, wrapped)) = plan
                    .recipient_keys
                    .iter()
                    .find(|(r, _)| *r == grant.recipient)
                {
                    grant.wrapped_root_key = wrapped.clone();
                    grant.key_epoch = epoch;
                }
                kept.push(grant);
            }
            GrantState::Revoked | GrantState::RotationComplete => {
                grant.state = GrantState::RotationComplete;
                discarded.push(grant);
            }
        }
    }

    access.grants = kept;
    access.owner_wrapped_root_key = plan.owner_wrapped_root_key;
    access.epoch = epoch;
    access.revision += 1;

    tracing::info!(
        container = %access.address_name,
        epoch,
        discarded = discarded.len(),
        "root key rotated"
    );
    Ok(discarded)
}

/// Grant as stored next to the container
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredGrant {
    pub recipient: UserPublicKey,
    #[serde(with = "hex_bytes")]
    pub wrapped_root_key: Vec<u8>,
    pub state: GrantState,
    pub key_epoch: u32,
}

impl From<&ShareGrant> for StoredGrant {
    fn from(grant: &ShareGrant) -> Self {
        Self {
            recipient: grant.recipient,
            wrapped_root_key: grant.wrapped_root_key.clone(),
            state: grant.state,
            key_epoch: grant.key_epoch,
        }
    }
}
