//! Container listings
//!
//! A listing names a container's children. Schema `v2` keeps file entries
//! slim: they only point at the item's own record by address name, and all
//! key material for the file lives in that record. Schema `v1` inlined file
//! keys in the listing and is rejected so callers can migrate it.

use super::{check, check_wrapped_key, read_version, schema_error, to_json, Timestamp};
use crate::{CoreError, Result};
use cipherbox_crypto::{encoding::hex_bytes, parse_ipns_name, AeadEnvelope, SymmetricKey};
use serde::{Deserialize, Serialize};

/// Listing schema written by this crate
pub const LISTING_VERSION: &str = "v2";

/// Listing schema with inline file entries
pub const LEGACY_LISTING_VERSION: &str = "v1";

/// A child container
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubcontainerRef {
    pub id: String,
    pub name: String,
    pub address_name: String,
    /// Child's signing seed, wrapped to the owner
    #[serde(with = "hex_bytes")]
    pub wrapped_signing_key: Vec<u8>,
    /// Child's root key, wrapped to the owner
    #[serde(with = "hex_bytes")]
    pub wrapped_container_key: Vec<u8>,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// A file, pointing at its item record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemPointerRef {
    pub id: String,
    pub name: String,
    pub item_address_name: String,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
}

/// One entry of a listing, tagged by `type`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChildRef {
    Folder(SubcontainerRef),
    File(ItemPointerRef),
}

impl ChildRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.id,
            Self::File(file) => &file.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.name,
            Self::File(file) => &file.name,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Folder(folder) => {
                check(!folder.id.is_empty() && !folder.name.is_empty(), "folder id/name")?;
                parse_ipns_name(&folder.address_name).map_err(schema_error)?;
                check_wrapped_key(&folder.wrapped_signing_key, "wrappedSigningKey")?;
                check_wrapped_key(&folder.wrapped_container_key, "wrappedContainerKey")
            }
            Self::File(file) => {
                check(!file.id.is_empty() && !file.name.is_empty(), "file id/name")?;
                parse_ipns_name(&file.item_address_name).map_err(schema_error)?;
                Ok(())
            }
        }
    }
}

/// The decrypted contents of a container
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerListing {
    pub children: Vec<ChildRef>,
}

#[derive(Serialize)]
struct ListingOut<'a> {
    version: &'static str,
    children: &'a [ChildRef],
}

#[derive(Deserialize)]
struct ListingIn {
    children: Vec<ChildRef>,
}

impl ContainerListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the child with the same id
    pub fn upsert(&mut self, child: ChildRef) {
        match self.children.iter_mut().find(|c| c.id() == child.id()) {
            Some(existing) => *existing = child,
            None => self.children.push(child),
        }
    }

    /// Remove a child by id, returning it
    pub fn remove(&mut self, id: &str) -> Option<ChildRef> {
        let index = self.children.iter().position(|c| c.id() == id)?;
        Some(self.children.remove(index))
    }

    pub fn folders(&self) -> impl Iterator<Item = &SubcontainerRef> {
        self.children.iter().filter_map(|c| match c {
            ChildRef::Folder(folder) => Some(folder),
            ChildRef::File(_) => None,
        })
    }

    pub fn files(&self) -> impl Iterator<Item = &ItemPointerRef> {
        self.children.iter().filter_map(|c| match c {
            ChildRef::File(file) => Some(file),
            ChildRef::Folder(_) => None,
        })
    }

    fn validate(&self) -> Result<()> {
        self.children.iter().try_for_each(ChildRef::validate)
    }

    /// Serialize as `v2` JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        to_json(&ListingOut {
            version: LISTING_VERSION,
            children: &self.children,
        })
    }

    /// Parse and validate listing JSON, dispatching on `version`
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let version = read_version(json)?;
        match version.as_str() {
            LISTING_VERSION => {
                let parsed: ListingIn = serde_json::from_slice(json).map_err(schema_error)?;
                let listing = Self {
                    children: parsed.children,
                };
                listing.validate()?;
                Ok(listing)
            }
            LEGACY_LISTING_VERSION => Err(CoreError::LegacySchema(version)),
            _ => Err(CoreError::UnsupportedSchema(version)),
        }
    }
}

/// Encrypt a listing under its container's root key
pub fn encrypt_listing(listing: &ContainerListing, container_key: &SymmetricKey) -> Result<AeadEnvelope> {
    listing.validate()?;
    Ok(AeadEnvelope::encrypt(&listing.to_json()?, container_key)?)
}

/// Decrypt and validate a listing
pub fn decrypt_listing(envelope: &AeadEnvelope, container_key: &SymmetricKey) -> Result<ContainerListing> {
    let json = zeroize::Zeroizing::new(envelope.decrypt(container_key)?);
    ContainerListing::from_json(&json)
}
