//! # CipherBox Core
//!
//! The key hierarchy built on top of `cipherbox-crypto`.
//!
//! This crate provides:
//! - **Container bundles**: per-folder root and signing keys, wrapped to the user
//! - **Metadata documents**: encrypted listings, item records and the device registry
//! - **Sharing**: re-wrapping a key or a whole subtree for another user
//! - **Rotation**: lazy revocation with a two-phase root-key rotation
//! - **Recovery**: a JSON export that rebuilds the root bundle offline
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      Sharing      │     Rotation        │
//! ├─────────────────────────────────────────┤
//! │   Listings · Item records · Devices     │
//! ├─────────────────────────────────────────┤
//! │  Container bundles   │   Recovery       │
//! ├─────────────────────────────────────────┤
//! │           cipherbox-crypto              │
//! └─────────────────────────────────────────┘
//! ```

pub mod container;
pub mod error;
pub mod metadata;
pub mod recovery;
pub mod rotation;
pub mod sharing;

pub use container::{ContainerRootBundle, ContainerTier, WrappedContainerBundle};
pub use error::{CoreError, Result};
pub use metadata::{
    decrypt_device_registry, decrypt_item_record, decrypt_listing, encrypt_device_registry,
    encrypt_item_record, encrypt_listing, new_entry_id, now_ms, ChildRef, CipherMode,
    ContainerListing, ContentVersion, DevicePlatform, DeviceRecord, DeviceRegistryDoc,
    DeviceStatus, HistoryEntry, ItemPointerRef, ItemRecord, SubcontainerRef, Timestamp,
};
pub use recovery::{DerivationInfo, RecoveryExport};
pub use rotation::{
    commit_rotation, prepare_rotation, ContainerAccess, GrantState, RotationPlan, ShareGrant,
    StoredGrant,
};
pub use sharing::{
    share_key, share_subtree, ContainerSource, KeyKind, MemorySource, SharedKey, SubtreeRoot,
    SubtreeShare, DEFAULT_SHARE_FANOUT,
};
