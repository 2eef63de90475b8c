//! Sharing demo for the CipherBox key hierarchy
//!
//! This example demonstrates:
//! - Creating a vault root from a master secret
//! - Adding a folder with one file
//! - Sharing the whole vault with a second user
//! - Revoking that user and rotating the folder key
//!
//! Run with: cargo run --example sharing_demo

use cipherbox_core::{
    commit_rotation, encrypt_item_record, encrypt_listing, new_entry_id, now_ms,
    prepare_rotation, share_subtree, ChildRef, CipherMode, ContainerAccess, ContainerListing,
    ContainerRootBundle, ContainerTier, ContentVersion, ItemPointerRef, ItemRecord, MemorySource,
    SubcontainerRef, SubtreeRoot, DEFAULT_SHARE_FANOUT,
};
use cipherbox_crypto::{
    derive_item_keypair, generate_random_bytes, wrap_key, SymmetricKey, UserKeypair,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("🔐 CipherBox - Sharing Demo\n");

    let master_secret = generate_random_bytes(32);
    let owner = UserKeypair::generate();
    let friend = UserKeypair::generate();
    let owner_pk = owner.public_key().as_bytes();
    let now = now_ms();

    // ==================== Vault ====================

    let root = ContainerRootBundle::init(ContainerTier::Root {
        master_secret: &master_secret,
    })?;
    let docs = ContainerRootBundle::init(ContainerTier::Nested)?;
    println!("📦 Vault root:  {}", root.address_name()?);
    println!("📁 Docs folder: {}", docs.address_name()?);

    let item_id = new_entry_id();
    let item_address = derive_item_keypair(&master_secret, &item_id)?.address_name;
    let content_key = SymmetricKey::generate();
    let record = ItemRecord::new(
        ContentVersion {
            content_address: "bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy".into(),
            wrapped_content_key: wrap_key(content_key.as_bytes(), owner_pk)?,
            content_iv: "00".repeat(16),
            size: 1 << 20,
            cipher_mode: CipherMode::Ctr,
        },
        "application/pdf",
        now,
    );

    let mut source = MemorySource::new();
    source.insert_item_record(&item_address, encrypt_item_record(&record, docs.root_key())?);

    let docs_listing = ContainerListing {
        children: vec![ChildRef::File(ItemPointerRef {
            id: item_id,
            name: "taxes.pdf".into(),
            item_address_name: item_address.clone(),
            created_at: now,
            modified_at: now,
        })],
    };
    let docs_envelope = encrypt_listing(&docs_listing, docs.root_key())?;
    source.insert_listing(docs.address_name()?, docs_envelope.clone());

    let wrapped_docs = docs.wrap(owner_pk)?;
    let mut root_listing = ContainerListing::new();
    root_listing.upsert(ChildRef::Folder(SubcontainerRef {
        id: new_entry_id(),
        name: "Docs".into(),
        address_name: docs.address_name()?,
        wrapped_signing_key: wrapped_docs.wrapped_signing_key.clone(),
        wrapped_container_key: wrapped_docs.wrapped_root_key.clone(),
        created_at: now,
        modified_at: now,
    }));
    source.insert_listing(root.address_name()?, encrypt_listing(&root_listing, root.root_key())?);

    // ==================== Share ====================

    println!("\n🤝 Sharing the vault...");
    let subtree = SubtreeRoot {
        address_name: root.address_name()?,
        wrapped_root_key: root.wrap(owner_pk)?.wrapped_root_key,
    };
    let share = share_subtree(
        &source,
        &subtree,
        &owner,
        friend.public_key(),
        DEFAULT_SHARE_FANOUT,
    )
    .await?;
    for key in &share.keys {
        println!("   - {:<28} {:?}", key.entry, key.kind);
    }

    // ==================== Revoke & rotate ====================

    println!("\n🚫 Revoking and rotating Docs...");
    let mut access = ContainerAccess::new(docs.address_name()?, wrapped_docs.wrapped_root_key);
    access.grant(&owner, friend.public_key())?;
    access.revoke(friend.public_key())?;

    let items = vec![(item_address.clone(), encrypt_item_record(&record, docs.root_key())?)];
    let plan = prepare_rotation(&access, &owner, &docs_envelope, &items)?;
    // publish plan.listing() and plan.item_records() here
    let discarded = commit_rotation(&mut access, plan)?;
    println!(
        "   ✅ epoch {} - {} grant(s) discarded",
        access.epoch(),
        discarded.len()
    );

    Ok(())
}
