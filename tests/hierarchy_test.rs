//! End-to-end tests across the key hierarchy
//!
//! Builds a small vault the way a client does (root container from the
//! master secret, a nested folder, a file with its own record) and then
//! shares, rotates and recovers it.

use chrono::{Duration, Utc};
use cipherbox_core::{
    commit_rotation, decrypt_item_record, decrypt_listing, encrypt_item_record, encrypt_listing,
    new_entry_id, prepare_rotation, share_subtree, ChildRef, CipherMode, ContainerAccess,
    ContainerListing, ContainerRootBundle, ContainerTier, ContentVersion, ItemPointerRef,
    ItemRecord, MemorySource, RecoveryExport, SubcontainerRef, SubtreeRoot,
};
use cipherbox_crypto::{
    create_ipns_record, derive_item_keypair, encrypt_aes_gcm, generate_iv, marshal_ipns_record,
    unmarshal_ipns_record, unwrap_key, verify_ipns_record, wrap_key, RecordVerifier,
    SymmetricKey, UserKeypair,
};

const MASTER: [u8; 32] = [0x42; 32];
const NOW: u64 = 1_700_000_000_000;

struct Vault {
    user: UserKeypair,
    root: ContainerRootBundle,
    photos: ContainerRootBundle,
    content_key: SymmetricKey,
    source: MemorySource,
    item_address: String,
}

/// root/Photos/cat.jpg
fn vault() -> Vault {
    let user = UserKeypair::generate();
    let user_pk = user.public_key().as_bytes();
    let root = ContainerRootBundle::init(ContainerTier::Root {
        master_secret: &MASTER,
    })
    .unwrap();
    let photos = ContainerRootBundle::init(ContainerTier::Nested).unwrap();

    // content
    let content_key = SymmetricKey::generate();
    let iv = generate_iv();
    let ciphertext = encrypt_aes_gcm(b"meow", content_key.as_bytes(), iv.as_bytes()).unwrap();
    assert_eq!(ciphertext.len(), 4 + 16);

    let item_id = new_entry_id();
    let item_address = derive_item_keypair(&MASTER, &item_id).unwrap().address_name;
    let record = ItemRecord::new(
        ContentVersion {
            content_address: "bafkreicat".into(),
            wrapped_content_key: wrap_key(content_key.as_bytes(), user_pk).unwrap(),
            content_iv: iv.to_hex(),
            size: ciphertext.len() as u64,
            cipher_mode: CipherMode::Gcm,
        },
        "image/jpeg",
        NOW,
    );

    let mut source = MemorySource::new();
    source.insert_item_record(&item_address, encrypt_item_record(&record, photos.root_key()).unwrap());

    let photos_listing = ContainerListing {
        children: vec![ChildRef::File(ItemPointerRef {
            id: item_id,
            name: "cat.jpg".into(),
            item_address_name: item_address.clone(),
            created_at: NOW,
            modified_at: NOW,
        })],
    };
    source.insert_listing(
        photos.address_name().unwrap(),
        encrypt_listing(&photos_listing, photos.root_key()).unwrap(),
    );

    let wrapped_photos = photos.wrap(user_pk).unwrap();
    let root_listing = ContainerListing {
        children: vec![ChildRef::Folder(SubcontainerRef {
            id: new_entry_id(),
            name: "Photos".into(),
            address_name: photos.address_name().unwrap(),
            wrapped_signing_key: wrapped_photos.wrapped_signing_key,
            wrapped_container_key: wrapped_photos.wrapped_root_key,
            created_at: NOW,
            modified_at: NOW,
        })],
    };
    source.insert_listing(
        root.address_name().unwrap(),
        encrypt_listing(&root_listing, root.root_key()).unwrap(),
    );

    Vault {
        user,
        root,
        photos,
        content_key,
        source,
        item_address,
    }
}

#[test]
fn test_root_address_is_derived_from_master_secret() {
    let a = vault();
    let b = vault();
    assert_eq!(a.root.address_name().unwrap(), b.root.address_name().unwrap());
    assert_ne!(a.root.root_key(), b.root.root_key());
}

#[test]
fn test_listing_is_published_under_signed_record() {
    let v = vault();
    let name = v.photos.address_name().unwrap();
    let mut verifier = RecordVerifier::new();

    for sequence in 1..=2 {
        let record = create_ipns_record(
            v.photos.signing_keypair().seed(),
            "/ipfs/bafkreigh2akiscaildcqabsyg3dfr6chu3fgpregiymsck7e7aqa4s52zy",
            sequence,
            std::time::Duration::from_secs(3600),
        )
        .unwrap();
        let fetched = unmarshal_ipns_record(&marshal_ipns_record(&record)).unwrap();
        verify_ipns_record(&name, &fetched, Utc::now()).unwrap();
        verifier.accept(&name, &fetched, Utc::now()).unwrap();
    }
    assert_eq!(verifier.last_sequence(&name), Some(2));

    let too_late = Utc::now() + Duration::hours(2);
    let record = create_ipns_record(
        v.photos.signing_keypair().seed(),
        "/ipfs/bafkqaaa",
        3,
        std::time::Duration::from_secs(3600),
    )
    .unwrap();
    assert!(verify_ipns_record(&name, &record, too_late).is_err());
}

#[test_log::test(tokio::test)]
async fn test_recipient_reads_shared_subtree() {
    let v = vault();
    let recipient = UserKeypair::generate();
    let root = SubtreeRoot {
        address_name: v.root.address_name().unwrap(),
        wrapped_root_key: v.root.wrap(v.user.public_key().as_bytes()).unwrap().wrapped_root_key,
    };

    let share = share_subtree(&v.source, &root, &v.user, recipient.public_key(), 2)
        .await
        .unwrap();
    // root, Photos (container + signing), cat.jpg
    assert_eq!(share.keys.len(), 4);

    let photos_key = share
        .keys
        .iter()
        .find(|k| k.entry == "root/Photos")
        .map(|k| unwrap_key(&k.wrapped, recipient.secret_bytes()).unwrap())
        .unwrap();
    let photos_key = SymmetricKey::from_bytes(&photos_key).unwrap();
    assert_eq!(&photos_key, v.photos.root_key());

    let record =
        decrypt_item_record(v.source_item(&v.item_address), &photos_key).unwrap();
    assert_eq!(record.mime_type, "image/jpeg");

    let content = share
        .keys
        .iter()
        .find(|k| k.entry == "root/Photos/item:cat.jpg")
        .unwrap();
    assert_eq!(
        unwrap_key(&content.wrapped, recipient.secret_bytes()).unwrap().as_slice(),
        v.content_key.as_bytes()
    );
}

#[test]
fn test_revoked_recipient_loses_access_after_rotation() {
    let v = vault();
    let alice = UserKeypair::generate();
    let bob = UserKeypair::generate();
    let photos_name = v.photos.address_name().unwrap();
    let wrapped = v.photos.wrap(v.user.public_key().as_bytes()).unwrap();

    let mut access = ContainerAccess::new(photos_name.clone(), wrapped.wrapped_root_key);
    access.grant(&v.user, alice.public_key()).unwrap();
    access.grant(&v.user, bob.public_key()).unwrap();
    access.revoke(bob.public_key()).unwrap();
    assert!(access.needs_rotation());

    let listing = v.source_listing(&photos_name).clone();
    let items = vec![(v.item_address.clone(), v.source_item(&v.item_address).clone())];
    let plan = prepare_rotation(&access, &v.user, &listing, &items).unwrap();
    let new_listing = plan.listing().clone();
    let discarded = commit_rotation(&mut access, plan).unwrap();
    assert_eq!(discarded.len(), 1);

    let key_for = |who: &UserKeypair, wrapped: &[u8]| {
        SymmetricKey::from_bytes(&unwrap_key(wrapped, who.secret_bytes()).unwrap()).unwrap()
    };
    let alice_key = key_for(&alice, &access.grant_for(alice.public_key()).unwrap().wrapped_root_key);
    let bob_key = key_for(&bob, &discarded[0].wrapped_root_key);

    assert_eq!(decrypt_listing(&new_listing, &alice_key).unwrap().children.len(), 1);
    assert!(decrypt_listing(&new_listing, &bob_key).is_err());
}

#[test]
fn test_recovery_export_rebuilds_root() {
    let v = vault();
    let export =
        RecoveryExport::export(&v.root, v.user.public_key().as_bytes(), Utc::now()).unwrap();
    let json = export.to_json().unwrap();

    let recovered = RecoveryExport::from_json(&json)
        .unwrap()
        .recover(v.user.secret_bytes())
        .unwrap();
    assert_eq!(recovered, v.root);
    assert!(export.matches_master_secret(&MASTER).unwrap());

    let listing = decrypt_listing(
        v.source_listing(&recovered.address_name().unwrap()),
        recovered.root_key(),
    )
    .unwrap();
    assert_eq!(listing.folders().next().unwrap().name, "Photos");
}

impl Vault {
    fn source_listing(&self, address_name: &str) -> &cipherbox_crypto::AeadEnvelope {
        use cipherbox_core::ContainerSource;
        self.source.listing(address_name).unwrap()
    }

    fn source_item(&self, address_name: &str) -> &cipherbox_crypto::AeadEnvelope {
        use cipherbox_core::ContainerSource;
        self.source.item_record(address_name).unwrap()
    }
}
