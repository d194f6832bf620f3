//! End-to-end tests for the address manager against the sqlite store.
//!
//! Most wallets here are created on simnet so the scrypt work stays
//! negligible; one test exercises the hardened mainnet parameters.

use bip32::{ChildNumber, Prefix};

use vela_keystore::{
    create_address_manager, create_watch_only, hash160, hd_keys_from_seed, Address, AccountType,
    CryptoKeyType, Error, Manager, Wif, DEFAULT_ACCOUNT_NUM, EXTERNAL_BRANCH,
    IMPORTED_ADDR_ACCOUNT, INTERNAL_BRANCH, NO_ADDRESS_INDEX,
};
use vela_params::ChainParams;
use vela_storage_sqlite::Store;

const SEED: [u8; 32] = [0x2a; 32];
const OTHER_SEED: [u8; 32] = [0x7f; 32];
const PUB_PASS: &[u8] = b"public";
const PRIV_PASS: &[u8] = b"private";

fn new_wallet(params: ChainParams) -> (Store, Manager) {
    let store = Store::open_in_memory().unwrap();
    store
        .update(|tx| create_address_manager(tx, &SEED, PUB_PASS, PRIV_PASS, &params))
        .unwrap();
    let mgr = store.view(|tx| Manager::load(tx, PUB_PASS, params)).unwrap();
    (store, mgr)
}

fn simnet_wallet() -> (Store, Manager) {
    new_wallet(ChainParams::simnet())
}

/// The hash-160 of the pubkey derived at `(account, branch, index)`.
fn derived_address(store: &Store, mgr: &Manager, account: u32, branch: u32, index: u32) -> Address {
    let branch_xpub = store
        .view(|tx| mgr.account_branch_extended_pubkey(tx, account, branch))
        .unwrap();
    let child = branch_xpub
        .derive_child(ChildNumber::new(index, false).unwrap())
        .unwrap();
    let pubkey = child.public_key().to_sec1_bytes();
    Address::Pubkey(pubkey.into_vec())
}

#[test]
fn create_unlock_and_resolve_first_account_address() {
    // Mainnet, so the hardened scrypt parameters get exercised once.
    let (store, mgr) = new_wallet(ChainParams::mainnet());

    mgr.unlock(PRIV_PASS).unwrap();
    assert!(!mgr.is_locked());

    let account = store.update(|tx| mgr.new_account(tx, "savings")).unwrap();
    assert_eq!(account, 1);

    let addr = derived_address(&store, &mgr, 1, EXTERNAL_BRANCH, 0);
    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 1, 0, EXTERNAL_BRANCH))
        .unwrap();

    let managed = store.view(|tx| mgr.address(tx, &addr)).unwrap();
    assert_eq!(managed.account(), 1);
    match managed {
        vela_keystore::ManagedAddress::PubKey(a) => {
            assert!(!a.internal());
            assert_eq!(a.index(), 0);
            assert!(!a.imported());
        }
        other => panic!("unexpected managed address {other:?}"),
    }
}

#[test]
fn watch_only_wallet_imports_public_keys() {
    let params = ChainParams::simnet();
    let keys = hd_keys_from_seed(&SEED, &params).unwrap();
    let xpub = keys.acct_legacy_priv.public_key().to_string(Prefix::XPUB);

    let store = Store::open_in_memory().unwrap();
    store
        .update(|tx| create_watch_only(tx, &xpub, PUB_PASS, &params))
        .unwrap();
    let mgr = store.view(|tx| Manager::load(tx, PUB_PASS, params)).unwrap();
    assert!(mgr.watching_only());

    assert!(matches!(mgr.unlock(PRIV_PASS), Err(Error::WatchingOnly(_))));

    let pubkey = Wif::from_bytes([0x11; 32]).pubkey().unwrap();
    let managed = store.update(|tx| mgr.import_public_key(tx, &pubkey)).unwrap();
    assert_eq!(managed.account(), IMPORTED_ADDR_ACCOUNT);

    let err = store
        .update(|tx| mgr.import_public_key(tx, &pubkey))
        .unwrap_err();
    assert!(matches!(err, Error::Exist(_)));

    // Garbage prefix bytes are rejected outright.
    let mut bogus = pubkey.clone();
    bogus[0] = 0x05;
    assert!(matches!(
        store.update(|tx| mgr.import_public_key(tx, &bogus)),
        Err(Error::Invalid(_))
    ));

    // No coin type keys are recorded for watching-only wallets.
    assert!(matches!(
        store.view(|tx| mgr.coin_type(tx)),
        Err(Error::WatchingOnly(_))
    ));
}

#[test]
fn unlocked_with_passphrase_states() {
    let (_store, mgr) = simnet_wallet();

    assert!(matches!(
        mgr.unlocked_with_passphrase(PRIV_PASS),
        Err(Error::Locked(_))
    ));

    mgr.unlock(PRIV_PASS).unwrap();
    mgr.unlocked_with_passphrase(PRIV_PASS).unwrap();
    assert!(matches!(
        mgr.unlocked_with_passphrase(b"wrong"),
        Err(Error::Passphrase)
    ));

    // A wrong re-auth does not lock the manager.
    assert!(!mgr.is_locked());
}

#[test]
fn unlock_with_wrong_passphrase_while_unlocked_locks() {
    let (_store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();

    assert!(matches!(mgr.unlock(b"wrong"), Err(Error::Passphrase)));
    assert!(mgr.is_locked());

    mgr.unlock(PRIV_PASS).unwrap();
    assert!(!mgr.is_locked());
}

#[test]
fn lock_semantics() {
    let (_store, mgr) = simnet_wallet();
    assert!(matches!(mgr.lock(), Err(Error::Locked(_))));
    mgr.unlock(PRIV_PASS).unwrap();
    mgr.lock().unwrap();
    assert!(mgr.is_locked());
}

#[test]
fn account_passphrase_lifecycle() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();

    assert_eq!(store.update(|tx| mgr.new_account(tx, "first")).unwrap(), 1);
    assert_eq!(store.update(|tx| mgr.new_account(tx, "second")).unwrap(), 2);

    let addr = derived_address(&store, &mgr, 2, EXTERNAL_BRANCH, 0);
    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 2, 0, EXTERNAL_BRANCH))
        .unwrap();

    store
        .update(|tx| mgr.set_account_passphrase(tx, 2, b"apple"))
        .unwrap();
    let (encrypted, unlocked) = store.view::<_, Error>(|tx| Ok(mgr.account_has_passphrase(tx, 2))).unwrap();
    assert!(encrypted);
    assert!(unlocked);

    mgr.lock().unwrap();
    let (_, unlocked) = store.view::<_, Error>(|tx| Ok(mgr.account_has_passphrase(tx, 2))).unwrap();
    assert!(!unlocked);

    // Wrong account passphrase first; the right one must still work.
    assert!(matches!(
        store.view(|tx| mgr.unlock_account(tx, 2, b"grape")),
        Err(Error::Passphrase)
    ));
    store.view(|tx| mgr.unlock_account(tx, 2, b"apple")).unwrap();

    // Re-auth on the already unlocked account takes the hash path.
    store.view(|tx| mgr.unlock_account(tx, 2, b"apple")).unwrap();
    assert!(matches!(
        store.view(|tx| mgr.unlock_account(tx, 2, b"grape")),
        Err(Error::Passphrase)
    ));

    // Private keys resolve with the wallet locked but the account open.
    let key = store.view(|tx| mgr.private_key(tx, &addr)).unwrap();
    assert_eq!(hash160(&key.pubkey()), addr.id());
    drop(key);

    store.view(|tx| mgr.lock_account(tx, 2)).unwrap();
    assert!(matches!(
        store.view(|tx| mgr.private_key(tx, &addr)),
        Err(Error::Locked(_))
    ));
    assert!(matches!(
        store.view(|tx| mgr.lock_account(tx, 2)),
        Err(Error::Locked(_))
    ));
}

#[test]
fn account_passphrase_removal_restores_global_protection() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();
    let account = store.update(|tx| mgr.new_account(tx, "sealed")).unwrap();

    store
        .update(|tx| mgr.set_account_passphrase(tx, account, b"apple"))
        .unwrap();
    store
        .update(|tx| mgr.set_account_passphrase(tx, account, b""))
        .unwrap();

    let (encrypted, _) = store
        .view::<_, Error>(|tx| Ok(mgr.account_has_passphrase(tx, account)))
        .unwrap();
    assert!(!encrypted);

    // After a fresh load, the wallet passphrase alone grants access.
    let mgr2 = store
        .view(|tx| Manager::load(tx, PUB_PASS, ChainParams::simnet()))
        .unwrap();
    mgr2.unlock(PRIV_PASS).unwrap();
    let xpriv = store
        .view(|tx| mgr2.account_extended_privkey(tx, account))
        .unwrap();
    drop(xpriv);
}

#[test]
fn mark_used_raises_last_returned() {
    let (store, mgr) = simnet_wallet();

    store
        .update(|tx| mgr.mark_used_child_index(tx, 0, EXTERNAL_BRANCH, 5))
        .unwrap();
    store
        .update(|tx| mgr.mark_returned_child_index(tx, 0, EXTERNAL_BRANCH, 3))
        .unwrap();

    let props = store.view(|tx| mgr.account_properties(tx, 0)).unwrap();
    assert_eq!(props.last_used_external_index, 5);
    assert_eq!(props.last_returned_external_index, 5);
    assert_eq!(props.last_used_internal_index, NO_ADDRESS_INDEX);
    assert_eq!(props.last_returned_internal_index, NO_ADDRESS_INDEX);

    // Marking a lower child used changes nothing.
    store
        .update(|tx| mgr.mark_used_child_index(tx, 0, EXTERNAL_BRANCH, 2))
        .unwrap();
    let props = store.view(|tx| mgr.account_properties(tx, 0)).unwrap();
    assert_eq!(props.last_used_external_index, 5);

    assert!(matches!(
        store.update(|tx| mgr.mark_used_child_index(tx, 0, 7, 1)),
        Err(Error::Invalid(_))
    ));
}

#[test]
fn slip0044_upgrade_rewrites_default_account() {
    let params = ChainParams::simnet();
    let (store, mgr) = simnet_wallet();

    assert_eq!(store.view(|tx| mgr.coin_type(tx)).unwrap(), params.legacy_coin_type);

    store.update(|tx| mgr.upgrade_to_slip0044_coin_type(tx)).unwrap();
    assert_eq!(
        store.view(|tx| mgr.coin_type(tx)).unwrap(),
        params.slip0044_coin_type
    );

    // Account 0 now derives from the SLIP-0044 tree.
    let expected = hd_keys_from_seed(&SEED, &params)
        .unwrap()
        .acct_slip0044_priv
        .public_key()
        .to_string(Prefix::XPUB);
    let xpub = store
        .view(|tx| mgr.account_extended_pubkey(tx, DEFAULT_ACCOUNT_NUM))
        .unwrap();
    assert_eq!(xpub.to_string(Prefix::XPUB), expected);

    // New accounts derive from the SLIP-0044 coin type key.
    mgr.unlock(PRIV_PASS).unwrap();
    store.update(|tx| mgr.new_account(tx, "post-upgrade")).unwrap();

    // A second upgrade is rejected.
    assert!(matches!(
        store.update(|tx| mgr.upgrade_to_slip0044_coin_type(tx)),
        Err(Error::Invalid(_))
    ));
}

#[test]
fn slip0044_upgrade_rejected_after_address_use() {
    let (store, mgr) = simnet_wallet();
    store
        .update(|tx| mgr.mark_returned_child_index(tx, 0, EXTERNAL_BRANCH, 0))
        .unwrap();
    assert!(matches!(
        store.update(|tx| mgr.upgrade_to_slip0044_coin_type(tx)),
        Err(Error::Invalid(_))
    ));
}

#[test]
fn change_private_passphrase_roundtrip() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();

    store
        .update(|tx| mgr.change_passphrase(tx, PRIV_PASS, b"fresh", true))
        .unwrap();

    // Still unlocked; the hash path now authenticates the new value.
    mgr.unlocked_with_passphrase(b"fresh").unwrap();
    mgr.lock().unwrap();

    assert!(matches!(mgr.unlock(PRIV_PASS), Err(Error::Passphrase)));
    mgr.unlock(b"fresh").unwrap();

    // The change persists across a reload.
    let mgr2 = store
        .view(|tx| Manager::load(tx, PUB_PASS, ChainParams::simnet()))
        .unwrap();
    mgr2.unlock(b"fresh").unwrap();
}

#[test]
fn change_private_passphrase_rejects_wrong_old() {
    let (store, mgr) = simnet_wallet();
    assert!(matches!(
        store.update(|tx| mgr.change_passphrase(tx, b"wrong", b"fresh", true)),
        Err(Error::Passphrase)
    ));
    mgr.unlock(PRIV_PASS).unwrap();
}

#[test]
fn change_public_passphrase_applies_to_load() {
    let (store, mgr) = simnet_wallet();
    store
        .update(|tx| mgr.change_passphrase(tx, PUB_PASS, b"open sesame", false))
        .unwrap();

    assert!(matches!(
        store.view(|tx| Manager::load(tx, PUB_PASS, ChainParams::simnet())),
        Err(Error::Passphrase)
    ));
    let mgr2 = store
        .view(|tx| Manager::load(tx, b"open sesame", ChainParams::simnet()))
        .unwrap();
    mgr2.unlock(PRIV_PASS).unwrap();
}

#[test]
fn convert_to_watching_only_scrubs_private_material() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();

    let wif = Wif::from_bytes([0x33; 32]);
    store.update(|tx| mgr.import_private_key(tx, &wif)).unwrap();
    let imported = Address::Pubkey(wif.pubkey().unwrap());

    store.update(|tx| mgr.convert_to_watching_only(tx)).unwrap();
    assert!(mgr.watching_only());
    assert!(mgr.is_locked());
    assert!(matches!(mgr.unlock(PRIV_PASS), Err(Error::WatchingOnly(_))));

    // The imported pubkey still resolves, but its private half is gone.
    let managed = store.view(|tx| mgr.address(tx, &imported)).unwrap();
    assert_eq!(managed.account(), IMPORTED_ADDR_ACCOUNT);
    assert!(!store.view(|tx| mgr.have_private_key(tx, &imported)).unwrap());

    // A reload sees a watching-only wallet with no private side at all.
    let mgr2 = store
        .view(|tx| Manager::load(tx, PUB_PASS, ChainParams::simnet()))
        .unwrap();
    assert!(mgr2.watching_only());
    assert!(matches!(
        store.view(|tx| mgr2.coin_type_priv_key(tx)),
        Err(Error::WatchingOnly(_)) | Err(Error::Locked(_))
    ));

    // Converting again is a no-op.
    store.update(|tx| mgr.convert_to_watching_only(tx)).unwrap();
}

#[test]
fn import_private_key_roundtrip() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();

    let wif = Wif::from_bytes([0x55; 32]);
    let managed = store.update(|tx| mgr.import_private_key(tx, &wif)).unwrap();
    assert_eq!(managed.account(), IMPORTED_ADDR_ACCOUNT);

    let addr = Address::Pubkey(wif.pubkey().unwrap());
    assert!(store.view(|tx| mgr.have_private_key(tx, &addr)).unwrap());

    let key = store.view(|tx| mgr.private_key(tx, &addr)).unwrap();
    assert_eq!(key.pubkey(), wif.pubkey().unwrap());
    drop(key);

    // Duplicates are rejected.
    assert!(matches!(
        store.update(|tx| mgr.import_private_key(tx, &wif)),
        Err(Error::Exist(_))
    ));

    // Locked managers cannot import.
    mgr.lock().unwrap();
    let other = Wif::from_bytes([0x56; 32]);
    assert!(matches!(
        store.update(|tx| mgr.import_private_key(tx, &other)),
        Err(Error::Locked(_))
    ));

    // But resolution of the imported key works while locked, and the
    // private key does not.
    let managed = store.view(|tx| mgr.address(tx, &addr)).unwrap();
    assert_eq!(managed.account(), IMPORTED_ADDR_ACCOUNT);
    assert!(matches!(
        store.view(|tx| mgr.private_key(tx, &addr)),
        Err(Error::Locked(_))
    ));
}

#[test]
fn import_script_resolves_while_locked() {
    let (store, mgr) = simnet_wallet();

    let script = vec![0x51, 0x21, 0x02, 0x88];
    let managed = store.update(|tx| mgr.import_script(tx, &script)).unwrap();
    let addr = managed.address();
    assert!(matches!(addr, Address::ScriptHash(_)));

    let resolved = store.view(|tx| mgr.address(tx, &addr)).unwrap();
    match resolved {
        vela_keystore::ManagedAddress::Script(s) => assert_eq!(s.script(), &script[..]),
        other => panic!("unexpected managed address {other:?}"),
    }

    assert_eq!(
        store.view(|tx| mgr.redeem_script(tx, &addr)).unwrap(),
        script
    );
    assert!(matches!(
        store.view(|tx| mgr.private_key(tx, &addr)),
        Err(Error::Invalid(_))
    ));
    assert!(matches!(
        store.update(|tx| mgr.import_script(tx, &script)),
        Err(Error::Exist(_))
    ));
}

#[test]
fn sync_account_to_addr_index_is_idempotent() {
    let (store, mgr) = simnet_wallet();

    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 0, 5, EXTERNAL_BRANCH))
        .unwrap();
    let count = || {
        let mut n = 0;
        store
            .view(|tx| {
                mgr.for_each_account_address(tx, 0, |_| {
                    n += 1;
                    Ok(())
                })
            })
            .unwrap();
        n
    };
    assert_eq!(count(), 6);

    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 0, 5, EXTERNAL_BRANCH))
        .unwrap();
    assert_eq!(count(), 6);

    // Syncing lower than what exists is also a no-op.
    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 0, 3, EXTERNAL_BRANCH))
        .unwrap();
    assert_eq!(count(), 6);

    assert!(matches!(
        store.update(|tx| mgr.sync_account_to_addr_index(tx, IMPORTED_ADDR_ACCOUNT, 1, 0)),
        Err(Error::Invalid(_))
    ));
    assert!(matches!(
        store.update(|tx| mgr.sync_account_to_addr_index(tx, 0, 1, 2)),
        Err(Error::Invalid(_))
    ));
}

#[test]
fn chained_addresses_resolve_identically_locked_and_unlocked() {
    let (store, mgr) = simnet_wallet();
    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 0, 2, INTERNAL_BRANCH))
        .unwrap();

    let addr = derived_address(&store, &mgr, 0, INTERNAL_BRANCH, 2);

    let locked_pubkey = match store.view(|tx| mgr.address(tx, &addr)).unwrap() {
        vela_keystore::ManagedAddress::PubKey(a) => {
            assert!(a.internal());
            a.pubkey().to_vec()
        }
        other => panic!("unexpected managed address {other:?}"),
    };

    mgr.unlock(PRIV_PASS).unwrap();
    let unlocked_pubkey = match store.view(|tx| mgr.address(tx, &addr)).unwrap() {
        vela_keystore::ManagedAddress::PubKey(a) => a.pubkey().to_vec(),
        other => panic!("unexpected managed address {other:?}"),
    };
    assert_eq!(locked_pubkey, unlocked_pubkey);

    // The derived private key matches the recorded pubkey.
    let key = store.view(|tx| mgr.private_key(tx, &addr)).unwrap();
    assert_eq!(key.pubkey(), locked_pubkey);
}

#[test]
fn new_account_requires_unlocked_and_unique_name() {
    let (store, mgr) = simnet_wallet();

    assert!(matches!(
        store.update(|tx| mgr.new_account(tx, "salary")),
        Err(Error::Locked(_))
    ));

    mgr.unlock(PRIV_PASS).unwrap();
    assert!(matches!(
        store.update(|tx| mgr.new_account(tx, "")),
        Err(Error::Invalid(_))
    ));
    assert!(matches!(
        store.update(|tx| mgr.new_account(tx, "imported")),
        Err(Error::Invalid(_))
    ));
    assert!(matches!(
        store.update(|tx| mgr.new_account(tx, "default")),
        Err(Error::Exist(_))
    ));

    let account = store.update(|tx| mgr.new_account(tx, "salary")).unwrap();
    assert_eq!(account, 1);
    assert_eq!(store.view(|tx| mgr.last_account(tx)).unwrap(), 1);
    assert_eq!(store.view(|tx| mgr.lookup_account(tx, "salary")).unwrap(), 1);
}

#[test]
fn rename_account_updates_indexes_and_cache() {
    let (store, mgr) = simnet_wallet();

    store.update(|tx| mgr.rename_account(tx, 0, "spending")).unwrap();
    assert_eq!(store.view(|tx| mgr.lookup_account(tx, "spending")).unwrap(), 0);
    assert!(matches!(
        store.view(|tx| mgr.lookup_account(tx, "default")),
        Err(Error::NotExist(_))
    ));
    assert_eq!(store.view(|tx| mgr.account_name(tx, 0)).unwrap(), "spending");

    let props = store.view(|tx| mgr.account_properties(tx, 0)).unwrap();
    assert_eq!(props.account_name, "spending");

    assert!(matches!(
        store.update(|tx| mgr.rename_account(tx, IMPORTED_ADDR_ACCOUNT, "anything")),
        Err(Error::Invalid(_))
    ));
    assert!(matches!(
        store.update(|tx| mgr.rename_account(tx, 0, "imported")),
        Err(Error::Invalid(_))
    ));
}

#[test]
fn import_xpub_account_lands_in_imported_range() {
    let (store, mgr) = simnet_wallet();

    let params = ChainParams::simnet();
    let xpub = hd_keys_from_seed(&OTHER_SEED, &params)
        .unwrap()
        .acct_legacy_priv
        .public_key();

    let account = store
        .update(|tx| mgr.import_xpub_account(tx, "cold", &xpub))
        .unwrap();
    assert_eq!(account, IMPORTED_ADDR_ACCOUNT + 1);
    assert_eq!(
        store.view(|tx| mgr.last_imported_account(tx)).unwrap(),
        account
    );

    // The account resolves addresses but has no private side.
    let got = store.view(|tx| mgr.account_extended_pubkey(tx, account)).unwrap();
    assert_eq!(got.to_string(Prefix::XPUB), xpub.to_string(Prefix::XPUB));
    assert!(matches!(
        store.view(|tx| mgr.account_extended_privkey(tx, account)),
        Err(Error::Invalid(_))
    ));

    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, account, 0, EXTERNAL_BRANCH))
        .unwrap();
    let addr = derived_address(&store, &mgr, account, EXTERNAL_BRANCH, 0);
    let managed = store.view(|tx| mgr.address(tx, &addr)).unwrap();
    assert_eq!(managed.account(), account);
}

#[test]
fn import_voting_account_is_sealed_from_the_start() {
    let (store, mgr) = simnet_wallet();

    let params = ChainParams::simnet();
    let xpriv = hd_keys_from_seed(&OTHER_SEED, &params).unwrap().acct_legacy_priv;

    assert!(matches!(
        store.update(|tx| mgr.import_voting_account(tx, &xpriv, b"", "votes")),
        Err(Error::Passphrase)
    ));

    let account = store
        .update(|tx| mgr.import_voting_account(tx, &xpriv, b"ballot", "votes"))
        .unwrap();
    assert!(account > IMPORTED_ADDR_ACCOUNT);

    let props = store.view(|tx| mgr.account_properties(tx, account)).unwrap();
    assert_eq!(props.account_type, AccountType::ImportedVoting);
    assert!(props.account_encrypted);
    assert!(!props.account_unlocked);

    store.view(|tx| mgr.unlock_account(tx, account, b"ballot")).unwrap();
    let xpriv_out = store
        .view(|tx| mgr.account_extended_privkey(tx, account))
        .unwrap();
    drop(xpriv_out);

    // Importing the same key again trips the external child 0 probe.
    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, account, 0, EXTERNAL_BRANCH))
        .unwrap();
    assert!(matches!(
        store.update(|tx| mgr.import_voting_account(tx, &xpriv, b"ballot2", "votes2")),
        Err(Error::Exist(_))
    ));
}

#[test]
fn imported_account_properties_count_keys() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();

    store
        .update(|tx| mgr.import_private_key(tx, &Wif::from_bytes([0x61; 32])))
        .unwrap();
    store
        .update(|tx| mgr.import_private_key(tx, &Wif::from_bytes([0x62; 32])))
        .unwrap();
    store
        .update(|tx| mgr.import_script(tx, &[0x51]))
        .unwrap();

    let props = store
        .view(|tx| mgr.account_properties(tx, IMPORTED_ADDR_ACCOUNT))
        .unwrap();
    assert_eq!(props.account_name, "imported");
    assert_eq!(props.imported_key_count, 3);
}

#[test]
fn addr_account_and_iteration() {
    let (store, mgr) = simnet_wallet();
    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 0, 1, EXTERNAL_BRANCH))
        .unwrap();
    store.update(|tx| mgr.import_script(tx, &[0x51])).unwrap();

    let addr = derived_address(&store, &mgr, 0, EXTERNAL_BRANCH, 1);
    assert_eq!(store.view(|tx| mgr.addr_account(tx, &addr)).unwrap(), 0);
    assert!(store.view(|tx| mgr.exists_hash160(tx, &addr.id())).unwrap());

    let mut total = 0;
    store
        .view(|tx| {
            mgr.for_each_active_address(tx, |_| {
                total += 1;
                Ok(())
            })
        })
        .unwrap();
    assert_eq!(total, 3);

    let mut accounts = Vec::new();
    store
        .view(|tx| {
            mgr.for_each_account(tx, |account| {
                accounts.push(account);
                Ok(())
            })
        })
        .unwrap();
    assert_eq!(accounts, vec![0, IMPORTED_ADDR_ACCOUNT]);
}

#[test]
fn mark_used_by_address_ignores_imported_rows() {
    let (store, mgr) = simnet_wallet();
    store
        .update(|tx| mgr.sync_account_to_addr_index(tx, 0, 4, EXTERNAL_BRANCH))
        .unwrap();
    store.update(|tx| mgr.import_script(tx, &[0x52])).unwrap();

    let addr = derived_address(&store, &mgr, 0, EXTERNAL_BRANCH, 4);
    store.update(|tx| mgr.mark_used(tx, &addr)).unwrap();

    let props = store.view(|tx| mgr.account_properties(tx, 0)).unwrap();
    assert_eq!(props.last_used_external_index, 4);
    assert_eq!(props.last_returned_external_index, 4);

    let script_addr = Address::ScriptHash(hash160(&[0x52]));
    store.update(|tx| mgr.mark_used(tx, &script_addr)).unwrap();
}

#[test]
fn encrypt_decrypt_requires_capability() {
    let (_store, mgr) = simnet_wallet();

    let ct = mgr.encrypt(CryptoKeyType::Public, b"payload").unwrap();
    assert_eq!(&mgr.decrypt(CryptoKeyType::Public, &ct).unwrap()[..], b"payload");

    assert!(matches!(
        mgr.encrypt(CryptoKeyType::Private, b"payload"),
        Err(Error::Locked(_))
    ));

    mgr.unlock(PRIV_PASS).unwrap();
    let ct = mgr.encrypt(CryptoKeyType::Private, b"payload").unwrap();
    assert_eq!(&mgr.decrypt(CryptoKeyType::Private, &ct).unwrap()[..], b"payload");

    mgr.lock().unwrap();
    assert!(matches!(
        mgr.decrypt(CryptoKeyType::Private, &ct),
        Err(Error::Locked(_))
    ));
}

#[test]
fn coin_type_priv_key_requires_unlocked() {
    let (store, mgr) = simnet_wallet();
    assert!(matches!(
        store.view(|tx| mgr.coin_type_priv_key(tx)),
        Err(Error::Locked(_))
    ));
    mgr.unlock(PRIV_PASS).unwrap();
    let key = store.view(|tx| mgr.coin_type_priv_key(tx)).unwrap();
    drop(key);
}

#[test]
fn account_private_key_neuters_to_stored_public() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();

    let xpriv = store.view(|tx| mgr.account_extended_privkey(tx, 0)).unwrap();
    let xpub = store.view(|tx| mgr.account_extended_pubkey(tx, 0)).unwrap();
    assert_eq!(
        xpriv.public_key().to_string(Prefix::XPUB),
        xpub.to_string(Prefix::XPUB)
    );
}

#[test]
fn create_twice_fails_exist() {
    let params = ChainParams::simnet();
    let (store, _mgr) = new_wallet(params);
    let err = store
        .update(|tx| create_address_manager(tx, &SEED, PUB_PASS, PRIV_PASS, &params))
        .unwrap_err();
    assert!(matches!(err, Error::Exist(_)));
}

#[test]
fn create_requires_private_passphrase() {
    let store = Store::open_in_memory().unwrap();
    let err = store
        .update(|tx| create_address_manager(tx, &SEED, PUB_PASS, b"", &ChainParams::simnet()))
        .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));
}

#[test]
fn load_rejects_wrong_public_passphrase() {
    let (store, _mgr) = simnet_wallet();
    assert!(matches!(
        store.view(|tx| Manager::load(tx, b"nope", ChainParams::simnet())),
        Err(Error::Passphrase)
    ));
}

#[test]
fn close_zeroizes_and_locks() {
    let (store, mgr) = simnet_wallet();
    mgr.unlock(PRIV_PASS).unwrap();
    mgr.close();
    assert!(mgr.is_locked());

    // Public-side decryption no longer works after close.
    assert!(store.view(|tx| mgr.account_extended_pubkey(tx, 0)).is_err());
}
