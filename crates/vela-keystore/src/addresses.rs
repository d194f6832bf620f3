//! Address resolution, import, and derivation records
//!
//! Chained addresses are never stored with key material: the row records
//! only `(account, branch, index)` and the keys are re-derived on
//! demand. Imported keys and scripts store their (encrypted) material in
//! the row itself under the reserved imported account.

use bip32::{XPrv, XPub};

use vela_walletdb::{ReadTx, WriteTx};

use crate::address::{
    hash160, Address, AddressPrivateKey, ManagedAddress, ManagedPubKeyAddress,
    ManagedScriptAddress, Wif, COMPRESSED_PUBKEY_LEN, PUBKEY_COMPRESSED_EVEN,
    PUBKEY_COMPRESSED_ODD,
};
use crate::error::{Error, Result};
use crate::hd::{self, IMPORTED_ADDR_ACCOUNT, INTERNAL_BRANCH, MAX_ADDRESSES_PER_ACCOUNT};
use crate::manager::{AccountInfo, Manager, ManagerState};
use crate::schema::{self, AddressRow};

/// A key derived at `(account, branch, index)`, private or public
/// depending on what was requested and available.
enum DerivedKey {
    Private(XPrv),
    Public(XPub),
}

impl DerivedKey {
    fn serialized_pubkey(&self) -> Vec<u8> {
        match self {
            DerivedKey::Private(xprv) => hd::xpub_pubkey_bytes(&xprv.public_key()),
            DerivedKey::Public(xpub) => hd::xpub_pubkey_bytes(xpub),
        }
    }
}

/// Derive the address key at `(branch, index)` from an account's cached
/// extended keys. The intermediate branch key is dropped (and zeroized)
/// before returning.
fn derive_key(info: &AccountInfo, branch: u32, index: u32, private: bool) -> Result<DerivedKey> {
    if branch > INTERNAL_BRANCH {
        return Err(Error::Invalid(format!("account branch {branch}")));
    }
    if private {
        let acct_key = match &info.key_priv {
            Some(key) => key,
            None if info.unique_kdf.is_some() => {
                return Err(Error::Locked("account with unique passphrase is locked".into()));
            }
            None if !info.key_encrypted.is_empty() => {
                return Err(Error::Locked(format!(
                    "private key {}/{branch}/{index} is locked",
                    info.name
                )));
            }
            None => {
                return Err(Error::WatchingOnly(format!(
                    "no private key for {}/{branch}/{index}",
                    info.name
                )));
            }
        };
        let branch_key = hd::derive_priv_child(acct_key, branch)?;
        let addr_key = hd::derive_priv_child(&branch_key, index)?;
        Ok(DerivedKey::Private(addr_key))
    } else {
        let branch_key = hd::derive_pub_child(&info.key_pub, branch)?;
        let addr_key = hd::derive_pub_child(&branch_key, index)?;
        Ok(DerivedKey::Public(addr_key))
    }
}

/// Convert a persisted row into a managed address, deriving or
/// decrypting whatever the variant calls for.
fn row_to_managed(state: &mut ManagerState, tx: &dyn ReadTx, row: AddressRow) -> Result<ManagedAddress> {
    match row {
        AddressRow::Chained { account, branch, index } => {
            let locked = state.locked;
            let info = state.account_info(tx, account)?;

            // Derive privately whenever the account's private key is
            // available, so a derivation mismatch between the trees
            // would surface here rather than at signing time.
            let mut private = !locked;
            if account > IMPORTED_ADDR_ACCOUNT {
                private = false;
            } else if info.unique_kdf.is_some() {
                private = info.key_priv.is_some();
            }

            let derived = derive_key(info, branch, index, private)?;
            let pubkey = derived.serialized_pubkey();
            drop(derived);

            Ok(ManagedAddress::PubKey(ManagedPubKeyAddress::new(
                account,
                pubkey,
                branch == INTERNAL_BRANCH,
                index,
                false,
            )))
        }
        AddressRow::Imported { account, enc_pub_key, .. } => {
            let pubkey = state
                .crypto_key_pub
                .decrypt(&enc_pub_key)
                .map_err(|_| Error::Crypto("decrypt imported pubkey".into()))?;
            Ok(ManagedAddress::PubKey(ManagedPubKeyAddress::new(
                account,
                pubkey.to_vec(),
                false,
                0,
                true,
            )))
        }
        AddressRow::Script { account, enc_script_hash, script } => {
            let hash_bytes = state
                .crypto_key_pub
                .decrypt(&enc_script_hash)
                .map_err(|_| Error::Crypto("decrypt imported script hash".into()))?;
            let mut script_hash = [0u8; 20];
            if hash_bytes.len() != script_hash.len() {
                return Err(Error::Io("malformed script hash".into()));
            }
            script_hash.copy_from_slice(&hash_bytes);
            Ok(ManagedAddress::Script(ManagedScriptAddress::new(
                account,
                script_hash,
                script,
            )))
        }
    }
}

impl Manager {
    /// Resolve an address known to the manager into its managed form.
    ///
    /// Addresses carrying a bare public key are normalized to their
    /// pubkey-hash form first.
    pub fn address(&self, tx: &dyn ReadTx, addr: &Address) -> Result<ManagedAddress> {
        let mut state = self.state.write();
        let row = schema::fetch_address(tx, &addr.id())?;
        row_to_managed(&mut state, tx, row)
    }

    /// The account an address belongs to.
    pub fn addr_account(&self, tx: &dyn ReadTx, addr: &Address) -> Result<u32> {
        schema::fetch_addr_account(tx, &addr.id())
    }

    /// Whether the 20-byte P2PKH or P2SH hash-160 is known to the
    /// manager.
    pub fn exists_hash160(&self, tx: &dyn ReadTx, hash160: &[u8; 20]) -> Result<bool> {
        schema::exists_address(tx, hash160)
    }

    /// Import a WIF private key under the reserved imported account.
    ///
    /// On a watching-only manager only the public key is recorded; the
    /// private key is never stored anywhere, so the caller must keep it
    /// elsewhere. Otherwise the manager must be unlocked.
    pub fn import_private_key(&self, tx: &dyn WriteTx, wif: &Wif) -> Result<ManagedAddress> {
        let state = self.state.write();

        if !state.watching_only && state.locked {
            return Err(Error::Locked("manager is locked".into()));
        }

        let pubkey = wif.pubkey()?;
        let pubkey_hash = hash160(&pubkey);
        if schema::exists_address(tx, &pubkey_hash)? {
            return Err(Error::Exist("address for private key already exists".into()));
        }

        let enc_pub = state.crypto_key_pub.encrypt(&pubkey)?;
        let enc_priv = if state.watching_only {
            Vec::new()
        } else {
            let ck = state
                .crypto_key_priv
                .as_ref()
                .ok_or_else(|| Error::Locked("manager is locked".into()))?;
            ck.encrypt(wif.priv_bytes())?
        };

        schema::put_imported_address(tx, &pubkey_hash, IMPORTED_ADDR_ACCOUNT, enc_pub, enc_priv)?;

        Ok(ManagedAddress::PubKey(ManagedPubKeyAddress::new(
            IMPORTED_ADDR_ACCOUNT,
            pubkey,
            false,
            0,
            true,
        )))
    }

    /// Import a compressed serialized public key. Only watching-only
    /// managers may import bare public keys.
    pub fn import_public_key(&self, tx: &dyn WriteTx, pubkey: &[u8]) -> Result<ManagedAddress> {
        let state = self.state.write();

        if !state.watching_only {
            return Err(Error::Invalid(
                "public keys may only be imported by watching-only wallets".into(),
            ));
        }
        if pubkey.len() != COMPRESSED_PUBKEY_LEN {
            return Err(Error::Invalid("invalid length for compressed pubkey".into()));
        }
        match pubkey[0] {
            PUBKEY_COMPRESSED_EVEN | PUBKEY_COMPRESSED_ODD => {}
            other => {
                return Err(Error::Invalid(format!(
                    "invalid format byte {other:#04x} for compressed pubkey"
                )));
            }
        }

        let pubkey_hash = hash160(pubkey);
        if schema::exists_address(tx, &pubkey_hash)? {
            return Err(Error::Exist("address for public key already exists".into()));
        }

        let enc_pub = state.crypto_key_pub.encrypt(pubkey)?;
        schema::put_imported_address(tx, &pubkey_hash, IMPORTED_ADDR_ACCOUNT, enc_pub, Vec::new())?;

        Ok(ManagedAddress::PubKey(ManagedPubKeyAddress::new(
            IMPORTED_ADDR_ACCOUNT,
            pubkey.to_vec(),
            false,
            0,
            true,
        )))
    }

    /// Import a redeem script as a pay-to-script-hash address.
    ///
    /// The script hash is encrypted under the public crypto key on
    /// purpose: script addresses must keep resolving while the manager
    /// is locked or watching-only. The script itself is not secret and
    /// persists in the clear.
    pub fn import_script(&self, tx: &dyn WriteTx, script: &[u8]) -> Result<ManagedAddress> {
        let state = self.state.write();

        let script_hash = hash160(script);
        if schema::exists_address(tx, &script_hash)? {
            return Err(Error::Exist("script already exists".into()));
        }

        let enc_hash = state.crypto_key_pub.encrypt(&script_hash)?;
        schema::put_script_address(tx, &script_hash, IMPORTED_ADDR_ACCOUNT, enc_hash, script.to_vec())?;

        Ok(ManagedAddress::Script(ManagedScriptAddress::new(
            IMPORTED_ADDR_ACCOUNT,
            script_hash,
            script.to_vec(),
        )))
    }

    /// The private key for a P2PK or P2PKH address.
    ///
    /// The returned handle zeroizes its key material on drop; callers
    /// must drop it as soon as signing is complete.
    pub fn private_key(&self, tx: &dyn ReadTx, addr: &Address) -> Result<AddressPrivateKey> {
        let mut state = self.state.write();

        let row = schema::fetch_address(tx, &addr.id())?;
        match row {
            AddressRow::Chained { account, branch, index } => {
                if account == IMPORTED_ADDR_ACCOUNT {
                    return Err(Error::Invalid("account does not record private keys".into()));
                }
                let info = state.account_info(tx, account)?;
                let DerivedKey::Private(xprv) = derive_key(info, branch, index, true)? else {
                    return Err(Error::Crypto("derived key is not private".into()));
                };
                let key = xprv.private_key().clone();
                Ok(AddressPrivateKey::new(key))
            }
            AddressRow::Imported { enc_priv_key, .. } => {
                if enc_priv_key.is_empty() {
                    return Err(Error::Invalid("imported address has no private key".into()));
                }
                let ck = state
                    .crypto_key_priv
                    .as_ref()
                    .ok_or_else(|| Error::Locked("manager is locked".into()))?;
                let plain = ck
                    .decrypt(&enc_priv_key)
                    .map_err(|_| Error::Crypto("decrypt imported privkey".into()))?;
                let key = k256::ecdsa::SigningKey::from_slice(&plain)
                    .map_err(|e| Error::Io(format!("imported privkey: {e}")))?;
                Ok(AddressPrivateKey::new(key))
            }
            AddressRow::Script { .. } => {
                Err(Error::Invalid("no private key for P2SH address".into()))
            }
        }
    }

    /// Whether the private key for an address is recorded or derivable
    /// once the relevant lock is open.
    pub fn have_private_key(&self, tx: &dyn ReadTx, addr: &Address) -> Result<bool> {
        Ok(match schema::fetch_address(tx, &addr.id())? {
            AddressRow::Chained { account, .. } => account < IMPORTED_ADDR_ACCOUNT,
            AddressRow::Imported { enc_priv_key, .. } => !enc_priv_key.is_empty(),
            AddressRow::Script { .. } => false,
        })
    }

    /// The redeem script of a P2SH address.
    pub fn redeem_script(&self, tx: &dyn ReadTx, addr: &Address) -> Result<Vec<u8>> {
        match schema::fetch_address(tx, &addr.id())? {
            AddressRow::Script { script, .. } => Ok(script),
            _ => Err(Error::Invalid("redeem script lookup requires P2SH address".into())),
        }
    }

    /// Record a chained address derived by the caller. Does not advance
    /// the last-returned or last-used watermarks; see
    /// [`Manager::mark_returned_child_index`].
    pub fn record_derived_address(
        &self,
        tx: &dyn WriteTx,
        account: u32,
        branch: u32,
        child: u32,
        pubkey: &[u8],
    ) -> Result<()> {
        let _guard = self.state.write();
        let pubkey_hash = hash160(pubkey);
        schema::put_chained_address(tx, &pubkey_hash, account, branch, child)
    }

    /// Persist chained rows for every child of an account branch up to
    /// and including `sync_to_index`.
    ///
    /// The store does not track the highest generated child, so children
    /// are written from `sync_to_index` downward and generation stops at
    /// the first already-persisted child: if a child exists, every lower
    /// child exists too. Children the derivation rejects are skipped.
    pub fn sync_account_to_addr_index(
        &self,
        tx: &dyn WriteTx,
        account: u32,
        sync_to_index: u32,
        branch: u32,
    ) -> Result<()> {
        let mut state = self.state.write();

        if account == IMPORTED_ADDR_ACCOUNT {
            return Err(Error::Invalid("cannot sync imported account branch index".into()));
        }
        if branch > INTERNAL_BRANCH {
            return Err(Error::Invalid(format!("account branch {branch}")));
        }
        if sync_to_index > MAX_ADDRESSES_PER_ACCOUNT {
            return Err(Error::Invalid(format!("child index {sync_to_index} exceeds max")));
        }

        let info = state.account_info(tx, account)?;
        let branch_xpub = hd::derive_pub_child(&info.key_pub, branch)?;

        let mut child = sync_to_index;
        loop {
            // An invalid child is simply skipped; the next lower index
            // takes its place.
            if let Ok(child_xpub) = hd::derive_pub_child(&branch_xpub, child) {
                let pubkey_hash = hash160(&hd::xpub_pubkey_bytes(&child_xpub));
                if schema::exists_address(tx, &pubkey_hash)? {
                    break;
                }
                schema::put_chained_address(tx, &pubkey_hash, account, branch, child)?;
            }
            if child == 0 {
                break;
            }
            child -= 1;
        }
        Ok(())
    }

    /// Record address usage for a chained address. No effect for
    /// imported keys and scripts.
    pub fn mark_used(&self, tx: &dyn WriteTx, addr: &Address) -> Result<()> {
        match schema::fetch_address(tx, &addr.id())? {
            AddressRow::Chained { account, branch, index } => {
                self.mark_used_child_index(tx, account, branch, index)
            }
            _ => Ok(()),
        }
    }

    /// Call `f` with each managed address of the account, breaking early
    /// on error.
    pub fn for_each_account_address(
        &self,
        tx: &dyn ReadTx,
        account: u32,
        mut f: impl FnMut(ManagedAddress) -> Result<()>,
    ) -> Result<()> {
        let mut state = self.state.write();
        for (_, row) in schema::account_address_rows(tx, account)? {
            let managed = row_to_managed(&mut state, tx, row)?;
            f(managed)?;
        }
        Ok(())
    }

    /// Call `f` with each active address in the store, breaking early on
    /// error.
    pub fn for_each_active_address(
        &self,
        tx: &dyn ReadTx,
        mut f: impl FnMut(&Address) -> Result<()>,
    ) -> Result<()> {
        let mut state = self.state.write();
        for (_, row) in schema::all_address_rows(tx)? {
            let managed = row_to_managed(&mut state, tx, row)?;
            f(&managed.address())?;
        }
        Ok(())
    }
}
