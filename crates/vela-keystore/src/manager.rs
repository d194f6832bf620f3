//! Address manager lifecycle and locking
//!
//! The [`Manager`] owns every piece of cached key state: the two
//! passphrase-derived master keys, the two crypto keys, and the lazily
//! populated account cache. All state sits behind a single reader-writer
//! lock; operations that can populate the cache or touch secret key
//! material take the write side.
//!
//! Secret handling follows one rule: anything derived or decrypted is
//! either owned by the manager (and dropped on lock, conversion, or
//! close) or handed to the caller in a type that zeroizes on drop.

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use bip32::{XPrv, XPub};
use tracing::debug;
use vela_params::ChainParams;
use vela_walletdb::{ReadTx, WriteTx};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{Argon2idParams, CryptoKey};
use crate::error::{Error, Result};
use crate::hasher::{hashes_equal, PassphraseHash, PassphraseHasher};
use crate::hd::{self, DEFAULT_ACCOUNT_NAME, DEFAULT_ACCOUNT_NUM, IMPORTED_ADDR_ACCOUNT_NAME, IMPORTED_ADDR_ACCOUNT};
use crate::masterkey::{MasterKey, MasterKeyParams};
use crate::schema::{self, AccountRow, AccountType};

/// Selector for the two crypto keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoKeyType {
    /// Key protecting public data: extended public keys, imported public
    /// keys, script hashes
    Public,
    /// Key protecting private data: extended private keys and imported
    /// private keys
    Private,
}

/// Cached per-account state: the decoded extended keys and, for
/// unique-passphrase accounts, the KDF parameters and re-auth hasher.
pub(crate) struct AccountInfo {
    pub(crate) name: String,
    pub(crate) acct_type: AccountType,
    /// Ciphertext of the private extended key; empty when the account
    /// records no private key material.
    pub(crate) key_encrypted: Vec<u8>,
    /// Cleartext private extended key. `None` while the manager (or the
    /// account, for unique-passphrase accounts) is locked.
    pub(crate) key_priv: Option<XPrv>,
    pub(crate) key_pub: XPub,
    pub(crate) unique_kdf: Option<Argon2idParams>,
    pub(crate) unique_hasher: Option<PassphraseHasher>,
    pub(crate) unique_pass_hash: Option<PassphraseHash>,
}

pub(crate) struct ManagerState {
    pub(crate) watching_only: bool,
    pub(crate) locked: bool,
    pub(crate) closed: bool,
    pub(crate) accts: HashMap<u32, AccountInfo>,
    pub(crate) master_key_pub: MasterKey,
    pub(crate) master_key_priv: Option<MasterKey>,
    pub(crate) crypto_key_pub: CryptoKey,
    pub(crate) crypto_key_priv_enc: Option<Vec<u8>>,
    pub(crate) crypto_key_priv: Option<CryptoKey>,
    pub(crate) pass_hasher: PassphraseHasher,
    pub(crate) priv_pass_hash: Option<PassphraseHash>,
}

impl ManagerState {
    /// Remove and zero every secret key held in memory.
    pub(crate) fn lock(&mut self) {
        for info in self.accts.values_mut() {
            // XPrv zeroizes its key material on drop.
            info.key_priv = None;
        }
        if let Some(ck) = self.crypto_key_priv.as_mut() {
            ck.zero();
        }
        self.crypto_key_priv = None;
        if let Some(mk) = self.master_key_priv.as_mut() {
            mk.zero();
        }
        self.priv_pass_hash = None;
        self.locked = true;

        // crypto_key_pub stays intact: public material must decrypt in
        // either lock state.
    }

    /// Load and cache the account's info, decrypting the private
    /// extended key as well when the manager is unlocked and the account
    /// is not uniquely encrypted.
    pub(crate) fn account_info(&mut self, tx: &dyn ReadTx, account: u32) -> Result<&mut AccountInfo> {
        let ManagerState { accts, crypto_key_pub, crypto_key_priv, locked, .. } = self;
        match accts.entry(account) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let row = schema::fetch_account_row(tx, account)?;
                let name = schema::fetch_account_name(tx, account)?;
                let unique_kdf = schema::fetch_account_kdf(tx, account)?;

                let pub_bytes = crypto_key_pub
                    .decrypt(&row.pub_key_enc)
                    .map_err(|_| Error::Crypto(format!("decrypt account {account} pubkey")))?;
                let key_pub = hd::xpub_from_stored(&pub_bytes)?;

                let mut info = AccountInfo {
                    name,
                    acct_type: row.acct_type,
                    key_encrypted: row.priv_key_enc,
                    key_priv: None,
                    key_pub,
                    unique_hasher: unique_kdf.as_ref().map(|_| PassphraseHasher::new()),
                    unique_kdf,
                    unique_pass_hash: None,
                };

                if !*locked && !info.key_encrypted.is_empty() && info.unique_kdf.is_none() {
                    let ck = crypto_key_priv
                        .as_ref()
                        .ok_or_else(|| Error::Locked("private crypto key unavailable".into()))?;
                    let plain = ck
                        .decrypt(&info.key_encrypted)
                        .map_err(|_| Error::Crypto(format!("decrypt account {account} privkey")))?;
                    info.key_priv = Some(hd::xprv_from_stored(&plain)?);
                }

                Ok(entry.insert(info))
            }
        }
    }

    /// Whether the account carries a unique passphrase and, if so,
    /// whether it is currently unlocked. Load failures report as
    /// (false, false).
    pub(crate) fn account_has_passphrase(&mut self, tx: &dyn ReadTx, account: u32) -> (bool, bool) {
        match self.account_info(tx, account) {
            Ok(info) => {
                let has = info.unique_kdf.is_some();
                (has, has && info.key_priv.is_some())
            }
            Err(_) => (false, false),
        }
    }
}

/// Concurrency-safe address manager and key store.
pub struct Manager {
    chain_params: ChainParams,
    pub(crate) state: RwLock<ManagerState>,
}

impl Manager {
    /// Load a manager from a previously created namespace.
    ///
    /// The public passphrase is authenticated while deriving the master
    /// public key; a mismatch returns `Passphrase`. The manager starts
    /// locked.
    pub fn load(tx: &dyn ReadTx, pub_passphrase: &[u8], chain_params: ChainParams) -> Result<Manager> {
        let watching_only = schema::fetch_watching_only(tx)?;
        let (pub_params, priv_params) = schema::fetch_master_key_params(tx)?;
        let (crypto_pub_enc, crypto_priv_enc) = schema::fetch_crypto_keys(tx)?;

        let mut master_key_pub = MasterKey::from_params(MasterKeyParams::unmarshal(&pub_params)?);
        master_key_pub.derive(pub_passphrase)?;

        let master_key_priv = if watching_only {
            None
        } else {
            let params = priv_params
                .ok_or_else(|| Error::Io("missing master privkey params".into()))?;
            Some(MasterKey::from_params(MasterKeyParams::unmarshal(&params)?))
        };

        let crypto_pub_bytes = master_key_pub
            .decrypt(&crypto_pub_enc)
            .map_err(|_| Error::Crypto("decrypt crypto pubkey".into()))?;
        let crypto_key_pub = CryptoKey::from_bytes(&crypto_pub_bytes)?;

        Ok(Manager {
            chain_params,
            state: RwLock::new(ManagerState {
                watching_only,
                locked: true,
                closed: false,
                accts: HashMap::new(),
                master_key_pub,
                master_key_priv,
                crypto_key_pub,
                crypto_key_priv_enc: crypto_priv_enc,
                crypto_key_priv: None,
                pass_hasher: PassphraseHasher::new(),
                priv_pass_hash: None,
            }),
        })
    }

    /// Chain parameters this manager was loaded with.
    pub fn chain_params(&self) -> &ChainParams {
        &self.chain_params
    }

    /// Whether the wallet records no private key material.
    pub fn watching_only(&self) -> bool {
        self.state.read().watching_only
    }

    /// Whether the private keys are currently inaccessible.
    pub fn is_locked(&self) -> bool {
        self.state.read().locked
    }

    /// Derive the master private key from `passphrase` and decrypt all
    /// cached private key material.
    ///
    /// When already unlocked, the passphrase is authenticated by
    /// constant-time hash comparison without re-deriving. Any failure
    /// leaves the manager locked.
    pub fn unlock(&self, passphrase: &[u8]) -> Result<()> {
        let mut state = self.state.write();

        if state.watching_only {
            return Err(Error::WatchingOnly("cannot unlock watching wallet".into()));
        }

        let pass_hash = state.pass_hasher.hash(passphrase);

        if !state.locked {
            let matches = state
                .priv_pass_hash
                .as_ref()
                .map(|h| hashes_equal(h, &pass_hash))
                .unwrap_or(false);
            if !matches {
                state.lock();
                return Err(Error::Passphrase);
            }
            return Ok(());
        }

        let derived = state
            .master_key_priv
            .as_mut()
            .ok_or_else(|| Error::Crypto("missing master private key".into()))
            .and_then(|mk| mk.derive(passphrase));
        if let Err(e) = derived {
            state.lock();
            return Err(e);
        }

        if let Err(e) = unlock_keys(&mut state) {
            state.lock();
            return Err(e);
        }

        state.locked = false;
        state.priv_pass_hash = Some(pass_hash);
        Ok(())
    }

    /// Remove and zero all cached secret keys.
    pub fn lock(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.watching_only {
            return Err(Error::WatchingOnly("watching wallets have no private keys to lock".into()));
        }
        if state.locked {
            return Err(Error::Locked("manager is already locked".into()));
        }
        state.lock();
        Ok(())
    }

    /// Authenticate `passphrase` against an already-unlocked manager
    /// using the keyed passphrase hash, without KDF work.
    pub fn unlocked_with_passphrase(&self, passphrase: &[u8]) -> Result<()> {
        let state = self.state.read();
        if state.watching_only {
            return Err(Error::WatchingOnly("watching wallets can not be unlocked".into()));
        }
        if state.locked {
            return Err(Error::Locked("manager is locked".into()));
        }
        let pass_hash = state.pass_hasher.hash(passphrase);
        let matches = state
            .priv_pass_hash
            .as_ref()
            .map(|h| hashes_equal(h, &pass_hash))
            .unwrap_or(false);
        if !matches {
            return Err(Error::Passphrase);
        }
        Ok(())
    }

    /// Change the public or private passphrase.
    ///
    /// The old passphrase is authenticated by deriving a scratch master
    /// key against the stored parameters. New parameters and the
    /// re-encrypted crypto key are written to the caller's transaction
    /// before any in-memory state changes.
    pub fn change_passphrase(
        &self,
        tx: &dyn WriteTx,
        old_passphrase: &[u8],
        new_passphrase: &[u8],
        private: bool,
    ) -> Result<()> {
        let mut state = self.state.write();

        if private && state.watching_only {
            return Err(Error::WatchingOnly("watching wallets have no private passphrase".into()));
        }

        let current = if private {
            state
                .master_key_priv
                .as_ref()
                .ok_or_else(|| Error::Crypto("missing master private key".into()))?
        } else {
            &state.master_key_pub
        };
        let scratch = current.derive_scratch(old_passphrase)?;

        let mut new_master = MasterKey::generate(new_passphrase, self.chain_params.scrypt_options())?;
        let new_params = new_master.params().marshal();

        if private {
            let hasher = PassphraseHasher::new();

            // Decrypt with the scratch key rather than relying on the
            // unlocked state; this works identically whether the manager
            // is locked or not.
            let enc = state
                .crypto_key_priv_enc
                .as_ref()
                .ok_or_else(|| Error::Crypto("missing crypto privkey ciphertext".into()))?;
            let dec = scratch
                .decrypt(enc)
                .map_err(|_| Error::Crypto("decrypt crypto privkey".into()))?;
            let new_enc = new_master
                .encrypt(&dec)
                .map_err(|_| Error::Crypto("encrypt crypto privkey".into()))?;

            let pass_hash = if state.locked {
                new_master.zero();
                None
            } else {
                Some(hasher.hash(new_passphrase))
            };

            schema::put_crypto_keys(tx, None, Some(&new_enc))?;
            schema::put_master_key_params(tx, None, Some(&new_params))?;

            state.crypto_key_priv_enc = Some(new_enc);
            if let Some(mk) = state.master_key_priv.as_mut() {
                mk.zero();
            }
            state.master_key_priv = Some(new_master);
            state.pass_hasher = hasher;
            state.priv_pass_hash = pass_hash;
        } else {
            let new_enc = new_master
                .encrypt(state.crypto_key_pub.bytes())
                .map_err(|_| Error::Crypto("encrypt crypto pubkey".into()))?;

            schema::put_crypto_keys(tx, Some(&new_enc), None)?;
            schema::put_master_key_params(tx, Some(&new_params), None)?;

            state.master_key_pub.zero();
            state.master_key_pub = new_master;
        }

        Ok(())
    }

    /// Convert to a locked watching-only manager, deleting every
    /// persisted private ciphertext.
    ///
    /// Irreversible for this namespace; callers typically run it on a
    /// copy of the wallet database. A no-op when already watching-only.
    pub fn convert_to_watching_only(&self, tx: &dyn WriteTx) -> Result<()> {
        let mut state = self.state.write();

        if state.watching_only {
            return Ok(());
        }

        schema::delete_private_keys(tx)?;
        schema::put_watching_only(tx, true)?;

        if !state.locked {
            state.lock();
        }

        for info in state.accts.values_mut() {
            info.key_encrypted.zeroize();
            info.key_encrypted = Vec::new();
            info.unique_kdf = None;
            info.unique_hasher = None;
            info.unique_pass_hash = None;
        }

        if let Some(enc) = state.crypto_key_priv_enc.as_mut() {
            enc.zeroize();
        }
        state.crypto_key_priv_enc = None;
        state.crypto_key_priv = None;
        state.master_key_priv = None;
        state.watching_only = true;

        debug!("converted address manager to watching-only");
        Ok(())
    }

    /// Shut the manager down, zeroing all cached key material including
    /// the public keys.
    pub fn close(&self) {
        let mut state = self.state.write();
        if state.closed {
            return;
        }
        if !state.watching_only && !state.locked {
            state.lock();
        }
        state.accts.clear();
        state.crypto_key_pub.zero();
        state.master_key_pub.zero();
        state.closed = true;
    }

    /// Encrypt `data` with the selected crypto key.
    pub fn encrypt(&self, key_type: CryptoKeyType, data: &[u8]) -> Result<Vec<u8>> {
        let state = self.state.write();
        select_crypto_key(&state, key_type)?.encrypt(data)
    }

    /// Decrypt `data` with the selected crypto key.
    pub fn decrypt(&self, key_type: CryptoKeyType, data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let state = self.state.write();
        select_crypto_key(&state, key_type)?.decrypt(data)
    }

    /// The BIP-0044 coin type currently in use.
    ///
    /// Watching-only wallets created from an account xpub record no coin
    /// type keys and report `WatchingOnly`.
    pub fn coin_type(&self, tx: &dyn ReadTx) -> Result<u32> {
        if schema::has_legacy_coin_type(tx)? {
            return Ok(self.chain_params.legacy_coin_type);
        }
        if schema::has_slip0044_coin_type(tx)? {
            return Ok(self.chain_params.slip0044_coin_type);
        }
        Err(Error::WatchingOnly("watching wallets do not record coin type keys".into()))
    }

    /// Decrypt and return the active coin type private key
    /// (`m/44'/<coin type>'`). The caller owns the key and must drop it
    /// as soon as possible.
    pub fn coin_type_priv_key(&self, tx: &dyn ReadTx) -> Result<XPrv> {
        let state = self.state.read();
        if state.locked {
            return Err(Error::Locked("manager is locked".into()));
        }
        if state.watching_only {
            return Err(Error::WatchingOnly("watching wallets record no coin type privkey".into()));
        }

        let (_, priv_enc) = schema::fetch_coin_type_keys(tx)?;
        let priv_enc = priv_enc.ok_or_else(|| Error::Io("missing coin type privkey".into()))?;
        let ck = state
            .crypto_key_priv
            .as_ref()
            .ok_or_else(|| Error::Locked("manager is locked".into()))?;
        let plain = ck
            .decrypt(&priv_enc)
            .map_err(|_| Error::Crypto("decrypt cointype privkey".into()))?;
        hd::xprv_from_stored(&plain)
    }

    /// Upgrade from the legacy coin type to the SLIP-0044 coin type.
    ///
    /// Only permitted while the wallet is still on the legacy coin type,
    /// the SLIP-0044 keys were saved at creation, and no account beyond
    /// the default exists and no address has ever been returned. Rewrites
    /// account 0 from the stashed SLIP-0044 row.
    pub fn upgrade_to_slip0044_coin_type(&self, tx: &dyn WriteTx) -> Result<()> {
        let mut state = self.state.write();

        if !schema::has_legacy_coin_type(tx)? {
            return Err(Error::Invalid(
                "SLIP0044 coin type upgrade only possible on legacy coin type wallets".into(),
            ));
        }
        if schema::fetch_slip0044_coin_type_keys(tx)?.is_none() {
            return Err(Error::Invalid("missing keys for SLIP0044 coin type upgrade".into()));
        }

        let last_account = schema::fetch_last_account(tx)?;
        let last_ret_ext =
            schema::fetch_account_var_u32(tx, DEFAULT_ACCOUNT_NUM, schema::VAR_LAST_RETURNED_EXTERNAL)?;
        let last_ret_int =
            schema::fetch_account_var_u32(tx, DEFAULT_ACCOUNT_NUM, schema::VAR_LAST_RETURNED_INTERNAL)?;
        if last_account != 0
            || last_ret_ext != schema::NO_ADDRESS_INDEX
            || last_ret_int != schema::NO_ADDRESS_INDEX
        {
            return Err(Error::Invalid(
                "wallets with returned addresses may not be upgraded to SLIP0044 coin type".into(),
            ));
        }

        schema::delete_legacy_coin_type_keys(tx)?;

        let stashed = schema::fetch_slip0044_account0_row(tx)?
            .ok_or_else(|| Error::Io("missing SLIP0044 coin type account row".into()))?;
        let stashed_row = schema::deserialize_account_row(&stashed)?;
        if stashed_row.acct_type != AccountType::Bip0044Legacy {
            return Err(Error::Io("invalid SLIP0044 account 0 row type".into()));
        }
        let new_row = AccountRow {
            acct_type: AccountType::Bip0044,
            pub_key_enc: stashed_row.pub_key_enc,
            priv_key_enc: stashed_row.priv_key_enc,
        };
        schema::put_account_row(tx, DEFAULT_ACCOUNT_NUM, &new_row)?;
        schema::delete_slip0044_account0_row(tx)?;

        // Refresh the cache entry so derivations use the SLIP-0044 keys
        // immediately, not only after a reload.
        if state.accts.contains_key(&DEFAULT_ACCOUNT_NUM) {
            let pub_bytes = state
                .crypto_key_pub
                .decrypt(&new_row.pub_key_enc)
                .map_err(|_| Error::Crypto("decrypt SLIP0044 account 0 xpub".into()))?;
            let key_pub = hd::xpub_from_stored(&pub_bytes)?;

            let key_priv = if !state.locked {
                let ck = state
                    .crypto_key_priv
                    .as_ref()
                    .ok_or_else(|| Error::Locked("private crypto key unavailable".into()))?;
                let plain = ck
                    .decrypt(&new_row.priv_key_enc)
                    .map_err(|_| Error::Crypto("decrypt SLIP0044 account 0 xpriv".into()))?;
                Some(hd::xprv_from_stored(&plain)?)
            } else {
                None
            };

            if let Some(info) = state.accts.get_mut(&DEFAULT_ACCOUNT_NUM) {
                info.key_encrypted = new_row.priv_key_enc;
                info.key_pub = key_pub;
                info.key_priv = key_priv;
            }
        }

        debug!("upgraded address manager to SLIP0044 coin type");
        Ok(())
    }
}

fn unlock_keys(state: &mut ManagerState) -> Result<()> {
    let ManagerState { accts, master_key_priv, crypto_key_priv_enc, crypto_key_priv, .. } = state;

    let master = master_key_priv
        .as_ref()
        .ok_or_else(|| Error::Crypto("missing master private key".into()))?;
    let enc = crypto_key_priv_enc
        .as_ref()
        .ok_or_else(|| Error::Crypto("missing crypto privkey ciphertext".into()))?;
    let dec = master
        .decrypt(enc)
        .map_err(|_| Error::Crypto("decrypt crypto privkey".into()))?;
    *crypto_key_priv = Some(CryptoKey::from_bytes(&dec)?);

    let ck = crypto_key_priv
        .as_ref()
        .ok_or_else(|| Error::Crypto("missing crypto private key".into()))?;
    for (account, info) in accts.iter_mut() {
        if info.key_encrypted.is_empty() || info.unique_kdf.is_some() {
            continue;
        }
        let plain = ck
            .decrypt(&info.key_encrypted)
            .map_err(|_| Error::Crypto(format!("decrypt account {account} privkey")))?;
        info.key_priv = Some(hd::xprv_from_stored(&plain)?);
    }
    Ok(())
}

pub(crate) fn select_crypto_key<'a>(state: &'a ManagerState, key_type: CryptoKeyType) -> Result<&'a CryptoKey> {
    match key_type {
        CryptoKeyType::Private => {
            if state.locked || state.watching_only {
                return Err(Error::Locked("private crypto key unavailable".into()));
            }
            state
                .crypto_key_priv
                .as_ref()
                .ok_or_else(|| Error::Locked("private crypto key unavailable".into()))
        }
        CryptoKeyType::Public => Ok(&state.crypto_key_pub),
    }
}

/// Create a new seeded address manager in the namespace.
///
/// Provisions the BIP-0044 tree for both coin types, generates the
/// master and crypto keys, and persists the encrypted hierarchy along
/// with the reserved imported account and the default account. Fails
/// with `Exist` when the namespace already holds a manager. All interim
/// secrets are zeroized on every exit path by drop.
pub fn create_address_manager(
    tx: &dyn WriteTx,
    seed: &[u8],
    pub_passphrase: &[u8],
    priv_passphrase: &[u8],
    chain_params: &ChainParams,
) -> Result<()> {
    if schema::manager_exists(tx)? {
        return Err(Error::Exist("address manager already exists".into()));
    }
    if priv_passphrase.is_empty() {
        return Err(Error::Invalid("private passphrase may not be empty".into()));
    }

    let keys = hd::hd_keys_from_seed(seed, chain_params)?;
    let acct_legacy_pub = keys.acct_legacy_priv.public_key();
    let acct_slip0044_pub = keys.acct_slip0044_priv.public_key();

    let scrypt_opts = chain_params.scrypt_options();
    let master_key_pub = MasterKey::generate(pub_passphrase, scrypt_opts)?;
    let master_key_priv = MasterKey::generate(priv_passphrase, scrypt_opts)?;

    let crypto_key_pub = CryptoKey::generate();
    let crypto_key_priv = CryptoKey::generate();

    let crypto_pub_enc = master_key_pub.encrypt(crypto_key_pub.bytes())?;
    let crypto_priv_enc = master_key_priv.encrypt(crypto_key_priv.bytes())?;

    let ct_legacy_pub_enc =
        crypto_key_pub.encrypt(hd::xpub_to_string(&keys.coin_type_legacy_priv.public_key()).as_bytes())?;
    let ct_legacy_priv_enc =
        crypto_key_priv.encrypt(hd::xprv_to_string(&keys.coin_type_legacy_priv).as_bytes())?;
    let ct_slip0044_pub_enc =
        crypto_key_pub.encrypt(hd::xpub_to_string(&keys.coin_type_slip0044_priv.public_key()).as_bytes())?;
    let ct_slip0044_priv_enc =
        crypto_key_priv.encrypt(hd::xprv_to_string(&keys.coin_type_slip0044_priv).as_bytes())?;

    let acct_legacy_pub_enc = crypto_key_pub.encrypt(hd::xpub_to_string(&acct_legacy_pub).as_bytes())?;
    let acct_legacy_priv_enc =
        crypto_key_priv.encrypt(hd::xprv_to_string(&keys.acct_legacy_priv).as_bytes())?;
    let acct_slip0044_pub_enc =
        crypto_key_pub.encrypt(hd::xpub_to_string(&acct_slip0044_pub).as_bytes())?;
    let acct_slip0044_priv_enc =
        crypto_key_priv.encrypt(hd::xprv_to_string(&keys.acct_slip0044_priv).as_bytes())?;

    schema::put_master_key_params(
        tx,
        Some(&master_key_pub.params().marshal()),
        Some(&master_key_priv.params().marshal()),
    )?;
    schema::put_crypto_keys(tx, Some(&crypto_pub_enc), Some(&crypto_priv_enc))?;
    schema::put_coin_type_legacy_keys(tx, &ct_legacy_pub_enc, &ct_legacy_priv_enc)?;
    schema::put_coin_type_slip0044_keys(tx, &ct_slip0044_pub_enc, &ct_slip0044_priv_enc)?;
    schema::put_watching_only(tx, false)?;
    schema::put_last_account(tx, DEFAULT_ACCOUNT_NUM)?;
    schema::put_next_to_use_addr_pool_index(tx, false, DEFAULT_ACCOUNT_NUM, 0)?;
    schema::put_next_to_use_addr_pool_index(tx, true, DEFAULT_ACCOUNT_NUM, 0)?;

    // The imported account is stored as an ordinary BIP-0044 row with no
    // keys.
    let imported_row = AccountRow {
        acct_type: AccountType::Bip0044,
        pub_key_enc: Vec::new(),
        priv_key_enc: Vec::new(),
    };
    schema::put_new_account(tx, IMPORTED_ADDR_ACCOUNT, &imported_row, IMPORTED_ADDR_ACCOUNT_NAME)?;

    // The default account derives from the legacy coin type until the
    // SLIP-0044 upgrade runs.
    let default_row = AccountRow {
        acct_type: AccountType::Bip0044,
        pub_key_enc: acct_legacy_pub_enc,
        priv_key_enc: acct_legacy_priv_enc,
    };
    schema::put_new_account(tx, DEFAULT_ACCOUNT_NUM, &default_row, DEFAULT_ACCOUNT_NAME)?;

    // Stash the SLIP-0044 account 0 row, in the legacy serialization, so
    // the upgrade can rewrite the default account without the seed.
    let slip0044_row = AccountRow {
        acct_type: AccountType::Bip0044Legacy,
        pub_key_enc: acct_slip0044_pub_enc,
        priv_key_enc: acct_slip0044_priv_enc,
    };
    schema::put_slip0044_account0_row(
        tx,
        &schema::serialize_legacy_account_row(&slip0044_row, [schema::NO_ADDRESS_INDEX; 4]),
    )?;

    debug!(network = chain_params.name, "created address manager");
    Ok(())
}

/// Create a watching-only address manager from an account extended
/// public key.
///
/// Both master keys are derived from the public passphrase; no private
/// key material of any kind is recorded. Fails with `Seed` when the
/// branches cannot be derived from the supplied xpub.
pub fn create_watch_only(
    tx: &dyn WriteTx,
    account_xpub: &str,
    pub_passphrase: &[u8],
    chain_params: &ChainParams,
) -> Result<()> {
    if schema::manager_exists(tx)? {
        return Err(Error::Exist("address manager already exists".into()));
    }

    let acct_key_pub = account_xpub
        .parse::<XPub>()
        .map_err(|e| Error::Invalid(format!("extended public key: {e}")))?;
    hd::check_branch_keys_pub(&acct_key_pub)?;

    let scrypt_opts = chain_params.scrypt_options();
    let master_key_pub = MasterKey::generate(pub_passphrase, scrypt_opts)?;
    let master_key_priv = MasterKey::generate(pub_passphrase, scrypt_opts)?;

    let crypto_key_pub = CryptoKey::generate();
    let crypto_key_priv = CryptoKey::generate();

    let crypto_pub_enc = master_key_pub.encrypt(crypto_key_pub.bytes())?;
    let crypto_priv_enc = master_key_priv.encrypt(crypto_key_priv.bytes())?;

    let acct_pub_enc = crypto_key_pub.encrypt(hd::xpub_to_string(&acct_key_pub).as_bytes())?;

    schema::put_master_key_params(
        tx,
        Some(&master_key_pub.params().marshal()),
        Some(&master_key_priv.params().marshal()),
    )?;
    schema::put_crypto_keys(tx, Some(&crypto_pub_enc), Some(&crypto_priv_enc))?;
    schema::put_watching_only(tx, true)?;
    schema::put_last_account(tx, DEFAULT_ACCOUNT_NUM)?;
    schema::put_next_to_use_addr_pool_index(tx, false, DEFAULT_ACCOUNT_NUM, 0)?;
    schema::put_next_to_use_addr_pool_index(tx, true, DEFAULT_ACCOUNT_NUM, 0)?;

    let imported_row = AccountRow {
        acct_type: AccountType::Bip0044,
        pub_key_enc: Vec::new(),
        priv_key_enc: Vec::new(),
    };
    schema::put_new_account(tx, IMPORTED_ADDR_ACCOUNT, &imported_row, IMPORTED_ADDR_ACCOUNT_NAME)?;

    let default_row = AccountRow {
        acct_type: AccountType::Bip0044,
        pub_key_enc: acct_pub_enc,
        priv_key_enc: Vec::new(),
    };
    schema::put_new_account(tx, DEFAULT_ACCOUNT_NUM, &default_row, DEFAULT_ACCOUNT_NAME)?;

    debug!(network = chain_params.name, "created watching-only address manager");
    Ok(())
}
