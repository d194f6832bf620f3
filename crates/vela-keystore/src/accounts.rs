//! Account operations
//!
//! Accounts come in three flavors: BIP-0044 accounts derived from the
//! active coin type key, imported xpub accounts (public side only), and
//! imported voting accounts. Any account holding a private extended key
//! can additionally be sealed under its own passphrase, layered on top
//! of the wallet passphrase.

use bip32::{XPrv, XPub};

use vela_walletdb::{ReadTx, WriteTx};

use crate::crypto::{self, Argon2idParams};
use crate::error::{Error, Result};
use crate::hasher::PassphraseHasher;
use crate::hd::{
    self, EXTERNAL_BRANCH, IMPORTED_ADDR_ACCOUNT, IMPORTED_ADDR_ACCOUNT_NAME, INTERNAL_BRANCH,
    MAX_ACCOUNT_NUM,
};
use crate::manager::{Manager, ManagerState};
use crate::schema::{self, AccountRow, AccountType, NO_ADDRESS_INDEX};

/// Properties associated with an account.
#[derive(Debug, Clone)]
pub struct AccountProperties {
    /// Account number
    pub account_number: u32,
    /// Current account name
    pub account_name: String,
    /// Persisted account kind
    pub account_type: AccountType,
    /// Last used external child index, or the all-ones sentinel
    pub last_used_external_index: u32,
    /// Last used internal child index, or the all-ones sentinel
    pub last_used_internal_index: u32,
    /// Last returned external child index, or the all-ones sentinel
    pub last_returned_external_index: u32,
    /// Last returned internal child index, or the all-ones sentinel
    pub last_returned_internal_index: u32,
    /// Number of imported keys and scripts (reserved account only)
    pub imported_key_count: u32,
    /// Whether the account is sealed under a unique passphrase
    pub account_encrypted: bool,
    /// Whether a unique-passphrase account is currently unlocked
    pub account_unlocked: bool,
}

/// Validate an account name: non-empty and not reserved.
pub fn validate_account_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Invalid("accounts may not be named the empty string".into()));
    }
    if name == IMPORTED_ADDR_ACCOUNT_NAME {
        return Err(Error::Invalid(format!("account name {name:?} is reserved")));
    }
    Ok(())
}

impl Manager {
    /// Create a new BIP-0044 account and return its number.
    ///
    /// Requires the manager unlocked, since the account keys derive from
    /// the coin type private key.
    pub fn new_account(&self, tx: &dyn WriteTx, name: &str) -> Result<u32> {
        let state = self.state.write();

        if state.watching_only {
            return Err(Error::WatchingOnly("watching wallets can not derive new accounts".into()));
        }
        if state.locked {
            return Err(Error::Locked("manager is locked".into()));
        }
        validate_account_name(name)?;
        if schema::fetch_account_by_name(tx, name).is_ok() {
            return Err(Error::Exist(format!("account named {name:?} already exists")));
        }

        let account = schema::fetch_last_account(tx)?
            .checked_add(1)
            .filter(|a| *a <= MAX_ACCOUNT_NUM)
            .ok_or_else(|| Error::Invalid("account space exhausted".into()))?;

        let (_, ct_priv_enc) = schema::fetch_coin_type_keys(tx)?;
        let ct_priv_enc = ct_priv_enc.ok_or_else(|| Error::Io("missing coin type privkey".into()))?;
        let ck_priv = state
            .crypto_key_priv
            .as_ref()
            .ok_or_else(|| Error::Locked("manager is locked".into()))?;
        let ct_plain = ck_priv
            .decrypt(&ct_priv_enc)
            .map_err(|_| Error::Crypto("decrypt cointype privkey".into()))?;
        let coin_type_key = hd::xprv_from_stored(&ct_plain)?;

        let acct_key_priv = hd::derive_account_key(&coin_type_key, account)?;
        drop(coin_type_key);
        let acct_key_pub = acct_key_priv.public_key();

        let pub_enc = state
            .crypto_key_pub
            .encrypt(hd::xpub_to_string(&acct_key_pub).as_bytes())?;
        let priv_enc = ck_priv.encrypt(hd::xprv_to_string(&acct_key_priv).as_bytes())?;

        schema::put_last_account(tx, account)?;
        let row = AccountRow {
            acct_type: AccountType::Bip0044,
            pub_key_enc: pub_enc,
            priv_key_enc: priv_enc,
        };
        schema::put_new_account(tx, account, &row, name)?;

        Ok(account)
    }

    /// Import an account-level extended public key as a new account in
    /// the imported range. The account can resolve and derive addresses
    /// but never sign.
    pub fn import_xpub_account(&self, tx: &dyn WriteTx, name: &str, xpub: &XPub) -> Result<u32> {
        let state = self.state.write();

        validate_account_name(name)?;
        if schema::fetch_account_by_name(tx, name).is_ok() {
            return Err(Error::Exist(format!("account named {name:?} already exists")));
        }

        let account = next_imported_account(tx)?;

        let pub_enc = state
            .crypto_key_pub
            .encrypt(hd::xpub_to_string(xpub).as_bytes())?;
        let row = AccountRow {
            acct_type: AccountType::Bip0044,
            pub_key_enc: pub_enc,
            priv_key_enc: Vec::new(),
        };
        schema::put_new_account(tx, account, &row, name)?;
        schema::put_last_imported_account(tx, account)?;

        Ok(account)
    }

    /// Import an account-level extended private key for voting use,
    /// sealed under its own passphrase from the start.
    pub fn import_voting_account(
        &self,
        tx: &dyn WriteTx,
        xpriv: &XPrv,
        passphrase: &[u8],
        name: &str,
    ) -> Result<u32> {
        let state = self.state.write();

        if passphrase.is_empty() {
            return Err(Error::Passphrase);
        }

        let account = import_account(&state, tx, AccountType::ImportedVoting, xpriv, name)?;

        // Seal the xpriv under an account-unique key; the global crypto
        // keys never protect this account's private material.
        let kdf_params = Argon2idParams::generate();
        let key = kdf_params.derive_key(passphrase)?;
        let plaintext = hd::xprv_to_string(xpriv);
        let ciphertext = crypto::seal(&key, plaintext.as_bytes())?;

        schema::put_account_kdf(tx, account, &kdf_params)?;
        let mut row = schema::fetch_account_row(tx, account)?;
        row.priv_key_enc = ciphertext;
        schema::put_account_row(tx, account, &row)?;

        Ok(account)
    }

    /// Seal or reseal an account's private extended key under its own
    /// passphrase, or remove the unique passphrase when `passphrase` is
    /// empty (resealing under the global crypto private key).
    pub fn set_account_passphrase(&self, tx: &dyn WriteTx, account: u32, passphrase: &[u8]) -> Result<()> {
        let mut state = self.state.write();

        if state.watching_only {
            if account < IMPORTED_ADDR_ACCOUNT {
                return Err(Error::WatchingOnly(
                    "cannot set passphrase for watching wallet".into(),
                ));
            }
            if passphrase.is_empty() {
                return Err(Error::Passphrase);
            }
        }

        let (has_priv, has_unique) = {
            let info = state.account_info(tx, account)?;
            (info.key_priv.is_some(), info.unique_kdf.is_some())
        };
        if !has_priv {
            let what = if has_unique { "account" } else { "wallet" };
            return Err(Error::Locked(format!(
                "{what} must be unlocked to set a unique account passphrase"
            )));
        }

        if passphrase.is_empty() {
            return remove_account_passphrase(&mut state, tx, account);
        }

        let hasher = PassphraseHasher::new();
        let pass_hash = hasher.hash(passphrase);
        let kdf_params = Argon2idParams::generate();
        let key = kdf_params.derive_key(passphrase)?;

        let ciphertext = {
            let info = state.account_info(tx, account)?;
            let xpriv = info
                .key_priv
                .as_ref()
                .ok_or_else(|| Error::Locked("account private key unavailable".into()))?;
            crypto::seal(&key, hd::xprv_to_string(xpriv).as_bytes())?
        };

        schema::put_account_kdf(tx, account, &kdf_params)?;
        let mut row = schema::fetch_account_row(tx, account)?;
        row.priv_key_enc = ciphertext.clone();
        schema::put_account_row(tx, account, &row)?;

        let info = state.account_info(tx, account)?;
        info.key_encrypted = ciphertext;
        info.unique_kdf = Some(kdf_params);
        info.unique_hasher = Some(hasher);
        info.unique_pass_hash = Some(pass_hash);

        Ok(())
    }

    /// Unseal a unique-passphrase account's private extended key.
    ///
    /// When the account is already unlocked, the passphrase is checked
    /// by constant-time hash comparison without KDF work. An AEAD
    /// authentication failure reports as `Passphrase`.
    pub fn unlock_account(&self, tx: &dyn ReadTx, account: u32, passphrase: &[u8]) -> Result<()> {
        let mut state = self.state.write();

        if state.watching_only && account < IMPORTED_ADDR_ACCOUNT {
            return Err(Error::WatchingOnly("cannot unlock watching wallet".into()));
        }

        let info = state.account_info(tx, account)?;
        let kdf_params = info
            .unique_kdf
            .clone()
            .ok_or_else(|| Error::Crypto("account is not encrypted with a unique passphrase".into()))?;
        let hasher = info
            .unique_hasher
            .as_ref()
            .ok_or_else(|| Error::Crypto("missing account passphrase hasher".into()))?;
        let pass_hash = hasher.hash(passphrase);

        if info.key_priv.is_some() {
            let matches = info
                .unique_pass_hash
                .as_ref()
                .map(|h| crate::hasher::hashes_equal(h, &pass_hash))
                .unwrap_or(false);
            if !matches {
                return Err(Error::Passphrase);
            }
            return Ok(());
        }

        let key = kdf_params.derive_key(passphrase)?;
        let plaintext = crypto::unseal(&key, &info.key_encrypted)?;
        info.key_priv = Some(hd::xprv_from_stored(&plaintext)?);
        info.unique_pass_hash = Some(pass_hash);

        Ok(())
    }

    /// Drop a unique-passphrase account's private extended key from the
    /// cache.
    pub fn lock_account(&self, tx: &dyn ReadTx, account: u32) -> Result<()> {
        let mut state = self.state.write();

        if state.watching_only && account < IMPORTED_ADDR_ACCOUNT {
            return Err(Error::WatchingOnly("cannot lock watching wallet".into()));
        }

        let info = state.account_info(tx, account)?;
        if info.unique_kdf.is_none() {
            return Err(Error::Crypto("account is not encrypted with a unique passphrase".into()));
        }
        if info.key_priv.is_none() {
            return Err(Error::Locked("account is already locked".into()));
        }
        info.key_priv = None;
        info.unique_pass_hash = None;

        Ok(())
    }

    /// Whether the account carries a unique passphrase and, if so,
    /// whether it is currently unlocked.
    pub fn account_has_passphrase(&self, tx: &dyn ReadTx, account: u32) -> (bool, bool) {
        self.state.write().account_has_passphrase(tx, account)
    }

    /// Properties of the account: name, usage watermarks, and encryption
    /// status. The reserved imported account reports its key count
    /// instead of derivation state.
    pub fn account_properties(&self, tx: &dyn ReadTx, account: u32) -> Result<AccountProperties> {
        let mut state = self.state.write();

        let (account_name, account_type, imported_key_count) = if account == IMPORTED_ADDR_ACCOUNT {
            let count = schema::account_address_rows(tx, account)?.len() as u32;
            (IMPORTED_ADDR_ACCOUNT_NAME.to_string(), AccountType::Bip0044, count)
        } else {
            let info = state.account_info(tx, account)?;
            (info.name.clone(), info.acct_type, 0)
        };

        let last_used_external_index =
            schema::fetch_account_var_u32(tx, account, schema::VAR_LAST_USED_EXTERNAL)?;
        let last_used_internal_index =
            schema::fetch_account_var_u32(tx, account, schema::VAR_LAST_USED_INTERNAL)?;
        let last_returned_external_index =
            schema::fetch_account_var_u32(tx, account, schema::VAR_LAST_RETURNED_EXTERNAL)?;
        let last_returned_internal_index =
            schema::fetch_account_var_u32(tx, account, schema::VAR_LAST_RETURNED_INTERNAL)?;

        let (account_encrypted, account_unlocked) = if account == IMPORTED_ADDR_ACCOUNT {
            (false, false)
        } else {
            state.account_has_passphrase(tx, account)
        };

        Ok(AccountProperties {
            account_number: account,
            account_name,
            account_type,
            last_used_external_index,
            last_used_internal_index,
            last_returned_external_index,
            last_returned_internal_index,
            imported_key_count,
            account_encrypted,
            account_unlocked,
        })
    }

    /// Record that a child of an account branch has been observed in
    /// use. The last-used watermark only ever advances, and the
    /// last-returned watermark is raised to match when it lags.
    pub fn mark_used_child_index(&self, tx: &dyn WriteTx, account: u32, branch: u32, child: u32) -> Result<()> {
        let (used_var, returned_var) = match branch {
            EXTERNAL_BRANCH => (schema::VAR_LAST_USED_EXTERNAL, schema::VAR_LAST_RETURNED_EXTERNAL),
            INTERNAL_BRANCH => (schema::VAR_LAST_USED_INTERNAL, schema::VAR_LAST_RETURNED_INTERNAL),
            _ => return Err(Error::Invalid(format!("account branch {branch}"))),
        };

        let last_used = schema::fetch_account_var_u32(tx, account, used_var)?;
        let last_returned = schema::fetch_account_var_u32(tx, account, returned_var)?;

        // The sentinel is all ones, so comparisons are made after a
        // wrapping increment: the sentinel maps to zero and every real
        // index compares above it.
        if child.wrapping_add(1) <= last_used.wrapping_add(1) {
            return Ok(());
        }
        schema::put_account_var_u32(tx, account, used_var, child)?;
        if last_returned.wrapping_add(1) < child.wrapping_add(1) {
            schema::put_account_var_u32(tx, account, returned_var, child)?;
        }
        Ok(())
    }

    /// Record that addresses through `child` have been handed out on an
    /// account branch. Never lowers the watermark below the last used
    /// index.
    pub fn mark_returned_child_index(&self, tx: &dyn WriteTx, account: u32, branch: u32, child: u32) -> Result<()> {
        let returned_var = match branch {
            EXTERNAL_BRANCH => schema::VAR_LAST_RETURNED_EXTERNAL,
            INTERNAL_BRANCH => schema::VAR_LAST_RETURNED_INTERNAL,
            _ => return Err(Error::Invalid(format!("account branch {branch}"))),
        };

        let last_returned = schema::fetch_account_var_u32(tx, account, returned_var)?;
        if child > last_returned || last_returned == NO_ADDRESS_INDEX {
            schema::put_account_var_u32(tx, account, returned_var, child)?;
        }
        Ok(())
    }

    /// Rename an account. Reserved accounts may not be renamed and the
    /// new name must be unused.
    pub fn rename_account(&self, tx: &dyn WriteTx, account: u32, name: &str) -> Result<()> {
        let mut state = self.state.write();

        if account == IMPORTED_ADDR_ACCOUNT {
            return Err(Error::Invalid("reserved account".into()));
        }
        validate_account_name(name)?;
        if schema::fetch_account_by_name(tx, name).is_ok() {
            return Err(Error::Exist(format!("account named {name:?} already exists")));
        }

        // Ensure the account exists before touching the indexes.
        schema::fetch_account_row(tx, account)?;
        let old_name = schema::fetch_account_name(tx, account)?;

        schema::put_account_name(tx, account, name)?;
        schema::delete_account_name_index(tx, &old_name)?;
        schema::put_account_name_index(tx, account, name)?;

        if let Some(info) = state.accts.get_mut(&account) {
            info.name = name.to_string();
        }
        Ok(())
    }

    /// The name of the given account.
    pub fn account_name(&self, tx: &dyn ReadTx, account: u32) -> Result<String> {
        if account == IMPORTED_ADDR_ACCOUNT {
            return Ok(IMPORTED_ADDR_ACCOUNT_NAME.to_string());
        }
        schema::fetch_account_name(tx, account)
    }

    /// Look up an account number by name.
    pub fn lookup_account(&self, tx: &dyn ReadTx, name: &str) -> Result<u32> {
        schema::fetch_account_by_name(tx, name)
    }

    /// The highest derived account number.
    pub fn last_account(&self, tx: &dyn ReadTx) -> Result<u32> {
        schema::fetch_last_account(tx)
    }

    /// The account number of the last imported account; the reserved
    /// imported account when no account has been imported.
    pub fn last_imported_account(&self, tx: &dyn ReadTx) -> Result<u32> {
        schema::fetch_last_imported_account(tx)
    }

    /// Call `f` with each account number, breaking early on error.
    pub fn for_each_account(&self, tx: &dyn ReadTx, mut f: impl FnMut(u32) -> Result<()>) -> Result<()> {
        schema::for_each_account(tx, &mut f)
    }

    /// The extended public key of an account.
    pub fn account_extended_pubkey(&self, tx: &dyn ReadTx, account: u32) -> Result<XPub> {
        if account == IMPORTED_ADDR_ACCOUNT {
            return Err(Error::Invalid("imported account has no extended pubkey".into()));
        }
        let mut state = self.state.write();
        let info = state.account_info(tx, account)?;
        Ok(info.key_pub.clone())
    }

    /// The extended private key of an account. Requires the private key
    /// to be currently accessible; the caller owns the returned key and
    /// must drop it as soon as possible.
    pub fn account_extended_privkey(&self, tx: &dyn ReadTx, account: u32) -> Result<XPrv> {
        if account == IMPORTED_ADDR_ACCOUNT {
            return Err(Error::Invalid("imported account has no extended privkey".into()));
        }
        let mut state = self.state.write();
        let info = state.account_info(tx, account)?;
        match &info.key_priv {
            Some(key) => Ok(key.clone()),
            None if info.key_encrypted.is_empty() => {
                Err(Error::Invalid("account has no extended privkey".into()))
            }
            None => Err(Error::Locked("unable to access account extended privkey".into())),
        }
    }

    /// The extended public key of an account branch, from which address
    /// keys derive.
    pub fn account_branch_extended_pubkey(&self, tx: &dyn ReadTx, account: u32, branch: u32) -> Result<XPub> {
        let xpub = self.account_extended_pubkey(tx, account)?;
        hd::derive_pub_child(&xpub, branch)
    }
}

fn remove_account_passphrase(state: &mut ManagerState, tx: &dyn WriteTx, account: u32) -> Result<()> {
    if state.watching_only {
        return Err(Error::WatchingOnly("cannot remove passphrase for watching wallet".into()));
    }
    if state.locked {
        return Err(Error::Locked(
            "wallet must be unlocked to remove account's unique passphrase".into(),
        ));
    }

    let ManagerState { accts, crypto_key_priv, .. } = state;
    let info = accts
        .get_mut(&account)
        .ok_or_else(|| Error::NotExist(format!("no account {account}")))?;
    let xpriv = info
        .key_priv
        .as_ref()
        .ok_or_else(|| Error::Locked("account private key unavailable".into()))?;
    let ck = crypto_key_priv
        .as_ref()
        .ok_or_else(|| Error::Locked("private crypto key unavailable".into()))?;
    let ciphertext = ck.encrypt(hd::xprv_to_string(xpriv).as_bytes())?;

    schema::delete_account_kdf(tx, account)?;
    let mut row = schema::fetch_account_row(tx, account)?;
    row.priv_key_enc = ciphertext.clone();
    schema::put_account_row(tx, account, &row)?;

    info.key_encrypted = ciphertext;
    info.unique_kdf = None;
    info.unique_hasher = None;
    info.unique_pass_hash = None;
    Ok(())
}

fn next_imported_account(tx: &dyn ReadTx) -> Result<u32> {
    // Imported accounts live in (IMPORTED_ADDR_ACCOUNT, u32::MAX);
    // refuse to wrap past the top of the range.
    schema::fetch_last_imported_account(tx)?
        .checked_add(1)
        .filter(|a| *a != u32::MAX)
        .ok_or_else(|| Error::Invalid("exhausted possible imported accounts".into()))
}

fn import_account(
    state: &ManagerState,
    tx: &dyn WriteTx,
    acct_type: AccountType,
    xpriv: &XPrv,
    name: &str,
) -> Result<u32> {
    validate_account_name(name)?;
    if schema::fetch_account_by_name(tx, name).is_ok() {
        return Err(Error::Exist(format!("account named {name:?} already exists")));
    }

    // Detect a previously imported copy of this key by probing for the
    // first external address. Only this child is checked; a hit rejects
    // the import without deriving further.
    let xpub = xpriv.public_key();
    let branch_pub = hd::derive_pub_child(&xpub, EXTERNAL_BRANCH)
        .map_err(|_| Error::Invalid("unable to derive external branch".into()))?;
    let child_pub = hd::derive_pub_child(&branch_pub, 0)
        .map_err(|_| Error::Invalid("unable to derive external child".into()))?;
    let address_id = crate::address::hash160(&hd::xpub_pubkey_bytes(&child_pub));
    if schema::exists_address(tx, &address_id)? {
        return Err(Error::Exist(
            "address belonging to this key already exists in the database".into(),
        ));
    }

    let account = next_imported_account(tx)?;

    let pub_enc = state
        .crypto_key_pub
        .encrypt(hd::xpub_to_string(&xpub).as_bytes())?;
    let row = AccountRow {
        acct_type,
        pub_key_enc: pub_enc,
        priv_key_enc: Vec::new(),
    };
    schema::put_last_imported_account(tx, account)?;
    schema::put_new_account(tx, account, &row, name)?;

    Ok(account)
}
