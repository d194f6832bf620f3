//! BIP-0044 deterministic derivation
//!
//! Paths follow `m / 44' / coin_type' / account' / branch / index`, with
//! hardened derivation from the root through the account level. Two coin
//! type trees exist for every seed: the legacy coin type used by early
//! wallets and the SLIP-0044 registered coin type; which one is active is
//! decided by the persisted state, not by this module.

use bip32::{ChildNumber, Prefix, XPrv, XPub};
use zeroize::Zeroizing;

use vela_params::ChainParams;

use crate::error::{Error, Result};

/// Start of the hardened child index range
pub const HARDENED_KEY_START: u32 = 1 << 31;

/// Maximum allowed account number. Accounts are hardened children, and
/// the top of the hardened range is reserved for imported addresses.
pub const MAX_ACCOUNT_NUM: u32 = HARDENED_KEY_START - 2;

/// Maximum allowed number of addresses per account branch
pub const MAX_ADDRESSES_PER_ACCOUNT: u32 = HARDENED_KEY_START - 1;

/// Account number reserved for imported keys and scripts. Never a
/// derivation target; it has no extended keys.
pub const IMPORTED_ADDR_ACCOUNT: u32 = MAX_ACCOUNT_NUM + 1;

/// Name of the reserved imported account
pub const IMPORTED_ADDR_ACCOUNT_NAME: &str = "imported";

/// Number of the default account
pub const DEFAULT_ACCOUNT_NUM: u32 = 0;

/// Initial name of the default account. The default account may be
/// renamed, so always refer to it by number.
pub(crate) const DEFAULT_ACCOUNT_NAME: &str = "default";

/// Maximum allowed coin type
pub const MAX_COIN_TYPE: u32 = HARDENED_KEY_START - 1;

/// Branch used for externally shared receive addresses
pub const EXTERNAL_BRANCH: u32 = 0;

/// Branch used for internal change addresses
pub const INTERNAL_BRANCH: u32 = 1;

/// BIP-0043 purpose field
const PURPOSE: u32 = 44;

/// The coin type keys and account-0 keys provisioned from a seed.
///
/// All four keys are private; dropping the struct zeroizes them.
pub struct SeedKeys {
    /// `m/44'/<legacy coin type>'`
    pub coin_type_legacy_priv: XPrv,
    /// `m/44'/<SLIP-0044 coin type>'`
    pub coin_type_slip0044_priv: XPrv,
    /// `m/44'/<legacy coin type>'/0'`
    pub acct_legacy_priv: XPrv,
    /// `m/44'/<SLIP-0044 coin type>'/0'`
    pub acct_slip0044_priv: XPrv,
}

fn hardened(index: u32) -> Result<ChildNumber> {
    ChildNumber::new(index, true).map_err(|e| Error::Invalid(format!("child index {index}: {e}")))
}

fn normal(index: u32) -> Result<ChildNumber> {
    ChildNumber::new(index, false).map_err(|e| Error::Invalid(format!("child index {index}: {e}")))
}

/// Derive the coin type key `m/44'/<coin_type>'` from the master node.
pub fn derive_coin_type_key(master: &XPrv, coin_type: u32) -> Result<XPrv> {
    if coin_type > MAX_COIN_TYPE {
        return Err(Error::Invalid(format!("coin type {coin_type}")));
    }
    let purpose = master
        .derive_child(hardened(PURPOSE)?)
        .map_err(|e| Error::Seed(format!("derive purpose key: {e}")))?;
    purpose
        .derive_child(hardened(coin_type)?)
        .map_err(|e| Error::Seed(format!("derive coin type key: {e}")))
}

/// Derive the account key `m/44'/<coin_type>'/<account>'` from a coin
/// type key.
pub fn derive_account_key(coin_type_key: &XPrv, account: u32) -> Result<XPrv> {
    if account > MAX_ACCOUNT_NUM {
        return Err(Error::Invalid(format!("account {account}")));
    }
    coin_type_key
        .derive_child(hardened(account)?)
        .map_err(|e| Error::Seed(format!("derive account key: {e}")))
}

/// Ensure both branches can be derived from a private account key.
///
/// An invalid child at either branch means the seed behind the key is
/// unusable for the required hierarchy.
pub(crate) fn check_branch_keys_priv(acct_key: &XPrv) -> Result<()> {
    for branch in [EXTERNAL_BRANCH, INTERNAL_BRANCH] {
        acct_key
            .derive_child(normal(branch)?)
            .map_err(|e| Error::Seed(format!("derive branch {branch}: {e}")))?;
    }
    Ok(())
}

/// Ensure both branches can be derived from a public account key.
pub(crate) fn check_branch_keys_pub(acct_key: &XPub) -> Result<()> {
    for branch in [EXTERNAL_BRANCH, INTERNAL_BRANCH] {
        acct_key
            .derive_child(normal(branch)?)
            .map_err(|e| Error::Seed(format!("derive branch {branch}: {e}")))?;
    }
    Ok(())
}

/// Build the full provisioning hierarchy from a seed: both coin type
/// keys and both account-0 keys, with branch derivability verified.
///
/// Any invalid-child outcome along a required path surfaces as `Seed`.
/// Keys created before a failure are zeroized on drop.
pub fn hd_keys_from_seed(seed: &[u8], params: &ChainParams) -> Result<SeedKeys> {
    let master = XPrv::new(seed).map_err(|e| Error::Seed(format!("master key from seed: {e}")))?;

    let coin_type_legacy_priv = derive_coin_type_key(&master, params.legacy_coin_type)?;
    let coin_type_slip0044_priv = derive_coin_type_key(&master, params.slip0044_coin_type)?;
    let acct_legacy_priv = derive_account_key(&coin_type_legacy_priv, 0)?;
    let acct_slip0044_priv = derive_account_key(&coin_type_slip0044_priv, 0)?;
    check_branch_keys_priv(&acct_legacy_priv)?;
    check_branch_keys_priv(&acct_slip0044_priv)?;

    Ok(SeedKeys {
        coin_type_legacy_priv,
        coin_type_slip0044_priv,
        acct_legacy_priv,
        acct_slip0044_priv,
    })
}

/// Derive a non-hardened child of an extended private key.
pub(crate) fn derive_priv_child(xprv: &XPrv, index: u32) -> Result<XPrv> {
    xprv.derive_child(normal(index)?)
        .map_err(|e| Error::Crypto(format!("derive child {index}: {e}")))
}

/// Derive a non-hardened child of an extended public key.
pub(crate) fn derive_pub_child(xpub: &XPub, index: u32) -> Result<XPub> {
    xpub.derive_child(normal(index)?)
        .map_err(|e| Error::Crypto(format!("derive child {index}: {e}")))
}

/// Serialized compressed public key of an extended public key.
pub(crate) fn xpub_pubkey_bytes(xpub: &XPub) -> Vec<u8> {
    xpub.public_key().to_sec1_bytes().into_vec()
}

/// Serialize an extended private key to its Base58 string form.
pub(crate) fn xprv_to_string(key: &XPrv) -> Zeroizing<String> {
    key.to_string(Prefix::XPRV)
}

/// Serialize an extended public key to its Base58 string form.
pub(crate) fn xpub_to_string(key: &XPub) -> String {
    key.to_string(Prefix::XPUB)
}

/// Parse an extended private key that was decrypted from the store.
pub(crate) fn xprv_from_stored(data: &[u8]) -> Result<XPrv> {
    let s = std::str::from_utf8(data).map_err(|e| Error::Io(format!("stored xprv: {e}")))?;
    s.parse::<XPrv>().map_err(|e| Error::Io(format!("stored xprv: {e}")))
}

/// Parse an extended public key that was decrypted from the store.
pub(crate) fn xpub_from_stored(data: &[u8]) -> Result<XPub> {
    let s = std::str::from_utf8(data).map_err(|e| Error::Io(format!("stored xpub: {e}")))?;
    s.parse::<XPub>().map_err(|e| Error::Io(format!("stored xpub: {e}")))
}
