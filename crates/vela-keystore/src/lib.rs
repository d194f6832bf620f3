//! Hierarchical deterministic address manager and key store
//!
//! This crate owns the persistent storage, encryption, and deterministic
//! derivation of all key material behind a wallet: receiving addresses
//! for any number of BIP-0044 accounts, private keys for signing, and
//! imported keys, scripts, and extended public keys.
//!
//! ## Key hierarchy
//!
//! Two scrypt-derived master keys (one per passphrase) each encrypt a
//! random 32-byte crypto key; the crypto keys encrypt everything else.
//! Unlocking derives the private master key, decrypts the private crypto
//! key, and attaches each cached account's private extended key. Locking
//! zeroizes all of it. Accounts can additionally carry their own
//! passphrase, sealing the account key under an Argon2id-derived key
//! instead of the global crypto private key.
//!
//! ## Storage
//!
//! All persistence goes through the bucketed transaction traits of
//! `vela-walletdb`; the caller supplies the transaction and owns the
//! commit. Nothing in this crate opens or commits transactions.
//!
//! ## Example
//!
//! ```no_run
//! use vela_keystore::{create_address_manager, Manager};
//! use vela_params::ChainParams;
//! use vela_storage_sqlite::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = ChainParams::mainnet();
//! let store = Store::open("wallet.db")?;
//! store.update(|tx| {
//!     create_address_manager(tx, &[0x2a; 32], b"public", b"private", &params)
//! })?;
//! let mgr = store.view(|tx| Manager::load(tx, b"public", params))?;
//! mgr.unlock(b"private")?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod address;
pub mod crypto;
pub mod error;
pub mod hd;
pub mod masterkey;

mod accounts;
mod addresses;
mod hasher;
mod manager;
mod schema;

pub use accounts::{validate_account_name, AccountProperties};
pub use address::{
    hash160, Address, AddressPrivateKey, ManagedAddress, ManagedPubKeyAddress,
    ManagedScriptAddress, Wif,
};
pub use crypto::{Argon2idParams, CryptoKey};
pub use error::{Error, Result};
pub use hd::{
    hd_keys_from_seed, SeedKeys, DEFAULT_ACCOUNT_NUM, EXTERNAL_BRANCH, IMPORTED_ADDR_ACCOUNT,
    IMPORTED_ADDR_ACCOUNT_NAME, INTERNAL_BRANCH, MAX_ACCOUNT_NUM, MAX_ADDRESSES_PER_ACCOUNT,
};
pub use manager::{create_address_manager, create_watch_only, CryptoKeyType, Manager};
pub use masterkey::{MasterKey, MasterKeyParams};
pub use schema::{AccountType, NO_ADDRESS_INDEX};
