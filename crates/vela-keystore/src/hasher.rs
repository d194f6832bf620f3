//! Constant-time passphrase re-authentication
//!
//! Re-deriving a master key just to check a passphrase costs hundreds of
//! milliseconds of memory-hard KDF work. Once a wallet or account is
//! unlocked, callers can instead be authenticated by comparing a keyed
//! BLAKE2b-256 hash of the candidate passphrase against the hash recorded
//! at unlock time. The MAC key is random per hasher instance, so the
//! recorded hash is useless outside the process that produced it.

use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type Blake2bMac256 = Blake2bMac<U32>;

/// A passphrase hash produced by a specific [`PassphraseHasher`].
pub(crate) type PassphraseHash = Zeroizing<[u8; 32]>;

/// Randomly-keyed passphrase hasher.
///
/// A fresh MAC instance is constructed per hash from the stored key, so
/// hashing is safe from any thread holding a shared reference.
pub(crate) struct PassphraseHasher {
    key: Zeroizing<[u8; 32]>,
}

impl PassphraseHasher {
    /// Create a hasher with a fresh random key.
    pub fn new() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *key);
        Self { key }
    }

    /// Hash a candidate passphrase.
    pub fn hash(&self, passphrase: &[u8]) -> PassphraseHash {
        let mut mac =
            Blake2bMac256::new_from_slice(&self.key[..]).expect("32-byte MAC key is always valid");
        mac.update(passphrase);
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }
}

/// Constant-time equality for passphrase hashes.
pub(crate) fn hashes_equal(a: &PassphraseHash, b: &PassphraseHash) -> bool {
    a[..].ct_eq(&b[..]).unwrap_u8() == 1
}
