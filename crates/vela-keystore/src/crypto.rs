//! Sealing primitives
//!
//! Two encryption paths protect key material at rest. The global path
//! uses random 32-byte crypto keys which are themselves stored encrypted
//! under passphrase-derived master keys. The per-account path seals an
//! account's extended private key under an Argon2id-derived key so the
//! account can carry a passphrase independent of the wallet's.
//!
//! Both paths use XChaCha20-Poly1305 with the random 24-byte nonce
//! prepended to the ciphertext:
//!
//! ```text
//! nonce (24 bytes) || ciphertext + auth_tag (plaintext_len + 16)
//! ```

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};

/// XChaCha20 nonce length in bytes
pub(crate) const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length in bytes
pub(crate) const TAG_LEN: usize = 16;

/// Minimum ciphertext length (nonce + auth tag)
pub(crate) const SEAL_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

const ARGON2_MEM_KIB: u32 = 65536; // 64 MiB
const ARGON2_TIME: u32 = 3;
const ARGON2_LANES: u32 = 4;
const ARGON2_SALT_LEN: usize = 16;

/// A random symmetric key protecting application data at rest.
///
/// Crypto keys are persisted encrypted under a master key and exist in
/// cleartext only while the manager holds them; key bytes are zeroized
/// on drop.
pub struct CryptoKey {
    key: Zeroizing<[u8; 32]>,
}

impl CryptoKey {
    /// Generate a new random crypto key.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *key);
        Self { key }
    }

    /// Rebuild a crypto key from decrypted bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::Crypto(format!(
                "invalid crypto key length {}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Raw key bytes.
    pub fn bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Overwrite the key bytes with zeros in place.
    pub(crate) fn zero(&mut self) {
        self.key.zeroize();
    }

    /// Encrypt `plaintext`, prepending a random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt_with(&self.key, plaintext).map_err(Error::Crypto)
    }

    /// Decrypt a ciphertext produced by [`CryptoKey::encrypt`].
    ///
    /// Any failure, including an authentication mismatch, is a `Crypto`
    /// error: the crypto keys are random and never derived from a user
    /// passphrase, so a bad tag here means corrupt data.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < SEAL_OVERHEAD {
            return Err(Error::Crypto(format!(
                "ciphertext too short ({} bytes) to encode nonce and tag",
                ciphertext.len()
            )));
        }
        decrypt_with(&self.key, ciphertext).map_err(|_| Error::Crypto("decryption failed".into()))
    }
}

fn encrypt_with(key: &[u8; 32], plaintext: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ct = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| e.to_string())?;
    let mut out = Vec::with_capacity(NONCE_LEN + ct.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ct);
    Ok(out)
}

fn decrypt_with(key: &[u8; 32], ciphertext: &[u8]) -> std::result::Result<Zeroizing<Vec<u8>>, ()> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = XNonce::from_slice(&ciphertext[..NONCE_LEN]);
    cipher
        .decrypt(nonce, &ciphertext[NONCE_LEN..])
        .map(Zeroizing::new)
        .map_err(|_| ())
}

/// Argon2id parameters for a unique-passphrase account.
///
/// The parameters persist alongside the account so the key can be
/// re-derived from the passphrase on unlock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argon2idParams {
    /// Memory cost in KiB
    pub mem_kib: u32,
    /// Number of passes
    pub time: u32,
    /// Degree of parallelism
    pub lanes: u32,
    /// Random salt
    pub salt: [u8; ARGON2_SALT_LEN],
}

impl Argon2idParams {
    /// Generate fresh parameters with a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; ARGON2_SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self {
            mem_kib: ARGON2_MEM_KIB,
            time: ARGON2_TIME,
            lanes: ARGON2_LANES,
            salt,
        }
    }

    /// Derive the 32-byte sealing key for `passphrase`.
    pub fn derive_key(&self, passphrase: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let params = Params::new(self.mem_kib, self.time, self.lanes, Some(32))
            .map_err(|e| Error::Crypto(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(passphrase, &self.salt, &mut *key)
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(key)
    }
}

/// Seal `plaintext` under an Argon2id-derived key.
pub fn seal(key: &Zeroizing<[u8; 32]>, plaintext: &[u8]) -> Result<Vec<u8>> {
    encrypt_with(key, plaintext).map_err(Error::Crypto)
}

/// Open a ciphertext produced by [`seal`].
///
/// The key is derived from a user passphrase, so an authentication
/// failure is reported as `Passphrase` rather than `Crypto`; the
/// ciphertext may technically have been tampered with, but the common
/// case by far is a mistyped passphrase.
pub fn unseal(key: &Zeroizing<[u8; 32]>, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < SEAL_OVERHEAD {
        return Err(Error::Crypto(format!(
            "ciphertext too short ({} bytes) to encode nonce and tag",
            ciphertext.len()
        )));
    }
    decrypt_with(key, ciphertext).map_err(|_| Error::Passphrase)
}
