//! Passphrase-derived master keys
//!
//! A master key is derived from a user passphrase with scrypt and is used
//! for exactly one thing: encrypting a crypto key. Keeping this
//! indirection means a passphrase change only re-encrypts 32 bytes
//! instead of every ciphertext in the store.
//!
//! The persisted parameters carry the salt, the scrypt difficulty, and a
//! SHA-256 digest of the derived key. The digest authenticates a
//! candidate passphrase without decrypting anything.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use vela_params::ScryptOptions;

use crate::crypto::CryptoKey;
use crate::error::{Error, Result};

const SALT_LEN: usize = 32;
const DIGEST_LEN: usize = 32;
const MARSHALLED_LEN: usize = SALT_LEN + DIGEST_LEN + 1 + 4 + 4;

/// Persisted master key parameters
#[derive(Debug, Clone)]
pub struct MasterKeyParams {
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
    options: ScryptOptions,
}

impl MasterKeyParams {
    /// Serialize for storage:
    /// `salt(32) || digest(32) || log_n(1) || r(4 LE) || p(4 LE)`.
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MARSHALLED_LEN);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.digest);
        out.push(self.options.log_n);
        out.extend_from_slice(&self.options.r.to_le_bytes());
        out.extend_from_slice(&self.options.p.to_le_bytes());
        out
    }

    /// Deserialize parameters previously produced by [`marshal`].
    ///
    /// [`marshal`]: MasterKeyParams::marshal
    pub fn unmarshal(data: &[u8]) -> Result<Self> {
        if data.len() != MARSHALLED_LEN {
            return Err(Error::Io(format!(
                "master key params length {} (want {})",
                data.len(),
                MARSHALLED_LEN
            )));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[..SALT_LEN]);
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&data[SALT_LEN..SALT_LEN + DIGEST_LEN]);
        let pos = SALT_LEN + DIGEST_LEN;
        let log_n = data[pos];
        let r = u32::from_le_bytes([data[pos + 1], data[pos + 2], data[pos + 3], data[pos + 4]]);
        let p = u32::from_le_bytes([data[pos + 5], data[pos + 6], data[pos + 7], data[pos + 8]]);
        Ok(Self {
            salt,
            digest,
            options: ScryptOptions { log_n, r, p },
        })
    }
}

/// A master key in one of two states: parameters only (locked), or
/// parameters plus the derived key (usable for encryption).
pub struct MasterKey {
    params: MasterKeyParams,
    key: Option<CryptoKey>,
}

impl MasterKey {
    /// Generate a new master key from `passphrase` with a fresh salt.
    pub fn generate(passphrase: &[u8], options: ScryptOptions) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let key = scrypt_key(passphrase, &salt, options)?;
        let digest: [u8; DIGEST_LEN] = Sha256::digest(&*key).into();
        Ok(Self {
            params: MasterKeyParams { salt, digest, options },
            key: Some(CryptoKey::from_bytes(&*key)?),
        })
    }

    /// Rebuild a master key from persisted parameters, without deriving.
    pub fn from_params(params: MasterKeyParams) -> Self {
        Self { params, key: None }
    }

    /// The persisted parameters.
    pub fn params(&self) -> &MasterKeyParams {
        &self.params
    }

    /// Derive the key from `passphrase` and authenticate it against the
    /// stored digest. A mismatch is a `Passphrase` error and leaves the
    /// key underived.
    pub fn derive(&mut self, passphrase: &[u8]) -> Result<()> {
        let key = scrypt_key(passphrase, &self.params.salt, self.params.options)?;
        let digest: [u8; DIGEST_LEN] = Sha256::digest(&*key).into();
        if digest[..].ct_eq(&self.params.digest[..]).unwrap_u8() != 1 {
            return Err(Error::Passphrase);
        }
        self.key = Some(CryptoKey::from_bytes(&*key)?);
        Ok(())
    }

    /// Derive an independent copy of this key from `passphrase` using the
    /// same parameters, leaving `self` untouched. Used to authenticate an
    /// old passphrase without disturbing current state.
    pub fn derive_scratch(&self, passphrase: &[u8]) -> Result<MasterKey> {
        let mut scratch = MasterKey::from_params(self.params.clone());
        scratch.derive(passphrase)?;
        Ok(scratch)
    }

    /// Whether the key has been derived and is usable.
    pub fn is_derived(&self) -> bool {
        self.key.is_some()
    }

    /// Encrypt `plaintext` with the derived key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            Some(key) => key.encrypt(plaintext),
            None => Err(Error::Crypto("master key is not derived".into())),
        }
    }

    /// Decrypt `ciphertext` with the derived key.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match &self.key {
            Some(key) => key.decrypt(ciphertext),
            None => Err(Error::Crypto("master key is not derived".into())),
        }
    }

    /// Drop the derived key material, keeping only the parameters.
    pub fn zero(&mut self) {
        self.key = None;
    }
}

fn scrypt_key(passphrase: &[u8], salt: &[u8], options: ScryptOptions) -> Result<Zeroizing<[u8; 32]>> {
    let params = scrypt::Params::new(options.log_n, options.r, options.p, 32)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    let mut key = Zeroizing::new([0u8; 32]);
    scrypt::scrypt(passphrase, salt, &params, &mut *key)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEAK: ScryptOptions = ScryptOptions { log_n: 1, r: 1, p: 1 };

    #[test]
    fn test_generate_and_derive() {
        let key = MasterKey::generate(b"passphrase", WEAK).unwrap();
        assert!(key.is_derived());

        let mut reloaded = MasterKey::from_params(
            MasterKeyParams::unmarshal(&key.params().marshal()).unwrap(),
        );
        assert!(!reloaded.is_derived());
        reloaded.derive(b"passphrase").unwrap();
        assert!(reloaded.is_derived());
    }

    #[test]
    fn test_wrong_passphrase() {
        let key = MasterKey::generate(b"passphrase", WEAK).unwrap();
        let mut reloaded = MasterKey::from_params(key.params().clone());
        assert!(matches!(reloaded.derive(b"nope"), Err(Error::Passphrase)));
        assert!(!reloaded.is_derived());
    }

    #[test]
    fn test_encrypt_decrypt_across_derivations() {
        let key = MasterKey::generate(b"passphrase", WEAK).unwrap();
        let ct = key.encrypt(b"crypto key bytes").unwrap();

        let mut reloaded = MasterKey::from_params(key.params().clone());
        reloaded.derive(b"passphrase").unwrap();
        let pt = reloaded.decrypt(&ct).unwrap();
        assert_eq!(&pt[..], b"crypto key bytes");
    }

    #[test]
    fn test_encrypt_requires_derived_key() {
        let key = MasterKey::generate(b"passphrase", WEAK).unwrap();
        let mut reloaded = MasterKey::from_params(key.params().clone());
        assert!(matches!(reloaded.encrypt(b"x"), Err(Error::Crypto(_))));
        reloaded.derive(b"passphrase").unwrap();
        reloaded.zero();
        assert!(matches!(reloaded.decrypt(b"x"), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_params_marshal_roundtrip() {
        let key = MasterKey::generate(b"passphrase", WEAK).unwrap();
        let marshalled = key.params().marshal();
        let params = MasterKeyParams::unmarshal(&marshalled).unwrap();
        assert_eq!(params.marshal(), marshalled);
    }

    #[test]
    fn test_params_unmarshal_rejects_short_input() {
        assert!(matches!(
            MasterKeyParams::unmarshal(&[0u8; 10]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_derive_scratch_does_not_disturb_state() {
        let key = MasterKey::generate(b"passphrase", WEAK).unwrap();
        let mut reloaded = MasterKey::from_params(key.params().clone());
        assert!(reloaded.derive_scratch(b"wrong").is_err());
        assert!(!reloaded.is_derived());
        let scratch = reloaded.derive_scratch(b"passphrase").unwrap();
        assert!(scratch.is_derived());
        assert!(!reloaded.is_derived());
        reloaded.derive(b"passphrase").unwrap();
    }
}
