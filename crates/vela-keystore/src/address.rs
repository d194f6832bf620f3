//! Address representations and key encodings
//!
//! The store keys every address by its 20-byte hash-160, so this module
//! deals in hashes rather than encoded address strings; rendering a
//! hash-160 as a P2PKH or P2SH address for a given network is a concern
//! of the address codec, not of the key store.

use k256::ecdsa::{SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use vela_params::ChainParams;

use crate::error::{Error, Result};

/// Length of a compressed secp256k1 public key
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Prefix byte of a compressed public key with an even Y coordinate
pub const PUBKEY_COMPRESSED_EVEN: u8 = 0x02;

/// Prefix byte of a compressed public key with an odd Y coordinate
pub const PUBKEY_COMPRESSED_ODD: u8 = 0x03;

/// RIPEMD-160 of SHA-256, the hash keying every address record.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// An address as the key store understands it.
///
/// Bare public keys are accepted for lookup convenience and are
/// normalized to their pubkey-hash form, since records are keyed only by
/// hash-160.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Pay-to-pubkey-hash
    PubkeyHash([u8; 20]),
    /// Pay-to-script-hash
    ScriptHash([u8; 20]),
    /// A bare compressed public key
    Pubkey(Vec<u8>),
}

impl Address {
    /// The hash-160 identifying this address in the store.
    pub fn id(&self) -> [u8; 20] {
        match self {
            Address::PubkeyHash(hash) | Address::ScriptHash(hash) => *hash,
            Address::Pubkey(pubkey) => hash160(pubkey),
        }
    }
}

/// A managed pay-to-pubkey-hash address, either chained (derived from an
/// account key) or imported.
#[derive(Debug, Clone)]
pub struct ManagedPubKeyAddress {
    account: u32,
    pubkey: Vec<u8>,
    pubkey_hash: [u8; 20],
    internal: bool,
    index: u32,
    imported: bool,
}

impl ManagedPubKeyAddress {
    pub(crate) fn new(account: u32, pubkey: Vec<u8>, internal: bool, index: u32, imported: bool) -> Self {
        let pubkey_hash = hash160(&pubkey);
        Self { account, pubkey, pubkey_hash, internal, index, imported }
    }

    /// Account the address belongs to.
    pub fn account(&self) -> u32 {
        self.account
    }

    /// Serialized compressed public key.
    pub fn pubkey(&self) -> &[u8] {
        &self.pubkey
    }

    /// Hash-160 of the public key.
    pub fn pubkey_hash(&self) -> &[u8; 20] {
        &self.pubkey_hash
    }

    /// Whether the address lies on the internal (change) branch.
    pub fn internal(&self) -> bool {
        self.internal
    }

    /// Derivation index within the branch. Zero for imported addresses.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether the address was imported rather than derived.
    pub fn imported(&self) -> bool {
        self.imported
    }
}

/// A managed pay-to-script-hash address.
#[derive(Debug, Clone)]
pub struct ManagedScriptAddress {
    account: u32,
    script_hash: [u8; 20],
    script: Vec<u8>,
}

impl ManagedScriptAddress {
    pub(crate) fn new(account: u32, script_hash: [u8; 20], script: Vec<u8>) -> Self {
        Self { account, script_hash, script }
    }

    /// Account the address belongs to.
    pub fn account(&self) -> u32 {
        self.account
    }

    /// Hash-160 of the redeem script.
    pub fn script_hash(&self) -> &[u8; 20] {
        &self.script_hash
    }

    /// The redeem script.
    pub fn script(&self) -> &[u8] {
        &self.script
    }
}

/// An address record resolved through the manager, carrying what is
/// needed to use the address beyond its encoded form.
#[derive(Debug, Clone)]
pub enum ManagedAddress {
    /// Pay-to-pubkey-hash address
    PubKey(ManagedPubKeyAddress),
    /// Pay-to-script-hash address
    Script(ManagedScriptAddress),
}

impl ManagedAddress {
    /// Account the address belongs to.
    pub fn account(&self) -> u32 {
        match self {
            ManagedAddress::PubKey(a) => a.account(),
            ManagedAddress::Script(a) => a.account(),
        }
    }

    /// The address in key store form.
    pub fn address(&self) -> Address {
        match self {
            ManagedAddress::PubKey(a) => Address::PubkeyHash(a.pubkey_hash),
            ManagedAddress::Script(a) => Address::ScriptHash(a.script_hash),
        }
    }
}

/// A private key in wallet import format.
///
/// The payload is `net_id(1) || key(32) || 0x01` under Base58Check; only
/// compressed public keys are supported. Key bytes are zeroized on drop.
pub struct Wif {
    key: Zeroizing<[u8; 32]>,
}

impl Wif {
    /// Wrap raw private key bytes.
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key: Zeroizing::new(key) }
    }

    /// Decode a WIF string for the given network.
    pub fn decode(s: &str, params: &ChainParams) -> Result<Self> {
        let payload = Zeroizing::new(
            bs58::decode(s)
                .with_check(None)
                .into_vec()
                .map_err(|e| Error::Invalid(format!("WIF: {e}")))?,
        );
        if payload.len() != 34 || payload[33] != 0x01 {
            return Err(Error::Invalid("WIF: malformed payload".into()));
        }
        if payload[0] != params.wif_net_id {
            return Err(Error::Invalid(format!(
                "WIF: net id {:#04x} is not for {}",
                payload[0], params.name
            )));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&payload[1..33]);
        // Reject out-of-range scalars up front.
        SigningKey::from_slice(&key[..]).map_err(|e| Error::Invalid(format!("WIF: {e}")))?;
        Ok(Self { key })
    }

    /// Encode as a WIF string for the given network.
    pub fn encode(&self, params: &ChainParams) -> String {
        let mut payload = Zeroizing::new(Vec::with_capacity(34));
        payload.push(params.wif_net_id);
        payload.extend_from_slice(&self.key[..]);
        payload.push(0x01);
        bs58::encode(&payload[..]).with_check().into_string()
    }

    /// Serialized compressed public key for this private key.
    pub fn pubkey(&self) -> Result<Vec<u8>> {
        let sk = SigningKey::from_slice(&self.key[..])
            .map_err(|e| Error::Invalid(format!("WIF: {e}")))?;
        Ok(sk.verifying_key().to_sec1_bytes().into_vec())
    }

    /// Raw private key bytes.
    pub(crate) fn priv_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// A private key handed to a signing consumer.
///
/// The key material is zeroized when the value is dropped; callers must
/// drop the handle as soon as signing is complete.
pub struct AddressPrivateKey {
    key: SigningKey,
}

impl AddressPrivateKey {
    pub(crate) fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// The secp256k1 signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// Serialized compressed public key.
    pub fn pubkey(&self) -> Vec<u8> {
        VerifyingKey::from(&self.key).to_sec1_bytes().into_vec()
    }
}
