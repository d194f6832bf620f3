//! Persistent schema
//!
//! Everything the manager stores lives in a handful of flat buckets.
//! Rows are hand-serialized, little-endian and length-prefixed, with a
//! leading type tag where more than one layout shares a bucket. Bucket
//! keys that must sort numerically (account numbers) are big-endian.
//!
//! Unknown tags and short payloads are reported as `Io`: they mean the
//! persisted bytes are corrupt, not that the caller did anything wrong.

use vela_walletdb::{ReadTx, WriteTx};

use crate::crypto::Argon2idParams;
use crate::error::{Error, Result};
use crate::hd::IMPORTED_ADDR_ACCOUNT;

pub(crate) const BUCKET_MAIN: &[u8] = b"main";
pub(crate) const BUCKET_ACCOUNTS: &[u8] = b"accounts";
pub(crate) const BUCKET_ACCT_VARS: &[u8] = b"acctvars";
pub(crate) const BUCKET_ACCT_NAME_IDX: &[u8] = b"acctnameidx";
pub(crate) const BUCKET_ADDRS: &[u8] = b"addrs";
pub(crate) const BUCKET_ADDR_ACCT_IDX: &[u8] = b"addracctidx";
pub(crate) const BUCKET_ADDR_POOL: &[u8] = b"addrpool";

const KEY_WATCHING_ONLY: &[u8] = b"watchingonly";
const KEY_MASTER_PUB_PARAMS: &[u8] = b"mkeypub";
const KEY_MASTER_PRIV_PARAMS: &[u8] = b"mkeypriv";
const KEY_CRYPTO_PUB: &[u8] = b"ckeypub";
const KEY_CRYPTO_PRIV: &[u8] = b"ckeypriv";
const KEY_COINTYPE_LEGACY_PUB: &[u8] = b"ctlegacypub";
const KEY_COINTYPE_LEGACY_PRIV: &[u8] = b"ctlegacypriv";
const KEY_COINTYPE_SLIP0044_PUB: &[u8] = b"ctslip44pub";
const KEY_COINTYPE_SLIP0044_PRIV: &[u8] = b"ctslip44priv";
const KEY_SLIP0044_ACCT0_ROW: &[u8] = b"slip44acct0";
const KEY_LAST_ACCOUNT: &[u8] = b"lastaccount";
const KEY_LAST_IMPORTED: &[u8] = b"lastimported";

pub(crate) const VAR_NAME: &[u8] = b"name";
pub(crate) const VAR_LAST_USED_EXTERNAL: &[u8] = b"lastusedext";
pub(crate) const VAR_LAST_USED_INTERNAL: &[u8] = b"lastusedint";
pub(crate) const VAR_LAST_RETURNED_EXTERNAL: &[u8] = b"lastretext";
pub(crate) const VAR_LAST_RETURNED_INTERNAL: &[u8] = b"lastretint";
const VAR_KDF: &[u8] = b"kdf";

/// Sentinel recorded in the usage variables before any address on the
/// branch has been used or returned.
pub const NO_ADDRESS_INDEX: u32 = u32::MAX;

const KDF_VERSION: u8 = 1;

/// Persisted account kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    /// BIP-0044 account written in the pre-upgrade row layout
    Bip0044Legacy,
    /// BIP-0044 account
    Bip0044,
    /// Imported voting account
    ImportedVoting,
}

impl AccountType {
    fn tag(self) -> u8 {
        match self {
            AccountType::Bip0044Legacy => 0,
            AccountType::Bip0044 => 1,
            AccountType::ImportedVoting => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(AccountType::Bip0044Legacy),
            1 => Ok(AccountType::Bip0044),
            2 => Ok(AccountType::ImportedVoting),
            other => Err(Error::Io(format!("unknown account type tag {other}"))),
        }
    }
}

/// A persisted account row
#[derive(Debug, Clone)]
pub(crate) struct AccountRow {
    pub acct_type: AccountType,
    pub pub_key_enc: Vec<u8>,
    pub priv_key_enc: Vec<u8>,
}

/// A persisted address row. Every variant carries the owning account;
/// the row itself is keyed by hash-160 in the address bucket.
#[derive(Debug, Clone)]
pub(crate) enum AddressRow {
    Chained {
        account: u32,
        branch: u32,
        index: u32,
    },
    Imported {
        account: u32,
        enc_pub_key: Vec<u8>,
        enc_priv_key: Vec<u8>,
    },
    Script {
        account: u32,
        enc_script_hash: Vec<u8>,
        script: Vec<u8>,
    },
}

const ADDR_TAG_CHAINED: u8 = 0;
const ADDR_TAG_IMPORTED: u8 = 1;
const ADDR_TAG_SCRIPT: u8 = 2;

// --- primitive helpers ---------------------------------------------------

pub(crate) fn u32_be(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

fn push_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::Io("truncated row".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::Io("truncated row".into()))?;
        self.pos = end;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        let end = self.pos + len;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::Io("truncated row".into()))?;
        self.pos = end;
        Ok(bytes.to_vec())
    }

    fn done(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::Io("trailing bytes in row".into()));
        }
        Ok(())
    }
}

// --- main bucket singletons ----------------------------------------------

fn main_get(tx: &dyn ReadTx, key: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(tx.get(BUCKET_MAIN, key)?)
}

fn main_put(tx: &dyn WriteTx, key: &[u8], value: &[u8]) -> Result<()> {
    Ok(tx.put(BUCKET_MAIN, key, value)?)
}

/// Whether a manager has already been created in this namespace.
pub(crate) fn manager_exists(tx: &dyn ReadTx) -> Result<bool> {
    Ok(main_get(tx, KEY_WATCHING_ONLY)?.is_some())
}

pub(crate) fn fetch_watching_only(tx: &dyn ReadTx) -> Result<bool> {
    match main_get(tx, KEY_WATCHING_ONLY)? {
        Some(v) if v.len() == 1 => Ok(v[0] != 0),
        Some(_) => Err(Error::Io("malformed watching-only flag".into())),
        None => Err(Error::NotExist("address manager is not created".into())),
    }
}

pub(crate) fn put_watching_only(tx: &dyn WriteTx, watching_only: bool) -> Result<()> {
    main_put(tx, KEY_WATCHING_ONLY, &[watching_only as u8])
}

pub(crate) fn put_master_key_params(
    tx: &dyn WriteTx,
    pub_params: Option<&[u8]>,
    priv_params: Option<&[u8]>,
) -> Result<()> {
    if let Some(params) = pub_params {
        main_put(tx, KEY_MASTER_PUB_PARAMS, params)?;
    }
    if let Some(params) = priv_params {
        main_put(tx, KEY_MASTER_PRIV_PARAMS, params)?;
    }
    Ok(())
}

pub(crate) fn fetch_master_key_params(tx: &dyn ReadTx) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    let pub_params = main_get(tx, KEY_MASTER_PUB_PARAMS)?
        .ok_or_else(|| Error::Io("missing master pubkey params".into()))?;
    Ok((pub_params, main_get(tx, KEY_MASTER_PRIV_PARAMS)?))
}

pub(crate) fn put_crypto_keys(
    tx: &dyn WriteTx,
    pub_enc: Option<&[u8]>,
    priv_enc: Option<&[u8]>,
) -> Result<()> {
    if let Some(enc) = pub_enc {
        main_put(tx, KEY_CRYPTO_PUB, enc)?;
    }
    if let Some(enc) = priv_enc {
        main_put(tx, KEY_CRYPTO_PRIV, enc)?;
    }
    Ok(())
}

pub(crate) fn fetch_crypto_keys(tx: &dyn ReadTx) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    let pub_enc = main_get(tx, KEY_CRYPTO_PUB)?
        .ok_or_else(|| Error::Io("missing crypto pubkey".into()))?;
    Ok((pub_enc, main_get(tx, KEY_CRYPTO_PRIV)?))
}

pub(crate) fn put_coin_type_legacy_keys(tx: &dyn WriteTx, pub_enc: &[u8], priv_enc: &[u8]) -> Result<()> {
    main_put(tx, KEY_COINTYPE_LEGACY_PUB, pub_enc)?;
    main_put(tx, KEY_COINTYPE_LEGACY_PRIV, priv_enc)
}

pub(crate) fn put_coin_type_slip0044_keys(tx: &dyn WriteTx, pub_enc: &[u8], priv_enc: &[u8]) -> Result<()> {
    main_put(tx, KEY_COINTYPE_SLIP0044_PUB, pub_enc)?;
    main_put(tx, KEY_COINTYPE_SLIP0044_PRIV, priv_enc)
}

/// Whether the legacy coin type key rows are present.
pub(crate) fn has_legacy_coin_type(tx: &dyn ReadTx) -> Result<bool> {
    Ok(main_get(tx, KEY_COINTYPE_LEGACY_PUB)?.is_some())
}

/// Whether the SLIP-0044 coin type key rows are present.
pub(crate) fn has_slip0044_coin_type(tx: &dyn ReadTx) -> Result<bool> {
    Ok(main_get(tx, KEY_COINTYPE_SLIP0044_PUB)?.is_some())
}

/// Fetch the encrypted key pair for the coin type currently in use:
/// legacy while its rows remain, SLIP-0044 after the upgrade.
pub(crate) fn fetch_coin_type_keys(tx: &dyn ReadTx) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    if let Some(pub_enc) = main_get(tx, KEY_COINTYPE_LEGACY_PUB)? {
        return Ok((pub_enc, main_get(tx, KEY_COINTYPE_LEGACY_PRIV)?));
    }
    if let Some(pub_enc) = main_get(tx, KEY_COINTYPE_SLIP0044_PUB)? {
        return Ok((pub_enc, main_get(tx, KEY_COINTYPE_SLIP0044_PRIV)?));
    }
    Err(Error::WatchingOnly(
        "watching wallets do not record coin type keys".into(),
    ))
}

pub(crate) fn fetch_slip0044_coin_type_keys(tx: &dyn ReadTx) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
    match (
        main_get(tx, KEY_COINTYPE_SLIP0044_PUB)?,
        main_get(tx, KEY_COINTYPE_SLIP0044_PRIV)?,
    ) {
        (Some(pub_enc), Some(priv_enc)) => Ok(Some((pub_enc, priv_enc))),
        _ => Ok(None),
    }
}

pub(crate) fn delete_legacy_coin_type_keys(tx: &dyn WriteTx) -> Result<()> {
    tx.delete(BUCKET_MAIN, KEY_COINTYPE_LEGACY_PUB)?;
    tx.delete(BUCKET_MAIN, KEY_COINTYPE_LEGACY_PRIV)?;
    Ok(())
}

pub(crate) fn put_slip0044_account0_row(tx: &dyn WriteTx, row: &[u8]) -> Result<()> {
    main_put(tx, KEY_SLIP0044_ACCT0_ROW, row)
}

pub(crate) fn fetch_slip0044_account0_row(tx: &dyn ReadTx) -> Result<Option<Vec<u8>>> {
    main_get(tx, KEY_SLIP0044_ACCT0_ROW)
}

pub(crate) fn delete_slip0044_account0_row(tx: &dyn WriteTx) -> Result<()> {
    Ok(tx.delete(BUCKET_MAIN, KEY_SLIP0044_ACCT0_ROW)?)
}

pub(crate) fn fetch_last_account(tx: &dyn ReadTx) -> Result<u32> {
    match main_get(tx, KEY_LAST_ACCOUNT)? {
        Some(v) => read_u32_value(&v),
        None => Err(Error::Io("missing last account".into())),
    }
}

pub(crate) fn put_last_account(tx: &dyn WriteTx, account: u32) -> Result<()> {
    main_put(tx, KEY_LAST_ACCOUNT, &account.to_le_bytes())
}

/// The account number of the last imported account. Defaults to the
/// reserved imported account when no xpub or voting account has ever
/// been imported.
pub(crate) fn fetch_last_imported_account(tx: &dyn ReadTx) -> Result<u32> {
    match main_get(tx, KEY_LAST_IMPORTED)? {
        Some(v) => read_u32_value(&v),
        None => Ok(IMPORTED_ADDR_ACCOUNT),
    }
}

pub(crate) fn put_last_imported_account(tx: &dyn WriteTx, account: u32) -> Result<()> {
    main_put(tx, KEY_LAST_IMPORTED, &account.to_le_bytes())
}

fn read_u32_value(v: &[u8]) -> Result<u32> {
    if v.len() != 4 {
        return Err(Error::Io("malformed u32 value".into()));
    }
    Ok(u32::from_le_bytes([v[0], v[1], v[2], v[3]]))
}

// --- account rows ---------------------------------------------------------

/// Serialize an account row in the current layout.
pub(crate) fn serialize_account_row(row: &AccountRow) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 8 + row.pub_key_enc.len() + row.priv_key_enc.len());
    out.push(row.acct_type.tag());
    push_bytes(&mut out, &row.pub_key_enc);
    push_bytes(&mut out, &row.priv_key_enc);
    out
}

/// Serialize an account row in the legacy layout, which carries the four
/// usage indices inline. Only ever written for the stashed SLIP-0044
/// account-0 row.
pub(crate) fn serialize_legacy_account_row(row: &AccountRow, indices: [u32; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 8 + 16 + row.pub_key_enc.len() + row.priv_key_enc.len());
    out.push(AccountType::Bip0044Legacy.tag());
    push_bytes(&mut out, &row.pub_key_enc);
    push_bytes(&mut out, &row.priv_key_enc);
    for index in indices {
        out.extend_from_slice(&index.to_le_bytes());
    }
    out
}

/// Deserialize an account row of either layout; the legacy layout's
/// usage indices are consumed and dropped (the variables bucket is
/// authoritative for usage).
pub(crate) fn deserialize_account_row(data: &[u8]) -> Result<AccountRow> {
    let mut r = Reader::new(data);
    let acct_type = AccountType::from_tag(r.u8()?)?;
    let pub_key_enc = r.bytes()?;
    let priv_key_enc = r.bytes()?;
    if acct_type == AccountType::Bip0044Legacy {
        for _ in 0..4 {
            r.u32()?;
        }
    }
    r.done()?;
    Ok(AccountRow { acct_type, pub_key_enc, priv_key_enc })
}

pub(crate) fn put_account_row(tx: &dyn WriteTx, account: u32, row: &AccountRow) -> Result<()> {
    Ok(tx.put(BUCKET_ACCOUNTS, &u32_be(account), &serialize_account_row(row))?)
}

pub(crate) fn fetch_account_row(tx: &dyn ReadTx, account: u32) -> Result<AccountRow> {
    match tx.get(BUCKET_ACCOUNTS, &u32_be(account))? {
        Some(data) => deserialize_account_row(&data),
        None => Err(Error::NotExist(format!("no account {account}"))),
    }
}

/// Write a brand-new account: the row, the name index entry, and the
/// variables initialized with usage sentinels.
pub(crate) fn put_new_account(tx: &dyn WriteTx, account: u32, row: &AccountRow, name: &str) -> Result<()> {
    put_account_row(tx, account, row)?;
    put_account_name_index(tx, account, name)?;
    put_account_name(tx, account, name)?;
    for var in [
        VAR_LAST_USED_EXTERNAL,
        VAR_LAST_USED_INTERNAL,
        VAR_LAST_RETURNED_EXTERNAL,
        VAR_LAST_RETURNED_INTERNAL,
    ] {
        put_account_var_u32(tx, account, var, NO_ADDRESS_INDEX)?;
    }
    Ok(())
}

// --- account variables ----------------------------------------------------

fn var_key(account: u32, var: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + var.len());
    key.extend_from_slice(&u32_be(account));
    key.extend_from_slice(var);
    key
}

pub(crate) fn fetch_account_var_u32(tx: &dyn ReadTx, account: u32, var: &[u8]) -> Result<u32> {
    match tx.get(BUCKET_ACCT_VARS, &var_key(account, var))? {
        Some(v) => read_u32_value(&v),
        None => Err(Error::Io(format!("missing account {account} variable"))),
    }
}

pub(crate) fn put_account_var_u32(tx: &dyn WriteTx, account: u32, var: &[u8], value: u32) -> Result<()> {
    Ok(tx.put(BUCKET_ACCT_VARS, &var_key(account, var), &value.to_le_bytes())?)
}

pub(crate) fn fetch_account_name(tx: &dyn ReadTx, account: u32) -> Result<String> {
    match tx.get(BUCKET_ACCT_VARS, &var_key(account, VAR_NAME))? {
        Some(v) => String::from_utf8(v).map_err(|e| Error::Io(format!("account name: {e}"))),
        None => Err(Error::NotExist(format!("no account {account}"))),
    }
}

pub(crate) fn put_account_name(tx: &dyn WriteTx, account: u32, name: &str) -> Result<()> {
    Ok(tx.put(BUCKET_ACCT_VARS, &var_key(account, VAR_NAME), name.as_bytes())?)
}

pub(crate) fn fetch_account_kdf(tx: &dyn ReadTx, account: u32) -> Result<Option<Argon2idParams>> {
    match tx.get(BUCKET_ACCT_VARS, &var_key(account, VAR_KDF))? {
        Some(v) => deserialize_kdf_params(&v).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn put_account_kdf(tx: &dyn WriteTx, account: u32, params: &Argon2idParams) -> Result<()> {
    Ok(tx.put(
        BUCKET_ACCT_VARS,
        &var_key(account, VAR_KDF),
        &serialize_kdf_params(params),
    )?)
}

pub(crate) fn delete_account_kdf(tx: &dyn WriteTx, account: u32) -> Result<()> {
    Ok(tx.delete(BUCKET_ACCT_VARS, &var_key(account, VAR_KDF))?)
}

fn serialize_kdf_params(params: &Argon2idParams) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 12 + 1 + params.salt.len());
    out.push(KDF_VERSION);
    out.extend_from_slice(&params.mem_kib.to_le_bytes());
    out.extend_from_slice(&params.time.to_le_bytes());
    out.extend_from_slice(&params.lanes.to_le_bytes());
    out.push(params.salt.len() as u8);
    out.extend_from_slice(&params.salt);
    out
}

fn deserialize_kdf_params(data: &[u8]) -> Result<Argon2idParams> {
    let mut r = Reader::new(data);
    let version = r.u8()?;
    if version != KDF_VERSION {
        return Err(Error::Io(format!("unknown KDF params version {version}")));
    }
    let mem_kib = r.u32()?;
    let time = r.u32()?;
    let lanes = r.u32()?;
    let salt_len = r.u8()? as usize;
    let mut salt = [0u8; 16];
    if salt_len != salt.len() {
        return Err(Error::Io(format!("unexpected KDF salt length {salt_len}")));
    }
    let end = r.pos + salt_len;
    let bytes = r
        .data
        .get(r.pos..end)
        .ok_or_else(|| Error::Io("truncated KDF params".into()))?;
    salt.copy_from_slice(bytes);
    Ok(Argon2idParams { mem_kib, time, lanes, salt })
}

// --- account name index ---------------------------------------------------

pub(crate) fn fetch_account_by_name(tx: &dyn ReadTx, name: &str) -> Result<u32> {
    match tx.get(BUCKET_ACCT_NAME_IDX, name.as_bytes())? {
        Some(v) if v.len() == 4 => Ok(u32::from_be_bytes([v[0], v[1], v[2], v[3]])),
        Some(_) => Err(Error::Io("malformed account name index entry".into())),
        None => Err(Error::NotExist(format!("no account named {name:?}"))),
    }
}

pub(crate) fn put_account_name_index(tx: &dyn WriteTx, account: u32, name: &str) -> Result<()> {
    Ok(tx.put(BUCKET_ACCT_NAME_IDX, name.as_bytes(), &u32_be(account))?)
}

pub(crate) fn delete_account_name_index(tx: &dyn WriteTx, name: &str) -> Result<()> {
    Ok(tx.delete(BUCKET_ACCT_NAME_IDX, name.as_bytes())?)
}

// --- address rows ---------------------------------------------------------

fn serialize_address_row(row: &AddressRow) -> Vec<u8> {
    let mut out = Vec::new();
    match row {
        AddressRow::Chained { account, branch, index } => {
            out.push(ADDR_TAG_CHAINED);
            out.extend_from_slice(&account.to_le_bytes());
            out.extend_from_slice(&branch.to_le_bytes());
            out.extend_from_slice(&index.to_le_bytes());
        }
        AddressRow::Imported { account, enc_pub_key, enc_priv_key } => {
            out.push(ADDR_TAG_IMPORTED);
            out.extend_from_slice(&account.to_le_bytes());
            push_bytes(&mut out, enc_pub_key);
            push_bytes(&mut out, enc_priv_key);
        }
        AddressRow::Script { account, enc_script_hash, script } => {
            out.push(ADDR_TAG_SCRIPT);
            out.extend_from_slice(&account.to_le_bytes());
            push_bytes(&mut out, enc_script_hash);
            push_bytes(&mut out, script);
        }
    }
    out
}

pub(crate) fn deserialize_address_row(data: &[u8]) -> Result<AddressRow> {
    let mut r = Reader::new(data);
    let tag = r.u8()?;
    let account = r.u32()?;
    let row = match tag {
        ADDR_TAG_CHAINED => AddressRow::Chained {
            account,
            branch: r.u32()?,
            index: r.u32()?,
        },
        ADDR_TAG_IMPORTED => AddressRow::Imported {
            account,
            enc_pub_key: r.bytes()?,
            enc_priv_key: r.bytes()?,
        },
        ADDR_TAG_SCRIPT => AddressRow::Script {
            account,
            enc_script_hash: r.bytes()?,
            script: r.bytes()?,
        },
        other => return Err(Error::Io(format!("unknown address row tag {other}"))),
    };
    r.done()?;
    Ok(row)
}

fn put_address_row(tx: &dyn WriteTx, hash160: &[u8; 20], account: u32, row: &AddressRow) -> Result<()> {
    tx.put(BUCKET_ADDRS, hash160, &serialize_address_row(row))?;
    tx.put(BUCKET_ADDR_ACCT_IDX, hash160, &account.to_le_bytes())?;
    Ok(())
}

pub(crate) fn put_chained_address(
    tx: &dyn WriteTx,
    hash160: &[u8; 20],
    account: u32,
    branch: u32,
    index: u32,
) -> Result<()> {
    put_address_row(tx, hash160, account, &AddressRow::Chained { account, branch, index })
}

pub(crate) fn put_imported_address(
    tx: &dyn WriteTx,
    hash160: &[u8; 20],
    account: u32,
    enc_pub_key: Vec<u8>,
    enc_priv_key: Vec<u8>,
) -> Result<()> {
    put_address_row(
        tx,
        hash160,
        account,
        &AddressRow::Imported { account, enc_pub_key, enc_priv_key },
    )
}

pub(crate) fn put_script_address(
    tx: &dyn WriteTx,
    hash160: &[u8; 20],
    account: u32,
    enc_script_hash: Vec<u8>,
    script: Vec<u8>,
) -> Result<()> {
    put_address_row(
        tx,
        hash160,
        account,
        &AddressRow::Script { account, enc_script_hash, script },
    )
}

pub(crate) fn fetch_address(tx: &dyn ReadTx, hash160: &[u8; 20]) -> Result<AddressRow> {
    match tx.get(BUCKET_ADDRS, hash160)? {
        Some(data) => deserialize_address_row(&data),
        None => Err(Error::NotExist("no address".into())),
    }
}

pub(crate) fn exists_address(tx: &dyn ReadTx, hash160: &[u8; 20]) -> Result<bool> {
    Ok(tx.get(BUCKET_ADDRS, hash160)?.is_some())
}

pub(crate) fn fetch_addr_account(tx: &dyn ReadTx, hash160: &[u8; 20]) -> Result<u32> {
    match tx.get(BUCKET_ADDR_ACCT_IDX, hash160)? {
        Some(v) => read_u32_value(&v),
        None => Err(Error::NotExist("no address".into())),
    }
}

// --- iteration ------------------------------------------------------------

/// Visit every account number in ascending order.
pub(crate) fn for_each_account(
    tx: &dyn ReadTx,
    f: &mut dyn FnMut(u32) -> Result<()>,
) -> Result<()> {
    let mut result = Ok(());
    tx.for_each(BUCKET_ACCOUNTS, &mut |key, _| {
        if key.len() != 4 {
            result = Err(Error::Io("malformed account bucket key".into()));
            return false;
        }
        let account = u32::from_be_bytes([key[0], key[1], key[2], key[3]]);
        match f(account) {
            Ok(()) => true,
            Err(e) => {
                result = Err(e);
                false
            }
        }
    })?;
    result
}

/// Collect every address row belonging to `account`.
pub(crate) fn account_address_rows(tx: &dyn ReadTx, account: u32) -> Result<Vec<([u8; 20], AddressRow)>> {
    address_rows_filtered(tx, Some(account))
}

/// Collect every address row in the store.
pub(crate) fn all_address_rows(tx: &dyn ReadTx) -> Result<Vec<([u8; 20], AddressRow)>> {
    address_rows_filtered(tx, None)
}

fn address_rows_filtered(tx: &dyn ReadTx, account: Option<u32>) -> Result<Vec<([u8; 20], AddressRow)>> {
    let mut rows = Vec::new();
    let mut result = Ok(());
    tx.for_each(BUCKET_ADDRS, &mut |key, value| {
        let mut hash = [0u8; 20];
        if key.len() != hash.len() {
            result = Err(Error::Io("malformed address bucket key".into()));
            return false;
        }
        hash.copy_from_slice(key);
        match deserialize_address_row(value) {
            Ok(row) => {
                let row_account = match &row {
                    AddressRow::Chained { account, .. }
                    | AddressRow::Imported { account, .. }
                    | AddressRow::Script { account, .. } => *account,
                };
                if account.is_none() || account == Some(row_account) {
                    rows.push((hash, row));
                }
                true
            }
            Err(e) => {
                result = Err(e);
                false
            }
        }
    })?;
    result?;
    Ok(rows)
}

// --- address pool indices -------------------------------------------------

fn addr_pool_key(internal: bool, account: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(internal as u8);
    key.extend_from_slice(&u32_be(account));
    key
}

pub(crate) fn put_next_to_use_addr_pool_index(
    tx: &dyn WriteTx,
    internal: bool,
    account: u32,
    index: u32,
) -> Result<()> {
    Ok(tx.put(
        BUCKET_ADDR_POOL,
        &addr_pool_key(internal, account),
        &index.to_le_bytes(),
    )?)
}

pub(crate) fn fetch_next_to_use_addr_pool_index(
    tx: &dyn ReadTx,
    internal: bool,
    account: u32,
) -> Result<u32> {
    match tx.get(BUCKET_ADDR_POOL, &addr_pool_key(internal, account))? {
        Some(v) => read_u32_value(&v),
        None => Ok(0),
    }
}

// --- watching-only conversion ---------------------------------------------

/// Remove every persisted private ciphertext: the master private key
/// params, the private crypto key, both coin type private keys, the
/// stashed SLIP-0044 account row, each account's private key ciphertext
/// (and KDF params), and each imported key's private ciphertext.
pub(crate) fn delete_private_keys(tx: &dyn WriteTx) -> Result<()> {
    for key in [
        KEY_MASTER_PRIV_PARAMS,
        KEY_CRYPTO_PRIV,
        KEY_COINTYPE_LEGACY_PRIV,
        KEY_COINTYPE_SLIP0044_PRIV,
        KEY_SLIP0044_ACCT0_ROW,
    ] {
        tx.delete(BUCKET_MAIN, key)?;
    }

    // Collect first: mutating a bucket while iterating it is backend
    // dependent behavior.
    let mut accounts = Vec::new();
    for_each_account(tx, &mut |account| {
        accounts.push(account);
        Ok(())
    })?;
    for account in accounts {
        let mut row = fetch_account_row(tx, account)?;
        if !row.priv_key_enc.is_empty() {
            row.priv_key_enc.clear();
            put_account_row(tx, account, &row)?;
        }
        delete_account_kdf(tx, account)?;
    }

    for (hash, row) in all_address_rows(tx)? {
        if let AddressRow::Imported { account, enc_pub_key, enc_priv_key } = row {
            if !enc_priv_key.is_empty() {
                put_imported_address(tx, &hash, account, enc_pub_key, Vec::new())?;
            }
        }
    }
    Ok(())
}
