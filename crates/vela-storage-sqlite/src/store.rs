//! Store connection and transaction wrappers

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::path::Path;

use vela_walletdb::{ReadTx, WriteTx};

use crate::Result;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    bucket BLOB NOT NULL,
    key    BLOB NOT NULL,
    value  BLOB NOT NULL,
    PRIMARY KEY (bucket, key)
) WITHOUT ROWID;";

/// SQLite-backed bucket store
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.as_ref().display(), "opened wallet store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open a transient in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Run `f` with a read-only transaction snapshot.
    pub fn view<T, E>(&self, f: impl FnOnce(&Tx<'_>) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<vela_walletdb::Error>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| E::from(store_err(e)))?;
        let wrapped = Tx { tx };
        f(&wrapped)
    }

    /// Run `f` inside a serializable write transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`; dropping the
    /// transaction on the error path rolls every change back.
    pub fn update<T, E>(&self, f: impl FnOnce(&Tx<'_>) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<vela_walletdb::Error>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| E::from(store_err(e)))?;
        let wrapped = Tx { tx };
        let out = f(&wrapped)?;
        wrapped.tx.commit().map_err(|e| E::from(store_err(e)))?;
        Ok(out)
    }
}

fn store_err(e: rusqlite::Error) -> vela_walletdb::Error {
    vela_walletdb::Error::Store(e.to_string())
}

/// Transaction over the sqlite store
pub struct Tx<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl ReadTx for Tx<'_> {
    fn get(&self, bucket: &[u8], key: &[u8]) -> vela_walletdb::Result<Option<Vec<u8>>> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT value FROM kv WHERE bucket = ?1 AND key = ?2")
            .map_err(store_err)?;
        stmt.query_row(rusqlite::params![bucket, key], |row| row.get(0))
            .optional()
            .map_err(store_err)
    }

    fn for_each(&self, bucket: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> vela_walletdb::Result<()> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT key, value FROM kv WHERE bucket = ?1 ORDER BY key")
            .map_err(store_err)?;
        let mut rows = stmt.query(rusqlite::params![bucket]).map_err(store_err)?;
        while let Some(row) = rows.next().map_err(store_err)? {
            let key: Vec<u8> = row.get(0).map_err(store_err)?;
            let value: Vec<u8> = row.get(1).map_err(store_err)?;
            if !f(&key, &value) {
                break;
            }
        }
        Ok(())
    }
}

impl WriteTx for Tx<'_> {
    fn put(&self, bucket: &[u8], key: &[u8], value: &[u8]) -> vela_walletdb::Result<()> {
        self.tx
            .execute(
                "INSERT INTO kv (bucket, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (bucket, key) DO UPDATE SET value = excluded.value",
                rusqlite::params![bucket, key, value],
            )
            .map(|_| ())
            .map_err(store_err)
    }

    fn delete(&self, bucket: &[u8], key: &[u8]) -> vela_walletdb::Result<()> {
        self.tx
            .execute(
                "DELETE FROM kv WHERE bucket = ?1 AND key = ?2",
                rusqlite::params![bucket, key],
            )
            .map(|_| ())
            .map_err(store_err)
    }
}
