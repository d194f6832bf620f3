//! Bucketed transactional key/value store interface for the Vela wallet
//!
//! Wallet components persist their state through the [`ReadTx`] and
//! [`WriteTx`] traits rather than against a concrete database. A backend
//! provides snapshot reads and serializable, atomic writes; the caller owns
//! the transaction and decides when it commits. Buckets are flat
//! namespaces of binary keys ordered lexicographically.
//!
//! An in-memory implementation is included for embedding and tests. The
//! `vela-storage-sqlite` crate provides the on-disk implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod memory;

pub use memory::MemoryDb;

/// Error type for storage backends
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying store failure
    #[error("Storage error: {0}")]
    Store(String),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Read access to a transaction snapshot.
pub trait ReadTx {
    /// Fetch the value recorded under `key` in `bucket`.
    fn get(&self, bucket: &[u8], key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Visit each key/value pair of `bucket` in lexicographic key order.
    ///
    /// Iteration stops early when the callback returns `false`.
    fn for_each(&self, bucket: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) -> Result<()>;
}

/// Write access to an atomic transaction.
///
/// Mutations are only visible to other transactions once the backend
/// commits the transaction; a transaction abandoned due to an error must
/// roll back completely.
pub trait WriteTx: ReadTx {
    /// Record `value` under `key` in `bucket`, replacing any previous value.
    fn put(&self, bucket: &[u8], key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove the value recorded under `key` in `bucket`, if any.
    fn delete(&self, bucket: &[u8], key: &[u8]) -> Result<()>;
}
