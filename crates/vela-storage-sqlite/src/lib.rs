//! SQLite-backed store for the Vela wallet
//!
//! Implements the `vela-walletdb` bucket interface on a single
//! `kv(bucket, key, value)` table. Write transactions run with SQLite's
//! default serializable isolation in WAL mode; the transaction commits
//! only when the caller's closure succeeds.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod store;

pub use store::{Store, Tx};

/// Error types for the sqlite store
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying sqlite failure
    #[error("Sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for sqlite store operations
pub type Result<T> = std::result::Result<T, Error>;
