//! Vela network parameters and constants
//!
//! This crate provides network-specific constants used by the wallet:
//! BIP-44 coin types (legacy and SLIP-0044), passphrase KDF difficulty,
//! and key encoding prefixes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod network;

pub use network::{ChainParams, Network, ScryptOptions};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
