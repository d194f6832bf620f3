//! Error types for the key store
//!
//! Every failure the manager surfaces carries one of these kinds so
//! callers can react without string matching. Errors from collaborating
//! crates are mapped at the call site.

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Key store errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation requires private key material a watching-only wallet
    /// does not record
    #[error("Watching-only: {0}")]
    WatchingOnly(String),

    /// Global or per-account secret keys are not currently accessible
    #[error("Locked: {0}")]
    Locked(String),

    /// Passphrase authentication failed
    #[error("Incorrect passphrase")]
    Passphrase,

    /// Encryption or decryption failure that is not an authentication
    /// mismatch
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Caller-supplied value violates a documented precondition
    #[error("Invalid value: {0}")]
    Invalid(String),

    /// Uniqueness violation in the persistent store
    #[error("Already exists: {0}")]
    Exist(String),

    /// Lookup failure in the persistent store
    #[error("Not found: {0}")]
    NotExist(String),

    /// Storage failure or a parse failure on persisted bytes
    #[error("IO error: {0}")]
    Io(String),

    /// The derivation hierarchy is unusable for the supplied seed or
    /// extended key
    #[error("Unusable seed: {0}")]
    Seed(String),
}

impl From<vela_walletdb::Error> for Error {
    fn from(e: vela_walletdb::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_io() {
        let err: Error = vela_walletdb::Error::Store("disk on fire".into()).into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("disk on fire"));
    }
}
