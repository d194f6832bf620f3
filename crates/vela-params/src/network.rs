//! Vela network definitions

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Network enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
    /// Simnet (local simulation network)
    Simnet,
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "simnet" => Ok(Network::Simnet),
            other => Err(Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Scrypt difficulty used when deriving master keys from passphrases.
///
/// The cost parameter is stored as `log2(N)` so the full parameter set
/// round-trips through a single byte when persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScryptOptions {
    /// log2 of the CPU/memory cost parameter N
    pub log_n: u8,
    /// Block size parameter
    pub r: u32,
    /// Parallelization parameter
    pub p: u32,
}

impl ScryptOptions {
    /// Scrypt difficulty for the given network.
    ///
    /// Simnet uses deliberately weak parameters so tests and simulations
    /// are not dominated by KDF time. All other networks use the hardened
    /// parameters (N = 2^18, r = 8, p = 1).
    pub const fn for_network(network: Network) -> Self {
        match network {
            Network::Simnet => Self { log_n: 1, r: 1, p: 1 },
            _ => Self { log_n: 18, r: 8, p: 1 },
        }
    }
}

/// Chain parameters
#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    /// Network this parameter set describes
    pub network: Network,
    /// Human-readable name
    pub name: &'static str,
    /// Legacy BIP-44 coin type used by early wallets
    pub legacy_coin_type: u32,
    /// Coin type registered in SLIP-0044
    pub slip0044_coin_type: u32,
    /// Version byte for WIF-encoded private keys
    pub wif_net_id: u8,
}

impl ChainParams {
    /// Mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            name: "mainnet",
            legacy_coin_type: 76,
            slip0044_coin_type: 571,
            wif_net_id: 0xb0,
        }
    }

    /// Testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            name: "testnet",
            legacy_coin_type: 11,
            slip0044_coin_type: 1,
            wif_net_id: 0xef,
        }
    }

    /// Simnet parameters
    pub const fn simnet() -> Self {
        Self {
            network: Network::Simnet,
            name: "simnet",
            legacy_coin_type: 115,
            slip0044_coin_type: 1,
            wif_net_id: 0x64,
        }
    }

    /// Parameters for the given network
    pub const fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Simnet => Self::simnet(),
        }
    }

    /// Scrypt difficulty for passphrase-derived master keys on this network
    pub const fn scrypt_options(&self) -> ScryptOptions {
        ScryptOptions::for_network(self.network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let params = ChainParams::mainnet();
        assert_eq!(params.network, Network::Mainnet);
        assert_eq!(params.legacy_coin_type, 76);
        assert_eq!(params.slip0044_coin_type, 571);
        assert_eq!(params.scrypt_options().log_n, 18);
    }

    #[test]
    fn test_simnet_uses_weak_scrypt() {
        let opts = ChainParams::simnet().scrypt_options();
        assert_eq!(opts, ScryptOptions { log_n: 1, r: 1, p: 1 });
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!("bogusnet".parse::<Network>().is_err());
    }
}
