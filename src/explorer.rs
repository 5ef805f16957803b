//! Block explorer links for mint transactions

use crate::config::Network;
use crate::error::{Error, Result};

/// Chains the explorer knows how to link to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chain {
    /// Cardano (cardanoscan)
    Cardano,
    /// Solana (explorer.solana.com)
    Solana,
    /// Ethereum (etherscan)
    Ethereum,
}

impl Chain {
    /// Parse an upstream chain name, case-insensitively
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cardano" => Ok(Chain::Cardano),
            "solana" => Ok(Chain::Solana),
            "ethereum" => Ok(Chain::Ethereum),
            _ => Err(Error::validation(
                "blockchain",
                format!("Unsupported blockchain type: {}", name),
            )),
        }
    }

    fn base_url(&self, network: Network) -> &'static str {
        match (self, network) {
            (Chain::Cardano, Network::Mainnet) => "https://cardanoscan.io/transaction",
            (Chain::Cardano, Network::Testnet) => "https://preprod.cardanoscan.io/transaction",
            (Chain::Solana, _) => "https://explorer.solana.com/tx",
            (Chain::Ethereum, Network::Mainnet) => "https://etherscan.io/tx",
            (Chain::Ethereum, Network::Testnet) => "https://sepolia.etherscan.io/tx",
        }
    }
}

/// Builds explorer URLs for a fixed network
#[derive(Clone, Debug)]
pub struct Explorer {
    network: Network,
    default_chain: Chain,
}

impl Explorer {
    /// Create an explorer for `network`, falling back to `default_chain` when none is reported
    pub fn new(network: Network, default_chain: Chain) -> Self {
        Self {
            network,
            default_chain,
        }
    }

    /// Network links are built for
    pub fn network(&self) -> Network {
        self.network
    }

    /// Explorer URL for a mint transaction
    ///
    /// An empty or missing chain name uses the default chain. Unknown chain
    /// names are a validation error.
    pub fn transaction_url(&self, chain: Option<&str>, tx_hash: &str) -> Result<String> {
        let chain = match chain.map(str::trim).filter(|c| !c.is_empty()) {
            Some(name) => Chain::parse(name)?,
            None => self.default_chain,
        };
        let base = chain.base_url(self.network);
        Ok(match chain {
            Chain::Solana => format!("{}/{}?cluster={}", base, tx_hash, self.network.as_str()),
            _ => format!("{}/{}", base, tx_hash),
        })
    }
}
