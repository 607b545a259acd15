// src/lib.rs

use std::sync::Arc;

use anyhow::Result;

// Re-export commonly used types
pub use ethers::types::{Address, H160, H256, U256, U64};

// Re-export modules
pub mod api;
pub mod blockchain;
pub mod config;
pub mod mcp;
pub mod swap;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

use blockchain::{
    client::ChainClient,
    evm_client::{EvmClient, RpcSettings},
    signer::load_signer,
};
use swap::{QuoteResolver, SwapOrchestrator, SwapSettings};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: config::Config,
    /// Signing chain client for the configured network
    pub chain: Arc<dyn ChainClient>,
    /// Swap pipeline bound to `chain`
    pub swaps: Arc<SwapOrchestrator>,
}

impl AppState {
    /// Wires the JSON-RPC client, quote resolver and swap orchestrator from
    /// `config`. Performs no network I/O.
    pub fn from_config(config: config::Config) -> Result<Self> {
        let evm = Self::evm_client(&config)?;
        Self::assemble(config, evm)
    }

    /// Like [`AppState::from_config`], but first checks that the RPC endpoint
    /// serves the configured chain.
    pub async fn connect(config: config::Config) -> Result<Self> {
        let evm = Self::evm_client(&config)?;
        evm.verify_chain_id().await?;
        Self::assemble(config, evm)
    }

    fn evm_client(config: &config::Config) -> Result<EvmClient> {
        let wallet = load_signer(config)?;
        let settings = RpcSettings {
            request_timeout: config.rpc_timeout,
            receipt_timeout: config.receipt_timeout,
            poll_interval: config.receipt_poll_interval,
        };
        EvmClient::new(&config.rpc_url, config.chain_id, wallet, settings)
    }

    fn assemble(config: config::Config, evm: EvmClient) -> Result<Self> {
        let chain: Arc<dyn ChainClient> = Arc::new(evm);
        let quotes = QuoteResolver::new(&config.one_inch_api_url, config.quote_timeout)?;
        let swaps = SwapOrchestrator::new(chain.clone(), quotes, SwapSettings::from_config(&config));

        Ok(Self {
            config,
            chain,
            swaps: Arc::new(swaps),
        })
    }
}
