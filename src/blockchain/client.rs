//! Chain access seam.
//!
//! Everything above the blockchain layer talks to the chain through
//! [`ChainClient`]. The production implementation is [`EvmClient`], which
//! speaks raw JSON-RPC; tests substitute an in-memory double.

use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256};
use thiserror::Error;

pub use super::evm_client::EvmClient;
use crate::blockchain::services::token;

/// Failures reported by a chain client.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },
    #[error("signing failed: {0}")]
    Signer(String),
    #[error("no receipt for {0:?} after {1:?}")]
    ReceiptTimeout(H256, Duration),
}

impl ChainError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChainError::Timeout | ChainError::ReceiptTimeout(..))
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Timeout
        } else {
            ChainError::Transport(err.to_string())
        }
    }
}

/// Read and write capabilities against one signing account on one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain id this client signs for.
    fn chain_id(&self) -> u64;

    /// Address of the account that signs every transaction sent through this client.
    fn signer_address(&self) -> Address;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Native coin balance in wei.
    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    /// Simulation-based gas estimate for `tx`.
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256, ChainError>;

    /// Signs and broadcasts `tx` from the signer account, returning the hash
    /// as soon as the node accepts it. Missing gas price and gas limit are
    /// filled in by the client.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256, ChainError>;

    /// Blocks until `hash` is mined or the client's receipt timeout elapses.
    async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt, ChainError>;

    /// ERC-20 `allowance(owner, spender)` on `token`.
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        let raw = self.call(token, token::allowance_call(owner, spender)).await?;
        token::decode_u256(&raw).ok_or_else(|| ChainError::Decode {
            what: "allowance".to_string(),
            reason: format!("0x{}", hex::encode(&raw)),
        })
    }
}

/// Whether a mined receipt reports success (`status == 1`).
pub fn receipt_succeeded(receipt: &TransactionReceipt) -> bool {
    receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false)
}
