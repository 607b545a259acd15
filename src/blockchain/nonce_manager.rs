// src/blockchain/nonce_manager.rs

use std::sync::Arc;

use dashmap::DashMap;
use ethers::types::{Address, U256};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::blockchain::client::ChainError;

// Hands out sequential nonces per signer so concurrent sends from the same
// account (an approval followed by a swap, or two swaps) never collide.
#[derive(Debug, Clone, Default)]
pub struct NonceManager {
    // One async mutex per address; different signers never contend.
    nonces: Arc<DashMap<Address, Arc<Mutex<NonceState>>>>,
}

#[derive(Debug, Default)]
struct NonceState {
    next_nonce: Option<U256>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, address: Address) -> Arc<Mutex<NonceState>> {
        self.nonces
            .entry(address)
            .or_insert_with(|| Arc::new(Mutex::new(NonceState::default())))
            .clone()
    }

    /// Returns the nonce to use for the next transaction from `address`.
    /// The first call per address asks the node for its pending transaction
    /// count; later calls increment the cached value.
    pub async fn get_next_nonce(
        &self,
        address: Address,
        client: &Client,
        rpc_url: &str,
    ) -> Result<U256, ChainError> {
        let slot = self.slot(address);
        let mut state = slot.lock().await;

        let nonce_to_use = match state.next_nonce {
            Some(nonce) => nonce,
            None => fetch_pending_nonce(client, rpc_url, address).await?,
        };

        state.next_nonce = Some(nonce_to_use + U256::one());
        Ok(nonce_to_use)
    }

    /// Drops the cached nonce for `address`, forcing the next send to refetch
    /// it from the node. Called after a broadcast is rejected.
    pub async fn reset(&self, address: Address) {
        let slot = self.slot(address);
        slot.lock().await.next_nonce = None;
    }
}

async fn fetch_pending_nonce(
    client: &Client,
    rpc_url: &str,
    address: Address,
) -> Result<U256, ChainError> {
    let payload = json!({
        "jsonrpc": "2.0",
        "method": "eth_getTransactionCount",
        "params": [format!("{:?}", address), "pending"],
        "id": 1
    });

    let resp: Value = client.post(rpc_url).json(&payload).send().await?.json().await?;
    if let Some(err) = resp.get("error") {
        return Err(ChainError::Rpc {
            code: err["code"].as_i64().unwrap_or_default(),
            message: err["message"].as_str().unwrap_or_default().to_string(),
        });
    }

    let nonce_hex = resp["result"].as_str().ok_or_else(|| ChainError::Decode {
        what: "eth_getTransactionCount".to_string(),
        reason: resp.to_string(),
    })?;
    U256::from_str_radix(nonce_hex.trim_start_matches("0x"), 16).map_err(|e| ChainError::Decode {
        what: "eth_getTransactionCount".to_string(),
        reason: e.to_string(),
    })
}
