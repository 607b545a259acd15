// src/blockchain/evm_client.rs

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt,
        TransactionRequest, H256, U256, U64,
    },
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::blockchain::{
    client::{ChainClient, ChainError},
    nonce_manager::NonceManager,
};

/// Timeouts applied by [`EvmClient`].
#[derive(Debug, Clone, Copy)]
pub struct RpcSettings {
    pub request_timeout: Duration,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            receipt_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// JSON-RPC client bound to one node and one signing wallet.
#[derive(Clone)]
pub struct EvmClient {
    http: Client,
    rpc_url: String,
    chain_id: u64,
    wallet: LocalWallet,
    nonce_manager: NonceManager,
    settings: RpcSettings,
}

impl EvmClient {
    pub fn new(rpc_url: &str, chain_id: u64, wallet: LocalWallet, settings: RpcSettings) -> Result<Self> {
        url::Url::parse(rpc_url).with_context(|| format!("invalid RPC URL '{}'", rpc_url))?;
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            rpc_url: rpc_url.to_string(),
            chain_id,
            wallet: wallet.with_chain_id(chain_id),
            nonce_manager: NonceManager::new(),
            settings,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Asks the node for its chain id and fails if it differs from the configured one.
    pub async fn verify_chain_id(&self) -> Result<()> {
        let reported: U64 = self.rpc("eth_chainId", json!([])).await?;
        if reported.as_u64() != self.chain_id {
            return Err(anyhow!(
                "RPC endpoint reports chain {} but CHAIN_ID is {}",
                reported,
                self.chain_id
            ));
        }
        Ok(())
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        debug!(method, "rpc request");
        let resp: Value = self
            .http
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.get("error") {
            return Err(ChainError::Rpc {
                code: err["code"].as_i64().unwrap_or_default(),
                message: err["message"].as_str().unwrap_or_default().to_string(),
            });
        }

        let result = resp.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| ChainError::Decode {
            what: method.to_string(),
            reason: e.to_string(),
        })
    }

    async fn broadcast(&self, tx: TransactionRequest) -> Result<H256, ChainError> {
        let from = self.wallet.address();
        let nonce = self
            .nonce_manager
            .get_next_nonce(from, &self.http, &self.rpc_url)
            .await?;
        let tx = tx.nonce(nonce);

        let typed: TypedTransaction = tx.clone().into();
        let signature = self
            .wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| ChainError::Signer(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        self.rpc(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(&raw))]),
        )
        .await
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer_address(&self) -> Address {
        self.wallet.address()
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let call = json!({ "to": to, "data": data });
        self.rpc("eth_call", json!([call, "latest"])).await
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        self.rpc("eth_getBalance", json!([address, "latest"])).await
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.rpc("eth_gasPrice", json!([])).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<U256, ChainError> {
        let call = serde_json::to_value(tx).map_err(|e| ChainError::Decode {
            what: "transaction request".to_string(),
            reason: e.to_string(),
        })?;
        self.rpc("eth_estimateGas", json!([call])).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256, ChainError> {
        let from = self.wallet.address();
        let mut tx = tx.from(from).chain_id(self.chain_id);

        if tx.gas_price.is_none() {
            tx = tx.gas_price(self.gas_price().await?);
        }
        if tx.gas.is_none() {
            let estimate = self.estimate_gas(&tx).await?;
            tx = tx.gas(estimate);
        }

        match self.broadcast(tx).await {
            Ok(hash) => {
                debug!(?hash, "transaction broadcast");
                Ok(hash)
            }
            Err(err) => {
                // The node may have rejected the nonce itself; refetch it next time.
                warn!(error = %err, "broadcast failed, resetting nonce");
                self.nonce_manager.reset(from).await;
                Err(err)
            }
        }
    }

    async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt, ChainError> {
        let poll = async {
            loop {
                let receipt: Option<TransactionReceipt> =
                    self.rpc("eth_getTransactionReceipt", json!([hash])).await?;
                if let Some(receipt) = receipt {
                    return Ok(receipt);
                }
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.settings.receipt_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::ReceiptTimeout(hash, self.settings.receipt_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::client::receipt_succeeded;
    use mockito::{Matcher, Server};
    use std::str::FromStr;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn client(url: &str) -> EvmClient {
        let wallet = LocalWallet::from_str(KEY).unwrap();
        let settings = RpcSettings {
            request_timeout: Duration::from_secs(5),
            receipt_timeout: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
        };
        EvmClient::new(url, 137, wallet, settings).unwrap()
    }

    fn rpc_body(method: &str) -> Matcher {
        Matcher::PartialJson(json!({ "method": method }))
    }

    #[test]
    fn rejects_malformed_rpc_url() {
        let wallet = LocalWallet::from_str(KEY).unwrap();
        assert!(EvmClient::new("not a url", 137, wallet, RpcSettings::default()).is_err());
    }

    #[tokio::test]
    async fn gas_price_is_decoded_from_hex() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(rpc_body("eth_gasPrice"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x6fc23ac00"}"#)
            .create_async()
            .await;

        let price = client(&server.url()).gas_price().await.unwrap();
        assert_eq!(price, U256::from(30_000_000_000u64));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rpc_errors_are_surfaced() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(rpc_body("eth_estimateGas"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted"}}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .estimate_gas(&TransactionRequest::new())
            .await
            .unwrap_err();
        match err {
            ChainError::Rpc { code, message } => {
                assert_eq!(code, 3);
                assert_eq!(message, "execution reverted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chain_id_mismatch_is_reported() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(rpc_body("eth_chainId"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#)
            .create_async()
            .await;

        assert!(client(&server.url()).verify_chain_id().await.is_err());
    }

    #[tokio::test]
    async fn send_uses_pending_nonce_and_returns_hash() {
        let mut server = Server::new_async().await;
        let nonce = server
            .mock("POST", "/")
            .match_body(rpc_body("eth_getTransactionCount"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x7"}"#)
            .expect(1)
            .create_async()
            .await;
        let hash = "0x1111111111111111111111111111111111111111111111111111111111111111";
        server
            .mock("POST", "/")
            .match_body(rpc_body("eth_sendRawTransaction"))
            .with_body(format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{hash}"}}"#))
            .expect(2)
            .create_async()
            .await;

        let client = client(&server.url());
        let tx = TransactionRequest::new()
            .to(Address::repeat_byte(0x22))
            .gas(21_000u64)
            .gas_price(1u64);
        let first = client.send_transaction(tx.clone()).await.unwrap();
        client.send_transaction(tx).await.unwrap();

        assert_eq!(first, H256::from_str(hash).unwrap());
        // Second send reuses the cached nonce.
        nonce.assert_async().await;
    }

    #[tokio::test]
    async fn send_fills_missing_gas_price_and_limit() {
        let mut server = Server::new_async().await;
        let price = server
            .mock("POST", "/")
            .match_body(rpc_body("eth_gasPrice"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x6fc23ac00"}"#)
            .expect(1)
            .create_async()
            .await;
        let estimate = server
            .mock("POST", "/")
            .match_body(rpc_body("eth_estimateGas"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x5208"}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/")
            .match_body(rpc_body("eth_getTransactionCount"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x0"}"#)
            .create_async()
            .await;
        let hash = "0x2222222222222222222222222222222222222222222222222222222222222222";
        server
            .mock("POST", "/")
            .match_body(rpc_body("eth_sendRawTransaction"))
            .with_body(format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{hash}"}}"#))
            .expect(1)
            .create_async()
            .await;

        let tx = TransactionRequest::new().to(Address::repeat_byte(0x22)).value(1u64);
        let sent = client(&server.url()).send_transaction(tx).await.unwrap();

        assert_eq!(sent, H256::from_str(hash).unwrap());
        price.assert_async().await;
        estimate.assert_async().await;
    }

    #[tokio::test]
    async fn receipt_is_polled_until_mined() {
        let mut server = Server::new_async().await;
        let hash = H256::repeat_byte(0x33);
        let receipt = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "transactionHash": hash,
                "transactionIndex": "0x0",
                "blockHash": H256::repeat_byte(0x44),
                "blockNumber": "0x10",
                "from": Address::repeat_byte(0x55),
                "to": Address::repeat_byte(0x66),
                "cumulativeGasUsed": "0x5208",
                "gasUsed": "0x5208",
                "contractAddress": null,
                "logs": [],
                "logsBloom": format!("0x{}", "0".repeat(512)),
                "status": "0x1",
                "type": "0x0",
                "effectiveGasPrice": "0x1"
            }
        });
        server
            .mock("POST", "/")
            .match_body(rpc_body("eth_getTransactionReceipt"))
            .with_body(receipt.to_string())
            .create_async()
            .await;

        let mined = client(&server.url()).wait_for_receipt(hash).await.unwrap();
        assert_eq!(mined.transaction_hash, hash);
        assert!(receipt_succeeded(&mined));
    }

    #[tokio::test]
    async fn receipt_wait_times_out() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/")
            .match_body(rpc_body("eth_getTransactionReceipt"))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .wait_for_receipt(H256::repeat_byte(0x33))
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::ReceiptTimeout(..)));
        assert!(err.is_timeout());
    }
}
