//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{
    Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256, U64,
};
use ethers::utils::keccak256;
use ethers_core::abi::{encode, Token};

use crate::blockchain::client::{ChainClient, ChainError};

pub(crate) const TEST_CHAIN_ID: u64 = 137;

/// What `wait_for_receipt` answers with.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ReceiptBehaviour {
    Success,
    Reverted,
    Timeout,
    Unavailable,
}

/// Scripted in-memory chain with per-capability call counters.
pub(crate) struct MockChain {
    signer: Address,
    chain_id: u64,
    allowance: Mutex<Option<U256>>,
    call_results: Mutex<HashMap<[u8; 4], U256>>,
    estimate: Mutex<Option<U256>>,
    send_failure: Mutex<Option<(usize, String)>>,
    receipt: Mutex<ReceiptBehaviour>,
    sent: Mutex<Vec<TransactionRequest>>,
    pub calls: AtomicUsize,
    pub allowance_reads: AtomicUsize,
    pub estimates: AtomicUsize,
    pub sends: AtomicUsize,
    pub receipt_waits: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            signer: Address::repeat_byte(0xa1),
            chain_id: TEST_CHAIN_ID,
            allowance: Mutex::new(Some(U256::zero())),
            call_results: Mutex::new(HashMap::new()),
            estimate: Mutex::new(Some(U256::from(21_000u64))),
            send_failure: Mutex::new(None),
            receipt: Mutex::new(ReceiptBehaviour::Success),
            sent: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            allowance_reads: AtomicUsize::new(0),
            estimates: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            receipt_waits: AtomicUsize::new(0),
        }
    }

    /// `None` makes allowance reads fail.
    pub fn set_allowance(&self, allowance: Option<U256>) {
        *self.allowance.lock().unwrap() = allowance;
    }

    /// Answers `eth_call`s whose selector matches `signature` with `value`.
    pub fn set_call_result(&self, signature: &str, value: U256) {
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&keccak256(signature.as_bytes())[..4]);
        self.call_results.lock().unwrap().insert(selector, value);
    }

    /// `None` makes gas estimation fail as if the call would revert.
    pub fn set_estimate(&self, estimate: Option<U256>) {
        *self.estimate.lock().unwrap() = estimate;
    }

    pub fn fail_sends(&self, reason: &str) {
        self.fail_sends_from(0, reason);
    }

    /// Lets the first `index` sends through and rejects every later one.
    pub fn fail_sends_from(&self, index: usize, reason: &str) {
        *self.send_failure.lock().unwrap() = Some((index, reason.to_string()));
    }

    pub fn set_receipt(&self, behaviour: ReceiptBehaviour) {
        *self.receipt.lock().unwrap() = behaviour;
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Every chain interaction of any kind.
    pub fn total_interactions(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
            + self.allowance_reads.load(Ordering::SeqCst)
            + self.estimates.load(Ordering::SeqCst)
            + self.sends.load(Ordering::SeqCst)
            + self.receipt_waits.load(Ordering::SeqCst)
    }

    pub fn tx_hash(index: usize) -> H256 {
        H256::from_low_u64_be(0xbeef_0000 + index as u64)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        match self.call_results.lock().unwrap().get(&selector) {
            Some(value) => Ok(Bytes::from(encode(&[Token::Uint(*value)]))),
            None => Err(ChainError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
            }),
        }
    }

    async fn balance(&self, _address: Address) -> Result<U256, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(U256::exp10(18))
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(U256::from(30_000_000_000u64))
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<U256, ChainError> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        self.estimate.lock().unwrap().ok_or_else(|| ChainError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
        })
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256, ChainError> {
        let index = self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some((from, reason)) = self.send_failure.lock().unwrap().clone() {
            if index >= from {
                return Err(ChainError::Rpc {
                    code: -32000,
                    message: reason,
                });
            }
        }
        self.sent.lock().unwrap().push(tx);
        Ok(Self::tx_hash(index))
    }

    async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt, ChainError> {
        self.receipt_waits.fetch_add(1, Ordering::SeqCst);
        let status = match *self.receipt.lock().unwrap() {
            ReceiptBehaviour::Success => 1u64,
            ReceiptBehaviour::Reverted => 0u64,
            ReceiptBehaviour::Timeout => {
                return Err(ChainError::ReceiptTimeout(hash, Duration::from_secs(1)))
            }
            ReceiptBehaviour::Unavailable => {
                return Err(ChainError::Transport("connection reset".to_string()))
            }
        };
        Ok(TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::from(status)),
            ..Default::default()
        })
    }

    async fn allowance(
        &self,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256, ChainError> {
        self.allowance_reads.fetch_add(1, Ordering::SeqCst);
        (*self.allowance.lock().unwrap()).ok_or_else(|| ChainError::Rpc {
            code: 3,
            message: "execution reverted".to_string(),
        })
    }
}
