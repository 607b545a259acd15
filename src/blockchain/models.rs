// src/blockchain/models.rs
use ethers::types::H256;
use serde::{Deserialize, Serialize};

/// A broadcast transaction together with its explorer link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxLink {
    pub hash: H256,
    pub url: String,
}

impl TxLink {
    pub fn new(explorer_url: &str, hash: H256) -> Self {
        Self {
            hash,
            url: explorer_tx_url(explorer_url, hash),
        }
    }
}

pub fn explorer_tx_url(explorer_url: &str, hash: H256) -> String {
    format!("{}/tx/{:?}", explorer_url.trim_end_matches('/'), hash)
}
