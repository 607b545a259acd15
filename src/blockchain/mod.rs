// src/blockchain/mod.rs

// Re-export the client module with EVM client
pub mod client;
pub use client::{ChainClient, ChainError, EvmClient};

pub mod evm_client;
pub mod models;
pub mod nonce_manager;
pub mod services;
pub mod signer;

// Re-export commonly used types
pub use ethers::{
    types::{Address, H256, U256, U64},
    utils::to_checksum,
};
