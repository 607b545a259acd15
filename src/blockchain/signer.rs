// src/blockchain/signer.rs

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use ethers_signers::{coins_bip39::English, LocalWallet, MnemonicBuilder};
use secrecy::ExposeSecret;

use crate::config::Config;

/// Builds the signing wallet from `SEED_PHRASE` (account index 0) or `PRIVATE_KEY`.
pub fn load_signer(config: &Config) -> Result<LocalWallet> {
    if let Some(phrase) = &config.seed_phrase {
        return MnemonicBuilder::<English>::default()
            .phrase(phrase.expose_secret().trim())
            .index(0u32)
            .context("invalid derivation index")?
            .build()
            .context("failed to derive wallet from SEED_PHRASE");
    }

    let key = config
        .private_key
        .as_ref()
        .ok_or_else(|| anyhow!("Either SEED_PHRASE or PRIVATE_KEY must be set"))?;
    let key = key.expose_secret().trim();
    LocalWallet::from_str(key.strip_prefix("0x").unwrap_or(key))
        .map_err(|e| anyhow!("PRIVATE_KEY is not a valid secp256k1 key: {}", e))
}
