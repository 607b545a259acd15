use anyhow::{Context, Result};
use ethers_core::types::U256;
use tracing::info;

use crate::blockchain::client::ChainClient;
use crate::blockchain::services::token::format_amount;

const GWEI_DECIMALS: u32 = 9;

/// Current gas price rendered as `"<n> Gwei"`.
pub async fn gas_price_gwei(chain: &dyn ChainClient) -> Result<String> {
    let price = chain.gas_price().await.context("eth_gasPrice failed")?;
    info!(wei = %price, "fetched gas price");
    format_gwei(price)
}

pub fn format_gwei(wei: U256) -> Result<String> {
    Ok(format!("{} Gwei", format_amount(wei, GWEI_DECIMALS)?))
}
