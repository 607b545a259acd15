use std::sync::Arc;

use ethers::types::{Address, TransactionRequest, U256};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::Quote;
use crate::blockchain::client::{ChainClient, ChainError};

/// Gas limit used when the quote carries none and simulation fails.
pub const FALLBACK_GAS_LIMIT: u64 = 300_000;

const MARGIN_PERCENT: u64 = 120;

#[derive(Error, Debug)]
enum EstimationError {
    #[error("estimation failed: {0}")]
    Chain(#[from] ChainError),
    #[error("estimate {0} overflows when padded")]
    Overflow(U256),
}

/// `ceil(estimate * 1.2)` in integer arithmetic.
pub fn with_margin(estimate: U256) -> Option<U256> {
    let scaled = estimate.checked_mul(U256::from(MARGIN_PERCENT))?;
    let padded = scaled.checked_add(U256::from(99u8))? / U256::from(100u8);
    Some(padded)
}

/// Sizes the gas limit of a swap transaction.
#[derive(Clone)]
pub struct GasEstimator {
    chain: Arc<dyn ChainClient>,
}

impl GasEstimator {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    async fn estimate_padded(&self, quote: &Quote, signer: Address) -> Result<U256, EstimationError> {
        let tx = TransactionRequest::new()
            .from(signer)
            .to(quote.destination)
            .data(quote.call_data.clone())
            .value(quote.native_value);
        let estimate = self.chain.estimate_gas(&tx).await?;
        with_margin(estimate).ok_or(EstimationError::Overflow(estimate))
    }

    /// Returns the quote's own gas when positive; otherwise a padded live
    /// estimate, or [`FALLBACK_GAS_LIMIT`] if estimation fails for any reason.
    pub async fn ensure_gas(&self, quote: &Quote, signer: Address) -> U256 {
        if let Some(gas) = quote.suggested_gas.filter(|g| !g.is_zero()) {
            debug!(%gas, "using gas from quote");
            return gas;
        }

        match self.estimate_padded(quote, signer).await {
            Ok(gas) => {
                debug!(%gas, "estimated gas with 20% margin");
                gas
            }
            Err(err) => {
                warn!(error = %err, fallback = FALLBACK_GAS_LIMIT, "gas estimation failed, using fallback");
                U256::from(FALLBACK_GAS_LIMIT)
            }
        }
    }
}
