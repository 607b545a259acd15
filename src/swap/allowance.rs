use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use tracing::{debug, info, warn};

use super::types::{ApprovalOutcome, TokenAddress};
use super::{SwapError, SwapStage};
use crate::blockchain::client::{receipt_succeeded, ChainClient, ChainError};
use crate::blockchain::services::token::erc20_approve_tx;

/// Reads and raises ERC-20 approvals for the signing account.
#[derive(Clone)]
pub struct AllowanceManager {
    chain: Arc<dyn ChainClient>,
}

impl AllowanceManager {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// Current approval of `spender` over `owner`'s `token`. The native coin
    /// needs no approval and reads as unlimited without touching the chain.
    pub async fn check_allowance(
        &self,
        token: TokenAddress,
        owner: Address,
        spender: Address,
    ) -> Result<U256, SwapError> {
        if token.is_native() {
            return Ok(U256::MAX);
        }
        self.chain
            .allowance(token.address(), owner, spender)
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    SwapError::Timeout {
                        stage: SwapStage::CheckingAllowance,
                    }
                } else {
                    SwapError::AllowanceCheckFailed(err)
                }
            })
    }

    /// Broadcasts `approve(spender, amount)` from the signer without waiting for inclusion.
    pub async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<H256, ChainError> {
        info!(token = ?token, spender = ?spender, %amount, "submitting token approval");
        self.chain
            .send_transaction(erc20_approve_tx(token, spender, amount))
            .await
    }

    /// Makes sure `spender` may move at least `required` of `token`. Raises
    /// the approval to the maximum and waits for it to be mined if not.
    pub async fn ensure_allowance(
        &self,
        token: TokenAddress,
        owner: Address,
        spender: Address,
        required: U256,
    ) -> Result<ApprovalOutcome, SwapError> {
        let current = self.check_allowance(token, owner, spender).await?;
        if current >= required {
            debug!(%current, %required, "allowance sufficient");
            return Ok(ApprovalOutcome::not_needed());
        }

        let tx_hash = self
            .approve(token.address(), spender, U256::MAX)
            .await
            .map_err(|err| SwapError::ApprovalFailed {
                tx_hash: None,
                reason: err.to_string(),
            })?;

        let receipt = self.chain.wait_for_receipt(tx_hash).await.map_err(|err| {
            if err.is_timeout() {
                SwapError::ApprovalTimeout { tx_hash }
            } else {
                SwapError::ApprovalFailed {
                    tx_hash: Some(tx_hash),
                    reason: err.to_string(),
                }
            }
        })?;

        if !receipt_succeeded(&receipt) {
            warn!(?tx_hash, "approval reverted");
            return Err(SwapError::ApprovalFailed {
                tx_hash: Some(tx_hash),
                reason: "approval transaction reverted".to_string(),
            });
        }

        info!(?tx_hash, "approval mined");
        Ok(ApprovalOutcome::raised(tx_hash))
    }
}
