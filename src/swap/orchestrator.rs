use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use ethers::types::TransactionRequest;
use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::allowance::AllowanceManager;
use super::gas::GasEstimator;
use super::quote::{normalize_token, resolve_api_key, QuoteResolver};
use super::types::{ApprovalOutcome, SubmittedTransaction, SwapIntent, SwapReport, SwapRequest};
use super::{SwapError, SwapStage};
use crate::blockchain::client::{receipt_succeeded, ChainClient};
use crate::blockchain::models::explorer_tx_url;
use crate::config::Config;

/// What to do when the router's allowance is below the swap amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowancePolicy {
    /// Approve the router for the maximum amount, wait for it, then swap.
    #[default]
    AutoApprove,
    /// Stop and tell the caller to run `approve_token` first.
    FailFast,
}

impl FromStr for AllowancePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto_approve" | "auto" => Ok(AllowancePolicy::AutoApprove),
            "fail_fast" | "manual" => Ok(AllowancePolicy::FailFast),
            other => Err(format!(
                "unknown allowance policy '{}', expected auto_approve or fail_fast",
                other
            )),
        }
    }
}

impl fmt::Display for AllowancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowancePolicy::AutoApprove => f.write_str("auto_approve"),
            AllowancePolicy::FailFast => f.write_str("fail_fast"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwapSettings {
    pub default_api_key: Option<SecretString>,
    pub allowance_policy: AllowancePolicy,
    pub wait_for_confirmation: bool,
    pub explorer_url: String,
}

impl SwapSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_api_key: config.one_inch_api_key.clone(),
            allowance_policy: config.allowance_policy,
            wait_for_confirmation: config.wait_for_confirmation,
            explorer_url: config.explorer_url.clone(),
        }
    }
}

/// Drives a swap from raw arguments to a broadcast transaction.
pub struct SwapOrchestrator {
    chain: Arc<dyn ChainClient>,
    quotes: QuoteResolver,
    allowances: AllowanceManager,
    gas: GasEstimator,
    settings: SwapSettings,
}

impl SwapOrchestrator {
    pub fn new(chain: Arc<dyn ChainClient>, quotes: QuoteResolver, settings: SwapSettings) -> Self {
        Self {
            allowances: AllowanceManager::new(chain.clone()),
            gas: GasEstimator::new(chain.clone()),
            chain,
            quotes,
            settings,
        }
    }

    pub fn allowances(&self) -> &AllowanceManager {
        &self.allowances
    }

    pub fn settings(&self) -> &SwapSettings {
        &self.settings
    }

    /// Executes one swap. Each call is independent; nothing is shared with
    /// concurrent swaps except the chain client's nonce sequencing.
    pub async fn swap(&self, req: SwapRequest) -> Result<SwapReport, SwapError> {
        let swap_id = Uuid::new_v4().to_string();
        let span = info_span!("swap", swap_id = %swap_id);
        let result = self.run(swap_id, req).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.in_scope(|| warn!(kind = err.kind(), stage = %err.stage(), error = %err, "swap failed"));
        }
        result
    }

    async fn run(&self, swap_id: String, req: SwapRequest) -> Result<SwapReport, SwapError> {
        debug!(stage = %SwapStage::Validating);
        let intent = SwapIntent::from_request(&req, self.chain.signer_address(), self.chain.chain_id())?;
        let api_key = resolve_api_key(req.api_key.as_ref(), self.settings.default_api_key.as_ref())?;

        debug!(stage = %SwapStage::Normalizing);
        let intent = SwapIntent {
            from_token: normalize_token(intent.chain_id, intent.from_token),
            to_token: normalize_token(intent.chain_id, intent.to_token),
            ..intent
        };

        debug!(stage = %SwapStage::Quoting, from = %intent.from_token, to = %intent.to_token, amount = %intent.amount);
        let quote = self.quotes.resolve_quote(&intent, &api_key).await?;
        info!(router = ?quote.destination, to_amount = %quote.to_amount, "quote received");

        let approval = if intent.from_token.is_native() {
            ApprovalOutcome::not_needed()
        } else {
            debug!(stage = %SwapStage::CheckingAllowance, spender = ?quote.destination);
            match self.settings.allowance_policy {
                AllowancePolicy::AutoApprove => {
                    self.allowances
                        .ensure_allowance(intent.from_token, intent.signer, quote.destination, intent.amount)
                        .await?
                }
                AllowancePolicy::FailFast => {
                    let current = self
                        .allowances
                        .check_allowance(intent.from_token, intent.signer, quote.destination)
                        .await?;
                    if current < intent.amount {
                        return Err(SwapError::InsufficientAllowance {
                            token: intent.from_token.address(),
                            spender: quote.destination,
                            required: intent.amount,
                            current,
                        });
                    }
                    ApprovalOutcome::not_needed()
                }
            }
        };

        debug!(stage = %SwapStage::EstimatingGas);
        let gas_limit = self.gas.ensure_gas(&quote, intent.signer).await;

        debug!(stage = %SwapStage::Submitting, gas = %gas_limit, value = %quote.native_value);
        let tx = TransactionRequest::new()
            .from(intent.signer)
            .to(quote.destination)
            .data(quote.call_data.clone())
            .value(quote.native_value)
            .gas(gas_limit);
        let hash = self
            .chain
            .send_transaction(tx)
            .await
            .map_err(|err| SwapError::SubmissionError {
                reason: err.to_string(),
                approval_tx: approval.tx_hash,
            })?;
        info!(?hash, "swap submitted");

        let confirmed = if self.settings.wait_for_confirmation {
            debug!(stage = %SwapStage::Confirming);
            let receipt = self.chain.wait_for_receipt(hash).await.map_err(|err| {
                warn!(error = %err, ?hash, "swap receipt unavailable");
                if err.is_timeout() {
                    SwapError::ConfirmationTimeout(hash)
                } else {
                    SwapError::ConfirmationFailed {
                        tx_hash: hash,
                        reason: err.to_string(),
                    }
                }
            })?;
            if !receipt_succeeded(&receipt) {
                return Err(SwapError::SwapReverted(hash));
            }
            Some(true)
        } else {
            None
        };

        debug!(stage = %SwapStage::Done);
        Ok(SwapReport {
            swap_id,
            transaction: SubmittedTransaction {
                hash,
                url: explorer_tx_url(&self.settings.explorer_url, hash),
                gas_limit,
            },
            from_token: quote.from_token,
            to_token: quote.to_token,
            from_amount: quote.from_amount,
            to_amount: quote.to_amount,
            estimated_gas: gas_limit,
            approval,
            confirmed,
            submitted_at: Utc::now(),
        })
    }
}
