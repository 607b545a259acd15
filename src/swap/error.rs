use ethers::types::{Address, H256, U256};
use thiserror::Error;

use super::SwapStage;
use crate::blockchain::client::ChainError;

fn approval_note(approval_tx: &Option<H256>) -> String {
    match approval_tx {
        Some(hash) => format!(" (approval {:?} was already mined)", hash),
        None => String::new(),
    }
}

/// Everything that can end a swap early.
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Invalid {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Invalid amount '{0}': expected a positive integer in the token's smallest unit")]
    InvalidAmount(String),

    #[error("Invalid slippage {0}: must be between 0 and 50 percent")]
    InvalidSlippage(f64),

    #[error("Chain {requested} is not supported: this server is connected to chain {connected}")]
    UnsupportedChain { requested: u64, connected: u64 },

    #[error("fromAddress {requested:?} does not match the signing account {signer:?}")]
    SignerMismatch { requested: Address, signer: Address },

    #[error("API key is required for 1inch swap")]
    CredentialsMissing,

    #[error("1inch API returned {status}: {body}")]
    QuoteUnavailable { status: u16, body: String },

    #[error("1inch API could not be reached: {0}")]
    QuoteNetworkError(String),

    #[error("Could not build the 1inch request: {0}")]
    QuoteRequestInvalid(String),

    #[error("1inch API returned an unexpected body: {0}")]
    QuoteMalformed(String),

    #[error("Failed to read token allowance: {0}")]
    AllowanceCheckFailed(#[source] ChainError),

    #[error(
        "Insufficient token approval. Please use the approve_token tool first with these parameters:\n\
         - tokenAddress: {token:?}\n\
         - spenderAddress: {spender:?}\n\
         - amount: at least {required} wei (current allowance: {current})"
    )]
    InsufficientAllowance {
        token: Address,
        spender: Address,
        required: U256,
        current: U256,
    },

    #[error("Token approval failed: {reason}")]
    ApprovalFailed { tx_hash: Option<H256>, reason: String },

    #[error("Token approval {tx_hash:?} was not mined in time")]
    ApprovalTimeout { tx_hash: H256 },

    #[error("Swap transaction was rejected: {reason}{}", approval_note(.approval_tx))]
    SubmissionError {
        reason: String,
        approval_tx: Option<H256>,
    },

    #[error("Swap transaction {0:?} reverted")]
    SwapReverted(H256),

    #[error("Swap transaction {0:?} was not mined in time")]
    ConfirmationTimeout(H256),

    #[error("Could not confirm swap transaction {tx_hash:?}: {reason}")]
    ConfirmationFailed { tx_hash: H256, reason: String },

    #[error("Timed out while {stage}")]
    Timeout { stage: SwapStage },
}

impl SwapError {
    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::InvalidAddress { .. } => "InvalidAddress",
            SwapError::InvalidAmount(_) => "InvalidAmount",
            SwapError::InvalidSlippage(_) => "InvalidSlippage",
            SwapError::UnsupportedChain { .. } => "UnsupportedChain",
            SwapError::SignerMismatch { .. } => "SignerMismatch",
            SwapError::CredentialsMissing => "CredentialsMissing",
            SwapError::QuoteUnavailable { .. } => "QuoteUnavailable",
            SwapError::QuoteNetworkError(_) => "QuoteNetworkError",
            SwapError::QuoteRequestInvalid(_) => "QuoteRequestInvalid",
            SwapError::QuoteMalformed(_) => "QuoteMalformed",
            SwapError::AllowanceCheckFailed(_) => "AllowanceCheckFailed",
            SwapError::InsufficientAllowance { .. } => "InsufficientAllowance",
            SwapError::ApprovalFailed { .. } => "ApprovalFailed",
            SwapError::ApprovalTimeout { .. } => "ApprovalTimeout",
            SwapError::SubmissionError { .. } => "SubmissionError",
            SwapError::SwapReverted(_) => "SwapReverted",
            SwapError::ConfirmationTimeout(_) => "ConfirmationTimeout",
            SwapError::ConfirmationFailed { .. } => "ConfirmationFailed",
            SwapError::Timeout { .. } => "Timeout",
        }
    }

    /// Stage of the swap the error belongs to.
    pub fn stage(&self) -> SwapStage {
        match self {
            SwapError::InvalidAddress { .. }
            | SwapError::InvalidAmount(_)
            | SwapError::InvalidSlippage(_)
            | SwapError::UnsupportedChain { .. }
            | SwapError::SignerMismatch { .. }
            | SwapError::CredentialsMissing => SwapStage::Validating,
            SwapError::QuoteUnavailable { .. }
            | SwapError::QuoteNetworkError(_)
            | SwapError::QuoteRequestInvalid(_)
            | SwapError::QuoteMalformed(_) => SwapStage::Quoting,
            SwapError::AllowanceCheckFailed(_) | SwapError::InsufficientAllowance { .. } => {
                SwapStage::CheckingAllowance
            }
            SwapError::ApprovalFailed { .. } | SwapError::ApprovalTimeout { .. } => {
                SwapStage::Approving
            }
            SwapError::SubmissionError { .. } => SwapStage::Submitting,
            SwapError::SwapReverted(_)
            | SwapError::ConfirmationTimeout(_)
            | SwapError::ConfirmationFailed { .. } => SwapStage::Confirming,
            SwapError::Timeout { stage } => *stage,
        }
    }

    /// Caller mistakes detected before any network traffic.
    pub fn is_validation(&self) -> bool {
        self.stage() == SwapStage::Validating
    }

    /// Hash of an approval or swap transaction that made it on-chain before the failure.
    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            SwapError::ApprovalFailed { tx_hash, .. } => *tx_hash,
            SwapError::ApprovalTimeout { tx_hash } => Some(*tx_hash),
            SwapError::SubmissionError { approval_tx, .. } => *approval_tx,
            SwapError::SwapReverted(hash)
            | SwapError::ConfirmationTimeout(hash)
            | SwapError::ConfirmationFailed { tx_hash: hash, .. } => Some(*hash),
            _ => None,
        }
    }
}
