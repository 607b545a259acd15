//! 1inch swap orchestration.
//!
//! A swap runs strictly in order through validation, token normalization,
//! quoting, allowance reconciliation, gas sizing and submission. Every
//! failure is a [`SwapError`] tagged with the [`SwapStage`] it occurred in.

use std::fmt;

use serde::Serialize;

pub mod allowance;
pub mod error;
pub mod gas;
pub mod orchestrator;
pub mod quote;
pub mod types;

pub use allowance::AllowanceManager;
pub use error::SwapError;
pub use gas::GasEstimator;
pub use orchestrator::{AllowancePolicy, SwapOrchestrator, SwapSettings};
pub use quote::QuoteResolver;
pub use types::{SwapReport, SwapRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStage {
    Validating,
    Normalizing,
    Quoting,
    CheckingAllowance,
    Approving,
    EstimatingGas,
    Submitting,
    Confirming,
    Done,
}

impl SwapStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStage::Validating => "validating",
            SwapStage::Normalizing => "normalizing",
            SwapStage::Quoting => "quoting",
            SwapStage::CheckingAllowance => "checking_allowance",
            SwapStage::Approving => "approving",
            SwapStage::EstimatingGas => "estimating_gas",
            SwapStage::Submitting => "submitting",
            SwapStage::Confirming => "confirming",
            SwapStage::Done => "done",
        }
    }
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
