use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H160, H256, U256};
use ethers::utils::to_checksum;
use secrecy::SecretString;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use validator::Validate;

use super::SwapError;
use crate::utils::{parse_u256, serialize_decimal, string_or_number};

/// 1inch's placeholder for the chain's native coin.
pub const NATIVE_TOKEN: Address = H160([0xee; 20]);

const DEFAULT_SLIPPAGE_PERCENT: f64 = 1.0;

/// Parses a `0x`-prefixed 20-byte address. Mixed-case input must carry a
/// valid EIP-55 checksum; all-lower and all-upper input is accepted as is.
pub fn parse_address(field: &'static str, input: &str) -> Result<Address, SwapError> {
    let invalid = || SwapError::InvalidAddress {
        field,
        value: input.to_string(),
    };

    let trimmed = input.trim();
    let hex_part = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let address = Address::from_str(hex_part).map_err(|_| invalid())?;

    // The native sentinel is matched case-insensitively.
    if address == NATIVE_TOKEN {
        return Ok(address);
    }

    let has_lower = hex_part.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex_part.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None)[2..] != *hex_part {
        return Err(invalid());
    }
    Ok(address)
}

/// A validated token identifier, either an ERC-20 contract or the native sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAddress(Address);

impl TokenAddress {
    pub fn parse(field: &'static str, input: &str) -> Result<Self, SwapError> {
        parse_address(field, input).map(TokenAddress)
    }

    pub fn address(&self) -> Address {
        self.0
    }

    pub fn is_native(&self) -> bool {
        self.0 == NATIVE_TOKEN
    }
}

impl From<Address> for TokenAddress {
    fn from(address: Address) -> Self {
        TokenAddress(address)
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_checksum(&self.0, None))
    }
}

impl Serialize for TokenAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn default_slippage() -> f64 {
    DEFAULT_SLIPPAGE_PERCENT
}

/// Raw `inch_swap` arguments as received from the caller.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub from_token_address: String,
    pub to_token_address: String,
    /// Amount of `from_token_address` in its smallest unit.
    #[serde(deserialize_with = "string_or_number")]
    pub amount: String,
    #[serde(default)]
    pub from_address: Option<String>,
    /// Percent, `1` meaning 1%.
    #[serde(default = "default_slippage")]
    #[validate(range(min = 0.0, max = 50.0))]
    pub slippage: f64,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

impl SwapRequest {
    pub fn new(from_token: &str, to_token: &str, amount: &str) -> Self {
        Self {
            from_token_address: from_token.to_string(),
            to_token_address: to_token.to_string(),
            amount: amount.to_string(),
            from_address: None,
            slippage: DEFAULT_SLIPPAGE_PERCENT,
            api_key: None,
            chain_id: None,
        }
    }
}

/// A validated, immutable swap request.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapIntent {
    pub from_token: TokenAddress,
    pub to_token: TokenAddress,
    pub amount: U256,
    pub signer: Address,
    /// Percent as supplied by the caller, `1.0` meaning 1%.
    pub slippage_percent: f64,
    pub chain_id: u64,
}

impl SwapIntent {
    /// Validates `req` against the signing account and the connected chain.
    /// Performs no I/O.
    pub fn from_request(req: &SwapRequest, signer: Address, connected_chain: u64) -> Result<Self, SwapError> {
        let from_token = TokenAddress::parse("fromTokenAddress", &req.from_token_address)?;
        let to_token = TokenAddress::parse("toTokenAddress", &req.to_token_address)?;

        if let Some(from) = req.from_address.as_deref().filter(|s| !s.trim().is_empty()) {
            let requested = parse_address("fromAddress", from)?;
            if requested != signer {
                return Err(SwapError::SignerMismatch { requested, signer });
            }
        }

        let raw_amount = req.amount.trim();
        let amount = if raw_amount.starts_with("0x") {
            None
        } else {
            parse_u256(raw_amount)
        }
        .filter(|a| !a.is_zero())
        .ok_or_else(|| SwapError::InvalidAmount(req.amount.clone()))?;

        if !req.slippage.is_finite() || req.validate().is_err() {
            return Err(SwapError::InvalidSlippage(req.slippage));
        }

        let chain_id = req.chain_id.unwrap_or(connected_chain);
        if chain_id == 0 || chain_id != connected_chain {
            return Err(SwapError::UnsupportedChain {
                requested: chain_id,
                connected: connected_chain,
            });
        }

        Ok(SwapIntent {
            from_token,
            to_token,
            amount,
            signer,
            slippage_percent: req.slippage,
            chain_id,
        })
    }
}

/// Executable route returned by the quote service.
#[derive(Debug, Clone)]
pub struct Quote {
    pub destination: Address,
    pub call_data: Bytes,
    pub native_value: U256,
    pub suggested_gas: Option<U256>,
    pub from_amount: U256,
    pub to_amount: U256,
    pub from_token: Value,
    pub to_token: Value,
    pub protocols: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub raised: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,
}

impl ApprovalOutcome {
    pub fn not_needed() -> Self {
        Self {
            raised: false,
            tx_hash: None,
        }
    }

    pub fn raised(tx_hash: H256) -> Self {
        Self {
            raised: true,
            tx_hash: Some(tx_hash),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTransaction {
    pub hash: H256,
    pub url: String,
    #[serde(serialize_with = "serialize_decimal")]
    pub gas_limit: U256,
}

/// What a successful swap reports back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapReport {
    pub swap_id: String,
    #[serde(flatten)]
    pub transaction: SubmittedTransaction,
    pub from_token: Value,
    pub to_token: Value,
    #[serde(serialize_with = "serialize_decimal")]
    pub from_amount: U256,
    #[serde(serialize_with = "serialize_decimal")]
    pub to_amount: U256,
    /// Gas limit the swap was submitted with, after padding.
    #[serde(serialize_with = "serialize_decimal")]
    pub estimated_gas: U256,
    pub approval: ApprovalOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    pub submitted_at: DateTime<Utc>,
}
