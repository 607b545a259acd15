use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use ethers::types::{Address, Bytes, H160, U256};
use lazy_static::lazy_static;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::types::{Quote, SwapIntent, TokenAddress};
use super::{SwapError, SwapStage};
use crate::utils::lenient_u256;

/// Bridged USDC.e on Polygon PoS.
pub const POLYGON_USDC_E: Address = H160([
    0x27, 0x91, 0xbc, 0xa1, 0xf2, 0xde, 0x46, 0x61, 0xed, 0x88, 0xa3, 0x0c, 0x99, 0xa7, 0xa9, 0x44,
    0x9a, 0xa8, 0x41, 0x74,
]);

/// Circle-issued USDC on Polygon PoS.
pub const POLYGON_USDC: Address = H160([
    0x3c, 0x49, 0x9c, 0x54, 0x2c, 0xef, 0x5e, 0x38, 0x11, 0xe1, 0x19, 0x2c, 0xe7, 0x0d, 0x8c, 0xc0,
    0x3d, 0x5c, 0x33, 0x59,
]);

lazy_static! {
    // (chain id, address) -> canonical address. Targets must never appear as keys.
    static ref EQUIVALENT_TOKENS: HashMap<(u64, Address), Address> = {
        let mut m = HashMap::new();
        m.insert((137, POLYGON_USDC_E), POLYGON_USDC);
        m
    };
}

/// Maps known equivalent assets on `chain_id` to their canonical address.
/// Unmapped tokens pass through unchanged.
pub fn normalize_token(chain_id: u64, token: TokenAddress) -> TokenAddress {
    match EQUIVALENT_TOKENS.get(&(chain_id, token.address())) {
        Some(canonical) => {
            let canonical = TokenAddress::from(*canonical);
            info!(from = %token, to = %canonical, chain_id, "replaced token with its canonical equivalent");
            canonical
        }
        None => token,
    }
}

/// Picks the per-call API key over the process default. Blank keys count as absent.
pub fn resolve_api_key(
    per_call: Option<&SecretString>,
    default: Option<&SecretString>,
) -> Result<SecretString, SwapError> {
    per_call
        .into_iter()
        .chain(default)
        .find(|key| !key.expose_secret().trim().is_empty())
        .map(|key| SecretString::new(key.expose_secret().trim().to_string()))
        .ok_or(SwapError::CredentialsMissing)
}

fn key_prefix(key: &SecretString) -> String {
    key.expose_secret().chars().take(3).collect()
}

#[derive(Debug, Deserialize)]
struct SwapTx {
    to: Address,
    data: Bytes,
    #[serde(default, deserialize_with = "lenient_u256")]
    value: U256,
    #[serde(default, deserialize_with = "lenient_u256")]
    gas: U256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    #[serde(default, alias = "srcAmount", deserialize_with = "lenient_u256")]
    from_amount: U256,
    #[serde(alias = "dstAmount", deserialize_with = "lenient_u256")]
    to_amount: U256,
    #[serde(default)]
    from_token: Value,
    #[serde(default)]
    to_token: Value,
    #[serde(default)]
    protocols: Option<Value>,
    tx: SwapTx,
}

/// Client for the 1inch swap endpoint.
#[derive(Clone)]
pub struct QuoteResolver {
    http: Client,
    base_url: String,
}

impl QuoteResolver {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        url::Url::parse(base_url).with_context(|| format!("invalid 1inch API URL '{}'", base_url))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn classify(err: reqwest::Error) -> SwapError {
        if err.is_timeout() {
            SwapError::Timeout {
                stage: SwapStage::Quoting,
            }
        } else if err.is_builder() {
            SwapError::QuoteRequestInvalid(err.to_string())
        } else {
            SwapError::QuoteNetworkError(err.to_string())
        }
    }

    /// Fetches an executable swap route for `intent`. Exactly one GET, no retries.
    pub async fn resolve_quote(&self, intent: &SwapIntent, api_key: &SecretString) -> Result<Quote, SwapError> {
        let endpoint = format!("{}/swap/v6.0/{}/swap", self.base_url, intent.chain_id);
        let mut url = url::Url::parse(&endpoint).map_err(|e| SwapError::QuoteRequestInvalid(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("src", &intent.from_token.to_string())
            .append_pair("dst", &intent.to_token.to_string())
            .append_pair("amount", &intent.amount.to_string())
            .append_pair("from", &ethers::utils::to_checksum(&intent.signer, None))
            .append_pair("slippage", &intent.slippage_percent.to_string())
            .append_pair("disableEstimate", "true");

        debug!(
            url = %url,
            authorization = %format!("Bearer {}...", key_prefix(api_key)),
            "requesting 1inch swap"
        );

        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(api_key.expose_secret())
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        let body = response.text().await.map_err(Self::classify)?;
        if !status.is_success() {
            return Err(SwapError::QuoteUnavailable {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SwapResponse =
            serde_json::from_str(&body).map_err(|e| SwapError::QuoteMalformed(e.to_string()))?;
        if let Some(protocols) = &parsed.protocols {
            debug!(%protocols, "1inch route");
        }

        Ok(Quote {
            destination: parsed.tx.to,
            call_data: parsed.tx.data,
            native_value: parsed.tx.value,
            suggested_gas: Some(parsed.tx.gas).filter(|g| !g.is_zero()),
            from_amount: if parsed.from_amount.is_zero() {
                intent.amount
            } else {
                parsed.from_amount
            },
            to_amount: parsed.to_amount,
            from_token: parsed.from_token,
            to_token: parsed.to_token,
            protocols: parsed.protocols,
        })
    }
}
