// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;

use crate::swap::AllowancePolicy;

pub const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";
pub const DEFAULT_ONE_INCH_API_URL: &str = "https://api.1inch.dev";
pub const DEFAULT_CHAIN_ID: u64 = 137;

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    // Chain settings
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: String,

    // Signing account; the seed phrase wins when both are set.
    pub seed_phrase: Option<SecretString>,
    pub private_key: Option<SecretString>,

    // 1inch
    pub one_inch_api_key: Option<SecretString>,
    pub one_inch_api_url: String,

    // Swap behaviour
    pub allowance_policy: AllowancePolicy,
    pub wait_for_confirmation: bool,

    // Timeouts
    pub rpc_timeout: Duration,
    pub quote_timeout: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            explorer_url: default_explorer_url(DEFAULT_CHAIN_ID).to_string(),
            seed_phrase: None,
            private_key: None,
            one_inch_api_key: None,
            one_inch_api_url: DEFAULT_ONE_INCH_API_URL.to_string(),
            allowance_policy: AllowancePolicy::default(),
            wait_for_confirmation: false,
            rpc_timeout: Duration::from_secs(30),
            quote_timeout: Duration::from_secs(15),
            receipt_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_millis(2000),
        }
    }
}

/// Block explorer used for transaction links when `EXPLORER_URL` is unset.
pub fn default_explorer_url(chain_id: u64) -> &'static str {
    match chain_id {
        1 => "https://etherscan.io",
        80002 => "https://amoy.polygonscan.com",
        _ => "https://polygonscan.com",
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("{} must be a valid value, got '{}'", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let chain_id: u64 = parse_var("CHAIN_ID", defaults.chain_id)?;
        if chain_id == 0 {
            return Err(anyhow!("CHAIN_ID must be greater than zero"));
        }

        let seed_phrase = non_empty_var("SEED_PHRASE").map(SecretString::new);
        let private_key = non_empty_var("PRIVATE_KEY").map(SecretString::new);
        if seed_phrase.is_none() && private_key.is_none() {
            return Err(anyhow!("Either SEED_PHRASE or PRIVATE_KEY must be set"));
        }

        let rpc_url = non_empty_var("RPC_URL").unwrap_or(defaults.rpc_url);
        url::Url::parse(&rpc_url).with_context(|| format!("RPC_URL is not a valid URL: {}", rpc_url))?;

        let one_inch_api_url = non_empty_var("ONE_INCH_API_URL").unwrap_or(defaults.one_inch_api_url);
        url::Url::parse(&one_inch_api_url)
            .with_context(|| format!("ONE_INCH_API_URL is not a valid URL: {}", one_inch_api_url))?;

        Ok(Config {
            port: parse_var("PORT", defaults.port).context("PORT must be a valid number")?,

            rpc_url,
            chain_id,
            explorer_url: non_empty_var("EXPLORER_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| default_explorer_url(chain_id).to_string()),

            seed_phrase,
            private_key,

            one_inch_api_key: non_empty_var("ONE_INCH_API_KEY").map(SecretString::new),
            one_inch_api_url,

            allowance_policy: parse_var("ALLOWANCE_POLICY", defaults.allowance_policy)?,
            wait_for_confirmation: parse_var("WAIT_FOR_CONFIRMATION", defaults.wait_for_confirmation)?,

            rpc_timeout: Duration::from_secs(parse_var("RPC_TIMEOUT_SECS", 30u64)?),
            quote_timeout: Duration::from_secs(parse_var("QUOTE_TIMEOUT_SECS", 15u64)?),
            receipt_timeout: Duration::from_secs(parse_var("RECEIPT_TIMEOUT_SECS", 120u64)?),
            receipt_poll_interval: Duration::from_millis(parse_var("RECEIPT_POLL_INTERVAL_MS", 2000u64)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explorer_defaults_follow_the_chain() {
        assert_eq!(default_explorer_url(1), "https://etherscan.io");
        assert_eq!(default_explorer_url(137), "https://polygonscan.com");
        assert_eq!(default_explorer_url(80002), "https://amoy.polygonscan.com");
    }

    #[test]
    fn defaults_target_polygon_without_waiting() {
        let config = Config::default();
        assert_eq!(config.chain_id, 137);
        assert_eq!(config.allowance_policy, AllowancePolicy::AutoApprove);
        assert!(!config.wait_for_confirmation);
        assert_eq!(config.receipt_timeout, Duration::from_secs(120));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = Config {
            private_key: Some(SecretString::new("deadbeef".to_string())),
            ..Config::default()
        };
        assert!(!format!("{:?}", config).contains("deadbeef"));
    }
}
