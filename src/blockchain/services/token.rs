// src/blockchain/services/token.rs

use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use ethers::utils::{format_units, keccak256, parse_units};
use ethers_core::abi::{decode, encode, ParamType, Token};

use crate::blockchain::client::ChainClient;

fn selector(sig: &str) -> [u8; 4] {
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&keccak256(sig.as_bytes())[0..4]);
    sel
}

/// ABI-encodes a call to `sig` with `tokens` as arguments.
pub fn encode_call(sig: &str, tokens: Vec<Token>) -> Bytes {
    let mut out = selector(sig).to_vec();
    out.extend(encode(&tokens));
    Bytes::from(out)
}

pub fn decode_u256(raw: &[u8]) -> Option<U256> {
    match decode(&[ParamType::Uint(256)], raw).ok()?.first() {
        Some(Token::Uint(n)) => Some(*n),
        _ => None,
    }
}

pub fn allowance_call(owner: Address, spender: Address) -> Bytes {
    encode_call(
        "allowance(address,address)",
        vec![Token::Address(owner), Token::Address(spender)],
    )
}

pub fn balance_of_call(owner: Address) -> Bytes {
    encode_call("balanceOf(address)", vec![Token::Address(owner)])
}

pub fn decimals_call() -> Bytes {
    encode_call("decimals()", vec![])
}

pub fn erc20_transfer_tx(token: Address, to: Address, amount: U256) -> TransactionRequest {
    let data = encode_call(
        "transfer(address,uint256)",
        vec![Token::Address(to), Token::Uint(amount)],
    );
    TransactionRequest::new().to(token).data(data)
}

pub fn erc20_approve_tx(token: Address, spender: Address, amount: U256) -> TransactionRequest {
    let data = encode_call(
        "approve(address,uint256)",
        vec![Token::Address(spender), Token::Uint(amount)],
    );
    TransactionRequest::new().to(token).data(data)
}

/// Renders a wei-style integer with `decimals` places, without trailing zeros.
pub fn format_amount(amount: U256, decimals: u32) -> Result<String> {
    let formatted = format_units(amount, decimals)
        .map_err(|e| anyhow!("failed to format amount {}: {}", amount, e))?;
    if formatted.contains('.') {
        Ok(formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string())
    } else {
        Ok(formatted)
    }
}

pub async fn erc20_decimals(chain: &dyn ChainClient, token: Address) -> Result<u32> {
    let raw = chain
        .call(token, decimals_call())
        .await
        .with_context(|| format!("decimals() call on {:?} failed", token))?;
    let decimals = decode_u256(&raw).ok_or_else(|| anyhow!("decimals() returned malformed data"))?;
    if decimals > U256::from(77u8) {
        return Err(anyhow!("token reports implausible decimals: {}", decimals));
    }
    Ok(decimals.as_u32())
}

/// Balance of `owner` in `token`, formatted with the token's decimals.
pub async fn erc20_balance(chain: &dyn ChainClient, token: Address, owner: Address) -> Result<String> {
    let raw = chain
        .call(token, balance_of_call(owner))
        .await
        .with_context(|| format!("balanceOf() call on {:?} failed", token))?;
    let balance = decode_u256(&raw).ok_or_else(|| anyhow!("balanceOf() returned malformed data"))?;
    let decimals = erc20_decimals(chain, token).await?;
    format_amount(balance, decimals)
}

/// Sends `amount` (human units, scaled by the token's decimals) of `token` to `to`.
pub async fn erc20_transfer(
    chain: &dyn ChainClient,
    token: Address,
    to: Address,
    amount: &str,
) -> Result<H256> {
    let decimals = erc20_decimals(chain, token).await?;
    let atomic: U256 = parse_units(amount, decimals)
        .map_err(|e| anyhow!("invalid amount '{}': {}", amount, e))?
        .into();
    let tx = erc20_transfer_tx(token, to, atomic);
    chain
        .send_transaction(tx)
        .await
        .context("ERC20 transfer failed")
}
