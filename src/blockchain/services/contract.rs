// src/blockchain/services/contract.rs

use anyhow::{anyhow, Context, Result};
use ethers::types::{Bytes, TransactionRequest, H256, I256, U256};
use ethers::utils::to_checksum;
use ethers_core::abi::{Abi, Function, Param, ParamType, StateMutability, Token};
use serde_json::{json, Value};
use tracing::debug;

use crate::blockchain::client::ChainClient;
use crate::swap::types::parse_address;

/// Result of `call_contract`: read-only functions return decoded output,
/// state-changing ones return the transaction hash.
#[derive(Debug)]
pub enum ContractCallOutcome {
    Read(Value),
    Sent(H256),
}

pub fn parse_abi(abi: &Value) -> Result<Abi> {
    // Accept both a JSON array and a JSON string holding one.
    match abi {
        Value::String(raw) => serde_json::from_str(raw).context("invalid ABI JSON"),
        other => serde_json::from_value(other.clone()).context("invalid ABI JSON"),
    }
}

fn select_function<'a>(abi: &'a Abi, name: &str, arg_count: usize) -> Result<&'a Function> {
    let candidates = abi
        .functions_by_name(name)
        .map_err(|_| anyhow!("function '{}' not found in ABI", name))?;
    candidates
        .iter()
        .find(|f| f.inputs.len() == arg_count)
        .ok_or_else(|| anyhow!("no overload of '{}' takes {} arguments", name, arg_count))
}

/// Calls `function_name` on `contract`. `view`/`pure` functions go through
/// `eth_call`; everything else is signed and broadcast.
pub async fn call_contract(
    chain: &dyn ChainClient,
    contract: &str,
    abi: &Value,
    function_name: &str,
    args: &[Value],
    value: U256,
) -> Result<ContractCallOutcome> {
    let contract = parse_address("contractAddress", contract)?;
    let abi = parse_abi(abi)?;
    let function = select_function(&abi, function_name, args.len())?;
    let tokens = coerce_tokens(&function.inputs, args)?;
    let data = Bytes::from(function.encode_input(&tokens).context("failed to encode call")?);

    match function.state_mutability {
        StateMutability::View | StateMutability::Pure => {
            let raw = chain
                .call(contract, data)
                .await
                .with_context(|| format!("{}() call failed", function_name))?;
            let decoded = function
                .decode_output(&raw)
                .with_context(|| format!("failed to decode {}() output", function_name))?;
            let mut values: Vec<Value> = decoded.into_iter().map(token_to_json).collect();
            let out = if values.len() == 1 {
                values.remove(0)
            } else {
                Value::Array(values)
            };
            Ok(ContractCallOutcome::Read(out))
        }
        _ => {
            debug!(function = function_name, "sending state-changing contract call");
            let tx = TransactionRequest::new().to(contract).data(data).value(value);
            let hash = chain
                .send_transaction(tx)
                .await
                .with_context(|| format!("{}() transaction failed", function_name))?;
            Ok(ContractCallOutcome::Sent(hash))
        }
    }
}

/// Deploys `bytecode`, ABI-encoding `constructor_args` against the ABI's constructor.
pub async fn deploy_contract(
    chain: &dyn ChainClient,
    bytecode: &str,
    abi: Option<&Value>,
    constructor_args: &[Value],
    value: U256,
) -> Result<H256> {
    let code = hex::decode(bytecode.trim().trim_start_matches("0x"))
        .context("bytecode must be hex")?;
    if code.is_empty() {
        return Err(anyhow!("bytecode is empty"));
    }

    let constructor = match abi {
        Some(abi) => parse_abi(abi)?.constructor,
        None => None,
    };
    let init_code = match constructor {
        Some(constructor) => {
            let tokens = coerce_tokens(&constructor.inputs, constructor_args)?;
            constructor
                .encode_input(code, &tokens)
                .context("failed to encode constructor arguments")?
        }
        None if constructor_args.is_empty() => code,
        None => return Err(anyhow!("constructor arguments given but the ABI has no constructor")),
    };

    let tx = TransactionRequest::new().data(Bytes::from(init_code)).value(value);
    chain
        .send_transaction(tx)
        .await
        .context("contract deployment failed")
}

/// Converts loosely typed JSON arguments into ABI tokens for `params`.
pub fn coerce_tokens(params: &[Param], args: &[Value]) -> Result<Vec<Token>> {
    if params.len() != args.len() {
        return Err(anyhow!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        ));
    }
    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            coerce_token(&param.kind, arg)
                .with_context(|| format!("invalid value for parameter '{}'", param.name))
        })
        .collect()
}

fn value_as_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn coerce_token(kind: &ParamType, value: &Value) -> Result<Token> {
    match kind {
        ParamType::Address => {
            let raw = value_as_str(value).ok_or_else(|| anyhow!("expected address string"))?;
            Ok(Token::Address(parse_address("argument", &raw)?))
        }
        ParamType::Uint(_) => {
            let raw = value_as_str(value).ok_or_else(|| anyhow!("expected unsigned integer"))?;
            let n = if let Some(hex) = raw.strip_prefix("0x") {
                U256::from_str_radix(hex, 16)?
            } else {
                U256::from_dec_str(&raw)?
            };
            Ok(Token::Uint(n))
        }
        ParamType::Int(_) => {
            let raw = value_as_str(value).ok_or_else(|| anyhow!("expected integer"))?;
            let n = I256::from_dec_str(&raw).map_err(|e| anyhow!("{}", e))?;
            Ok(Token::Int(n.into_raw()))
        }
        ParamType::Bool => match value {
            Value::Bool(b) => Ok(Token::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Token::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Token::Bool(false)),
            _ => Err(anyhow!("expected boolean")),
        },
        ParamType::String => match value {
            Value::String(s) => Ok(Token::String(s.clone())),
            other => Ok(Token::String(other.to_string())),
        },
        ParamType::Bytes => {
            let raw = value_as_str(value).ok_or_else(|| anyhow!("expected hex bytes"))?;
            Ok(Token::Bytes(hex::decode(raw.trim_start_matches("0x"))?))
        }
        ParamType::FixedBytes(size) => {
            let raw = value_as_str(value).ok_or_else(|| anyhow!("expected hex bytes"))?;
            let bytes = hex::decode(raw.trim_start_matches("0x"))?;
            if bytes.len() != *size {
                return Err(anyhow!("expected {} bytes, got {}", size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => {
            let items = value.as_array().ok_or_else(|| anyhow!("expected array"))?;
            let tokens = items
                .iter()
                .map(|item| coerce_token(inner, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Token::Array(tokens))
        }
        ParamType::FixedArray(inner, size) => {
            let items = value.as_array().ok_or_else(|| anyhow!("expected array"))?;
            if items.len() != *size {
                return Err(anyhow!("expected {} elements, got {}", size, items.len()));
            }
            let tokens = items
                .iter()
                .map(|item| coerce_token(inner, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Token::FixedArray(tokens))
        }
        ParamType::Tuple(kinds) => {
            let items = value.as_array().ok_or_else(|| anyhow!("expected tuple as array"))?;
            if items.len() != kinds.len() {
                return Err(anyhow!("expected {} tuple fields, got {}", kinds.len(), items.len()));
            }
            let tokens = kinds
                .iter()
                .zip(items)
                .map(|(kind, item)| coerce_token(kind, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Token::Tuple(tokens))
        }
    }
}

/// Renders a decoded token as JSON. Integers become decimal strings.
pub fn token_to_json(token: Token) -> Value {
    match token {
        Token::Address(a) => json!(to_checksum(&a, None)),
        Token::Uint(n) => json!(n.to_string()),
        Token::Int(n) => json!(I256::from_raw(n).to_string()),
        Token::Bool(b) => json!(b),
        Token::String(s) => json!(s),
        Token::Bytes(b) | Token::FixedBytes(b) => json!(format!("0x{}", hex::encode(b))),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.into_iter().map(token_to_json).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockChain;
    use ethers::types::Address;

    fn erc20_abi() -> Value {
        json!([
            {
                "type": "function",
                "name": "balanceOf",
                "stateMutability": "view",
                "inputs": [{ "name": "owner", "type": "address" }],
                "outputs": [{ "name": "", "type": "uint256" }]
            },
            {
                "type": "function",
                "name": "transfer",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "to", "type": "address" },
                    { "name": "amount", "type": "uint256" }
                ],
                "outputs": [{ "name": "", "type": "bool" }]
            }
        ])
    }

    #[test]
    fn coerces_loose_json_arguments() {
        let abi = parse_abi(&erc20_abi()).unwrap();
        let transfer = select_function(&abi, "transfer", 2).unwrap();
        let tokens = coerce_tokens(
            &transfer.inputs,
            &[json!("0x2222222222222222222222222222222222222222"), json!(1000)],
        )
        .unwrap();
        assert_eq!(tokens[0], Token::Address(Address::repeat_byte(0x22)));
        assert_eq!(tokens[1], Token::Uint(U256::from(1000u64)));
    }

    #[test]
    fn negative_ints_round_trip_through_json() {
        let token = coerce_token(&ParamType::Int(256), &json!("-5")).unwrap();
        assert_eq!(token_to_json(token), json!("-5"));
    }

    #[test]
    fn argument_count_mismatch_is_rejected() {
        let abi = parse_abi(&erc20_abi()).unwrap();
        assert!(select_function(&abi, "transfer", 1).is_err());
    }

    #[tokio::test]
    async fn view_functions_use_eth_call() {
        let chain = MockChain::new();
        chain.set_call_result("balanceOf(address)", U256::from(42u64));

        let outcome = call_contract(
            &chain,
            "0x3333333333333333333333333333333333333333",
            &erc20_abi(),
            "balanceOf",
            &[json!("0x4444444444444444444444444444444444444444")],
            U256::zero(),
        )
        .await
        .unwrap();

        match outcome {
            ContractCallOutcome::Read(v) => assert_eq!(v, json!("42")),
            other => panic!("expected read, got {other:?}"),
        }
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn state_changing_functions_are_sent() {
        let chain = MockChain::new();
        let outcome = call_contract(
            &chain,
            "0x3333333333333333333333333333333333333333",
            &erc20_abi(),
            "transfer",
            &[json!("0x4444444444444444444444444444444444444444"), json!("7")],
            U256::zero(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, ContractCallOutcome::Sent(_)));
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test]
    async fn deploy_appends_constructor_args() {
        let chain = MockChain::new();
        let abi = json!([{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [{ "name": "supply", "type": "uint256" }]
        }]);
        deploy_contract(&chain, "0x6080", Some(&abi), &[json!("1")], U256::zero())
            .await
            .unwrap();

        let sent = chain.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].to.is_none());
        let data = sent[0].data.clone().unwrap();
        assert_eq!(&data[..2], &[0x60, 0x80]);
        assert_eq!(data.len(), 2 + 32);
    }

    #[tokio::test]
    async fn deploy_rejects_args_without_constructor() {
        let chain = MockChain::new();
        let err = deploy_contract(&chain, "0x6080", None, &[json!("1")], U256::zero()).await;
        assert!(err.is_err());
        assert!(chain.sent().is_empty());
    }
}
