//! Utility functions for the MCP server

use ethers::types::U256;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::{from_value, Value};

use crate::mcp::protocol::{error_codes, Response};

/// Helper function to extract a required argument from a JSON object
pub fn get_required_arg<T: DeserializeOwned>(
    args: &Value,
    key: &str,
    req_id: &Value,
) -> Result<T, Response> {
    from_value(args.get(key).cloned().unwrap_or(Value::Null)).map_err(|_| {
        Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            format!("Missing or invalid required argument: '{}'", key),
        )
    })
}

/// Like [`get_required_arg`], but a missing or `null` argument yields `None`.
pub fn get_optional_arg<T: DeserializeOwned>(
    args: &Value,
    key: &str,
    req_id: &Value,
) -> Result<Option<T>, Response> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => from_value(v.clone()).map(Some).map_err(|_| {
            Response::error(
                req_id.clone(),
                error_codes::INVALID_PARAMS,
                format!("Invalid argument: '{}'", key),
            )
        }),
    }
}

/// Parses a non-negative integer given as decimal or `0x` hex.
pub fn parse_u256(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => {
            if !raw.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            U256::from_dec_str(raw).ok()
        }
    }
}

/// Serializes a `U256` as a decimal string.
pub fn serialize_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

/// Accepts a JSON string or number and keeps it as text.
pub fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected string or number, got {}", other))),
    }
}

/// Reads an integer that may arrive as a JSON number, a decimal string or a
/// hex string. `null` and `""` read as zero.
pub fn lenient_u256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(U256::zero()),
        Value::String(s) if s.trim().is_empty() => Ok(U256::zero()),
        Value::String(s) => {
            parse_u256(&s).ok_or_else(|| D::Error::custom(format!("invalid integer '{}'", s)))
        }
        Value::Number(n) => parse_u256(&n.to_string())
            .ok_or_else(|| D::Error::custom(format!("invalid integer {}", n))),
        other => Err(D::Error::custom(format!("expected integer, got {}", other))),
    }
}
