//! # MCP Handler Module
//!
//! Implements the Model Context Protocol dispatcher. Incoming requests are
//! routed to the tools below; every tool name is also accepted as a direct
//! JSON-RPC method and rewritten into `tools/call`.
//!
//! ## Supported Tools
//!
//! ### Account & Network
//! - `get_address` - Address of the signing account
//! - `get_gas_price` - Current gas price in Gwei
//!
//! ### Tokens
//! - `erc20_balance` - Signer balance of an ERC-20 token
//! - `get_token_decimals` - ERC-20 `decimals()`
//! - `erc20_transfer` - Transfer an ERC-20 token
//! - `check_allowance` - Read an ERC-20 allowance
//! - `approve_token` - Approve a spender
//!
//! ### Contracts
//! - `deploy_contract` - Deploy bytecode with optional constructor arguments
//! - `call_contract` - Call a contract function via its ABI
//!
//! ### Swaps
//! - `inch_swap` - Swap tokens through the 1inch aggregator

use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    blockchain::{
        models::TxLink,
        services::{
            contract::{self, ContractCallOutcome},
            fees, token,
        },
    },
    mcp::protocol::{error_codes, Request, Response},
    swap::{
        types::{parse_address, TokenAddress},
        SwapError, SwapRequest,
    },
    utils, AppState,
};

const TOOL_NAMES: [&str; 10] = [
    "get_address",
    "get_gas_price",
    "erc20_balance",
    "get_token_decimals",
    "erc20_transfer",
    "deploy_contract",
    "call_contract",
    "inch_swap",
    "check_allowance",
    "approve_token",
];

// Helper: produce a result Value that always contains a text content array
// and preserves structured data for JSON-friendly clients.
fn make_texty_result(text: String, payload: Value) -> Value {
    let content = json!([{ "type": "text", "text": text }]);
    match payload {
        Value::Object(mut map) => {
            // Do not overwrite if caller already set content
            if !map.contains_key("content") {
                map.insert("content".into(), content);
            }
            Value::Object(map)
        }
        other => json!({
            "data": other,
            "content": content
        }),
    }
}

/// Converts a swap-layer failure into a JSON-RPC error carrying `{kind, stage}`.
pub fn swap_error_response(req_id: &Value, err: &SwapError) -> Response {
    let code = if err.is_validation() {
        error_codes::INVALID_PARAMS
    } else {
        error_codes::INTERNAL_ERROR
    };
    let mut data = json!({ "kind": err.kind(), "stage": err.stage() });
    if let Some(hash) = err.tx_hash() {
        data["txHash"] = json!(hash);
    }
    Response::error_with_data(req_id.clone(), code, err.to_string(), data)
}

fn internal_error(req_id: &Value, err: anyhow::Error) -> Response {
    error!("Tool failed: {:#}", err);
    Response::error(req_id.clone(), error_codes::INTERNAL_ERROR, format!("{:#}", err))
}

fn address_arg(args: &Value, key: &'static str, req_id: &Value) -> Result<Address, Response> {
    let raw = utils::get_required_arg::<String>(args, key, req_id)?;
    parse_address(key, &raw).map_err(|e| swap_error_response(req_id, &e))
}

fn optional_address_arg(args: &Value, key: &'static str, req_id: &Value) -> Result<Option<Address>, Response> {
    match utils::get_optional_arg::<String>(args, key, req_id)? {
        Some(raw) if !raw.trim().is_empty() => parse_address(key, &raw)
            .map(Some)
            .map_err(|e| swap_error_response(req_id, &e)),
        _ => Ok(None),
    }
}

/// Optional wei amount given as a decimal string or number.
fn optional_wei_arg(args: &Value, key: &str, req_id: &Value) -> Result<Option<U256>, Response> {
    let raw = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => String::new(),
    };
    utils::parse_u256(&raw).map(Some).ok_or_else(|| {
        Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            format!("Invalid argument: '{}' must be a non-negative integer in wei", key),
        )
    })
}

fn tx_link_result(req_id: &Value, link: TxLink, extra: Value) -> Response {
    let mut payload = json!(link);
    if let (Value::Object(map), Value::Object(extra)) = (&mut payload, extra) {
        map.extend(extra);
    }
    let text = payload.to_string();
    Response::success(req_id.clone(), make_texty_result(text, payload))
}

/// This is the main dispatcher for all incoming MCP requests.
pub async fn handle_mcp_request(req: Request, state: AppState) -> Option<Response> {
    info!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "tools/list" => handle_tools_list(&req),
        "tools/call" => handle_tool_call(req, state).await,
        // Convenience aliases to support direct method calls from CLI
        // They are rewritten into tools/call internally to reuse the same logic
        name if TOOL_NAMES.contains(&name) => {
            let wrapped = Request {
                jsonrpc: req.jsonrpc.clone(),
                id: req.id.clone(),
                method: "tools/call".to_string(),
                params: Some(json!({
                    "name": name,
                    "arguments": req.params.clone().unwrap_or_else(|| json!({}))
                })),
            };
            handle_tool_call(wrapped, state).await
        }
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

/// Handles a 'tools/call' request by dispatching it to the correct tool logic.
async fn handle_tool_call(req: Request, state: AppState) -> Response {
    let params = match req.params.as_ref() {
        Some(p) => p,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'params' object".into(),
            )
        }
    };

    let tool_name = match params.get("name").and_then(|n| n.as_str()) {
        Some(name) => name,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'name' field in params".into(),
            )
        }
    };

    let empty_args = json!({});
    let args = params.get("arguments").unwrap_or(&empty_args);
    let req_id = &req.id;
    let chain = state.chain.as_ref();
    let explorer = state.config.explorer_url.as_str();

    match tool_name {
        "get_address" => {
            let address = to_checksum(&chain.signer_address(), None);
            Response::success(
                req_id.clone(),
                make_texty_result(address.clone(), json!({ "address": address })),
            )
        }

        "get_gas_price" => match fees::gas_price_gwei(chain).await {
            Ok(price) => Response::success(
                req_id.clone(),
                make_texty_result(price.clone(), json!({ "gasPrice": price })),
            ),
            Err(e) => internal_error(req_id, e),
        },

        "erc20_balance" => {
            let res: Result<Response, Response> = (async {
                let token_address = address_arg(args, "contractAddress", req_id)?;
                let balance = token::erc20_balance(chain, token_address, chain.signer_address())
                    .await
                    .map_err(|e| internal_error(req_id, e))?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(
                        balance.clone(),
                        json!({ "balance": balance, "contractAddress": to_checksum(&token_address, None) }),
                    ),
                ))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        "get_token_decimals" => {
            let res: Result<Response, Response> = (async {
                let token_address = address_arg(args, "tokenAddress", req_id)?;
                let decimals = token::erc20_decimals(chain, token_address)
                    .await
                    .map_err(|e| internal_error(req_id, e))?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(decimals.to_string(), json!({ "decimals": decimals })),
                ))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        "erc20_transfer" => {
            let res: Result<Response, Response> = (async {
                let token_address = address_arg(args, "contractAddress", req_id)?;
                let to = address_arg(args, "toAddress", req_id)?;
                let amount = utils::get_required_arg::<String>(args, "amount", req_id)?;
                let hash = token::erc20_transfer(chain, token_address, to, &amount)
                    .await
                    .map_err(|e| internal_error(req_id, e))?;
                Ok(tx_link_result(req_id, TxLink::new(explorer, hash), json!({})))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        "deploy_contract" => {
            let res: Result<Response, Response> = (async {
                let bytecode = utils::get_required_arg::<String>(args, "bytecode", req_id)?;
                let abi = utils::get_optional_arg::<Value>(args, "abi", req_id)?;
                let constructor_args =
                    utils::get_optional_arg::<Vec<Value>>(args, "constructorArgs", req_id)?.unwrap_or_default();
                let value = optional_wei_arg(args, "value", req_id)?.unwrap_or_default();
                let hash = contract::deploy_contract(chain, &bytecode, abi.as_ref(), &constructor_args, value)
                    .await
                    .map_err(|e| internal_error(req_id, e))?;
                Ok(tx_link_result(req_id, TxLink::new(explorer, hash), json!({})))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        "call_contract" => {
            let res: Result<Response, Response> = (async {
                let contract_address = utils::get_required_arg::<String>(args, "contractAddress", req_id)?;
                parse_address("contractAddress", &contract_address).map_err(|e| swap_error_response(req_id, &e))?;
                let function_name = utils::get_required_arg::<String>(args, "functionName", req_id)?;
                let abi = utils::get_required_arg::<Value>(args, "abi", req_id)?;
                let function_args =
                    utils::get_optional_arg::<Vec<Value>>(args, "functionArgs", req_id)?.unwrap_or_default();
                let value = optional_wei_arg(args, "value", req_id)?.unwrap_or_default();

                let outcome = contract::call_contract(chain, &contract_address, &abi, &function_name, &function_args, value)
                    .await
                    .map_err(|e| internal_error(req_id, e))?;
                Ok(match outcome {
                    ContractCallOutcome::Read(result) => {
                        let text = match &result {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        Response::success(req_id.clone(), make_texty_result(text, json!({ "result": result })))
                    }
                    ContractCallOutcome::Sent(hash) => tx_link_result(req_id, TxLink::new(explorer, hash), json!({})),
                })
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        "inch_swap" => {
            let res: Result<Response, Response> = (async {
                let request: SwapRequest = serde_json::from_value(args.clone()).map_err(|e| {
                    Response::error(
                        req_id.clone(),
                        error_codes::INVALID_PARAMS,
                        format!("Invalid inch_swap arguments: {}", e),
                    )
                })?;
                let report = state
                    .swaps
                    .swap(request)
                    .await
                    .map_err(|e| swap_error_response(req_id, &e))?;
                let payload = json!(report);
                Ok(Response::success(req_id.clone(), make_texty_result(payload.to_string(), payload)))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        "check_allowance" => {
            let res: Result<Response, Response> = (async {
                let token_address = address_arg(args, "tokenAddress", req_id)?;
                let spender = address_arg(args, "spenderAddress", req_id)?;
                let owner = optional_address_arg(args, "ownerAddress", req_id)?.unwrap_or_else(|| chain.signer_address());
                let allowance = state
                    .swaps
                    .allowances()
                    .check_allowance(TokenAddress::from(token_address), owner, spender)
                    .await
                    .map_err(|e| swap_error_response(req_id, &e))?;
                Ok(Response::success(
                    req_id.clone(),
                    make_texty_result(allowance.to_string(), json!({ "allowance": allowance.to_string() })),
                ))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        "approve_token" => {
            let res: Result<Response, Response> = (async {
                let token_address = address_arg(args, "tokenAddress", req_id)?;
                let spender = address_arg(args, "spenderAddress", req_id)?;
                if TokenAddress::from(token_address).is_native() {
                    return Err(Response::error(
                        req_id.clone(),
                        error_codes::INVALID_PARAMS,
                        "The native coin needs no approval".into(),
                    ));
                }
                let amount = optional_wei_arg(args, "amount", req_id)?.unwrap_or(U256::MAX);
                let hash = state
                    .swaps
                    .allowances()
                    .approve(token_address, spender, amount)
                    .await
                    .map_err(|e| internal_error(req_id, e.into()))?;
                Ok(tx_link_result(
                    req_id,
                    TxLink::new(explorer, hash),
                    json!({
                        "tokenAddress": to_checksum(&token_address, None),
                        "spenderAddress": to_checksum(&spender, None),
                        "amount": amount.to_string(),
                    }),
                ))
            })
            .await;
            res.unwrap_or_else(|err_resp| err_resp)
        }

        _ => Response::error(
            req_id.clone(),
            error_codes::METHOD_NOT_FOUND,
            format!("Unknown tool: {}", tool_name),
        ),
    }
}

/// Handles the 'initialize' request.
fn handle_initialize(req: &Request) -> Response {
    let server_info = json!({
        "name": "polygon_swap_mcp",
        "version": env!("CARGO_PKG_VERSION")
    });
    let capabilities = json!({ "tools": { "listChanged": false } });
    let instructions =
        "Polygon PoS MCP server: ERC-20 transfers, contract calls and deployment, and 1inch token swaps from the configured account.";

    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": server_info,
            "protocolVersion": "2025-06-18",
            "capabilities": capabilities,
            "instructions": instructions
        }),
    )
}

/// Handles the 'tools/list' request by returning a JSON definition of all available tools.
fn handle_tools_list(req: &Request) -> Response {
    let tools = json!([
        {
            "name": "get_address",
            "description": "Get the address of the current account.",
            "inputSchema": { "type": "object", "properties": {}, "additionalProperties": false }
        },
        {
            "name": "get_gas_price",
            "description": "Get the current gas price on Polygon PoS.",
            "inputSchema": { "type": "object", "properties": {}, "additionalProperties": false }
        },
        {
            "name": "erc20_balance",
            "description": "Get the balance of an ERC20 token for the current account.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "contractAddress": {"type": "string", "description": "The address of the token contract."}
                },
                "required": ["contractAddress"]
            }
        },
        {
            "name": "get_token_decimals",
            "description": "Get the number of decimals of an ERC20 token.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tokenAddress": {"type": "string", "description": "The address of the token."}
                },
                "required": ["tokenAddress"]
            }
        },
        {
            "name": "erc20_transfer",
            "description": "Transfer an ERC20 token from the current account.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "contractAddress": {"type": "string", "description": "The address of the token contract."},
                    "toAddress": {"type": "string", "description": "The address of the recipient."},
                    "amount": {"type": "string", "description": "Amount in whole tokens, e.g. '1.5'."}
                },
                "required": ["contractAddress", "toAddress", "amount"]
            }
        },
        {
            "name": "deploy_contract",
            "description": "Deploy a contract from its bytecode.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "bytecode": {"type": "string", "description": "0x-prefixed creation bytecode."},
                    "abi": {"type": ["string", "array"], "description": "Contract ABI, needed for constructor arguments."},
                    "constructorArgs": {"type": "array", "description": "Constructor arguments in ABI order."},
                    "value": {"type": "string", "description": "Wei to send with the deployment."}
                },
                "required": ["bytecode"]
            }
        },
        {
            "name": "call_contract",
            "description": "Call a contract function. View and pure functions are read; others are sent as transactions.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "contractAddress": {"type": "string", "description": "The address of the contract to call."},
                    "functionName": {"type": "string", "description": "The name of the function to call."},
                    "functionArgs": {"type": "array", "description": "The arguments to pass to the function."},
                    "abi": {"type": ["string", "array"], "description": "The ABI of the contract."},
                    "value": {"type": "string", "description": "Wei to send with the call."}
                },
                "required": ["contractAddress", "functionName", "abi"]
            }
        },
        {
            "name": "inch_swap",
            "description": "Swap tokens using the 1inch aggregator on Polygon.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "fromTokenAddress": {"type": "string", "description": "The address of the token to swap from."},
                    "toTokenAddress": {"type": "string", "description": "The address of the token to swap to."},
                    "amount": {"type": "string", "description": "The amount of tokens to swap in wei."},
                    "fromAddress": {"type": "string", "description": "Must equal the current account if given."},
                    "slippage": {"type": "number", "description": "Maximum acceptable slippage percentage (default: 1, max 50)."},
                    "apiKey": {"type": "string", "description": "1inch API key; overrides the server default."},
                    "chainId": {"type": "number", "description": "Chain ID (default: the connected chain)."}
                },
                "required": ["fromTokenAddress", "toTokenAddress", "amount"]
            }
        },
        {
            "name": "check_allowance",
            "description": "Check the allowance of an ERC20 token for a spender.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tokenAddress": {"type": "string", "description": "The address of the token."},
                    "spenderAddress": {"type": "string", "description": "The address of the spender."},
                    "ownerAddress": {"type": "string", "description": "Owner to check (default: current account)."}
                },
                "required": ["tokenAddress", "spenderAddress"]
            }
        },
        {
            "name": "approve_token",
            "description": "Approve a spender to spend an ERC20 token from the current account.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tokenAddress": {"type": "string", "description": "The address of the token to approve."},
                    "spenderAddress": {"type": "string", "description": "The address of the spender to approve."},
                    "amount": {"type": "string", "description": "Amount in wei. If not provided, max uint256 is used."}
                },
                "required": ["tokenAddress", "spenderAddress"]
            }
        }
    ]);
    Response::success(req.id.clone(), json!({ "tools": tools }))
}
