//! Read-only contract calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use personal_server_core::Address;
use serde::{Deserialize, Serialize};

use crate::abi::{AbiFunction, AbiValue};
use crate::error::{ChainError, Result};

/// A client able to execute view functions against chain state.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Call `function` on `contract` with `args`, returning the decoded outputs.
    async fn call_view(
        &self,
        contract: &Address,
        function: &AbiFunction,
        args: &[AbiValue],
    ) -> Result<Vec<AbiValue>>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: (CallObject<'a>, &'static str),
}

#[derive(Serialize)]
struct CallObject<'a> {
    to: &'a str,
    data: &'a str,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// `eth_call` over HTTP JSON-RPC.
#[derive(Debug)]
pub struct JsonRpcChainClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcChainClient {
    /// Create a client for `url`. Every call is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChainClient for JsonRpcChainClient {
    async fn call_view(
        &self,
        contract: &Address,
        function: &AbiFunction,
        args: &[AbiValue],
    ) -> Result<Vec<AbiValue>> {
        let data = format!("0x{}", hex::encode(function.encode_call(args)?));
        let to = contract.to_lower_hex();
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "eth_call",
            params: (CallObject { to: &to, data: &data }, "latest"),
        };

        tracing::debug!(contract = %contract, function = function.name, "eth_call");

        let response = self.http.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!("rpc returned HTTP {}", status)));
        }
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Transport(format!("malformed rpc response: {}", e)))?;

        if let Some(err) = body.error {
            tracing::debug!(function = function.name, code = err.code, "call reverted");
            return Err(ChainError::Reverted(format!(
                "{}: {} ({})",
                function.name, err.message, err.code
            )));
        }

        let result = body
            .result
            .ok_or_else(|| ChainError::Transport("rpc response has no result".into()))?;
        let hex_data = result.strip_prefix("0x").unwrap_or(&result);
        if hex_data.is_empty() {
            // Calls to missing contracts or reverts without data return "0x".
            return Err(ChainError::Reverted(format!("{}: empty return data", function.name)));
        }
        let bytes = hex::decode(hex_data)
            .map_err(|e| ChainError::Decode(format!("return data is not hex: {}", e)))?;
        function.decode_output(&bytes)
    }
}
