//! # JSON-RPC Ledger API
//!
//! Wire types for the ledger's JSON-RPC 2.0 API and [`JsonRpcLedger`], a
//! `reqwest` client implementing [`LedgerReader`] and [`LedgerWriter`] over
//! it. The sandbox node in the binary serves the same methods.
//!
//! ## Method Index
//!
//! | Method                | Params             | Result                |
//! |-----------------------|--------------------|-----------------------|
//! | `account_info`        | `{account}`        | `AccountInfo`         |
//! | `fee`                 | none               | `FeeInfo`             |
//! | `ledger_current`      | none               | `{ledger_current_index}` |
//! | `server_info`         | none               | `ServerInfo`          |
//! | `account_tickets`     | `{account}`        | `{tickets}`           |
//! | `account_signer_list` | `{account}`        | `{signer_list}`       |
//! | `account_lines`       | `{account}`        | `{lines}`             |
//! | `tx`                  | `{hash}`           | `TransactionStatus`   |
//! | `simulate`            | `{tx_json}`        | `RawResponse`         |
//! | `submit_and_wait`     | `{tx_blob}`        | `RawResponse`         |

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::client::{
    AccountInfo, FeeInfo, LedgerReader, LedgerWriter, NetworkError, RawResponse, ServerInfo,
    SignerList, TransactionStatus, TrustLine,
};
use crate::crypto::address::AccountId;
use crate::transaction::builder::CanonicalOperation;
use crate::transaction::signing::SignedEnvelope;

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcMethod {
    AccountInfo,
    Fee,
    LedgerCurrent,
    ServerInfo,
    AccountTickets,
    AccountSignerList,
    AccountLines,
    Tx,
    Simulate,
    SubmitAndWait,
}

impl RpcMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountInfo => "account_info",
            Self::Fee => "fee",
            Self::LedgerCurrent => "ledger_current",
            Self::ServerInfo => "server_info",
            Self::AccountTickets => "account_tickets",
            Self::AccountSignerList => "account_signer_list",
            Self::AccountLines => "account_lines",
            Self::Tx => "tx",
            Self::Simulate => "simulate",
            Self::SubmitAndWait => "submit_and_wait",
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: RpcMethod,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: serde_json::Value, method: RpcMethod, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

/// Exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object.
///
/// Standard codes `-32700..-32600`; `-32002` is "account not found" and
/// carries the address in `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub const CODE_PARSE_ERROR: i32 = -32700;
pub const CODE_INVALID_REQUEST: i32 = -32600;
pub const CODE_METHOD_NOT_FOUND: i32 = -32601;
pub const CODE_INVALID_PARAMS: i32 = -32602;
pub const CODE_INTERNAL_ERROR: i32 = -32603;
pub const CODE_ACCOUNT_NOT_FOUND: i32 = -32002;

impl RpcError {
    fn with_code(code: i32, message: String) -> Self {
        Self {
            code,
            message,
            data: None,
        }
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::with_code(CODE_PARSE_ERROR, msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::with_code(CODE_INVALID_REQUEST, msg.into())
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::with_code(
            CODE_METHOD_NOT_FOUND,
            format!("method not found: {}", method.into()),
        )
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::with_code(CODE_INVALID_PARAMS, msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::with_code(CODE_INTERNAL_ERROR, msg.into())
    }

    pub fn account_not_found(account: &AccountId) -> Self {
        Self {
            code: CODE_ACCOUNT_NOT_FOUND,
            message: format!("account not found: {}", account),
            data: Some(json!({ "account": account })),
        }
    }

    /// Map a ledger-side failure to its wire error.
    pub fn from_network(err: &NetworkError) -> Self {
        match err {
            NetworkError::AccountNotFound(account) => Self::account_not_found(account),
            NetworkError::Malformed(msg) => Self::invalid_params(msg.clone()),
            NetworkError::Rpc { code, message } => Self::with_code(*code, message.clone()),
            other => Self::internal_error(other.to_string()),
        }
    }

    /// Map a wire error back to the client-side taxonomy.
    pub fn into_network(self) -> NetworkError {
        if self.code == CODE_ACCOUNT_NOT_FOUND {
            let account = self
                .data
                .as_ref()
                .and_then(|d| d.get("account"))
                .and_then(|a| a.as_str())
                .and_then(|a| a.parse::<AccountId>().ok());
            if let Some(account) = account {
                return NetworkError::AccountNotFound(account);
            }
        }
        NetworkError::Rpc {
            code: self.code,
            message: self.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Result payloads that are not plain models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerCurrentResult {
    pub ledger_current_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketsResult {
    pub tickets: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerListResult {
    pub signer_list: Option<SignerList>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinesResult {
    pub lines: Vec<TrustLine>,
}

// ---------------------------------------------------------------------------
// JsonRpcLedger
// ---------------------------------------------------------------------------

/// Ledger client speaking JSON-RPC over HTTP.
pub struct JsonRpcLedger {
    url: String,
    http: reqwest::Client,
    read_timeout: Duration,
    submit_timeout: Duration,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(
        url: impl Into<String>,
        read_timeout: Duration,
        submit_timeout: Duration,
    ) -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| NetworkError::Unreachable(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            read_timeout,
            submit_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, NetworkError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(json!(id), method, params);
        debug!(method = method.as_str(), id, "rpc call");

        let response = self
            .http
            .post(&self.url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_reqwest(method, timeout, e))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| map_reqwest(method, timeout, e))?;

        if let Some(err) = body.error {
            warn!(method = method.as_str(), code = err.code, "rpc error");
            return Err(err.into_network());
        }
        let result = body
            .result
            .ok_or_else(|| NetworkError::Malformed(format!("{}: empty result", method.as_str())))?;
        serde_json::from_value(result)
            .map_err(|e| NetworkError::Malformed(format!("{}: {}", method.as_str(), e)))
    }

    async fn read<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: serde_json::Value,
    ) -> Result<T, NetworkError> {
        self.call(method, params, self.read_timeout).await
    }
}

fn map_reqwest(method: RpcMethod, timeout: Duration, err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout {
            method: method.as_str().to_string(),
            after_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() || err.is_builder() {
        NetworkError::Unreachable(err.to_string())
    } else if err.is_decode() {
        NetworkError::Malformed(err.to_string())
    } else {
        NetworkError::Transport(err.to_string())
    }
}

#[async_trait]
impl LedgerReader for JsonRpcLedger {
    fn endpoint(&self) -> String {
        self.url.clone()
    }

    async fn account_info(&self, account: &AccountId) -> Result<AccountInfo, NetworkError> {
        self.read(RpcMethod::AccountInfo, json!({ "account": account }))
            .await
    }

    async fn fee(&self) -> Result<FeeInfo, NetworkError> {
        self.read(RpcMethod::Fee, json!({})).await
    }

    async fn current_ledger_index(&self) -> Result<u32, NetworkError> {
        let r: LedgerCurrentResult = self.read(RpcMethod::LedgerCurrent, json!({})).await?;
        Ok(r.ledger_current_index)
    }

    async fn server_info(&self) -> Result<ServerInfo, NetworkError> {
        self.read(RpcMethod::ServerInfo, json!({})).await
    }

    async fn account_tickets(&self, account: &AccountId) -> Result<Vec<u32>, NetworkError> {
        let r: TicketsResult = self
            .read(RpcMethod::AccountTickets, json!({ "account": account }))
            .await?;
        Ok(r.tickets)
    }

    async fn signer_list(&self, account: &AccountId) -> Result<Option<SignerList>, NetworkError> {
        let r: SignerListResult = self
            .read(RpcMethod::AccountSignerList, json!({ "account": account }))
            .await?;
        Ok(r.signer_list)
    }

    async fn account_lines(&self, account: &AccountId) -> Result<Vec<TrustLine>, NetworkError> {
        let r: LinesResult = self
            .read(RpcMethod::AccountLines, json!({ "account": account }))
            .await?;
        Ok(r.lines)
    }

    async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, NetworkError> {
        self.read(RpcMethod::Tx, json!({ "hash": hash })).await
    }
}

#[async_trait]
impl LedgerWriter for JsonRpcLedger {
    async fn simulate(&self, operation: &CanonicalOperation) -> Result<RawResponse, NetworkError> {
        self.read(RpcMethod::Simulate, json!({ "tx_json": operation }))
            .await
    }

    async fn submit_and_wait(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<RawResponse, NetworkError> {
        self.call(
            RpcMethod::SubmitAndWait,
            json!({ "tx_blob": envelope.blob() }),
            self.submit_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_snake_case_method_names() {
        let req = RpcRequest::new(json!(1), RpcMethod::AccountSignerList, json!({}));
        let text = serde_json::to_string(&req).unwrap();
        assert!(text.contains("\"account_signer_list\""));
        let back: RpcRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back.method, RpcMethod::AccountSignerList);
    }

    #[test]
    fn method_names_match_serde() {
        for m in [
            RpcMethod::AccountInfo,
            RpcMethod::Fee,
            RpcMethod::LedgerCurrent,
            RpcMethod::ServerInfo,
            RpcMethod::AccountTickets,
            RpcMethod::AccountSignerList,
            RpcMethod::AccountLines,
            RpcMethod::Tx,
            RpcMethod::Simulate,
            RpcMethod::SubmitAndWait,
        ] {
            assert_eq!(serde_json::to_value(m).unwrap(), json!(m.as_str()));
        }
    }

    #[test]
    fn account_not_found_roundtrips_through_wire_error() {
        let account = AccountId::from_bytes([4; 20]);
        let wire = RpcError::from_network(&NetworkError::AccountNotFound(account));
        assert_eq!(wire.code, CODE_ACCOUNT_NOT_FOUND);
        assert_eq!(wire.into_network(), NetworkError::AccountNotFound(account));
    }

    #[test]
    fn unknown_codes_become_rpc_errors() {
        let err = RpcError::internal_error("boom").into_network();
        assert_eq!(
            err,
            NetworkError::Rpc {
                code: CODE_INTERNAL_ERROR,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn response_constructors() {
        let ok = RpcResponse::success(json!(1), json!({ "x": 1 }));
        assert!(ok.result.is_some() && ok.error.is_none());
        let err = RpcResponse::error(json!(1), RpcError::method_not_found("nope"));
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, CODE_METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let ledger = JsonRpcLedger::new(
            "http://127.0.0.1:9/",
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = ledger.fee().await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error {:?}", err);
    }
}
