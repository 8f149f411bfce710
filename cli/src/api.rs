//! # Sandbox Node API
//!
//! The axum router that serves a [`SandboxLedger`] over the same JSON-RPC 2.0
//! methods [`JsonRpcLedger`](ledgerflow::ledger::JsonRpcLedger) calls, so the
//! engine can be driven end to end against a local node.
//!
//! ## Endpoints
//!
//! | Method | Path       | Description          |
//! |--------|------------|----------------------|
//! | POST   | `/`        | JSON-RPC 2.0 gateway |
//! | GET    | `/health`  | Liveness probe       |
//! | GET    | `/status`  | Node status summary  |
//! | GET    | `/metrics` | Prometheus metrics   |

use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ledgerflow::crypto::address::AccountId;
use ledgerflow::ledger::client::{LedgerReader, LedgerWriter, NetworkError};
use ledgerflow::ledger::rpc::{LedgerCurrentResult, LinesResult, SignerListResult, TicketsResult};
use ledgerflow::ledger::{RpcError, RpcMethod, RpcResponse, SandboxLedger};
use ledgerflow::transaction::{CanonicalOperation, SignedEnvelope};

use crate::metrics::{self, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub ledger: Arc<SandboxLedger>,
    pub metrics: SharedMetrics,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(Arc::clone(&state.metrics));

    Router::new()
        .route("/", post(rpc_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state)
        .merge(metrics_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// REST handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub ledger_index: u32,
    pub timestamp: String,
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        ledger_index: state.ledger.ledger_index(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// JSON-RPC
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct AccountParams {
    account: AccountId,
}

#[derive(Deserialize)]
struct HashParams {
    hash: String,
}

#[derive(Deserialize)]
struct SimulateParams {
    tx_json: CanonicalOperation,
}

#[derive(Deserialize)]
struct SubmitParams {
    tx_blob: String,
}

/// `POST /`. Every reply is HTTP 200 with a JSON-RPC body, errors included.
async fn rpc_handler(State(state): State<AppState>, body: String) -> Json<RpcResponse> {
    let request: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            state.metrics.rpc_errors_total.inc();
            return Json(RpcResponse::error(Value::Null, RpcError::parse_error(e.to_string())));
        }
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    let response = match parse_method(&request) {
        Ok(method) => {
            state
                .metrics
                .rpc_requests_total
                .with_label_values(&[method.as_str()])
                .inc();
            let params = request.get("params").cloned().unwrap_or(Value::Null);
            dispatch(&state, method, params).await
        }
        Err(e) => Err(e),
    };

    match response {
        Ok(result) => Json(RpcResponse::success(id, result)),
        Err(err) => {
            state.metrics.rpc_errors_total.inc();
            tracing::debug!(code = err.code, message = %err.message, "rpc error");
            Json(RpcResponse::error(id, err))
        }
    }
}

fn parse_method(request: &Value) -> Result<RpcMethod, RpcError> {
    if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(RpcError::invalid_request("jsonrpc must be \"2.0\""));
    }
    let name = request
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_request("missing method"))?;
    serde_json::from_value(Value::String(name.to_string()))
        .map_err(|_| RpcError::method_not_found(name))
}

async fn dispatch(state: &AppState, method: RpcMethod, params: Value) -> Result<Value, RpcError> {
    let ledger = state.ledger.as_ref();
    match method {
        RpcMethod::AccountInfo => {
            let p: AccountParams = parse_params(params)?;
            encode(ledger.account_info(&p.account).await)
        }
        RpcMethod::Fee => encode(ledger.fee().await),
        RpcMethod::LedgerCurrent => encode(
            ledger
                .current_ledger_index()
                .await
                .map(|ledger_current_index| LedgerCurrentResult { ledger_current_index }),
        ),
        RpcMethod::ServerInfo => encode(ledger.server_info().await),
        RpcMethod::AccountTickets => {
            let p: AccountParams = parse_params(params)?;
            encode(
                ledger
                    .account_tickets(&p.account)
                    .await
                    .map(|tickets| TicketsResult { tickets }),
            )
        }
        RpcMethod::AccountSignerList => {
            let p: AccountParams = parse_params(params)?;
            encode(
                ledger
                    .signer_list(&p.account)
                    .await
                    .map(|signer_list| SignerListResult { signer_list }),
            )
        }
        RpcMethod::AccountLines => {
            let p: AccountParams = parse_params(params)?;
            encode(
                ledger
                    .account_lines(&p.account)
                    .await
                    .map(|lines| LinesResult { lines }),
            )
        }
        RpcMethod::Tx => {
            let p: HashParams = parse_params(params)?;
            encode(ledger.transaction_status(&p.hash).await)
        }
        RpcMethod::Simulate => {
            let p: SimulateParams = parse_params(params)?;
            encode(ledger.simulate(&p.tx_json).await)
        }
        RpcMethod::SubmitAndWait => {
            let p: SubmitParams = parse_params(params)?;
            let envelope = SignedEnvelope::open(&p.tx_blob)
                .map_err(|e| RpcError::invalid_params(format!("tx_blob: {}", e)))?;
            let raw = ledger
                .submit_and_wait(&envelope)
                .await
                .map_err(|e| RpcError::from_network(&e))?;
            state.metrics.record_submission(&raw.engine_result);
            state.metrics.ledger_index.set(i64::from(ledger.ledger_index()));
            encode(Ok(raw))
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn encode<T: Serialize>(result: Result<T, NetworkError>) -> Result<Value, RpcError> {
    let value = result.map_err(|e| RpcError::from_network(&e))?;
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
