//! # Prometheus Metrics
//!
//! Operational metrics for the sandbox node, scraped at `GET /metrics`.
//! They live in their own [`prometheus::Registry`] under the `ledgerflow_node`
//! namespace, apart from the engine's pipeline metrics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

use ledgerflow::metrics::encode_registry;

/// Metric handles for the node. Cloning shares the underlying collectors.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// RPC calls received, by method.
    pub rpc_requests_total: IntCounterVec,
    /// RPC calls answered with an error object.
    pub rpc_errors_total: IntCounter,
    /// Submissions applied, by result code class (`tes`, `tec`, `tef`, ...).
    pub submissions_total: IntCounterVec,
    /// Current open ledger index.
    pub ledger_index: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("ledgerflow_node".into()), None)?;

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("rpc_requests_total", "JSON-RPC requests received"),
            &["method"],
        )?;
        registry.register(Box::new(rpc_requests_total.clone()))?;

        let rpc_errors_total =
            IntCounter::new("rpc_errors_total", "JSON-RPC requests answered with an error")?;
        registry.register(Box::new(rpc_errors_total.clone()))?;

        let submissions_total = IntCounterVec::new(
            Opts::new("submissions_total", "Submitted transactions by result class"),
            &["class"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let ledger_index = IntGauge::new("ledger_index", "Current open ledger index")?;
        registry.register(Box::new(ledger_index.clone()))?;

        Ok(Self {
            registry,
            rpc_requests_total,
            rpc_errors_total,
            submissions_total,
            ledger_index,
        })
    }

    /// Count a submission by the three-letter prefix of its result code.
    pub fn record_submission(&self, engine_result: &str) {
        let class = engine_result.get(..3).unwrap_or("unknown");
        self.submissions_total.with_label_values(&[class]).inc();
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        encode_registry(&self.registry)
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders the registry in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submissions_are_bucketed_by_code_class() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_submission("tesSUCCESS");
        metrics.record_submission("tecUNFUNDED_PAYMENT");
        metrics.record_submission("tecNO_DST");

        assert_eq!(metrics.submissions_total.with_label_values(&["tes"]).get(), 1);
        assert_eq!(metrics.submissions_total.with_label_values(&["tec"]).get(), 2);
    }

    #[test]
    fn encode_uses_node_namespace() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.rpc_requests_total.with_label_values(&["fee"]).inc();
        let text = metrics.encode().unwrap();
        assert!(text.contains("ledgerflow_node_rpc_requests_total"));
    }
}
