//! # Prometheus Metrics
//!
//! Exposes operational metrics for the ledger node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `nova_ledger` prefix so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Prometheus handles are reference-counted internally, so clones share
/// the same series.
#[derive(Clone)]
pub struct LedgerMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Successful deposits.
    pub deposits_total: IntCounter,
    /// Successful withdrawals (entity and protocol-fee paths).
    pub withdrawals_total: IntCounter,
    /// Rejected operations, labelled by error kind.
    pub rejected_operations_total: IntCounterVec,
    /// Published ledger events, labelled by event name.
    pub events_published_total: IntCounterVec,
    /// Currently live entities.
    pub entities_registered: IntGauge,
    /// Handler latency in seconds, labelled by operation.
    pub operation_latency_seconds: HistogramVec,
}

impl LedgerMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("nova_ledger".into()), None)?;

        let deposits_total = IntCounter::new("deposits_total", "Total number of credited deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total number of settled withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let rejected_operations_total = IntCounterVec::new(
            Opts::new(
                "rejected_operations_total",
                "Operations refused by the ledger, by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Ledger events published, by event name"),
            &["event"],
        )?;
        registry.register(Box::new(events_published_total.clone()))?;

        let entities_registered =
            IntGauge::new("entities_registered", "Number of live registered entities")?;
        registry.register(Box::new(entities_registered.clone()))?;

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Ledger operation latency in seconds, including persistence",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            deposits_total,
            withdrawals_total,
            rejected_operations_total,
            events_published_total,
            entities_registered,
            operation_latency_seconds,
        })
    }

    /// Counts a refused operation.
    pub fn record_rejection(&self, kind: &str) {
        self.rejected_operations_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<LedgerMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
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
