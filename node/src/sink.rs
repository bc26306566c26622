//! # Event Sink
//!
//! The node's receiver for committed ledger events. Every event is logged
//! as a structured `tracing` record under the `ledger_events` target and
//! counted in Prometheus. Delivery never fails back into the ledger.

use nova_ledger::{EventRecord, EventSink};

use crate::metrics::SharedMetrics;

/// Logs and counts ledger events.
pub struct TracingSink {
    metrics: SharedMetrics,
}

impl TracingSink {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self { metrics }
    }
}

impl EventSink for TracingSink {
    fn publish(&self, record: &EventRecord) {
        let name = record.event.name();
        self.metrics
            .events_published_total
            .with_label_values(&[name])
            .inc();

        match serde_json::to_string(&record.event) {
            Ok(payload) => tracing::info!(
                target: "ledger_events",
                id = %record.id,
                committed_at = %record.committed_at.to_rfc3339(),
                event = name,
                %payload,
                "ledger event"
            ),
            Err(e) => tracing::warn!(
                target: "ledger_events",
                id = %record.id,
                event = name,
                error = %e,
                "ledger event could not be rendered"
            ),
        }
    }
}
