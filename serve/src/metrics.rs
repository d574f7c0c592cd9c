//! Prometheus exposition and the dispatch sink feeding it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use hivemind::{DispatchEvent, DispatchSink, HubError, HubResult};

use crate::app::AppState;

/// Counters and histograms for the dispatch path.
pub struct Metrics {
    registry: Registry,
    dispatch_total: IntCounterVec,
    dispatch_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> HubResult<Self> {
        let registry = Registry::new();
        let dispatch_total = IntCounterVec::new(
            Opts::new("hivemind_dispatch_total", "Tool dispatches by outcome"),
            &["server", "tool", "outcome"],
        )
        .map_err(|e| HubError::Internal(format!("metrics: {}", e)))?;
        let dispatch_duration = HistogramVec::new(
            HistogramOpts::new(
                "hivemind_dispatch_duration_seconds",
                "Tool dispatch latency",
            ),
            &["server", "tool"],
        )
        .map_err(|e| HubError::Internal(format!("metrics: {}", e)))?;
        registry
            .register(Box::new(dispatch_total.clone()))
            .map_err(|e| HubError::Internal(format!("metrics: {}", e)))?;
        registry
            .register(Box::new(dispatch_duration.clone()))
            .map_err(|e| HubError::Internal(format!("metrics: {}", e)))?;
        Ok(Self {
            registry,
            dispatch_total,
            dispatch_duration,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Dispatch sink recording every call into the registry.
pub struct PrometheusSink {
    metrics: Arc<Metrics>,
}

impl PrometheusSink {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl DispatchSink for PrometheusSink {
    fn on_dispatch(&self, event: &DispatchEvent) {
        let outcome = if event.is_error {
            event.error_kind.unwrap_or("error")
        } else {
            "ok"
        };
        self.metrics
            .dispatch_total
            .with_label_values(&[&event.server, &event.tool, outcome])
            .inc();
        self.metrics
            .dispatch_duration
            .with_label_values(&[&event.server, &event.tool])
            .observe(event.duration_ms as f64 / 1000.0);
    }
}

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: dispatch events land in the exposition output with
    /// their labels.
    #[test]
    fn sink_records_events() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let sink = PrometheusSink::new(metrics.clone());
        sink.on_dispatch(&DispatchEvent {
            server: "graph-memory".to_string(),
            tool: "create_entity".to_string(),
            duration_ms: 12,
            is_error: false,
            error_kind: None,
        });
        sink.on_dispatch(&DispatchEvent {
            server: "graph-memory".to_string(),
            tool: "create_entity".to_string(),
            duration_ms: 5,
            is_error: true,
            error_kind: Some("duplicate"),
        });
        let text = metrics.render();
        assert!(text.contains("hivemind_dispatch_total"));
        assert!(text.contains("outcome=\"ok\""));
        assert!(text.contains("outcome=\"duplicate\""));
        assert!(text.contains("hivemind_dispatch_duration_seconds"));
    }
}
