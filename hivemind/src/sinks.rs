//! Dispatch sinks: typed hooks observing every tool dispatch.
//!
//! Sinks run out-of-band after the envelope is built; they must be cheap and
//! must not fail the dispatch. The transport crate adds a Prometheus sink;
//! the core ships a tracing sink.

/// One completed dispatch as seen by sinks.
#[derive(Clone, Debug)]
pub struct DispatchEvent {
    pub server: String,
    pub tool: String,
    pub duration_ms: u64,
    pub is_error: bool,
    /// Taxonomy tag when the dispatch failed.
    pub error_kind: Option<&'static str>,
}

/// Observer invoked on every dispatch.
pub trait DispatchSink: Send + Sync {
    fn on_dispatch(&self, event: &DispatchEvent);
}

/// Default sink: one structured tracing event per dispatch.
pub struct TracingSink;

impl DispatchSink for TracingSink {
    fn on_dispatch(&self, event: &DispatchEvent) {
        if event.is_error {
            tracing::warn!(
                server = event.server.as_str(),
                tool = event.tool.as_str(),
                duration_ms = event.duration_ms,
                kind = event.error_kind.unwrap_or("unknown"),
                "tool dispatch failed"
            );
        } else {
            tracing::info!(
                server = event.server.as_str(),
                tool = event.tool.as_str(),
                duration_ms = event.duration_ms,
                "tool dispatch"
            );
        }
    }
}
