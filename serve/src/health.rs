//! Health endpoints: dependency probes with latency, readiness, liveness.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use hivemind::clock::utc_now_iso;

use crate::app::AppState;

/// `GET /health`: probes the graph and model backends, reports per-dependency
/// latency, and maps overall status to 200/503.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();

    let graph_health = state.hub.graph.health().await;
    let model_started = Instant::now();
    let model_ok = state.hub.router.list(false).await;
    let model_latency = model_started.elapsed().as_millis() as u64;

    let graph_healthy = graph_health.is_healthy();
    let model_healthy = model_ok.is_ok();
    let status = if graph_healthy && model_healthy {
        "healthy"
    } else {
        "degraded"
    };
    let code = if status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let graph_detail = match &graph_health {
        hivemind::GraphHealth::Healthy { latency_ms } => json!({
            "healthy": true,
            "latency_ms": latency_ms,
        }),
        hivemind::GraphHealth::Unhealthy { reason, latency_ms } => json!({
            "healthy": false,
            "reason": reason,
            "latency_ms": latency_ms,
        }),
    };
    let model_detail = match &model_ok {
        Ok(models) => json!({
            "healthy": true,
            "models": models.len(),
            "latency_ms": model_latency,
        }),
        Err(e) => json!({
            "healthy": false,
            "reason": e.to_string(),
            "latency_ms": model_latency,
        }),
    };

    let body = json!({
        "status": status,
        "timestamp": utc_now_iso(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "dependencies": {
            "graph": graph_detail,
            "model": model_detail,
        },
        "response_time_ms": started.elapsed().as_millis() as u64,
    });
    (code, Json(body))
}

/// `GET /health/ready`: 200 once the process serves requests.
pub async fn ready_handler() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ready": true })))
}

/// `GET /health/live`: 200 while the process is up.
pub async fn live_handler() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "alive": true })))
}
