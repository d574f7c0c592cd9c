//! Axum app: shared state, router, and the bearer check.

use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use hivemind::Hub;

use crate::health::{health_handler, live_handler, ready_handler};
use crate::http::tools_call_handler;
use crate::metrics::{metrics_handler, Metrics};
use crate::ws::ws_handler;

/// Transport options.
#[derive(Clone, Debug, Default)]
pub struct ServeOptions {
    /// When set, HTTP requests and WS upgrades must carry
    /// `Authorization: Bearer <token>`.
    pub bearer_token: Option<String>,
    /// Drain window for graceful shutdown.
    pub drain_timeout: std::time::Duration,
}

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub hub: Arc<Hub>,
    pub metrics: Arc<Metrics>,
    pub bearer_token: Option<String>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, metrics: Arc<Metrics>, options: &ServeOptions) -> Self {
        Self {
            hub,
            metrics,
            bearer_token: options.bearer_token.clone(),
            started_at: Instant::now(),
        }
    }

    /// Opaque bearer check at the edge. Health endpoints stay open.
    pub fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.bearer_token else {
            return true;
        };
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|token| token == expected)
            .unwrap_or(false)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/health/ready", get(ready_handler))
        .route("/health/live", get(live_handler))
        .route("/metrics", get(metrics_handler))
        .route("/tools/call", post(tools_call_handler))
        .with_state(state)
}
