//! HTTP + WebSocket transport for the hub (axum).
//!
//! The hub's outward surface: WS MCP framing at `/` and `/ws`,
//! `POST /tools/call`, health endpoints, Prometheus `/metrics`. Shutdown
//! drains in-flight handlers inside the configured window.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`ServeOptions`],
//! [`build_app`].

mod app;
mod health;
mod http;
mod metrics;
mod ws;

pub use app::{AppState, ServeOptions};
pub use http::status_for_kind;
pub use metrics::{Metrics, PrometheusSink};

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use hivemind::{Hub, HubError, HubResult};

/// Builds the app state and router for a hub. The returned state carries
/// the metrics registry the `PrometheusSink` should feed.
pub fn build_app(
    hub: Arc<Hub>,
    metrics: Arc<Metrics>,
    options: &ServeOptions,
) -> (Arc<AppState>, axum::Router) {
    let state = Arc::new(AppState::new(hub, metrics, options));
    let router = app::router(state.clone());
    (state, router)
}

/// Serves on an existing listener until `ctrl-c`. Tests bind to
/// `127.0.0.1:0` and pass the listener in.
pub async fn run_serve_on_listener(
    hub: Arc<Hub>,
    metrics: Arc<Metrics>,
    listener: TcpListener,
    options: ServeOptions,
) -> HubResult<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| HubError::Internal(format!("listener addr: {}", e)))?;
    info!("hub transport listening on http://{}", addr);
    let drain = options.drain_timeout;
    let (_state, router) = build_app(hub.clone(), metrics, &options);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, draining");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HubError::Internal(format!("serve: {}", e)))?;

    // Teardown runs inside the drain window: probe-and-release the
    // backends in parallel, then exit regardless.
    let teardown = async {
        let graph = hub.graph.clone();
        let registry = hub.registry.clone();
        tokio::join!(graph.health(), registry.health_probe());
    };
    if tokio::time::timeout(drain, teardown).await.is_err() {
        tracing::warn!("drain window exceeded, forcing exit");
    }
    info!("hub transport stopped");
    Ok(())
}

/// Binds `addr` and serves until `ctrl-c`. `metrics` should be the registry
/// whose [`PrometheusSink`] was attached when the hub was built, so the
/// `/metrics` endpoint reflects dispatches.
pub async fn run_serve(
    hub: Arc<Hub>,
    metrics: Arc<Metrics>,
    addr: &str,
    options: ServeOptions,
) -> HubResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| HubError::BackendUnavailable(format!("bind {}: {}", addr, e)))?;
    run_serve_on_listener(hub, metrics, listener, options).await
}
