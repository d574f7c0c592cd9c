//! Hivemind CLI: build the hub from configuration and run a transport.

pub mod stdio;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use config::HubConfig;
use hivemind::{
    GraphPool, GraphPoolSettings, GraphStore, Hub, HubBuilder, HubError, HubResult,
    InMemoryGraph, InventoryCache, ModelRouter, Neo4jGraph, NotebookVault, OllamaRuntime,
    OmegaConfig, RoutingTable, TaskClass,
};
use serve::{Metrics, PrometheusSink, ServeOptions};

/// Hivemind: memory-and-reasoning hub for a hive mind of CLI agents.
#[derive(Parser, Debug)]
#[command(name = "hivemind", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP + WebSocket transport.
    Serve {
        /// Listen address, e.g. 127.0.0.1:8484 (overrides HIVEMIND_ADDR).
        #[arg(long)]
        addr: Option<String>,
        /// Use the in-memory graph instead of the bolt endpoint.
        #[arg(long)]
        standalone: bool,
    },
    /// Serve MCP over stdin/stdout for a single point-to-point session.
    Stdio {
        /// Use the in-memory graph instead of the bolt endpoint.
        #[arg(long)]
        standalone: bool,
    },
}

/// Installs the tracing subscriber: RUST_LOG wins, the configured level is
/// the default.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn routing_table(cfg: &HubConfig) -> RoutingTable {
    let mut table = RoutingTable::default();
    let overrides = [
        (TaskClass::Reasoning, &cfg.model.reasoning),
        (TaskClass::Coding, &cfg.model.coding),
        (TaskClass::Vision, &cfg.model.vision),
        (TaskClass::Chat, &cfg.model.chat),
        (TaskClass::Embedding, &cfg.model.embedding),
        (TaskClass::General, &cfg.model.general),
    ];
    for (class, model) in overrides {
        if let Some(model) = model {
            table.set(class, model.clone());
        }
    }
    if let Some(fallback) = &cfg.model.fallback {
        table.fallback = fallback.clone();
    }
    table
}

/// Builds the hub from configuration: real backends, or the in-memory graph
/// in standalone mode. Returns the hub together with the metrics registry
/// its Prometheus sink feeds.
pub async fn build_hub(cfg: &HubConfig, standalone: bool) -> HubResult<(Arc<Hub>, Arc<Metrics>)> {
    let graph: Arc<dyn GraphStore> = if standalone {
        tracing::info!("standalone mode: in-memory graph, nothing persists");
        Arc::new(InMemoryGraph::new())
    } else {
        let password = cfg.graph.password.clone().ok_or_else(|| {
            HubError::InvalidInput("HIVEMIND_GRAPH_PASSWORD is required (or use --standalone)".into())
        })?;
        let pool = GraphPool::connect(&GraphPoolSettings {
            uri: cfg.graph.uri.clone(),
            user: cfg.graph.user.clone(),
            password,
            database: cfg.graph.database.clone(),
            pool_size: cfg.graph.pool_size,
            acquire_timeout: Duration::from_millis(cfg.graph.acquire_timeout_ms),
        })
        .await?;
        Arc::new(Neo4jGraph::new(pool))
    };

    let vault = Arc::new(
        NotebookVault::new(cfg.vault.root.clone()).with_logs_folder(cfg.vault.logs_folder.clone()),
    );
    let runtime = Arc::new(OllamaRuntime::new(
        &cfg.model.host,
        cfg.model.port,
        Duration::from_millis(cfg.model.timeout_ms),
    ));
    let inventory = InventoryCache::new(
        runtime.clone(),
        Duration::from_secs(cfg.model.inventory_ttl_secs),
    );
    let router = Arc::new(ModelRouter::new(
        runtime,
        inventory,
        routing_table(cfg),
        cfg.model.retries,
    ));

    // Warm the inventory so the first routed call skips the probe.
    if let Err(e) = router.list(true).await {
        tracing::warn!(error = %e, "model inventory warmup failed");
    }

    let metrics = Arc::new(Metrics::new()?);
    let hub = HubBuilder::new(graph, vault, router)
        .governance(OmegaConfig {
            enforce_logging: cfg.governance.enforce,
            block_on_failure: cfg.governance.block_on_failure,
            ..OmegaConfig::default()
        })
        .sink(Arc::new(PrometheusSink::new(metrics.clone())))
        .build()
        .await?;
    Ok((Arc::new(hub), metrics))
}

/// Runs one parsed command to completion.
pub async fn run(cli: Cli, cfg: HubConfig) -> HubResult<()> {
    match cli.command {
        Command::Serve { addr, standalone } => {
            let (hub, metrics) = build_hub(&cfg, standalone).await?;
            let addr = addr.unwrap_or_else(|| cfg.serve.addr.clone());
            let options = ServeOptions {
                bearer_token: cfg.serve.bearer_token.clone(),
                drain_timeout: Duration::from_secs(cfg.serve.drain_timeout_secs),
            };
            serve::run_serve(hub, metrics, &addr, options).await
        }
        Command::Stdio { standalone } => {
            let (hub, _metrics) = build_hub(&cfg, standalone).await?;
            stdio::run(&hub.dispatcher).await
        }
    }
}
