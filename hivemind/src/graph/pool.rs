//! Graph session pool: scoped read/write transactions over the bolt driver.
//!
//! External callers never see sessions or transactions directly; they pass a
//! closure to `run_read`/`run_write`, which acquires a session, opens the
//! transaction, commits on success, rolls back on failure, and releases the
//! session on every exit path. Acquisition waits up to the configured
//! timeout; exhaustion surfaces as `BackendUnavailable` or `Timeout`.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use neo4rs::{query, ConfigBuilder, Graph, Txn};

use crate::error::{HubError, HubResult};
use crate::graph::store::GraphHealth;

/// Connection settings for the bolt endpoint.
#[derive(Clone, Debug)]
pub struct GraphPoolSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: usize,
    pub acquire_timeout: Duration,
}

impl Default for GraphPoolSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            pool_size: 50,
            acquire_timeout: Duration::from_millis(60_000),
        }
    }
}

/// Pooled bolt connection with scoped transaction helpers.
pub struct GraphPool {
    graph: Graph,
    acquire_timeout: Duration,
}

impl GraphPool {
    /// Connects to the bolt endpoint. The driver maintains the connection
    /// pool internally; `pool_size` caps it.
    pub async fn connect(settings: &GraphPoolSettings) -> HubResult<Self> {
        let config = ConfigBuilder::default()
            .uri(&settings.uri)
            .user(&settings.user)
            .password(&settings.password)
            .db(settings.database.as_str())
            .max_connections(settings.pool_size)
            .build()
            .map_err(map_driver_err)?;
        let graph = Graph::connect(config).await.map_err(map_driver_err)?;
        Ok(Self {
            graph,
            acquire_timeout: settings.acquire_timeout,
        })
    }

    /// Runs `f` inside a read transaction. Commits on success, rolls back on
    /// failure; the session is released on every exit path.
    pub async fn run_read<T, F>(&self, f: F) -> HubResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Txn) -> BoxFuture<'t, HubResult<T>> + Send,
    {
        self.run_txn(f).await
    }

    /// Runs `f` inside a write transaction with the same scoping rules.
    pub async fn run_write<T, F>(&self, f: F) -> HubResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Txn) -> BoxFuture<'t, HubResult<T>> + Send,
    {
        self.run_txn(f).await
    }

    async fn run_txn<T, F>(&self, f: F) -> HubResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Txn) -> BoxFuture<'t, HubResult<T>> + Send,
    {
        let mut txn = tokio::time::timeout(self.acquire_timeout, self.graph.start_txn())
            .await
            .map_err(|_| HubError::Timeout("graph session acquisition".into()))?
            .map_err(map_driver_err)?;
        match f(&mut txn).await {
            Ok(value) => {
                txn.commit().await.map_err(map_driver_err)?;
                Ok(value)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    /// `RETURN 1` on a fresh session, with latency.
    pub async fn health(&self) -> GraphHealth {
        let started = Instant::now();
        let probe = async {
            let mut rows = self.graph.execute(query("RETURN 1 AS ok")).await?;
            rows.next().await.map(|_| ())
        };
        let outcome = tokio::time::timeout(self.acquire_timeout, probe).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(())) => GraphHealth::Healthy { latency_ms },
            Ok(Err(e)) => GraphHealth::Unhealthy {
                reason: e.to_string(),
                latency_ms,
            },
            Err(_) => GraphHealth::Unhealthy {
                reason: "health probe timed out".to_string(),
                latency_ms,
            },
        }
    }
}

/// Translates driver failures into the hub taxonomy. The driver's error
/// surface is stringly at this level, so classification matches on the
/// rendered message.
pub(crate) fn map_driver_err(e: neo4rs::Error) -> HubError {
    let text = e.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("constraintvalidation") || lowered.contains("already exists") {
        HubError::Duplicate(text)
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        HubError::Timeout(text)
    } else if lowered.contains("connection")
        || lowered.contains("io error")
        || lowered.contains("refused")
        || lowered.contains("reset")
        || lowered.contains("authentication")
    {
        HubError::BackendUnavailable(text)
    } else {
        HubError::Internal(text)
    }
}
