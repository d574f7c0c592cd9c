//! Sub-server discovery: the process-wide registry mapping names and tool
//! names to sub-servers.
//!
//! Registration order is the routing order: `route_tool` returns the first
//! registered sub-server offering the tool. Mutations are rare; lookups take
//! a read lock only.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::clock::utc_now_iso;
use crate::mcp::{SubServer, ToolSpec};

/// Probe status of one registered sub-server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Registry entry for one sub-server.
#[derive(Clone)]
pub struct Registration {
    pub server: Arc<dyn SubServer>,
    pub tools: Vec<String>,
    pub capabilities: Vec<String>,
    pub status: ServerStatus,
    pub registered_at: String,
}

/// Snapshot of a registration without the server handle, for introspection.
#[derive(Clone, Debug, serde::Serialize)]
pub struct RegistrationInfo {
    pub name: String,
    pub tools: Vec<String>,
    pub capabilities: Vec<String>,
    pub status: ServerStatus,
    pub registered_at: String,
}

/// Ordered sub-server registry.
#[derive(Default)]
pub struct SubServerRegistry {
    entries: RwLock<Vec<Registration>>,
}

impl SubServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sub-server, caching its tool names for routing. A name
    /// collision warns and keeps the existing registration.
    pub async fn register(&self, server: Arc<dyn SubServer>) {
        let name = server.name().to_string();
        let tools: Vec<String> = server
            .list_tools()
            .await
            .into_iter()
            .map(|t| t.name)
            .collect();
        let mut entries = self.entries.write().await;
        if entries.iter().any(|r| r.server.name() == name) {
            tracing::warn!(server = name.as_str(), "sub-server already registered");
            return;
        }
        entries.push(Registration {
            capabilities: server.capabilities(),
            server,
            tools,
            status: ServerStatus::Unknown,
            registered_at: utc_now_iso(),
        });
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|r| r.server.name() != name);
        entries.len() < before
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn SubServer>> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|r| r.server.name() == name)
            .map(|r| r.server.clone())
    }

    /// All sub-servers in registration order.
    pub async fn servers(&self) -> Vec<Arc<dyn SubServer>> {
        let entries = self.entries.read().await;
        entries.iter().map(|r| r.server.clone()).collect()
    }

    /// Every tool with its owning sub-server, flattened in registration
    /// order.
    pub async fn discover_tools(&self) -> Vec<(String, ToolSpec)> {
        let servers = self.servers().await;
        let mut out = Vec::new();
        for server in servers {
            for spec in server.list_tools().await {
                out.push((server.name().to_string(), spec));
            }
        }
        out
    }

    /// First registered sub-server offering `tool`, per the cached tool
    /// lists; deterministic by registration order.
    pub async fn route_tool(&self, tool: &str) -> Option<Arc<dyn SubServer>> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|r| r.tools.iter().any(|t| t == tool))
            .map(|r| r.server.clone())
    }

    /// Probes every sub-server and updates status.
    pub async fn health_probe(&self) {
        let servers = self.servers().await;
        let mut outcomes = Vec::with_capacity(servers.len());
        for server in &servers {
            outcomes.push(if server.healthy().await {
                ServerStatus::Healthy
            } else {
                ServerStatus::Unhealthy
            });
        }
        let mut entries = self.entries.write().await;
        for entry in entries.iter_mut() {
            if let Some(pos) = servers
                .iter()
                .position(|s| s.name() == entry.server.name())
            {
                entry.status = outcomes[pos];
            }
        }
    }

    pub async fn info(&self) -> Vec<RegistrationInfo> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|r| RegistrationInfo {
                name: r.server.name().to_string(),
                tools: r.tools.clone(),
                capabilities: r.capabilities.clone(),
                status: r.status,
                registered_at: r.registered_at.clone(),
            })
            .collect()
    }
}
