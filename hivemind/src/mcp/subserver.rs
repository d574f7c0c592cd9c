//! Sub-server interface.
//!
//! One trait instead of a class hierarchy: a sub-server exposes its name,
//! its tool surface, and optionally resources. Most implementations hold a
//! [`crate::mcp::ToolRegistry`] and delegate.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{HubError, HubResult};
use crate::mcp::{CallToolResult, ResourceContent, ResourceSpec, ToolSpec};

/// A named tool surface the dispatcher can route to.
#[async_trait]
pub trait SubServer: Send + Sync {
    /// Stable sub-server name, e.g. `graph-memory`.
    fn name(&self) -> &str;

    /// Capability tags reported to discovery.
    fn capabilities(&self) -> Vec<String> {
        vec!["tools".to_string()]
    }

    async fn list_tools(&self) -> Vec<ToolSpec>;

    async fn call_tool(&self, name: &str, args: Value) -> CallToolResult;

    async fn list_resources(&self) -> Vec<ResourceSpec> {
        Vec::new()
    }

    async fn read_resource(&self, uri: &str) -> HubResult<ResourceContent> {
        Err(HubError::NotFound(format!("resource {}", uri)))
    }

    /// Backend reachability for discovery's health probe.
    async fn healthy(&self) -> bool {
        true
    }
}
