//! Per-sub-server tool registry.
//!
//! Tool registration is a data structure: a spec plus an async handler
//! closure. The registry preserves registration order for `list` and runs
//! schema validation before any handler.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{HubError, HubResult};
use crate::mcp::schema::validate_args;
use crate::mcp::{CallToolResult, ToolSpec};

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, HubResult<Value>> + Send + Sync>;

/// One registered tool: spec plus handler.
#[derive(Clone)]
pub struct ToolDef {
    spec: ToolSpec,
    handler: Handler,
}

impl ToolDef {
    /// Builds a tool from its wire description and an async handler.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HubResult<Value>> + Send + 'static,
    {
        Self {
            spec: ToolSpec {
                name: name.into(),
                description: description.into(),
                input_schema,
            },
            handler: Arc::new(move |args| {
                Box::pin(handler(args)) as BoxFuture<'static, HubResult<Value>>
            }),
        }
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }
}

/// Ordered tool collection with by-name lookup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. A name collision replaces the handler in place so
    /// listing order stays stable.
    pub fn register(&mut self, tool: ToolDef) {
        let name = tool.spec.name.clone();
        match self.index.get(&name) {
            Some(&slot) => {
                tracing::warn!(tool = name.as_str(), "replacing registered tool");
                self.tools[slot] = tool;
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec.name.clone()).collect()
    }

    /// Specs in registration order.
    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    /// Dispatches one call: unknown tools and validation failures never
    /// reach a handler; every failure comes back as an error envelope.
    pub async fn call(&self, name: &str, args: Value) -> CallToolResult {
        let Some(&slot) = self.index.get(name) else {
            return CallToolResult::error(
                &HubError::NotFound(format!("tool not found: {}", name)),
                name,
            );
        };
        let tool = &self.tools[slot];
        if let Err(reason) = validate_args(&tool.spec.input_schema, &args) {
            return CallToolResult::error(&HubError::InvalidInput(reason), name);
        }
        match (tool.handler)(args).await {
            Ok(value) => CallToolResult::ok(&value),
            Err(e) => CallToolResult::error(&e, name),
        }
    }
}
