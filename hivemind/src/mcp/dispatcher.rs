//! Dispatcher: routes the four MCP operations across sub-servers.
//!
//! Transport-agnostic and re-entrant; independent calls run concurrently.
//! Every `tools/call` is wrapped by governance, and sinks observe every
//! dispatch outcome. Failures never escape as panics; they become error
//! envelopes.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::discovery::SubServerRegistry;
use crate::error::{HubError, HubResult};
use crate::governance::Omega;
use crate::mcp::{CallToolResult, ResourceContent, ResourceSpec, ToolSpec};
use crate::sinks::{DispatchEvent, DispatchSink};

/// Multiplexes `tools/list`, `tools/call`, `resources/list`, and
/// `resources/read` over the sub-server registry.
pub struct Dispatcher {
    registry: Arc<SubServerRegistry>,
    governance: Arc<Omega>,
    sinks: Vec<Arc<dyn DispatchSink>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubServerRegistry>, governance: Arc<Omega>) -> Self {
        Self {
            registry,
            governance,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DispatchSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn registry(&self) -> &Arc<SubServerRegistry> {
        &self.registry
    }

    pub fn governance(&self) -> &Arc<Omega> {
        &self.governance
    }

    /// All tools across sub-servers, flattened in registration order.
    pub async fn tools_list(&self) -> Vec<ToolSpec> {
        self.registry
            .discover_tools()
            .await
            .into_iter()
            .map(|(_, spec)| spec)
            .collect()
    }

    /// Routes and executes one tool call under governance.
    ///
    /// `server` pins the target sub-server; without it the tool name is
    /// resolved through discovery in registration order.
    pub async fn tools_call(
        &self,
        server: Option<&str>,
        tool: &str,
        args: Value,
    ) -> CallToolResult {
        let started = Instant::now();
        let target = match server {
            Some(name) => self.registry.get(name).await,
            None => self.registry.route_tool(tool).await,
        };
        let resolved = target.as_ref().map(|s| s.name().to_string());
        let result = match target {
            Some(sub) => {
                let summary = summarize_args(&args);
                self.governance
                    .wrap_tool_call(sub.name(), tool, summary, || sub.call_tool(tool, args))
                    .await
            }
            None => CallToolResult::error(
                &HubError::NotFound(match server {
                    Some(name) => format!("sub-server not found: {}", name),
                    None => format!("tool not found: {}", tool),
                }),
                tool,
            ),
        };
        let event = DispatchEvent {
            server: resolved
                .or_else(|| server.map(str::to_string))
                .unwrap_or_else(|| "unrouted".to_string()),
            tool: tool.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            is_error: result.is_err(),
            error_kind: result.error_kind,
        };
        for sink in &self.sinks {
            sink.on_dispatch(&event);
        }
        result
    }

    /// All resources across sub-servers.
    pub async fn resources_list(&self) -> Vec<ResourceSpec> {
        let mut out = Vec::new();
        for server in self.registry.servers().await {
            out.extend(server.list_resources().await);
        }
        out
    }

    /// Reads a resource by URI: sub-servers are asked in registration order
    /// and the first one that recognizes the URI wins.
    pub async fn resources_read(&self, uri: &str) -> HubResult<ResourceContent> {
        for server in self.registry.servers().await {
            match server.read_resource(uri).await {
                Ok(content) => return Ok(content),
                Err(HubError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(HubError::NotFound(format!("resource {}", uri)))
    }
}

/// Arguments enter the pre-record; cap the payload so one oversized call
/// cannot bloat the daily log.
fn summarize_args(args: &Value) -> Value {
    let rendered = args.to_string();
    const CAP: usize = 512;
    if rendered.len() <= CAP {
        args.clone()
    } else {
        let mut cut = CAP;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        Value::String(format!("{}… ({} bytes)", &rendered[..cut], rendered.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::OmegaConfig;
    use crate::mcp::{object_schema, SchemaField, SubServer, ToolDef, ToolRegistry};
    use crate::notebook::NotebookVault;
    use crate::sinks::test_support::RecordingSink;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoServer {
        registry: ToolRegistry,
    }

    impl EchoServer {
        fn new() -> Self {
            let mut registry = ToolRegistry::new();
            registry.register(ToolDef::new(
                "echo",
                "Echoes its input",
                object_schema(&[SchemaField::new("text", "string", "Text")], &["text"]),
                |args| async move { Ok(json!({ "echoed": args["text"] })) },
            ));
            Self { registry }
        }
    }

    #[async_trait]
    impl SubServer for EchoServer {
        fn name(&self) -> &str {
            "echo-server"
        }

        async fn list_tools(&self) -> Vec<ToolSpec> {
            self.registry.list()
        }

        async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
            self.registry.call(name, args).await
        }

        async fn list_resources(&self) -> Vec<ResourceSpec> {
            vec![ResourceSpec {
                uri: "echo://only".to_string(),
                name: "only".to_string(),
                description: "the one resource".to_string(),
                mime_type: "text/plain".to_string(),
            }]
        }

        async fn read_resource(&self, uri: &str) -> HubResult<ResourceContent> {
            if uri == "echo://only" {
                Ok(ResourceContent {
                    uri: uri.to_string(),
                    mime_type: "text/plain".to_string(),
                    text: "hi".to_string(),
                })
            } else {
                Err(HubError::NotFound(format!("resource {}", uri)))
            }
        }
    }

    async fn dispatcher() -> (tempfile::TempDir, Arc<RecordingSink>, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(NotebookVault::new(dir.path()));
        let omega = Arc::new(Omega::new(vault, OmegaConfig::default()));
        let registry = Arc::new(SubServerRegistry::new());
        registry.register(Arc::new(EchoServer::new())).await;
        let sink = Arc::new(RecordingSink::new());
        let dispatcher = Dispatcher::new(registry, omega).with_sink(sink.clone());
        (dir, sink, dispatcher)
    }

    /// **Scenario**: a routed call reaches the tool and the sink observes it.
    #[tokio::test]
    async fn routed_call_and_sink() {
        let (_dir, sink, dispatcher) = dispatcher().await;
        let result = dispatcher
            .tools_call(None, "echo", json!({"text": "hello"}))
            .await;
        assert!(!result.is_err());
        assert!(result.first_text().contains("hello"));
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tool, "echo");
        assert!(!events[0].is_error);
    }

    /// **Scenario**: pinning an unknown sub-server yields NotFound without
    /// executing.
    #[tokio::test]
    async fn unknown_server_pin() {
        let (_dir, sink, dispatcher) = dispatcher().await;
        let result = dispatcher
            .tools_call(Some("ghost"), "echo", json!({"text": "x"}))
            .await;
        assert!(result.is_err());
        assert_eq!(result.error_kind, Some("not_found"));
        assert!(sink.events.lock().unwrap()[0].is_error);
    }

    /// **Scenario**: tools_list flattens sub-server surfaces.
    #[tokio::test]
    async fn list_flattens() {
        let (_dir, _sink, dispatcher) = dispatcher().await;
        let tools = dispatcher.tools_list().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    /// **Scenario**: resources route by first-recognizer.
    #[tokio::test]
    async fn resource_read() {
        let (_dir, _sink, dispatcher) = dispatcher().await;
        let resources = dispatcher.resources_list().await;
        assert_eq!(resources.len(), 1);
        let content = dispatcher.resources_read("echo://only").await.unwrap();
        assert_eq!(content.text, "hi");
        assert!(dispatcher.resources_read("nope://x").await.is_err());
    }

    /// **Scenario**: oversized arguments are summarized, not dropped.
    #[test]
    fn arg_summaries_bounded() {
        let big = json!({ "blob": "y".repeat(10_000) });
        let summary = summarize_args(&big);
        let text = summary.as_str().unwrap();
        assert!(text.len() < 600);
        assert!(text.contains("bytes"));
        let small = json!({"a": 1});
        assert_eq!(summarize_args(&small), small);
    }
}
