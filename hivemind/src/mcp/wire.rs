//! Transport-agnostic wire protocol: one JSON-RPC-shaped request in, one
//! response out.
//!
//! Both the WebSocket transport and the stdio loop parse a frame into
//! [`WireRequest`], hand it to [`handle_request`], and serialize the
//! [`WireResponse`]. The dispatcher stays unaware of framing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::HubError;
use crate::mcp::Dispatcher;

/// Incoming frame. `method` selects the operation; `params` carries its
/// arguments.
#[derive(Clone, Debug, Deserialize)]
pub struct WireRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC-shaped error payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

/// Outgoing frame: exactly one of `result`/`error` is set.
#[derive(Clone, Debug, Serialize)]
pub struct WireResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl WireResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(WireError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Parses one frame and dispatches it. Parse failures come back as error
/// responses, never as transport failures.
pub async fn handle_frame(dispatcher: &Dispatcher, frame: &str) -> WireResponse {
    match serde_json::from_str::<WireRequest>(frame) {
        Ok(request) => handle_request(dispatcher, request).await,
        Err(e) => WireResponse::err(None, -32700, format!("parse error: {}", e)),
    }
}

/// Dispatches one request over the four MCP operations plus `ping`.
pub async fn handle_request(dispatcher: &Dispatcher, request: WireRequest) -> WireResponse {
    let id = request.id.clone();
    match request.method.as_str() {
        "tools/list" => {
            let tools = dispatcher.tools_list().await;
            WireResponse::ok(id, json!({ "tools": tools }))
        }
        "tools/call" => {
            let params = &request.params;
            let Some(tool) = params
                .get("name")
                .or_else(|| params.get("tool"))
                .and_then(Value::as_str)
            else {
                return WireResponse::err(id, -32602, "tools/call requires a tool name");
            };
            let server = params.get("server").and_then(Value::as_str);
            let args = params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            let result = dispatcher.tools_call(server, tool, args).await;
            match serde_json::to_value(&result) {
                Ok(value) => WireResponse::ok(id, value),
                Err(e) => WireResponse::err(id, -32603, format!("encode: {}", e)),
            }
        }
        "resources/list" => {
            let resources = dispatcher.resources_list().await;
            WireResponse::ok(id, json!({ "resources": resources }))
        }
        "resources/read" => {
            let Some(uri) = request.params.get("uri").and_then(Value::as_str) else {
                return WireResponse::err(id, -32602, "resources/read requires a uri");
            };
            match dispatcher.resources_read(uri).await {
                Ok(content) => WireResponse::ok(id, json!({ "contents": [content] })),
                Err(e) => WireResponse::err(id, error_code(&e), e.to_string()),
            }
        }
        "ping" => WireResponse::ok(id, json!({ "pong": true })),
        other => WireResponse::err(id, -32601, format!("unknown method: {}", other)),
    }
}

fn error_code(e: &HubError) -> i64 {
    match e {
        HubError::InvalidInput(_) => -32602,
        HubError::NotFound(_) => -32004,
        _ => -32603,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::SubServerRegistry;
    use crate::governance::{Omega, OmegaConfig};
    use crate::mcp::{object_schema, CallToolResult, SubServer, ToolDef, ToolRegistry, ToolSpec};
    use crate::notebook::NotebookVault;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct PingServer {
        registry: ToolRegistry,
    }

    impl PingServer {
        fn new() -> Self {
            let mut registry = ToolRegistry::new();
            registry.register(ToolDef::new(
                "hello",
                "Says hello",
                object_schema(&[], &[]),
                |_args| async move { Ok(json!("hello")) },
            ));
            Self { registry }
        }
    }

    #[async_trait]
    impl SubServer for PingServer {
        fn name(&self) -> &str {
            "ping-server"
        }

        async fn list_tools(&self) -> Vec<ToolSpec> {
            self.registry.list()
        }

        async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
            self.registry.call(name, args).await
        }
    }

    async fn dispatcher() -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(NotebookVault::new(dir.path()));
        let omega = Arc::new(Omega::new(vault, OmegaConfig::default()));
        let registry = Arc::new(SubServerRegistry::new());
        registry.register(Arc::new(PingServer::new())).await;
        (dir, Dispatcher::new(registry, omega))
    }

    /// **Scenario**: tools/list and tools/call round-trip over the wire
    /// shapes.
    #[tokio::test]
    async fn list_and_call() {
        let (_dir, dispatcher) = dispatcher().await;
        let resp = handle_frame(&dispatcher, r#"{"id":1,"method":"tools/list"}"#).await;
        let tools = resp.result.unwrap();
        assert_eq!(tools["tools"][0]["name"], "hello");

        let resp = handle_frame(
            &dispatcher,
            r#"{"id":2,"method":"tools/call","params":{"name":"hello","arguments":{}}}"#,
        )
        .await;
        assert_eq!(resp.id, Some(json!(2)));
        let result = resp.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
    }

    /// **Scenario**: malformed frames and unknown methods are error
    /// responses, not failures.
    #[tokio::test]
    async fn protocol_errors() {
        let (_dir, dispatcher) = dispatcher().await;
        let resp = handle_frame(&dispatcher, "not json").await;
        assert_eq!(resp.error.unwrap().code, -32700);

        let resp = handle_frame(&dispatcher, r#"{"id":3,"method":"nope"}"#).await;
        assert_eq!(resp.error.unwrap().code, -32601);

        let resp =
            handle_frame(&dispatcher, r#"{"id":4,"method":"tools/call","params":{}}"#).await;
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    /// **Scenario**: ping answers without touching any sub-server.
    #[tokio::test]
    async fn ping() {
        let (_dir, dispatcher) = dispatcher().await;
        let resp = handle_frame(&dispatcher, r#"{"id":9,"method":"ping"}"#).await;
        assert_eq!(resp.result.unwrap()["pong"], json!(true));
    }
}
