//! MCP surface: tool specs, call envelopes, registry, dispatcher, and the
//! transport-agnostic wire protocol.
//!
//! Sub-servers register typed tools in a [`ToolRegistry`]; the
//! [`Dispatcher`] multiplexes `tools/list`, `tools/call`, `resources/list`,
//! and `resources/read` across sub-servers with governance wrapped around
//! every call.

mod dispatcher;
mod registry;
mod schema;
mod subserver;
pub mod wire;

pub use dispatcher::Dispatcher;
pub use registry::{ToolDef, ToolRegistry};
pub use schema::{object_schema, validate_args, SchemaField};
pub use subserver::SubServer;

use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// Tool description as listed via `tools/list`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One content item in a tool result. Only text content is produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Uniform `tools/call` envelope.
///
/// Success wraps the stringified result; failure wraps a JSON error object
/// and sets `isError`. `error_kind` carries the taxonomy tag for transports
/// that map kinds to status codes; it never serializes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(skip)]
    pub error_kind: Option<&'static str>,
}

impl CallToolResult {
    /// Wraps a successful result as stringified JSON text content.
    pub fn ok(value: &impl Serialize) -> Self {
        let text = serde_json::to_string(value)
            .unwrap_or_else(|e| format!("{{\"error\":\"encode: {}\"}}", e));
        Self {
            content: vec![ContentItem::text(text)],
            is_error: None,
            error_kind: None,
        }
    }

    /// Wraps a failure as a text-encoded `{error, kind, tool}` object.
    pub fn error(err: &HubError, tool: &str) -> Self {
        let body = serde_json::json!({
            "error": err.to_string(),
            "kind": err.kind(),
            "tool": tool,
        });
        Self {
            content: vec![ContentItem::text(body.to_string())],
            is_error: Some(true),
            error_kind: Some(err.kind()),
        }
    }

    pub fn is_err(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// First text item, used for summaries and tests.
    pub fn first_text(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or("")
    }
}

/// Resource description as listed via `resources/list`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: String,
}

/// Resource payload as returned by `resources/read`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: success envelopes stringify the value as one text item.
    #[test]
    fn ok_envelope_shape() {
        let result = CallToolResult::ok(&serde_json::json!({"a": 1}));
        assert!(!result.is_err());
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.content[0].kind, "text");
        assert!(result.first_text().contains("\"a\":1"));
        let wire = serde_json::to_value(&result).unwrap();
        assert!(wire.get("isError").is_none());
    }

    /// **Scenario**: error envelopes set isError and carry the taxonomy kind
    /// in the text, while error_kind stays off the wire.
    #[test]
    fn error_envelope_shape() {
        let err = HubError::NotFound("Person:p1".into());
        let result = CallToolResult::error(&err, "get_entity");
        assert!(result.is_err());
        assert_eq!(result.error_kind, Some("not_found"));
        let body: serde_json::Value = serde_json::from_str(result.first_text()).unwrap();
        assert_eq!(body["kind"], "not_found");
        assert_eq!(body["tool"], "get_entity");
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["isError"], serde_json::json!(true));
        assert!(wire.get("error_kind").is_none());
    }
}
