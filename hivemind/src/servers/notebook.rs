//! Notebook sub-server: vault I/O as tools, vault files as resources.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{HubError, HubResult};
use crate::governance::LogRecord;
use crate::mcp::{
    object_schema, CallToolResult, ResourceContent, ResourceSpec, SchemaField, SubServer, ToolDef,
    ToolRegistry, ToolSpec,
};
use crate::notebook::{FmValue, Frontmatter, ListOrder, NotebookVault};

pub const SERVER_NAME: &str = "notebook";

impl FromStr for ListOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(ListOrder::Newest),
            "oldest" => Ok(ListOrder::Oldest),
            _ => Err(format!("unknown order: {} (use newest or oldest)", s)),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> HubResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::InvalidInput(format!("missing required field: {}", key)))
}

/// Converts a JSON object into insertion-ordered frontmatter. Nested
/// structures beyond one map level are rejected.
fn frontmatter_from_json(obj: &Map<String, Value>) -> HubResult<Frontmatter> {
    let mut fm = Frontmatter::new();
    for (key, value) in obj {
        fm.insert(key.as_str(), fm_value(value, true)?);
    }
    Ok(fm)
}

fn fm_value(value: &Value, allow_nesting: bool) -> HubResult<FmValue> {
    match value {
        Value::String(s) => Ok(FmValue::String(s.clone())),
        Value::Bool(b) => Ok(FmValue::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(FmValue::Int(i))
            } else {
                Ok(FmValue::Float(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::Array(items) => {
            let strings: Option<Vec<String>> = items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect();
            strings
                .map(FmValue::List)
                .ok_or_else(|| HubError::InvalidInput("frontmatter lists hold strings".into()))
        }
        Value::Object(map) if allow_nesting => {
            let mut entries = Vec::with_capacity(map.len());
            for (k, v) in map {
                entries.push((k.clone(), fm_value(v, false)?));
            }
            Ok(FmValue::Map(entries))
        }
        _ => Err(HubError::InvalidInput(
            "unsupported frontmatter value".into(),
        )),
    }
}

fn frontmatter_to_json(fm: &Frontmatter) -> Value {
    let mut out = Map::new();
    for (key, value) in fm.iter() {
        out.insert(key.to_string(), fm_to_json(value));
    }
    Value::Object(out)
}

fn fm_to_json(value: &FmValue) -> Value {
    match value {
        FmValue::String(s) => json!(s),
        FmValue::Int(i) => json!(i),
        FmValue::Float(f) => json!(f),
        FmValue::Bool(b) => json!(b),
        FmValue::List(items) => json!(items),
        FmValue::Map(entries) => {
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), fm_to_json(v));
            }
            Value::Object(out)
        }
    }
}

/// Sub-server exposing vault tools.
pub struct NotebookServer {
    vault: Arc<NotebookVault>,
    registry: ToolRegistry,
}

impl NotebookServer {
    pub fn new(vault: Arc<NotebookVault>) -> Self {
        let mut registry = ToolRegistry::new();

        let v = vault.clone();
        registry.register(ToolDef::new(
            "write_note",
            "Replace a note's contents, optionally with frontmatter",
            object_schema(
                &[
                    SchemaField::new("name", "string", "Note name inside the vault"),
                    SchemaField::new("body", "string", "Markdown body"),
                    SchemaField::new("frontmatter", "object", "Frontmatter map"),
                ],
                &["name", "body"],
            ),
            move |args| {
                let vault = v.clone();
                async move {
                    let fm = match args.get("frontmatter").and_then(Value::as_object) {
                        Some(obj) => Some(frontmatter_from_json(obj)?),
                        None => None,
                    };
                    let path = vault
                        .write(
                            required_str(&args, "name")?,
                            required_str(&args, "body")?,
                            fm.as_ref(),
                        )
                        .await?;
                    Ok(json!({ "success": true, "path": path.display().to_string() }))
                }
            },
        ));

        let v = vault.clone();
        registry.register(ToolDef::new(
            "append_note",
            "Append to a note with a blank-line separator",
            object_schema(
                &[
                    SchemaField::new("name", "string", "Note name"),
                    SchemaField::new("body", "string", "Markdown to append"),
                ],
                &["name", "body"],
            ),
            move |args| {
                let vault = v.clone();
                async move {
                    let path = vault
                        .append(required_str(&args, "name")?, required_str(&args, "body")?)
                        .await?;
                    Ok(json!({ "success": true, "path": path.display().to_string() }))
                }
            },
        ));

        let v = vault.clone();
        registry.register(ToolDef::new(
            "read_note",
            "Read a note, splitting frontmatter from body",
            object_schema(&[SchemaField::new("name", "string", "Note name")], &["name"]),
            move |args| {
                let vault = v.clone();
                async move {
                    let (fm, body) = vault.read(required_str(&args, "name")?).await?;
                    Ok(json!({
                        "success": true,
                        "frontmatter": frontmatter_to_json(&fm),
                        "body": body,
                    }))
                }
            },
        ));

        let v = vault.clone();
        registry.register(ToolDef::new(
            "list_notes",
            "List vault notes by modification time",
            object_schema(
                &[
                    SchemaField::new("limit", "integer", "Max results (default 50)"),
                    SchemaField::new("order", "string", "newest | oldest (default newest)"),
                ],
                &[],
            ),
            move |args| {
                let vault = v.clone();
                async move {
                    let order = match args.get("order").and_then(Value::as_str) {
                        Some(raw) => ListOrder::from_str(raw).map_err(HubError::InvalidInput)?,
                        None => ListOrder::Newest,
                    };
                    let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
                    let notes = vault.list(limit, order).await?;
                    Ok(json!({ "success": true, "count": notes.len(), "notes": notes }))
                }
            },
        ));

        let v = vault.clone();
        registry.register(ToolDef::new(
            "search_notes",
            "Search notes by filename, optionally scanning content",
            object_schema(
                &[
                    SchemaField::new("query", "string", "Substring to match"),
                    SchemaField::new("searchBody", "boolean", "Also scan note contents"),
                ],
                &["query"],
            ),
            move |args| {
                let vault = v.clone();
                async move {
                    let hits = vault
                        .search(
                            required_str(&args, "query")?,
                            args.get("searchBody")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                        )
                        .await?;
                    Ok(json!({ "success": true, "count": hits.len(), "notes": hits }))
                }
            },
        ));

        let v = vault.clone();
        registry.register(ToolDef::new(
            "log_entry",
            "Append a structured record to today's daily log",
            object_schema(
                &[
                    SchemaField::new("source", "string", "Originating client or subsystem"),
                    SchemaField::new("action", "string", "Action name"),
                    SchemaField::new("type", "string", "Record type (default tool_call)"),
                    SchemaField::new("data", "object", "Sections payload"),
                ],
                &["source", "action"],
            ),
            move |args| {
                let vault = v.clone();
                async move {
                    let record = LogRecord::now(
                        args.get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("tool_call"),
                        required_str(&args, "source")?,
                        required_str(&args, "action")?,
                        args.get("data").cloned().unwrap_or_else(|| json!({})),
                    );
                    let path = vault
                        .append_daily_log(&record.render_markdown(), env!("CARGO_PKG_VERSION"))
                        .await?;
                    Ok(json!({
                        "success": true,
                        "path": path.display().to_string(),
                        "timestamp": record.timestamp,
                    }))
                }
            },
        ));

        Self { vault, registry }
    }
}

#[async_trait]
impl SubServer for NotebookServer {
    fn name(&self) -> &str {
        SERVER_NAME
    }

    fn capabilities(&self) -> Vec<String> {
        vec!["tools".to_string(), "resources".to_string()]
    }

    async fn list_tools(&self) -> Vec<ToolSpec> {
        self.registry.list()
    }

    async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        self.registry.call(name, args).await
    }

    async fn list_resources(&self) -> Vec<ResourceSpec> {
        match self.vault.list(100, ListOrder::Newest).await {
            Ok(notes) => notes
                .into_iter()
                .map(|note| ResourceSpec {
                    uri: format!("notebook://{}", note.name),
                    name: note.name,
                    description: "Vault markdown note".to_string(),
                    mime_type: "text/markdown".to_string(),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn read_resource(&self, uri: &str) -> HubResult<ResourceContent> {
        let Some(name) = uri.strip_prefix("notebook://") else {
            return Err(HubError::NotFound(format!("resource {}", uri)));
        };
        let (fm, body) = self.vault.read(name).await?;
        let text = if fm.is_empty() {
            body
        } else {
            format!("{}\n{}", fm.to_block(), body)
        };
        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: "text/markdown".to_string(),
            text,
        })
    }

    async fn healthy(&self) -> bool {
        self.vault.ensure_root().await.is_ok()
    }
}
