//! Reasoning-chain sub-server: the MCP surface over the chain store.

mod chain;
mod export;
mod store;

pub use chain::{ChainStatus, ReasoningChain, ReasoningStep, StepType};
pub use export::{export_body, export_frontmatter, export_name};
pub use store::{ChainStore, BRANCHED_TO, CHAIN_LABEL, HAS_STEP, STEP_LABEL};

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{HubError, HubResult};
use crate::mcp::{
    object_schema, CallToolResult, ResourceContent, ResourceSpec, SchemaField, SubServer, ToolDef,
    ToolRegistry, ToolSpec,
};

pub const SERVER_NAME: &str = "reasoning-chains";

/// Sub-server exposing chain lifecycle tools.
pub struct ChainServer {
    store: Arc<ChainStore>,
    registry: ToolRegistry,
}

fn opt_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_vec(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn required_str<'a>(args: &'a Value, key: &str) -> HubResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::InvalidInput(format!("missing required field: {}", key)))
}

impl ChainServer {
    pub fn new(store: Arc<ChainStore>) -> Self {
        let mut registry = ToolRegistry::new();

        let s = store.clone();
        registry.register(ToolDef::new(
            "start_thinking",
            "Start a new reasoning chain from a prompt",
            object_schema(
                &[
                    SchemaField::new("prompt", "string", "Initial prompt or question"),
                    SchemaField::new("context", "string", "Optional background context"),
                    SchemaField::new("goal", "string", "Optional goal statement"),
                    SchemaField::new("tags", "array", "Optional tags"),
                    SchemaField::new("branchFrom", "string", "Parent chain id to branch from"),
                ],
                &["prompt"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let chain = store
                        .start(
                            required_str(&args, "prompt")?,
                            opt_string(&args, "context"),
                            opt_string(&args, "goal"),
                            string_vec(&args, "tags"),
                            opt_string(&args, "branchFrom"),
                        )
                        .await?;
                    Ok(json!({ "success": true, "chainId": chain.id, "status": chain.status }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "add_step",
            "Append one reasoning step to a chain",
            object_schema(
                &[
                    SchemaField::new("chainId", "string", "Chain id"),
                    SchemaField::new("thought", "string", "The reasoning step"),
                    SchemaField::new(
                        "stepType",
                        "string",
                        "observation | analysis | inference | conclusion | question | hypothesis",
                    ),
                    SchemaField::new("confidence", "number", "Confidence in [0, 1]"),
                    SchemaField::new("data", "object", "Structured payload"),
                ],
                &["chainId", "thought"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let step_type = match args.get("stepType").and_then(Value::as_str) {
                        Some(raw) => StepType::from_str(raw).map_err(HubError::InvalidInput)?,
                        None => StepType::Analysis,
                    };
                    let step = store
                        .add_step(
                            required_str(&args, "chainId")?,
                            required_str(&args, "thought")?,
                            step_type,
                            args.get("confidence").and_then(Value::as_f64),
                            args.get("data").filter(|v| !v.is_null()).cloned(),
                        )
                        .await?;
                    Ok(json!({
                        "success": true,
                        "stepNumber": step.step_number,
                        "stepType": step.step_type,
                    }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "conclude",
            "Conclude a chain with a final answer",
            object_schema(
                &[
                    SchemaField::new("chainId", "string", "Chain id"),
                    SchemaField::new("conclusion", "string", "Final conclusion"),
                    SchemaField::new("success", "boolean", "Completed (true) or failed (false)"),
                    SchemaField::new("confidence", "number", "Confidence in [0, 1]"),
                ],
                &["chainId", "conclusion"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let chain = store
                        .conclude(
                            required_str(&args, "chainId")?,
                            required_str(&args, "conclusion")?,
                            args.get("success").and_then(Value::as_bool).unwrap_or(true),
                            args.get("confidence").and_then(Value::as_f64),
                        )
                        .await?;
                    Ok(json!({
                        "success": true,
                        "chainId": chain.id,
                        "status": chain.status,
                        "exported": chain.exported,
                        "exportFile": export_name(&chain),
                    }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "get_chain",
            "Fetch a chain, optionally with its steps",
            object_schema(
                &[
                    SchemaField::new("chainId", "string", "Chain id"),
                    SchemaField::new("includeSteps", "boolean", "Include steps (default true)"),
                ],
                &["chainId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let include_steps = args
                        .get("includeSteps")
                        .and_then(Value::as_bool)
                        .unwrap_or(true);
                    let chain = store
                        .get(required_str(&args, "chainId")?, include_steps)
                        .await?;
                    Ok(json!({ "success": true, "chain": chain }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "list_chains",
            "List chains, optionally filtered by status",
            object_schema(
                &[
                    SchemaField::new(
                        "status",
                        "string",
                        "in_progress | completed | failed",
                    ),
                    SchemaField::new("limit", "integer", "Max results (default 20)"),
                ],
                &[],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let status = match args.get("status").and_then(Value::as_str) {
                        Some(raw) => {
                            Some(ChainStatus::from_str(raw).map_err(HubError::InvalidInput)?)
                        }
                        None => None,
                    };
                    let limit = args
                        .get("limit")
                        .and_then(Value::as_u64)
                        .unwrap_or(20) as usize;
                    let chains = store.list(status, limit).await?;
                    Ok(json!({ "success": true, "count": chains.len(), "chains": chains }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "branch_chain",
            "Branch a chain, copying steps up to a point",
            object_schema(
                &[
                    SchemaField::new("chainId", "string", "Chain id to branch"),
                    SchemaField::new("atStep", "integer", "Copy steps 1..=atStep (default all)"),
                ],
                &["chainId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let at_step = args.get("atStep").and_then(Value::as_u64).map(|n| n as u32);
                    let child = store
                        .branch(required_str(&args, "chainId")?, at_step)
                        .await?;
                    Ok(json!({
                        "success": true,
                        "chainId": child.id,
                        "branchFrom": child.branch_from,
                        "copiedSteps": child.steps.len(),
                    }))
                }
            },
        ));

        Self { store, registry }
    }
}

#[async_trait]
impl SubServer for ChainServer {
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
        vec![ResourceSpec {
            uri: "chain://<id>".to_string(),
            name: "reasoning-chain".to_string(),
            description: "A reasoning chain rendered in its export format".to_string(),
            mime_type: "text/markdown".to_string(),
        }]
    }

    async fn read_resource(&self, uri: &str) -> HubResult<ResourceContent> {
        let Some(chain_id) = uri.strip_prefix("chain://") else {
            return Err(HubError::NotFound(format!("resource {}", uri)));
        };
        let chain = self.store.get(chain_id, true).await?;
        let text = format!(
            "{}\n{}",
            export_frontmatter(&chain).to_block(),
            export_body(&chain)
        );
        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: "text/markdown".to_string(),
            text,
        })
    }
}
