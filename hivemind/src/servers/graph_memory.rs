//! Graph-memory sub-server: the MCP surface over entity, relationship, and
//! traversal ops.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{HubError, HubResult};
use crate::graph::{Direction, EntityRef, GraphStore, PropMap};
use crate::mcp::{
    object_schema, CallToolResult, SchemaField, SubServer, ToolDef, ToolRegistry, ToolSpec,
};

pub const SERVER_NAME: &str = "graph-memory";

fn required_str<'a>(args: &'a Value, key: &str) -> HubResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::InvalidInput(format!("missing required field: {}", key)))
}

fn props_arg(args: &Value, key: &str) -> PropMap {
    args.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new)
}

fn limit_arg(args: &Value, default: u64) -> usize {
    args.get("limit").and_then(Value::as_u64).unwrap_or(default) as usize
}

fn depth_arg(args: &Value, default: u64) -> usize {
    args.get("maxDepth")
        .and_then(Value::as_u64)
        .unwrap_or(default) as usize
}

fn entity_ref(args: &Value, label_key: &str, id_key: &str) -> HubResult<EntityRef> {
    Ok(EntityRef::new(
        required_str(args, label_key)?,
        required_str(args, id_key)?,
    ))
}

fn path_json(path: &crate::graph::GraphPath) -> Value {
    json!({
        "length": path.length,
        "nodes": path.nodes,
        "relationships": path.relationships,
    })
}

/// Sub-server exposing graph CRUD and traversal tools.
pub struct GraphMemoryServer {
    graph: Arc<dyn GraphStore>,
    registry: ToolRegistry,
}

impl GraphMemoryServer {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        let mut registry = ToolRegistry::new();

        let g = graph.clone();
        registry.register(ToolDef::new(
            "create_entity",
            "Create an entity under a label",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Entity label"),
                    SchemaField::new("id", "string", "Identifier, unique within the label"),
                    SchemaField::new("properties", "object", "Entity properties"),
                ],
                &["label", "id"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let label = required_str(&args, "label")?.to_string();
                    let id = required_str(&args, "id")?.to_string();
                    let mut props = props_arg(&args, "properties");
                    props.insert("id".to_string(), json!(id));
                    let entity = graph.create_entity(&label, props).await?;
                    Ok(json!({ "success": true, "entity": entity }))
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "get_entity",
            "Fetch one entity by (label, id)",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Entity label"),
                    SchemaField::new("id", "string", "Entity id"),
                ],
                &["label", "id"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let label = required_str(&args, "label")?;
                    let id = required_str(&args, "id")?;
                    match graph.get_entity(label, id).await? {
                        Some(entity) => Ok(json!({ "success": true, "entity": entity })),
                        None => Err(HubError::NotFound(format!("{}:{}", label, id))),
                    }
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "find_entities",
            "Find entities by property equality",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Entity label"),
                    SchemaField::new("properties", "object", "Equality match properties"),
                    SchemaField::new("limit", "integer", "Max results (default 25)"),
                    SchemaField::new("newestFirst", "boolean", "Order by created_at descending"),
                ],
                &["label"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let entities = graph
                        .find_entities(
                            required_str(&args, "label")?,
                            &props_arg(&args, "properties"),
                            limit_arg(&args, 25),
                            args.get("newestFirst")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                        )
                        .await?;
                    Ok(json!({ "success": true, "count": entities.len(), "entities": entities }))
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "update_entity",
            "Merge properties into an entity",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Entity label"),
                    SchemaField::new("id", "string", "Entity id"),
                    SchemaField::new("properties", "object", "Properties to merge"),
                ],
                &["label", "id", "properties"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let entity = graph
                        .update_entity(
                            required_str(&args, "label")?,
                            required_str(&args, "id")?,
                            props_arg(&args, "properties"),
                        )
                        .await?;
                    Ok(json!({ "success": true, "entity": entity }))
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "delete_entity",
            "Detach-delete an entity",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Entity label"),
                    SchemaField::new("id", "string", "Entity id"),
                ],
                &["label", "id"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let removed = graph
                        .delete_entity(required_str(&args, "label")?, required_str(&args, "id")?)
                        .await?;
                    Ok(json!({ "success": true, "deleted": removed }))
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "count_entities",
            "Count entities under a label",
            object_schema(&[SchemaField::new("label", "string", "Entity label")], &["label"]),
            move |args| {
                let graph = g.clone();
                async move {
                    let count = graph.count_entities(required_str(&args, "label")?).await?;
                    Ok(json!({ "success": true, "count": count }))
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "create_relationship",
            "Create a typed edge between two entities",
            object_schema(
                &[
                    SchemaField::new("fromLabel", "string", "Source label"),
                    SchemaField::new("fromId", "string", "Source id"),
                    SchemaField::new("type", "string", "Relationship type (UPPER_SNAKE)"),
                    SchemaField::new("toLabel", "string", "Target label"),
                    SchemaField::new("toId", "string", "Target id"),
                    SchemaField::new("properties", "object", "Edge properties"),
                ],
                &["fromLabel", "fromId", "type", "toLabel", "toId"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let props = props_arg(&args, "properties");
                    let rel = graph
                        .create_relationship(
                            &entity_ref(&args, "fromLabel", "fromId")?,
                            required_str(&args, "type")?,
                            &entity_ref(&args, "toLabel", "toId")?,
                            if props.is_empty() { None } else { Some(props) },
                        )
                        .await?;
                    Ok(json!({ "success": true, "relationship": rel }))
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "get_relationships",
            "List relationships attached to an entity",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Entity label"),
                    SchemaField::new("id", "string", "Entity id"),
                    SchemaField::new("direction", "string", "in | out | both (default both)"),
                    SchemaField::new("type", "string", "Restrict to one relationship type"),
                ],
                &["label", "id"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let direction = match args.get("direction").and_then(Value::as_str) {
                        Some(raw) => Direction::from_str(raw).map_err(HubError::InvalidInput)?,
                        None => Direction::Both,
                    };
                    let related = graph
                        .relationships_for(
                            required_str(&args, "label")?,
                            required_str(&args, "id")?,
                            direction,
                            args.get("type").and_then(Value::as_str),
                        )
                        .await?;
                    let rows: Vec<Value> = related
                        .into_iter()
                        .map(|r| {
                            json!({
                                "type": r.rel_type,
                                "direction": r.direction.as_str(),
                                "properties": r.rel_props,
                                "entity": r.other,
                                "entityLabels": r.other_labels,
                            })
                        })
                        .collect();
                    Ok(json!({ "success": true, "count": rows.len(), "relationships": rows }))
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "query_graph",
            "Traverse around an entity: connected set, paths, or stats",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Anchor label"),
                    SchemaField::new("id", "string", "Anchor id"),
                    SchemaField::new("mode", "string", "connected | path | stats"),
                    SchemaField::new("maxDepth", "integer", "Traversal bound (default 3)"),
                    SchemaField::new("toLabel", "string", "Path target label (mode=path)"),
                    SchemaField::new("toId", "string", "Path target id (mode=path)"),
                    SchemaField::new("limit", "integer", "Path cap (mode=path, default 10)"),
                ],
                &["label", "id", "mode"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let label = required_str(&args, "label")?;
                    let id = required_str(&args, "id")?;
                    match required_str(&args, "mode")? {
                        "connected" => {
                            let nodes = graph.connected(label, id, depth_arg(&args, 3)).await?;
                            let rows: Vec<Value> = nodes
                                .into_iter()
                                .map(|n| json!({ "labels": n.labels, "properties": n.props }))
                                .collect();
                            Ok(json!({ "success": true, "count": rows.len(), "nodes": rows }))
                        }
                        "path" => {
                            let to = entity_ref(&args, "toLabel", "toId")?;
                            let paths = graph
                                .all_paths(
                                    &EntityRef::new(label, id),
                                    &to,
                                    depth_arg(&args, 3),
                                    limit_arg(&args, 10),
                                )
                                .await?;
                            let rows: Vec<Value> = paths.iter().map(path_json).collect();
                            Ok(json!({ "success": true, "count": rows.len(), "paths": rows }))
                        }
                        "stats" => {
                            let stats = graph.rel_stats(label, id).await?;
                            Ok(json!({ "success": true, "stats": stats }))
                        }
                        other => Err(HubError::InvalidInput(format!(
                            "unknown query mode: {} (use connected, path, or stats)",
                            other
                        ))),
                    }
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "find_shortest_path",
            "Shortest path between two entities within a depth bound",
            object_schema(
                &[
                    SchemaField::new("fromLabel", "string", "Source label"),
                    SchemaField::new("fromId", "string", "Source id"),
                    SchemaField::new("toLabel", "string", "Target label"),
                    SchemaField::new("toId", "string", "Target id"),
                    SchemaField::new("maxDepth", "integer", "Depth bound (default 5)"),
                ],
                &["fromLabel", "fromId", "toLabel", "toId"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let path = graph
                        .shortest_path(
                            &entity_ref(&args, "fromLabel", "fromId")?,
                            &entity_ref(&args, "toLabel", "toId")?,
                            depth_arg(&args, 5),
                        )
                        .await?;
                    Ok(match path {
                        Some(path) => json!({ "found": true, "path": path_json(&path) }),
                        None => json!({ "found": false }),
                    })
                }
            },
        ));

        let g = graph.clone();
        registry.register(ToolDef::new(
            "search_entities",
            "Case-insensitive substring search over property fields",
            object_schema(
                &[
                    SchemaField::new("label", "string", "Entity label"),
                    SchemaField::new("query", "string", "Substring to match"),
                    SchemaField::new("fields", "array", "Property fields to search"),
                    SchemaField::new("limit", "integer", "Max results (default 25)"),
                ],
                &["label", "query", "fields"],
            ),
            move |args| {
                let graph = g.clone();
                async move {
                    let fields: Vec<String> = args
                        .get("fields")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    let entities = graph
                        .search_by_text(
                            required_str(&args, "label")?,
                            required_str(&args, "query")?,
                            &fields,
                            limit_arg(&args, 25),
                        )
                        .await?;
                    Ok(json!({ "success": true, "count": entities.len(), "entities": entities }))
                }
            },
        ));

        Self { graph, registry }
    }
}

#[async_trait]
impl SubServer for GraphMemoryServer {
    fn name(&self) -> &str {
        SERVER_NAME
    }

    async fn list_tools(&self) -> Vec<ToolSpec> {
        self.registry.list()
    }

    async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        self.registry.call(name, args).await
    }

    async fn healthy(&self) -> bool {
        self.graph.health().await.is_healthy()
    }
}
