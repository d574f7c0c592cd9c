//! Task sub-server: hierarchical tasks with typed dependencies.

mod store;
mod task;

pub use store::{TaskDependency, TaskFilter, TaskStore, TaskUpdate, HAS_SUBTASK, TASK_LABEL};
pub use task::{DependencyType, Task, TaskPriority, TaskStatus};

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{HubError, HubResult};
use crate::graph::Direction;
use crate::mcp::{
    object_schema, CallToolResult, SchemaField, SubServer, ToolDef, ToolRegistry, ToolSpec,
};

pub const SERVER_NAME: &str = "tasks";

fn opt_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_str<'a>(args: &'a Value, key: &str) -> HubResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::InvalidInput(format!("missing required field: {}", key)))
}

fn string_vec(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn parse_status(args: &Value) -> HubResult<Option<TaskStatus>> {
    args.get("status")
        .and_then(Value::as_str)
        .map(|raw| TaskStatus::from_str(raw).map_err(HubError::InvalidInput))
        .transpose()
}

fn parse_priority(args: &Value) -> HubResult<Option<TaskPriority>> {
    args.get("priority")
        .and_then(Value::as_str)
        .map(|raw| TaskPriority::from_str(raw).map_err(HubError::InvalidInput))
        .transpose()
}

fn task_from_args(args: &Value) -> HubResult<Task> {
    let mut task = Task::new(required_str(args, "title")?);
    task.description = opt_string(args, "description");
    task.assignee = opt_string(args, "assignee");
    task.due_date = opt_string(args, "dueDate");
    if let Some(tags) = string_vec(args, "tags") {
        task.tags = tags;
    }
    if let Some(priority) = parse_priority(args)? {
        task.priority = priority;
    }
    Ok(task)
}

fn creation_fields() -> [SchemaField; 6] {
    [
        SchemaField::new("title", "string", "Task title"),
        SchemaField::new("description", "string", "Longer description"),
        SchemaField::new("priority", "string", "critical | high | medium | low"),
        SchemaField::new("assignee", "string", "Assigned client"),
        SchemaField::new("tags", "array", "Tags"),
        SchemaField::new("dueDate", "string", "Due date"),
    ]
}

/// Sub-server exposing task tools.
pub struct TaskServer {
    registry: ToolRegistry,
}

impl TaskServer {
    pub fn new(store: Arc<TaskStore>) -> Self {
        let mut registry = ToolRegistry::new();

        let s = store.clone();
        let mut fields = creation_fields().to_vec();
        fields.push(SchemaField::new(
            "parentTaskId",
            "string",
            "Parent task for a subtask",
        ));
        registry.register(ToolDef::new(
            "create_task",
            "Create a task, optionally as a subtask",
            object_schema(&fields, &["title"]),
            move |args| {
                let store = s.clone();
                async move {
                    let task = task_from_args(&args)?;
                    let parent = opt_string(&args, "parentTaskId");
                    let task = store.create(task, parent.as_deref()).await?;
                    Ok(json!({ "success": true, "taskId": task.id, "task": task }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "get_task",
            "Fetch a task, optionally with subtasks",
            object_schema(
                &[
                    SchemaField::new("taskId", "string", "Task id"),
                    SchemaField::new("includeSubtasks", "boolean", "Include subtask summaries"),
                ],
                &["taskId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let id = required_str(&args, "taskId")?;
                    let task = store.get(id).await?;
                    let include = args
                        .get("includeSubtasks")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    let subtasks = if include {
                        Some(store.subtasks(id).await?)
                    } else {
                        None
                    };
                    Ok(json!({ "success": true, "task": task, "subtasks": subtasks }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "update_task",
            "Merge fields into a task",
            object_schema(
                &[
                    SchemaField::new("taskId", "string", "Task id"),
                    SchemaField::new("title", "string", "New title"),
                    SchemaField::new("description", "string", "New description"),
                    SchemaField::new("status", "string", "New status"),
                    SchemaField::new("priority", "string", "New priority"),
                    SchemaField::new("assignee", "string", "New assignee"),
                    SchemaField::new("tags", "array", "Replacement tags"),
                    SchemaField::new("dueDate", "string", "New due date"),
                    SchemaField::new("progress", "integer", "Progress in [0, 100]"),
                    SchemaField::new("result", "string", "Outcome note"),
                ],
                &["taskId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let update = TaskUpdate {
                        title: opt_string(&args, "title"),
                        description: opt_string(&args, "description"),
                        status: parse_status(&args)?,
                        priority: parse_priority(&args)?,
                        assignee: opt_string(&args, "assignee"),
                        tags: string_vec(&args, "tags"),
                        due_date: opt_string(&args, "dueDate"),
                        progress: args
                            .get("progress")
                            .and_then(Value::as_u64)
                            .map(|p| p.min(255) as u8),
                        result: opt_string(&args, "result"),
                    };
                    let task = store.update(required_str(&args, "taskId")?, update).await?;
                    Ok(json!({ "success": true, "task": task }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "complete_task",
            "Mark a task completed",
            object_schema(
                &[
                    SchemaField::new("taskId", "string", "Task id"),
                    SchemaField::new("result", "string", "Outcome note"),
                ],
                &["taskId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let task = store
                        .complete(required_str(&args, "taskId")?, opt_string(&args, "result"))
                        .await?;
                    Ok(json!({ "success": true, "task": task }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "delete_task",
            "Delete a task, optionally cascading to subtasks",
            object_schema(
                &[
                    SchemaField::new("taskId", "string", "Task id"),
                    SchemaField::new("deleteSubtasks", "boolean", "Cascade to subtasks"),
                ],
                &["taskId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let removed = store
                        .delete(
                            required_str(&args, "taskId")?,
                            args.get("deleteSubtasks")
                                .and_then(Value::as_bool)
                                .unwrap_or(false),
                        )
                        .await?;
                    Ok(json!({ "success": true, "deleted": removed }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "list_tasks",
            "List tasks with combined filters",
            object_schema(
                &[
                    SchemaField::new("status", "string", "Status filter"),
                    SchemaField::new("priority", "string", "Priority filter"),
                    SchemaField::new("assignee", "string", "Assignee filter"),
                    SchemaField::new("tags", "array", "Any-match tag filter"),
                    SchemaField::new("parentTaskId", "string", "Restrict to one parent's subtasks"),
                    SchemaField::new("limit", "integer", "Max results (default 50)"),
                ],
                &[],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let filter = TaskFilter {
                        status: parse_status(&args)?,
                        priority: parse_priority(&args)?,
                        assignee: opt_string(&args, "assignee"),
                        tags: string_vec(&args, "tags").unwrap_or_default(),
                        parent_task_id: opt_string(&args, "parentTaskId"),
                        limit: args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize,
                    };
                    let tasks = store.list(&filter).await?;
                    Ok(json!({ "success": true, "count": tasks.len(), "tasks": tasks }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "add_subtask",
            "Create a subtask under a parent task",
            object_schema(
                &{
                    let mut fields = creation_fields().to_vec();
                    fields.push(SchemaField::new("parentTaskId", "string", "Parent task id"));
                    fields
                },
                &["parentTaskId", "title"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let task = task_from_args(&args)?;
                    let parent = required_str(&args, "parentTaskId")?;
                    let task = store.create(task, Some(parent)).await?;
                    Ok(json!({ "success": true, "taskId": task.id, "task": task }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "set_task_dependency",
            "Record a typed dependency between tasks",
            object_schema(
                &[
                    SchemaField::new("taskId", "string", "Dependent task"),
                    SchemaField::new("dependsOnId", "string", "Task depended on"),
                    SchemaField::new(
                        "dependencyType",
                        "string",
                        "MUST_COMPLETE_BEFORE | SHOULD_COMPLETE_BEFORE | BLOCKS",
                    ),
                ],
                &["taskId", "dependsOnId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let dep_type = match args.get("dependencyType").and_then(Value::as_str) {
                        Some(raw) => {
                            DependencyType::from_str(raw).map_err(HubError::InvalidInput)?
                        }
                        None => DependencyType::MustCompleteBefore,
                    };
                    store
                        .set_dependency(
                            required_str(&args, "taskId")?,
                            required_str(&args, "dependsOnId")?,
                            dep_type,
                        )
                        .await?;
                    Ok(json!({ "success": true, "dependencyType": dep_type }))
                }
            },
        ));

        let s = store.clone();
        registry.register(ToolDef::new(
            "get_task_dependencies",
            "List a task's typed dependencies",
            object_schema(
                &[
                    SchemaField::new("taskId", "string", "Task id"),
                    SchemaField::new("direction", "string", "in | out | both (default both)"),
                ],
                &["taskId"],
            ),
            move |args| {
                let store = s.clone();
                async move {
                    let direction = match args.get("direction").and_then(Value::as_str) {
                        Some(raw) => {
                            Direction::from_str(raw).map_err(HubError::InvalidInput)?
                        }
                        None => Direction::Both,
                    };
                    let deps = store
                        .dependencies(required_str(&args, "taskId")?, direction)
                        .await?;
                    Ok(json!({ "success": true, "count": deps.len(), "dependencies": deps }))
                }
            },
        ));

        Self { registry }
    }
}

#[async_trait]
impl SubServer for TaskServer {
    fn name(&self) -> &str {
        SERVER_NAME
    }

    async fn list_tools(&self) -> Vec<ToolSpec> {
        self.registry.list()
    }

    async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        self.registry.call(name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, InMemoryGraph};

    fn server() -> TaskServer {
        let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraph::new());
        TaskServer::new(Arc::new(TaskStore::new(graph)))
    }

    fn parse(result: &CallToolResult) -> Value {
        serde_json::from_str(result.first_text()).unwrap()
    }

    /// **Scenario**: the full tool sequence — create, subtask, complete,
    /// cascading delete, get is NotFound.
    #[tokio::test]
    async fn subtask_cascade_tools() {
        let server = server();
        let created = server.call_tool("create_task", json!({"title": "P"})).await;
        let parent_id = parse(&created)["taskId"].as_str().unwrap().to_string();

        let sub = server
            .call_tool(
                "add_subtask",
                json!({"parentTaskId": parent_id, "title": "S"}),
            )
            .await;
        let sub_id = parse(&sub)["taskId"].as_str().unwrap().to_string();

        let completed = server
            .call_tool("complete_task", json!({"taskId": sub_id}))
            .await;
        let body = parse(&completed);
        assert_eq!(body["task"]["status"], "completed");
        assert_eq!(body["task"]["progress"], 100);

        let deleted = server
            .call_tool(
                "delete_task",
                json!({"taskId": parent_id, "deleteSubtasks": true}),
            )
            .await;
        assert_eq!(parse(&deleted)["deleted"], 2);

        let gone = server.call_tool("get_task", json!({"taskId": sub_id})).await;
        assert!(gone.is_err());
        assert_eq!(gone.error_kind, Some("not_found"));
    }

    /// **Scenario**: list_tasks filters by status through the tool surface.
    #[tokio::test]
    async fn list_tool() {
        let server = server();
        let a = server.call_tool("create_task", json!({"title": "a"})).await;
        let a_id = parse(&a)["taskId"].as_str().unwrap().to_string();
        server.call_tool("create_task", json!({"title": "b"})).await;
        server
            .call_tool("complete_task", json!({"taskId": a_id}))
            .await;

        let pending = server
            .call_tool("list_tasks", json!({"status": "pending"}))
            .await;
        assert_eq!(parse(&pending)["count"], 1);
        let done = server
            .call_tool("list_tasks", json!({"status": "completed"}))
            .await;
        assert_eq!(parse(&done)["count"], 1);
    }

    /// **Scenario**: dependency tools round-trip the typed edge.
    #[tokio::test]
    async fn dependency_tools() {
        let server = server();
        let a = server.call_tool("create_task", json!({"title": "a"})).await;
        let a_id = parse(&a)["taskId"].as_str().unwrap().to_string();
        let b = server.call_tool("create_task", json!({"title": "b"})).await;
        let b_id = parse(&b)["taskId"].as_str().unwrap().to_string();

        let set = server
            .call_tool(
                "set_task_dependency",
                json!({"taskId": a_id, "dependsOnId": b_id, "dependencyType": "BLOCKS"}),
            )
            .await;
        assert!(!set.is_err());

        let deps = server
            .call_tool(
                "get_task_dependencies",
                json!({"taskId": a_id, "direction": "out"}),
            )
            .await;
        let body = parse(&deps);
        assert_eq!(body["count"], 1);
        assert_eq!(body["dependencies"][0]["dependency_type"], "BLOCKS");
    }
}
