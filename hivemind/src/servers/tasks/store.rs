//! Task persistence over the graph backend.
//!
//! Tasks are `Task` entities; subtasks hang off `HAS_SUBTASK` edges and
//! dependencies are typed edges between tasks. A subtask has exactly one
//! parent.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{HubError, HubResult};
use crate::graph::{Direction, EntityRef, GraphStore, PropMap};
use crate::servers::tasks::task::{DependencyType, Task, TaskPriority, TaskStatus};

pub const TASK_LABEL: &str = "Task";
pub const HAS_SUBTASK: &str = "HAS_SUBTASK";

/// Filters for `list`.
#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<String>,
    /// Any-match over task tags.
    pub tags: Vec<String>,
    pub parent_task_id: Option<String>,
    pub limit: usize,
}

/// Fields accepted by `update`.
#[derive(Clone, Debug, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee: Option<String>,
    pub tags: Option<Vec<String>>,
    pub due_date: Option<String>,
    pub progress: Option<u8>,
    pub result: Option<String>,
}

/// One dependency edge as reported by `get_dependencies`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct TaskDependency {
    pub task_id: String,
    pub dependency_type: DependencyType,
    pub direction: &'static str,
}

/// Task store over the graph.
pub struct TaskStore {
    graph: Arc<dyn GraphStore>,
}

impl TaskStore {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Creates a task; with a parent, also the `HAS_SUBTASK` edge after
    /// checking single-parent ownership.
    pub async fn create(&self, task: Task, parent_task_id: Option<&str>) -> HubResult<Task> {
        if let Some(parent) = parent_task_id {
            if self.graph.get_entity(TASK_LABEL, parent).await?.is_none() {
                return Err(HubError::NotFound(format!("task {}", parent)));
            }
        }
        self.graph
            .create_entity(TASK_LABEL, task.to_props())
            .await?;
        if let Some(parent) = parent_task_id {
            self.graph
                .create_relationship(
                    &EntityRef::new(TASK_LABEL, parent),
                    HAS_SUBTASK,
                    &EntityRef::new(TASK_LABEL, &task.id),
                    None,
                )
                .await?;
        }
        Ok(task)
    }

    pub async fn get(&self, id: &str) -> HubResult<Task> {
        let props = self
            .graph
            .get_entity(TASK_LABEL, id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("task {}", id)))?;
        Task::from_props(&props)
    }

    /// Shallow subtask list via the outgoing `HAS_SUBTASK` set.
    pub async fn subtasks(&self, id: &str) -> HubResult<Vec<Task>> {
        let related = self
            .graph
            .relationships_for(TASK_LABEL, id, Direction::Out, Some(HAS_SUBTASK))
            .await?;
        related
            .iter()
            .map(|r| Task::from_props(&r.other))
            .collect()
    }

    /// Merges fields; a transition to `completed` forces progress 100 and
    /// stamps `completed_at`.
    pub async fn update(&self, id: &str, update: TaskUpdate) -> HubResult<Task> {
        let mut task = self.get(id).await?;
        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = Some(description);
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(assignee) = update.assignee {
            task.assignee = Some(assignee);
        }
        if let Some(tags) = update.tags {
            task.tags = tags;
        }
        if let Some(due_date) = update.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(progress) = update.progress {
            task.set_progress(progress)?;
        }
        if let Some(result) = update.result {
            task.result = Some(result);
        }
        match update.status {
            Some(status) => task.set_status(status),
            None => task.updated_at = crate::clock::utc_now_iso(),
        }
        self.graph
            .update_entity(TASK_LABEL, id, task.to_props())
            .await?;
        self.get(id).await
    }

    /// Shortcut for `update({status: completed, result})`. Terminal tasks
    /// cannot be re-completed through this path.
    pub async fn complete(&self, id: &str, result: Option<String>) -> HubResult<Task> {
        let task = self.get(id).await?;
        if task.status.is_terminal() {
            return Err(HubError::InvalidInput(format!(
                "task {} is already {}",
                id,
                task.status.as_str()
            )));
        }
        self.update(
            id,
            TaskUpdate {
                status: Some(TaskStatus::Completed),
                result,
                ..TaskUpdate::default()
            },
        )
        .await
    }

    /// Deletes a task; with `delete_subtasks`, the outgoing `HAS_SUBTASK`
    /// set goes first (depth-first).
    pub async fn delete(&self, id: &str, delete_subtasks: bool) -> HubResult<u64> {
        let mut removed = 0;
        if delete_subtasks {
            let mut pending: Vec<String> =
                self.subtasks(id).await?.into_iter().map(|t| t.id).collect();
            while let Some(sub_id) = pending.pop() {
                pending.extend(
                    self.subtasks(&sub_id)
                        .await?
                        .into_iter()
                        .map(|t| t.id),
                );
                if self.graph.delete_entity(TASK_LABEL, &sub_id).await? {
                    removed += 1;
                }
            }
        }
        if self.graph.delete_entity(TASK_LABEL, id).await? {
            removed += 1;
        } else {
            return Err(HubError::NotFound(format!("task {}", id)));
        }
        Ok(removed)
    }

    /// Combines backend equality filters with post-filters for tags
    /// (any-match) and parent membership.
    pub async fn list(&self, filter: &TaskFilter) -> HubResult<Vec<Task>> {
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        let mut match_props = PropMap::new();
        if let Some(status) = filter.status {
            match_props.insert("status".to_string(), json!(status.as_str()));
        }
        if let Some(priority) = filter.priority {
            match_props.insert("priority".to_string(), json!(priority.as_str()));
        }
        if let Some(assignee) = &filter.assignee {
            match_props.insert("assignee".to_string(), json!(assignee));
        }
        // Over-fetch when post-filters will thin the results.
        let fetch = if filter.tags.is_empty() && filter.parent_task_id.is_none() {
            limit
        } else {
            limit.saturating_mul(4)
        };
        let rows = self
            .graph
            .find_entities(TASK_LABEL, &match_props, fetch, true)
            .await?;
        let mut tasks: Vec<Task> = rows
            .iter()
            .map(Task::from_props)
            .collect::<HubResult<_>>()?;
        if !filter.tags.is_empty() {
            tasks.retain(|t| filter.tags.iter().any(|wanted| t.tags.contains(wanted)));
        }
        if let Some(parent) = &filter.parent_task_id {
            let members: Vec<String> = self
                .subtasks(parent)
                .await?
                .into_iter()
                .map(|t| t.id)
                .collect();
            tasks.retain(|t| members.contains(&t.id));
        }
        tasks.truncate(limit);
        Ok(tasks)
    }

    /// Records a typed dependency edge `task -> depends_on`.
    pub async fn set_dependency(
        &self,
        task_id: &str,
        depends_on_id: &str,
        dependency_type: DependencyType,
    ) -> HubResult<()> {
        if task_id == depends_on_id {
            return Err(HubError::InvalidInput(
                "a task cannot depend on itself".into(),
            ));
        }
        self.graph
            .create_relationship(
                &EntityRef::new(TASK_LABEL, task_id),
                dependency_type.as_str(),
                &EntityRef::new(TASK_LABEL, depends_on_id),
                None,
            )
            .await?;
        Ok(())
    }

    /// Dependencies for a task in the requested direction.
    pub async fn dependencies(
        &self,
        task_id: &str,
        direction: Direction,
    ) -> HubResult<Vec<TaskDependency>> {
        let mut out = Vec::new();
        for dep_type in DependencyType::all() {
            let related = self
                .graph
                .relationships_for(TASK_LABEL, task_id, direction, Some(dep_type.as_str()))
                .await?;
            for rel in related {
                let Some(other_id) = rel.other.get("id").and_then(Value::as_str) else {
                    continue;
                };
                out.push(TaskDependency {
                    task_id: other_id.to_string(),
                    dependency_type: dep_type,
                    direction: rel.direction.as_str(),
                });
            }
        }
        Ok(out)
    }
}
