//! Task domain types: status, priority, typed dependencies.
//!
//! The one hard invariant lives here: transitioning to `completed` forces
//! `progress = 100` and stamps `completed_at`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::utc_now_iso;
use crate::error::{HubError, HubResult};
use crate::graph::PropMap;

/// Task lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Deferred,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Deferred => "deferred",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "deferred" => Ok(TaskStatus::Deferred),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("unknown task status: {}", s)),
        }
    }
}

/// Task priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(TaskPriority::Critical),
            "high" => Ok(TaskPriority::High),
            "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// Typed dependency edges between tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyType {
    MustCompleteBefore,
    ShouldCompleteBefore,
    Blocks,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::MustCompleteBefore => "MUST_COMPLETE_BEFORE",
            DependencyType::ShouldCompleteBefore => "SHOULD_COMPLETE_BEFORE",
            DependencyType::Blocks => "BLOCKS",
        }
    }

    pub fn all() -> [DependencyType; 3] {
        [
            DependencyType::MustCompleteBefore,
            DependencyType::ShouldCompleteBefore,
            DependencyType::Blocks,
        ]
    }
}

impl std::str::FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MUST_COMPLETE_BEFORE" => Ok(DependencyType::MustCompleteBefore),
            "SHOULD_COMPLETE_BEFORE" => Ok(DependencyType::ShouldCompleteBefore),
            "BLOCKS" => Ok(DependencyType::Blocks),
            _ => Err(format!("unknown dependency type: {}", s)),
        }
    }
}

/// One work item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        let now = utc_now_iso();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            assignee: None,
            tags: Vec::new(),
            due_date: None,
            progress: 0,
            result: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Applies a status transition, enforcing the completed invariant.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = utc_now_iso();
        if status == TaskStatus::Completed {
            self.progress = 100;
            self.completed_at = Some(self.updated_at.clone());
        }
    }

    pub fn set_progress(&mut self, progress: u8) -> HubResult<()> {
        if progress > 100 {
            return Err(HubError::InvalidInput(format!(
                "progress {} outside [0, 100]",
                progress
            )));
        }
        self.progress = progress;
        self.updated_at = utc_now_iso();
        Ok(())
    }

    pub fn to_props(&self) -> PropMap {
        let mut props = PropMap::new();
        props.insert("id".to_string(), json!(self.id));
        props.insert("title".to_string(), json!(self.title));
        props.insert("status".to_string(), json!(self.status.as_str()));
        props.insert("priority".to_string(), json!(self.priority.as_str()));
        props.insert("tags".to_string(), json!(self.tags));
        props.insert("progress".to_string(), json!(self.progress));
        props.insert("created_at".to_string(), json!(self.created_at));
        props.insert("updated_at".to_string(), json!(self.updated_at));
        if let Some(description) = &self.description {
            props.insert("description".to_string(), json!(description));
        }
        if let Some(assignee) = &self.assignee {
            props.insert("assignee".to_string(), json!(assignee));
        }
        if let Some(due_date) = &self.due_date {
            props.insert("due_date".to_string(), json!(due_date));
        }
        if let Some(result) = &self.result {
            props.insert("result".to_string(), json!(result));
        }
        if let Some(completed_at) = &self.completed_at {
            props.insert("completed_at".to_string(), json!(completed_at));
        }
        props
    }

    pub fn from_props(props: &PropMap) -> HubResult<Task> {
        let get_str = |key: &str| props.get(key).and_then(Value::as_str).map(str::to_string);
        let id = get_str("id").ok_or_else(|| HubError::Internal("task without id".into()))?;
        let status = get_str("status")
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()
            .map_err(HubError::Internal)?
            .unwrap_or(TaskStatus::Pending);
        let priority = get_str("priority")
            .as_deref()
            .map(str::parse::<TaskPriority>)
            .transpose()
            .map_err(HubError::Internal)?
            .unwrap_or(TaskPriority::Medium);
        Ok(Task {
            id,
            title: get_str("title").unwrap_or_default(),
            description: get_str("description"),
            status,
            priority,
            assignee: get_str("assignee"),
            tags: props
                .get("tags")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            due_date: get_str("due_date"),
            progress: props
                .get("progress")
                .and_then(Value::as_u64)
                .unwrap_or(0)
                .min(100) as u8,
            result: get_str("result"),
            created_at: get_str("created_at").unwrap_or_default(),
            updated_at: get_str("updated_at").unwrap_or_default(),
            completed_at: get_str("completed_at"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: completing a task forces progress 100 and stamps
    /// completed_at at or after updated_at.
    #[test]
    fn completed_invariant() {
        let mut task = Task::new("ship it");
        task.set_progress(40).unwrap();
        task.set_status(TaskStatus::Completed);
        assert_eq!(task.progress, 100);
        let completed_at = task.completed_at.clone().unwrap();
        assert!(completed_at >= task.created_at);
        assert_eq!(completed_at, task.updated_at);
    }

    /// **Scenario**: progress outside [0, 100] is rejected.
    #[test]
    fn progress_bounds() {
        let mut task = Task::new("t");
        assert!(task.set_progress(100).is_ok());
        assert!(task.set_progress(101).is_err());
    }

    /// **Scenario**: props round-trip preserves every field.
    #[test]
    fn props_round_trip() {
        let mut task = Task::new("title");
        task.description = Some("desc".to_string());
        task.priority = TaskPriority::High;
        task.assignee = Some("worker".to_string());
        task.tags = vec!["a".to_string(), "b".to_string()];
        task.due_date = Some("2026-09-01".to_string());
        task.set_status(TaskStatus::InProgress);

        let restored = Task::from_props(&task.to_props()).unwrap();
        assert_eq!(restored.id, task.id);
        assert_eq!(restored.title, task.title);
        assert_eq!(restored.description, task.description);
        assert_eq!(restored.status, TaskStatus::InProgress);
        assert_eq!(restored.priority, TaskPriority::High);
        assert_eq!(restored.tags, task.tags);
        assert_eq!(restored.due_date, task.due_date);
    }

    /// **Scenario**: enum wire strings round-trip.
    #[test]
    fn enum_round_trips() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Deferred,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        for dep in DependencyType::all() {
            assert_eq!(dep.as_str().parse::<DependencyType>().unwrap(), dep);
        }
    }
}
