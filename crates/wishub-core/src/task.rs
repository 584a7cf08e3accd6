//! The task row: one concrete invocation of a skill.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Error,
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Error | TaskStatus::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
            TaskStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable row backing one skill invocation.
///
/// Lifecycle: `pending -> running -> {success|error|timeout}`. Terminal
/// states never mutate again; `ExecutionStore` implementations should treat
/// an update to an already-terminal row as a bug, not silently accept it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillExecution {
    pub task_id: TaskId,
    pub skill_id: String,
    pub status: TaskStatus,
    pub inputs: serde_json::Value,
    pub outputs: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub execution_time_seconds: Option<f64>,
    pub container_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SkillExecution {
    pub fn new_pending(task_id: TaskId, skill_id: impl Into<String>, inputs: serde_json::Value) -> Self {
        SkillExecution {
            task_id,
            skill_id: skill_id.into(),
            status: TaskStatus::Pending,
            inputs,
            outputs: None,
            error_message: None,
            execution_time_seconds: None,
            container_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// A partial update applied to a task row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub outputs: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub execution_time_seconds: Option<f64>,
    pub container_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn started(started_at: DateTime<Utc>) -> Self {
        TaskPatch {
            status: Some(TaskStatus::Running),
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    pub fn terminal(
        status: TaskStatus,
        outputs: Option<serde_json::Value>,
        error_message: Option<String>,
        container_id: Option<String>,
        execution_time_seconds: f64,
        completed_at: DateTime<Utc>,
    ) -> Self {
        TaskPatch {
            status: Some(status),
            outputs,
            error_message,
            container_id,
            execution_time_seconds: Some(execution_time_seconds),
            completed_at: Some(completed_at),
            started_at: None,
        }
    }
}
