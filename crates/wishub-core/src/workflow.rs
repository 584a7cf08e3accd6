//! Workflow definitions, executions, and step outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub type WorkflowExecutionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Success,
    Error,
    Timeout,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Success => "success",
            WorkflowStatus::Error => "error",
            WorkflowStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node in a workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: String,
    pub skill_id: String,
    pub inputs: serde_json::Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A declarative workflow: an ordered list of steps plus their dependency
/// edges. Declaration order matters for `ExecutionMode::Sequential`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
    Timeout,
}

/// Terminal record for one step of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Durable row backing one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: WorkflowExecutionId,
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub results: HashMap<String, StepOutcome>,
    pub error_message: Option<String>,
    pub execution_time_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    pub fn new_running(execution_id: WorkflowExecutionId, workflow_id: impl Into<String>) -> Self {
        WorkflowExecution {
            execution_id,
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Running,
            results: HashMap::new(),
            error_message: None,
            execution_time_seconds: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A partial update applied to a workflow execution row.
#[derive(Debug, Clone, Default)]
pub struct WorkflowExecutionPatch {
    pub status: Option<WorkflowStatus>,
    pub results: Option<HashMap<String, StepOutcome>>,
    pub error_message: Option<String>,
    pub execution_time_seconds: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}
