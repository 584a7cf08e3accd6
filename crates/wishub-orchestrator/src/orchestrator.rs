//! Workflow scheduling: sequential, parallel (no-dependency steps
//! concurrent), and hybrid (full DAG layering).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use wishub_core::error::{ApiError, ErrorCode};
use wishub_core::traits::ExecutionStore;
use wishub_core::workflow::{
    ExecutionMode, StepOutcome, StepStatus, WorkflowDefinition, WorkflowExecution,
    WorkflowExecutionId, WorkflowExecutionPatch, WorkflowStatus, WorkflowStep,
};

use crate::graph::{GraphError, GraphValidator};
use crate::invocation::InvocationService;
use crate::resolver::ReferenceResolver;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("workflow validation failed: {0}")]
    InvalidWorkflow(#[from] GraphError),
    #[error("{0}")]
    Internal(String),
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match &e {
            OrchestratorError::InvalidWorkflow(GraphError::Cycle) => {
                ApiError::new(ErrorCode::Workflow002, "cyclic dependency detected")
            }
            OrchestratorError::InvalidWorkflow(other) => {
                ApiError::new(ErrorCode::Workflow003, other.to_string())
            }
            OrchestratorError::Internal(msg) => ApiError::new(ErrorCode::Workflow999, msg.clone()),
        }
    }
}

pub struct OrchestrationResult {
    pub execution_id: WorkflowExecutionId,
    pub status: WorkflowStatus,
    pub results: HashMap<String, StepOutcome>,
    pub execution_time_seconds: f64,
}

/// Schedules a workflow's steps per its declared `ExecutionMode`, persisting
/// the run through `ExecutionStore`.
pub struct Orchestrator {
    invocation: Arc<InvocationService>,
    store: Arc<dyn ExecutionStore>,
}

impl Orchestrator {
    pub fn new(invocation: Arc<InvocationService>, store: Arc<dyn ExecutionStore>) -> Self {
        Orchestrator { invocation, store }
    }

    pub async fn orchestrate(
        &self,
        workflow_id: &str,
        workflow: &WorkflowDefinition,
        mode: ExecutionMode,
        overall_timeout: Duration,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        if workflow.steps.is_empty() {
            return Err(GraphError::Empty.into());
        }
        GraphValidator::validate(&workflow.steps)?;

        let execution_id = Uuid::new_v4();
        self.store
            .create_workflow_execution(WorkflowExecution::new_running(execution_id, workflow_id))
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        let started = Instant::now();
        let deadline = started + overall_timeout;
        let results = Arc::new(Mutex::new(HashMap::<String, StepOutcome>::new()));

        match mode {
            ExecutionMode::Sequential => {
                self.run_sequential(&workflow.steps, &results, deadline).await
            }
            ExecutionMode::Parallel => {
                self.run_parallel(&workflow.steps, &results, deadline).await
            }
            ExecutionMode::Hybrid => {
                self.run_hybrid(&workflow.steps, &results, deadline).await
            }
        }

        let execution_time_seconds = started.elapsed().as_secs_f64();
        let final_results = results.lock().await.clone();
        let timed_out = Instant::now() >= deadline
            && final_results.len() < workflow.steps.len();
        let status = if timed_out {
            WorkflowStatus::Timeout
        } else {
            WorkflowStatus::Success
        };

        self.store
            .update_workflow_execution(
                execution_id,
                WorkflowExecutionPatch {
                    status: Some(status),
                    results: Some(final_results.clone()),
                    execution_time_seconds: Some(execution_time_seconds),
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        Ok(OrchestrationResult {
            execution_id,
            status,
            results: final_results,
            execution_time_seconds,
        })
    }

    async fn run_sequential(
        &self,
        steps: &[WorkflowStep],
        results: &Arc<Mutex<HashMap<String, StepOutcome>>>,
        deadline: Instant,
    ) {
        for step in steps {
            if Instant::now() >= deadline {
                warn!(step_id = %step.step_id, "overall workflow timeout, not launching step");
                break;
            }
            let outcome = self.run_step(step, results).await;
            results.lock().await.insert(step.step_id.clone(), outcome);
        }
    }

    async fn run_parallel(
        &self,
        steps: &[WorkflowStep],
        results: &Arc<Mutex<HashMap<String, StepOutcome>>>,
        deadline: Instant,
    ) {
        let (concurrent, serialized): (Vec<_>, Vec<_>) =
            steps.iter().partition(|s| s.depends_on.is_empty());

        if Instant::now() < deadline {
            let futures = concurrent.iter().map(|step| self.run_step(step, results));
            let outcomes = futures::future::join_all(futures).await;
            let mut guard = results.lock().await;
            for (step, outcome) in concurrent.iter().zip(outcomes) {
                guard.insert(step.step_id.clone(), outcome);
            }
        }

        for step in serialized {
            if Instant::now() >= deadline {
                warn!(step_id = %step.step_id, "overall workflow timeout, not launching step");
                break;
            }
            let outcome = self.run_step(step, results).await;
            results.lock().await.insert(step.step_id.clone(), outcome);
        }
    }

    async fn run_hybrid(
        &self,
        steps: &[WorkflowStep],
        results: &Arc<Mutex<HashMap<String, StepOutcome>>>,
        deadline: Instant,
    ) {
        for layer in GraphValidator::layers(steps) {
            if Instant::now() >= deadline {
                warn!("overall workflow timeout, not launching remaining layers");
                break;
            }
            let futures = layer.iter().map(|step| self.run_step(step, results));
            let outcomes = futures::future::join_all(futures).await;
            let mut guard = results.lock().await;
            for (step, outcome) in layer.iter().zip(outcomes) {
                guard.insert(step.step_id.clone(), outcome);
            }
        }
    }

    async fn run_step(
        &self,
        step: &WorkflowStep,
        results: &Arc<Mutex<HashMap<String, StepOutcome>>>,
    ) -> StepOutcome {
        let started_at = Utc::now();
        let snapshot = results.lock().await.clone();
        let resolved_inputs = ReferenceResolver::resolve(&step.inputs, &snapshot);

        info!(step_id = %step.step_id, skill_id = %step.skill_id, "executing step");
        match self.invocation.invoke(&step.skill_id, resolved_inputs, None).await {
            Ok(row) => StepOutcome {
                status: match row.status {
                    wishub_core::task::TaskStatus::Success => StepStatus::Success,
                    wishub_core::task::TaskStatus::Timeout => StepStatus::Timeout,
                    _ => StepStatus::Error,
                },
                outputs: row.outputs,
                error: row.error_message,
                container_id: row.container_id,
                started_at,
                completed_at: Utc::now(),
            },
            Err(e) => StepOutcome {
                status: StepStatus::Error,
                outputs: None,
                error: Some(e.to_string()),
                container_id: None,
                started_at,
                completed_at: Utc::now(),
            },
        }
    }
}
