//! Single-skill invocation: catalog lookup, sandboxed execution, and task
//! bookkeeping. Workflows drive this one step at a time; `/skill/invoke`
//! drives it directly.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;
use wishub_core::error::{ApiError, ErrorCode};
use wishub_core::task::{SkillExecution, TaskId, TaskPatch, TaskStatus};
use wishub_core::traits::{ArtifactStore, CatalogError, ExecutionStore, RunResult, SandboxRunner, SkillCatalog};

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("skill not found: {0}")]
    SkillNotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Internal(String),
}

impl From<InvocationError> for ApiError {
    fn from(e: InvocationError) -> Self {
        match e {
            InvocationError::SkillNotFound(id) => ApiError::new(ErrorCode::Skill001, id),
            InvocationError::InvalidArguments(msg) => ApiError::new(ErrorCode::Skill002, msg),
            InvocationError::Internal(msg) => ApiError::new(ErrorCode::Skill999, msg),
        }
    }
}

/// Resolves a skill, runs it in the sandbox, and records the outcome.
///
/// `sandbox_limit` caps how many containers run at once across every caller
/// (direct `/skill/invoke` and every orchestrator step fan-out) — excess
/// invocations queue for a permit rather than all starting at once.
pub struct InvocationService {
    catalog: Arc<dyn SkillCatalog>,
    artifacts: Arc<dyn ArtifactStore>,
    sandbox: Arc<dyn SandboxRunner>,
    store: Arc<dyn ExecutionStore>,
    sandbox_limit: Arc<Semaphore>,
}

impl InvocationService {
    pub fn new(
        catalog: Arc<dyn SkillCatalog>,
        artifacts: Arc<dyn ArtifactStore>,
        sandbox: Arc<dyn SandboxRunner>,
        store: Arc<dyn ExecutionStore>,
        max_concurrent_containers: usize,
    ) -> Self {
        InvocationService {
            catalog,
            artifacts,
            sandbox,
            store,
            sandbox_limit: Arc::new(Semaphore::new(max_concurrent_containers.max(1))),
        }
    }

    /// Run a skill to completion and return its terminal row.
    pub async fn invoke(
        &self,
        skill_id: &str,
        inputs: serde_json::Value,
        timeout_override: Option<u32>,
    ) -> Result<SkillExecution, InvocationError> {
        let task_id = Uuid::new_v4();
        let row = SkillExecution::new_pending(task_id, skill_id, inputs.clone());
        self.store
            .create_task(row)
            .await
            .map_err(|e| InvocationError::Internal(e.to_string()))?;

        self.run_and_record(task_id, skill_id, inputs, timeout_override)
            .await?;

        self.store
            .get_task(task_id)
            .await
            .map_err(|e| InvocationError::Internal(e.to_string()))
    }

    /// Create a pending task and run it in the background, returning the
    /// task id immediately. Callers poll `get_task` for completion.
    pub fn invoke_async(
        self: &Arc<Self>,
        skill_id: String,
        inputs: serde_json::Value,
        timeout_override: Option<u32>,
    ) -> Result<TaskId, InvocationError> {
        let task_id = Uuid::new_v4();
        let row = SkillExecution::new_pending(task_id, &skill_id, inputs.clone());
        let store = self.store.clone();
        let this = self.clone();

        tokio::spawn(async move {
            if let Err(e) = store.create_task(row).await {
                error!(task_id = %task_id, "failed to persist pending task: {e}");
                return;
            }
            if let Err(e) = this
                .run_and_record(task_id, &skill_id, inputs, timeout_override)
                .await
            {
                warn!(task_id = %task_id, "async invocation failed: {e}");
            }
        });

        Ok(task_id)
    }

    pub async fn get_task(&self, task_id: TaskId) -> Result<SkillExecution, InvocationError> {
        self.store
            .get_task(task_id)
            .await
            .map_err(|_| InvocationError::Internal(format!("task not found: {task_id}")))
    }

    async fn run_and_record(
        &self,
        task_id: TaskId,
        skill_id: &str,
        inputs: serde_json::Value,
        timeout_override: Option<u32>,
    ) -> Result<(), InvocationError> {
        if !inputs.is_object() {
            return Err(InvocationError::InvalidArguments(
                "inputs must be a JSON object".to_string(),
            ));
        }

        let meta = self.catalog.get(skill_id).await.map_err(|e| match e {
            CatalogError::NotFound(id) => InvocationError::SkillNotFound(id),
            other => InvocationError::Internal(other.to_string()),
        })?;

        let code = self
            .artifacts
            .fetch(&meta.code_pointer)
            .await
            .map_err(|e| InvocationError::Internal(e.to_string()))?;

        let started_at = Utc::now();
        self.store
            .update_task(task_id, TaskPatch::started(started_at))
            .await
            .map_err(|e| InvocationError::Internal(e.to_string()))?;

        let timeout_seconds = meta.effective_timeout(timeout_override);
        let clock = Instant::now();

        let permit = self
            .sandbox_limit
            .acquire()
            .await
            .expect("sandbox_limit semaphore is never closed");

        info!(skill_id, %task_id, timeout_seconds, "invoking skill");
        let run_result = self
            .sandbox
            .execute(skill_id, meta.language, &code, &inputs, timeout_seconds)
            .await;
        drop(permit);

        let elapsed = clock.elapsed().as_secs_f64();
        let completed_at = Utc::now();

        let patch = match run_result {
            RunResult::Success {
                outputs,
                container_id,
            } => TaskPatch::terminal(
                TaskStatus::Success,
                Some(outputs),
                None,
                Some(container_id),
                elapsed,
                completed_at,
            ),
            RunResult::Timeout { container_id } => TaskPatch::terminal(
                TaskStatus::Timeout,
                None,
                Some(format!("execution exceeded {timeout_seconds}s")),
                Some(container_id),
                elapsed,
                completed_at,
            ),
            RunResult::Error {
                message,
                container_id,
            } => TaskPatch::terminal(
                TaskStatus::Error,
                None,
                Some(message),
                container_id,
                elapsed,
                completed_at,
            ),
        };

        self.store
            .update_task(task_id, patch)
            .await
            .map_err(|e| InvocationError::Internal(e.to_string()))
    }
}
