//! Collaborator interfaces the orchestration core consumes.
//!
//! These traits are the seams between the orchestration core and everything
//! that talks to Docker, SQLite, or the filesystem. Production code wires in
//! the real implementations from `wishub-sandbox`/`wishub-store`; tests wire
//! in in-memory fakes.

use async_trait::async_trait;
use std::fmt;

use crate::error::ApiError;
use crate::skill::{CodePointer, Language, Skill, SkillMeta, SkillRegistration};
use crate::task::{SkillExecution, TaskId, TaskPatch};
use crate::workflow::{WorkflowExecution, WorkflowExecutionId, WorkflowExecutionPatch};

/// Outcome of one sandboxed invocation.
#[derive(Debug, Clone)]
pub enum RunResult {
    Success {
        outputs: serde_json::Value,
        container_id: String,
    },
    Timeout {
        container_id: String,
    },
    Error {
        message: String,
        container_id: Option<String>,
    },
}

/// One sandboxed skill invocation. Implemented by `wishub_sandbox::SandboxRunner`.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn execute(
        &self,
        skill_id: &str,
        language: Language,
        code: &[u8],
        inputs: &serde_json::Value,
        timeout_seconds: u32,
    ) -> RunResult;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("skill not found: {0}")]
    NotFound(String),
    #[error("skill already exists: {0}")]
    AlreadyExists(String),
    #[error("catalog storage failure: {0}")]
    Storage(String),
}

/// Lookup and registration of skill metadata. The actual code blob is
/// fetched separately via `ArtifactStore`.
#[async_trait]
pub trait SkillCatalog: Send + Sync {
    async fn get(&self, skill_id: &str) -> Result<SkillMeta, CatalogError>;
    async fn register(&self, registration: SkillRegistration) -> Result<Skill, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("artifact storage failure: {0}")]
    Storage(String),
}

/// Opaque fetch/put of code blobs by `(skill_id, version)`, stored at
/// `<skill_id>/<version>/skill.<ext>`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn fetch(&self, pointer: &CodePointer) -> Result<Vec<u8>, ArtifactError>;
    async fn put(
        &self,
        skill_id: &str,
        version: &str,
        language: Language,
        bytes: &[u8],
    ) -> Result<CodePointer, ArtifactError>;
    async fn delete(&self, skill_id: &str, version: &str) -> Result<(), ArtifactError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Durable CRUD on task and workflow-execution rows.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_task(&self, row: SkillExecution) -> Result<(), StoreError>;
    async fn update_task(&self, task_id: TaskId, patch: TaskPatch) -> Result<(), StoreError>;
    async fn get_task(&self, task_id: TaskId) -> Result<SkillExecution, StoreError>;

    async fn create_workflow_execution(&self, row: WorkflowExecution) -> Result<(), StoreError>;
    async fn update_workflow_execution(
        &self,
        execution_id: WorkflowExecutionId,
        patch: WorkflowExecutionPatch,
    ) -> Result<(), StoreError>;
    async fn get_workflow_execution(
        &self,
        execution_id: WorkflowExecutionId,
    ) -> Result<WorkflowExecution, StoreError>;
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunResult::Success { container_id, .. } => {
                write!(f, "success (container {container_id})")
            }
            RunResult::Timeout { container_id } => write!(f, "timeout (container {container_id})"),
            RunResult::Error { message, .. } => write!(f, "error: {message}"),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        use crate::error::ErrorCode;
        match e {
            CatalogError::NotFound(id) => ApiError::new(ErrorCode::Skill001, id),
            CatalogError::AlreadyExists(id) => ApiError::new(ErrorCode::SkillReg001, id),
            CatalogError::Storage(msg) => ApiError::new(ErrorCode::SkillReg999, msg),
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(e: ArtifactError) -> Self {
        use crate::error::ErrorCode;
        match e {
            ArtifactError::NotFound(id) => ApiError::new(ErrorCode::Skill999, id),
            ArtifactError::Storage(msg) => ApiError::new(ErrorCode::SkillReg999, msg),
        }
    }
}
