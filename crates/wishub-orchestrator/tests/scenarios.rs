//! End-to-end scenarios against in-memory fakes of the four collaborator
//! traits — no Docker daemon or SQLite file required.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use wishub_core::skill::{CodePointer, Language, Skill, SkillInfo, SkillMeta, SkillRegistration};
use wishub_core::task::{SkillExecution, TaskId, TaskPatch, TaskStatus};
use wishub_core::traits::{
    ArtifactError, ArtifactStore, CatalogError, ExecutionStore, RunResult, SandboxRunner,
    SkillCatalog, StoreError,
};
use wishub_core::workflow::{
    ExecutionMode, WorkflowDefinition, WorkflowExecution, WorkflowExecutionId,
    WorkflowExecutionPatch, WorkflowStep,
};
use wishub_orchestrator::{GraphError, GraphValidator, InvocationService, Orchestrator};

struct FakeCatalog {
    skills: Mutex<HashMap<String, SkillMeta>>,
}

impl FakeCatalog {
    fn new() -> Self {
        FakeCatalog {
            skills: Mutex::new(HashMap::new()),
        }
    }

    async fn seed(&self, skill_id: &str, default_timeout_seconds: u32) {
        self.skills.lock().await.insert(
            skill_id.to_string(),
            SkillMeta {
                skill_id: skill_id.to_string(),
                version: "1.0.0".to_string(),
                language: Language::Python,
                code_pointer: CodePointer::new(skill_id, "1.0.0"),
                dependencies: vec![],
                input_schema: serde_json::json!({}),
                output_schema: None,
                default_timeout_seconds,
                info: SkillInfo::default(),
            },
        );
    }
}

#[async_trait]
impl SkillCatalog for FakeCatalog {
    async fn get(&self, skill_id: &str) -> Result<SkillMeta, CatalogError> {
        self.skills
            .lock()
            .await
            .get(skill_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(skill_id.to_string()))
    }

    async fn register(&self, registration: SkillRegistration) -> Result<Skill, CatalogError> {
        let meta = SkillMeta {
            skill_id: registration.skill_id.clone(),
            version: registration.version,
            language: registration.language,
            code_pointer: CodePointer::new(&registration.skill_id, "1.0.0"),
            dependencies: registration.dependencies,
            input_schema: registration.input_schema,
            output_schema: registration.output_schema,
            default_timeout_seconds: registration.default_timeout_seconds,
            info: registration.info,
        };
        self.skills
            .lock()
            .await
            .insert(registration.skill_id.clone(), meta.clone());
        Ok(Skill {
            meta,
            downloads: 0,
            rating: 0.0,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
    }
}

struct FakeArtifacts;

#[async_trait]
impl ArtifactStore for FakeArtifacts {
    async fn fetch(&self, _pointer: &CodePointer) -> Result<Vec<u8>, ArtifactError> {
        Ok(b"noop".to_vec())
    }
    async fn put(
        &self,
        skill_id: &str,
        version: &str,
        _language: Language,
        _bytes: &[u8],
    ) -> Result<CodePointer, ArtifactError> {
        Ok(CodePointer::new(skill_id, version))
    }
    async fn delete(&self, _skill_id: &str, _version: &str) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Drives deterministic per-skill behavior by `skill_id` so each scenario
/// can wire up exactly the sandbox semantics it's testing.
struct FakeSandbox {
    call_count: Mutex<HashMap<String, usize>>,
}

impl FakeSandbox {
    fn new() -> Self {
        FakeSandbox {
            call_count: Mutex::new(HashMap::new()),
        }
    }

    async fn calls_for(&self, skill_id: &str) -> usize {
        *self.call_count.lock().await.get(skill_id).unwrap_or(&0)
    }
}

#[async_trait]
impl SandboxRunner for FakeSandbox {
    async fn execute(
        &self,
        skill_id: &str,
        _language: Language,
        _code: &[u8],
        inputs: &serde_json::Value,
        _timeout_seconds: u32,
    ) -> RunResult {
        *self
            .call_count
            .lock()
            .await
            .entry(skill_id.to_string())
            .or_insert(0) += 1;

        match skill_id {
            "add" => {
                let a = inputs["a"].as_i64().unwrap_or(0);
                let b = inputs["b"].as_i64().unwrap_or(0);
                RunResult::Success {
                    outputs: serde_json::json!({"sum": a + b}),
                    container_id: "container-add".to_string(),
                }
            }
            "sleeper" => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                RunResult::Timeout {
                    container_id: "container-sleeper".to_string(),
                }
            }
            "echo" => RunResult::Success {
                outputs: inputs.clone(),
                container_id: "container-echo".to_string(),
            },
            "greeter" => RunResult::Success {
                outputs: serde_json::json!({"name": "alice"}),
                container_id: "container-greeter".to_string(),
            },
            other => RunResult::Error {
                message: format!("unknown skill: {other}"),
                container_id: None,
            },
        }
    }
}

struct FakeStore {
    tasks: Mutex<HashMap<TaskId, SkillExecution>>,
    workflows: Mutex<HashMap<WorkflowExecutionId, WorkflowExecution>>,
}

impl FakeStore {
    fn new() -> Self {
        FakeStore {
            tasks: Mutex::new(HashMap::new()),
            workflows: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ExecutionStore for FakeStore {
    async fn create_task(&self, row: SkillExecution) -> Result<(), StoreError> {
        self.tasks.lock().await.insert(row.task_id, row);
        Ok(())
    }

    async fn update_task(&self, task_id: TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        let row = tasks
            .get_mut(&task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if let Some(status) = patch.status {
            row.status = status;
        }
        if patch.outputs.is_some() {
            row.outputs = patch.outputs;
        }
        if patch.error_message.is_some() {
            row.error_message = patch.error_message;
        }
        if patch.execution_time_seconds.is_some() {
            row.execution_time_seconds = patch.execution_time_seconds;
        }
        if patch.container_id.is_some() {
            row.container_id = patch.container_id;
        }
        if patch.started_at.is_some() {
            row.started_at = patch.started_at;
        }
        if patch.completed_at.is_some() {
            row.completed_at = patch.completed_at;
        }
        Ok(())
    }

    async fn get_task(&self, task_id: TaskId) -> Result<SkillExecution, StoreError> {
        self.tasks
            .lock()
            .await
            .get(&task_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }

    async fn create_workflow_execution(&self, row: WorkflowExecution) -> Result<(), StoreError> {
        self.workflows.lock().await.insert(row.execution_id, row);
        Ok(())
    }

    async fn update_workflow_execution(
        &self,
        execution_id: WorkflowExecutionId,
        patch: WorkflowExecutionPatch,
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.lock().await;
        let row = workflows
            .get_mut(&execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(results) = patch.results {
            row.results = results;
        }
        if patch.error_message.is_some() {
            row.error_message = patch.error_message;
        }
        if patch.execution_time_seconds.is_some() {
            row.execution_time_seconds = patch.execution_time_seconds;
        }
        if patch.completed_at.is_some() {
            row.completed_at = patch.completed_at;
        }
        Ok(())
    }

    async fn get_workflow_execution(
        &self,
        execution_id: WorkflowExecutionId,
    ) -> Result<WorkflowExecution, StoreError> {
        self.workflows
            .lock()
            .await
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))
    }
}

struct Harness {
    catalog: Arc<FakeCatalog>,
    sandbox: Arc<FakeSandbox>,
    store: Arc<FakeStore>,
    invocation: Arc<InvocationService>,
}

impl Harness {
    async fn new() -> Self {
        let catalog = Arc::new(FakeCatalog::new());
        let artifacts = Arc::new(FakeArtifacts);
        let sandbox = Arc::new(FakeSandbox::new());
        let store = Arc::new(FakeStore::new());
        let invocation = Arc::new(InvocationService::new(
            catalog.clone(),
            artifacts,
            sandbox.clone(),
            store.clone(),
            16,
        ));
        Harness {
            catalog,
            sandbox,
            store,
            invocation,
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.invocation.clone(), self.store.clone())
    }
}

fn step(id: &str, skill_id: &str, inputs: serde_json::Value, deps: &[&str]) -> WorkflowStep {
    WorkflowStep {
        step_id: id.to_string(),
        skill_id: skill_id.to_string(),
        inputs,
        depends_on: deps.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn s1_sync_invoke_success() {
    let h = Harness::new().await;
    h.catalog.seed("add", 5).await;

    let row = h
        .invocation
        .invoke("add", serde_json::json!({"a": 2, "b": 3}), Some(5))
        .await
        .unwrap();

    assert_eq!(row.status, TaskStatus::Success);
    assert_eq!(row.outputs, Some(serde_json::json!({"sum": 5})));
    assert!(row.execution_time_seconds.unwrap_or(-1.0) >= 0.0);
}

#[tokio::test]
async fn s2_timeout_leaves_terminal_task_row() {
    let h = Harness::new().await;
    h.catalog.seed("sleeper", 1).await;

    let row = h
        .invocation
        .invoke("sleeper", serde_json::json!({}), Some(1))
        .await
        .unwrap();

    assert_eq!(row.status, TaskStatus::Timeout);
    assert!(row.status.is_terminal());
}

#[tokio::test]
async fn s3_cycle_is_rejected_before_any_step_runs() {
    let h = Harness::new().await;
    h.catalog.seed("add", 5).await;

    let steps = vec![step("s1", "add", serde_json::json!({}), &["s2"]),
                      step("s2", "add", serde_json::json!({}), &["s1"])];
    let err = GraphValidator::validate(&steps).unwrap_err();
    assert_eq!(err, GraphError::Cycle);
    assert_eq!(h.sandbox.calls_for("add").await, 0);
}

#[tokio::test]
async fn s4_hybrid_dag_runs_all_three_steps() {
    let h = Harness::new().await;
    h.catalog.seed("echo", 5).await;

    let steps = vec![
        step("a", "echo", serde_json::json!({"v": "a"}), &[]),
        step("b", "echo", serde_json::json!({"v": "b"}), &[]),
        step("c", "echo", serde_json::json!({"v": "c"}), &["a", "b"]),
    ];
    let workflow = WorkflowDefinition {
        name: "hybrid-test".to_string(),
        description: None,
        steps,
    };

    let result = h
        .orchestrator()
        .orchestrate("wf-1", &workflow, ExecutionMode::Hybrid, Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(result.results.len(), 3);
    let a = &result.results["a"];
    let b = &result.results["b"];
    let c = &result.results["c"];
    assert!(a.is_success() && b.is_success() && c.is_success());
    assert!(c.started_at >= a.completed_at.min(b.completed_at));
}

#[tokio::test]
async fn s5_reference_resolution_passes_prior_output_into_next_step() {
    let h = Harness::new().await;
    h.catalog.seed("greeter", 5).await;
    h.catalog.seed("echo", 5).await;

    let steps = vec![
        step("s1", "greeter", serde_json::json!({}), &[]),
        step(
            "s2",
            "echo",
            serde_json::json!({"greeting": "hello {{s1.name}}"}),
            &["s1"],
        ),
    ];
    let workflow = WorkflowDefinition {
        name: "resolution-test".to_string(),
        description: None,
        steps,
    };

    let result = h
        .orchestrator()
        .orchestrate("wf-2", &workflow, ExecutionMode::Sequential, Duration::from_secs(10))
        .await
        .unwrap();

    let s2 = &result.results["s2"];
    assert_eq!(
        s2.outputs.as_ref().unwrap()["greeting"],
        serde_json::json!("hello alice")
    );
}

#[tokio::test]
async fn s6_async_poll_reaches_a_terminal_status_without_regressing() {
    let h = Harness::new().await;
    h.catalog.seed("add", 5).await;

    let task_id = h
        .invocation
        .invoke_async("add".to_string(), serde_json::json!({"a": 1, "b": 1}), None)
        .unwrap();

    let mut seen_running = false;
    let mut final_status = None;
    for _ in 0..50 {
        match h.invocation.get_task(task_id).await {
            Ok(row) => {
                if row.status == TaskStatus::Running {
                    seen_running = true;
                }
                if row.status.is_terminal() {
                    final_status = Some(row.status);
                    break;
                }
            }
            Err(_) => {}
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let _ = seen_running;
    assert!(matches!(final_status, Some(TaskStatus::Success)));
}
