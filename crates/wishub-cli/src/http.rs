//! HTTP surface: the axum router wiring `/skill/*` routes onto
//! `InvocationService`/`Orchestrator`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;
use wishub_core::error::{ApiError, ErrorCode};
use wishub_core::skill::{Language, SkillInfo, SkillRegistration};
use wishub_core::task::TaskStatus;
use wishub_core::traits::{ArtifactStore, CatalogError, ExecutionStore, SkillCatalog};
use wishub_core::workflow::{ExecutionMode, StepOutcome, WorkflowDefinition, WorkflowStatus};
use wishub_orchestrator::{InvocationService, Orchestrator};
use wishub_sandbox::ContainerEngine;
use wishub_store::FilesystemArtifactStore;

use crate::config::Settings;

pub struct AppState {
    pub settings: Settings,
    pub invocation: Arc<InvocationService>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn ExecutionStore>,
    pub artifacts: Arc<FilesystemArtifactStore>,
    pub catalog: Arc<dyn SkillCatalog>,
    pub engine: Arc<dyn ContainerEngine>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/skill/invoke", post(invoke_skill))
        .route("/skill/task/{task_id}", get(get_task))
        .route("/skill/orchestrate", post(orchestrate_workflow))
        .route("/skill/workflow/{execution_id}", get(get_workflow))
        .route("/skill/register", post(register_skill))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn auth_gate(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<ErrorBody>)> {
    if !state.settings.auth_required {
        return Ok(());
    }
    let expected = state.settings.api_key.as_deref().unwrap_or("");
    let supplied = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if supplied.is_empty() || supplied != expected {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                status: "error".into(),
                error: Some("missing or invalid X-API-Key".into()),
            }),
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: String,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthBody {
    status: &'static str,
    docker: bool,
    database: bool,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let docker = state.engine.ping().await;
    let database = state.store.get_task(Uuid::nil()).await.is_err();
    let status = if docker && database { "ok" } else { "degraded" };
    Json(HealthBody {
        status,
        docker,
        database,
    })
}

#[derive(Debug, Deserialize)]
struct InvokeRequest {
    skill_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    skill_version: Option<String>,
    inputs: serde_json::Value,
    #[serde(default)]
    timeout: Option<u32>,
    #[serde(default)]
    is_async: bool,
}

#[derive(Debug, Serialize)]
struct InvokeResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outputs: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "pending",
        TaskStatus::Success => "success",
        TaskStatus::Error => "error",
        TaskStatus::Timeout => "timeout",
    }
}

async fn invoke_skill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<InvokeRequest>,
) -> impl IntoResponse {
    if let Err(resp) = auth_gate(&state, &headers) {
        return resp.into_response();
    }
    let timeout = req.timeout.map(|t| t.clamp(1, 300));

    if req.is_async {
        return match state
            .invocation
            .invoke_async(req.skill_id, req.inputs, timeout)
        {
            Ok(task_id) => Json(InvokeResponse {
                status: "pending".into(),
                task_id: Some(task_id),
                outputs: None,
                execution_time: None,
                message: Some("task accepted".into()),
                error: None,
            })
            .into_response(),
            Err(e) => invoke_error_response(e.into()),
        };
    }

    match state
        .invocation
        .invoke(&req.skill_id, req.inputs, timeout)
        .await
    {
        Ok(row) => Json(InvokeResponse {
            status: task_status_str(row.status).into(),
            task_id: Some(row.task_id),
            outputs: row.outputs,
            execution_time: row.execution_time_seconds,
            message: None,
            error: row.error_message,
        })
        .into_response(),
        Err(e) => invoke_error_response(e.into()),
    }
}

fn invoke_error_response(err: ApiError) -> axum::response::Response {
    warn!(code = %err.code, "invocation failed: {}", err.details);
    (
        StatusCode::BAD_REQUEST,
        Json(InvokeResponse {
            status: "error".into(),
            task_id: None,
            outputs: None,
            execution_time: None,
            message: None,
            error: Some(err.to_string()),
        }),
    )
        .into_response()
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<Uuid>,
) -> impl IntoResponse {
    match state.invocation.get_task(task_id).await {
        Ok(row) => Json(InvokeResponse {
            status: task_status_str(row.status).into(),
            task_id: Some(row.task_id),
            outputs: row.outputs,
            execution_time: row.execution_time_seconds,
            message: None,
            error: row.error_message,
        })
        .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                status: "error".into(),
                error: Some(format!("unknown task: {task_id}")),
            }),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct OrchestrateRequest {
    workflow_id: String,
    workflow: WorkflowDefinition,
    execution_mode: ExecutionMode,
    #[serde(default)]
    timeout: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OrchestrateResponse {
    status: String,
    execution_id: Uuid,
    results: std::collections::HashMap<String, StepOutcome>,
    execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn workflow_status_str(status: WorkflowStatus) -> &'static str {
    status.as_str()
}

async fn orchestrate_workflow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OrchestrateRequest>,
) -> impl IntoResponse {
    if let Err(resp) = auth_gate(&state, &headers) {
        return resp.into_response();
    }
    let timeout_seconds = req.timeout.unwrap_or(3600).clamp(1, 3600);

    match state
        .orchestrator
        .orchestrate(
            &req.workflow_id,
            &req.workflow,
            req.execution_mode,
            Duration::from_secs(timeout_seconds as u64),
        )
        .await
    {
        Ok(result) => Json(OrchestrateResponse {
            status: workflow_status_str(result.status).into(),
            execution_id: result.execution_id,
            results: result.results,
            execution_time: result.execution_time_seconds,
            message: None,
            error: None,
        })
        .into_response(),
        Err(e) => {
            let api_err: ApiError = e.into();
            warn!(code = %api_err.code, "orchestration failed: {}", api_err.details);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    status: "error".into(),
                    error: Some(api_err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    AxumPath(execution_id): AxumPath<Uuid>,
) -> impl IntoResponse {
    match state.store.get_workflow_execution(execution_id).await {
        Ok(row) => Json(OrchestrateResponse {
            status: workflow_status_str(row.status).into(),
            execution_id: row.execution_id,
            results: row.results,
            execution_time: row.execution_time_seconds.unwrap_or(0.0),
            message: None,
            error: row.error_message,
        })
        .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                status: "error".into(),
                error: Some(format!("unknown workflow execution: {execution_id}")),
            }),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    skill_id: String,
    version: String,
    language: String,
    code_base64: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    input_schema: Option<serde_json::Value>,
    #[serde(default)]
    output_schema: Option<serde_json::Value>,
    #[serde(default)]
    default_timeout_seconds: Option<u32>,
    #[serde(default)]
    metadata: Option<RegisterMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterMetadata {
    name: Option<String>,
    description: Option<String>,
    author: Option<String>,
    license: Option<String>,
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    status: String,
    skill_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn register_skill(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    if let Err(resp) = auth_gate(&state, &headers) {
        return resp.into_response();
    }

    let language: Language = match req.language.parse() {
        Ok(l) => l,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RegisterResponse {
                    status: "error".into(),
                    skill_id: req.skill_id,
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    };

    let code = match STANDARD.decode(req.code_base64.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            let api_err = ApiError::new(ErrorCode::SkillReg003, format!("invalid base64: {e}"));
            return (
                StatusCode::BAD_REQUEST,
                Json(RegisterResponse {
                    status: "error".into(),
                    skill_id: req.skill_id,
                    error: Some(api_err.to_string()),
                }),
            )
                .into_response()
        }
    };

    let version = req.version.clone();

    if let Err(e) = state
        .artifacts
        .put(&req.skill_id, &version, language, &code)
        .await
    {
        let api_err: ApiError = e.into();
        warn!(code = %api_err.code, "artifact upload failed: {}", api_err.details);
        return (
            StatusCode::BAD_REQUEST,
            Json(RegisterResponse {
                status: "error".into(),
                skill_id: req.skill_id,
                error: Some(api_err.to_string()),
            }),
        )
            .into_response();
    }

    let metadata = req.metadata.unwrap_or_default();
    let registration = SkillRegistration {
        skill_id: req.skill_id.clone(),
        version,
        language,
        code,
        dependencies: req.dependencies,
        input_schema: req.input_schema.unwrap_or_else(|| serde_json::json!({})),
        output_schema: req.output_schema,
        default_timeout_seconds: req.default_timeout_seconds.unwrap_or(30),
        info: SkillInfo {
            name: metadata.name,
            description: metadata.description,
            author: metadata.author,
            license: metadata.license,
            category: metadata.category,
        },
    };

    match state.catalog.register(registration).await {
        Ok(skill) => Json(RegisterResponse {
            status: "success".into(),
            skill_id: skill.meta.skill_id,
            error: None,
        })
        .into_response(),
        Err(e) => {
            // Only the artifact this call just uploaded is ours to clean up;
            // on AlreadyExists the path belongs to the prior registration.
            if !matches!(e, CatalogError::AlreadyExists(_)) {
                let _ = state.artifacts.delete(&req.skill_id, &req.version).await;
            }
            let api_err: ApiError = e.into();
            warn!(code = %api_err.code, "registration failed: {}", api_err.details);
            (
                StatusCode::BAD_REQUEST,
                Json(RegisterResponse {
                    status: "error".into(),
                    skill_id: req.skill_id,
                    error: Some(api_err.to_string()),
                }),
            )
                .into_response()
        }
    }
}
