//! SQLite-backed `SkillCatalog` and `ExecutionStore`.
//!
//! Schema and query style follow the registry's persistence layer: plain
//! `sqlx::query`/`query_scalar` over hand-written SQL, JSON-serialized blob
//! columns for nested structures, and `INSERT OR REPLACE ... COALESCE(...)`
//! to preserve `created_at` across re-registrations.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use wishub_core::skill::{CodePointer, Language, Skill, SkillInfo, SkillMeta, SkillRegistration};
use wishub_core::task::{SkillExecution, TaskId, TaskPatch, TaskStatus};
use wishub_core::traits::{CatalogError, ExecutionStore, SkillCatalog, StoreError};
use wishub_core::workflow::{
    StepOutcome, WorkflowExecution, WorkflowExecutionId, WorkflowExecutionPatch, WorkflowStatus,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = SqliteStore { pool };
        store.initialize_schema().await?;
        info!(path = %db_path.display(), "sqlite store initialized");
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS skills (
                skill_id TEXT NOT NULL,
                version TEXT NOT NULL,
                language TEXT NOT NULL,
                code_pointer TEXT NOT NULL,
                dependencies TEXT NOT NULL,
                input_schema TEXT NOT NULL,
                output_schema TEXT,
                default_timeout_seconds INTEGER NOT NULL,
                info TEXT NOT NULL,
                downloads INTEGER NOT NULL DEFAULT 0,
                rating REAL NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (skill_id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                skill_id TEXT NOT NULL,
                status TEXT NOT NULL,
                inputs TEXT NOT NULL,
                outputs TEXT,
                error_message TEXT,
                execution_time_seconds REAL,
                container_id TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_tasks_skill ON tasks(skill_id)"#)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_executions (
                execution_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                results TEXT NOT NULL,
                error_message TEXT,
                execution_time_seconds REAL,
                created_at INTEGER NOT NULL,
                completed_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("wishub-store schema initialized");
        Ok(())
    }
}

fn row_to_skill(row: &sqlx::sqlite::SqliteRow) -> Result<Skill, CatalogError> {
    let language: String = row.try_get("language").map_err(db_err)?;
    let language = Language::from_str(&language)
        .map_err(|e| CatalogError::Storage(format!("corrupt language column: {e}")))?;
    let input_schema: String = row.try_get("input_schema").map_err(db_err)?;
    let output_schema: Option<String> = row.try_get("output_schema").map_err(db_err)?;
    let info: String = row.try_get("info").map_err(db_err)?;
    let dependencies: String = row.try_get("dependencies").map_err(db_err)?;

    let meta = SkillMeta {
        skill_id: row.try_get("skill_id").map_err(db_err)?,
        version: row.try_get("version").map_err(db_err)?,
        language,
        code_pointer: CodePointer(row.try_get("code_pointer").map_err(db_err)?),
        dependencies: serde_json::from_str(&dependencies).unwrap_or_default(),
        input_schema: serde_json::from_str(&input_schema).unwrap_or(serde_json::Value::Null),
        output_schema: output_schema.and_then(|s| serde_json::from_str(&s).ok()),
        default_timeout_seconds: row
            .try_get::<i64, _>("default_timeout_seconds")
            .map_err(db_err)? as u32,
        info: serde_json::from_str::<SkillInfo>(&info).unwrap_or_default(),
    };

    Ok(Skill {
        meta,
        downloads: row.try_get::<i64, _>("downloads").map_err(db_err)? as u64,
        rating: row.try_get("rating").map_err(db_err)?,
        created_at: ts_to_utc(row.try_get("created_at").map_err(db_err)?),
        updated_at: ts_to_utc(row.try_get("updated_at").map_err(db_err)?),
    })
}

fn ts_to_utc(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

fn db_err(e: sqlx::Error) -> CatalogError {
    CatalogError::Storage(e.to_string())
}

#[async_trait]
impl SkillCatalog for SqliteStore {
    async fn get(&self, skill_id: &str) -> Result<SkillMeta, CatalogError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM skills WHERE skill_id = ?1
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(skill_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| CatalogError::NotFound(skill_id.to_string()))?;

        Ok(row_to_skill(&row)?.meta)
    }

    async fn register(&self, registration: SkillRegistration) -> Result<Skill, CatalogError> {
        let existing = sqlx::query(
            r#"SELECT 1 FROM skills WHERE skill_id = ?1 AND version = ?2"#,
        )
        .bind(&registration.skill_id)
        .bind(&registration.version)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if existing.is_some() {
            return Err(CatalogError::AlreadyExists(format!(
                "{}@{}",
                registration.skill_id, registration.version
            )));
        }

        let now = Utc::now();
        let code_pointer = CodePointer::new(&registration.skill_id, &registration.version);

        let dependencies_json = serde_json::to_string(&registration.dependencies)
            .map_err(|e| CatalogError::Storage(e.to_string()))?;
        let input_schema_json = serde_json::to_string(&registration.input_schema)
            .map_err(|e| CatalogError::Storage(e.to_string()))?;
        let output_schema_json = registration
            .output_schema
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CatalogError::Storage(e.to_string()))?;
        let info_json = serde_json::to_string(&registration.info)
            .map_err(|e| CatalogError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO skills (
                skill_id, version, language, code_pointer, dependencies,
                input_schema, output_schema, default_timeout_seconds, info,
                downloads, rating, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, ?10, ?10)
            "#,
        )
        .bind(&registration.skill_id)
        .bind(&registration.version)
        .bind(registration.language.as_str())
        .bind(code_pointer.as_str())
        .bind(dependencies_json)
        .bind(input_schema_json)
        .bind(output_schema_json)
        .bind(registration.default_timeout_seconds as i64)
        .bind(info_json)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Skill {
            meta: SkillMeta {
                skill_id: registration.skill_id,
                version: registration.version,
                language: registration.language,
                code_pointer,
                dependencies: registration.dependencies,
                input_schema: registration.input_schema,
                output_schema: registration.output_schema,
                default_timeout_seconds: registration.default_timeout_seconds,
                info: registration.info,
            },
            downloads: 0,
            rating: 0.0,
            created_at: now,
            updated_at: now,
        })
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn create_task(&self, row: SkillExecution) -> Result<(), StoreError> {
        let inputs = serde_json::to_string(&row.inputs).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO tasks (
                task_id, skill_id, status, inputs, outputs, error_message,
                execution_time_seconds, container_id, created_at, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, NULL, ?5, NULL, NULL)
            "#,
        )
        .bind(row.task_id.to_string())
        .bind(&row.skill_id)
        .bind(row.status.as_str())
        .bind(inputs)
        .bind(row.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn update_task(&self, task_id: TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        let current = self.get_task(task_id).await?;
        let merged = SkillExecution {
            status: patch.status.unwrap_or(current.status),
            outputs: patch.outputs.or(current.outputs),
            error_message: patch.error_message.or(current.error_message),
            execution_time_seconds: patch
                .execution_time_seconds
                .or(current.execution_time_seconds),
            container_id: patch.container_id.or(current.container_id),
            started_at: patch.started_at.or(current.started_at),
            completed_at: patch.completed_at.or(current.completed_at),
            ..current
        };

        let outputs = merged
            .outputs
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE tasks SET status = ?2, outputs = ?3, error_message = ?4,
                execution_time_seconds = ?5, container_id = ?6, started_at = ?7, completed_at = ?8
            WHERE task_id = ?1
            "#,
        )
        .bind(task_id.to_string())
        .bind(merged.status.as_str())
        .bind(outputs)
        .bind(&merged.error_message)
        .bind(merged.execution_time_seconds)
        .bind(&merged.container_id)
        .bind(merged.started_at.map(|t| t.timestamp()))
        .bind(merged.completed_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_task(&self, task_id: TaskId) -> Result<SkillExecution, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM tasks WHERE task_id = ?1"#)
            .bind(task_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;

        let inputs: String = row.try_get("inputs").map_err(store_err)?;
        let outputs: Option<String> = row.try_get("outputs").map_err(store_err)?;
        let status: String = row.try_get("status").map_err(store_err)?;

        Ok(SkillExecution {
            task_id,
            skill_id: row.try_get("skill_id").map_err(store_err)?,
            status: parse_task_status(&status),
            inputs: serde_json::from_str(&inputs).unwrap_or(serde_json::Value::Null),
            outputs: outputs.and_then(|s| serde_json::from_str(&s).ok()),
            error_message: row.try_get("error_message").map_err(store_err)?,
            execution_time_seconds: row.try_get("execution_time_seconds").map_err(store_err)?,
            container_id: row.try_get("container_id").map_err(store_err)?,
            created_at: ts_to_utc(row.try_get("created_at").map_err(store_err)?),
            started_at: row
                .try_get::<Option<i64>, _>("started_at")
                .map_err(store_err)?
                .map(ts_to_utc),
            completed_at: row
                .try_get::<Option<i64>, _>("completed_at")
                .map_err(store_err)?
                .map(ts_to_utc),
        })
    }

    async fn create_workflow_execution(&self, row: WorkflowExecution) -> Result<(), StoreError> {
        let results = serde_json::to_string(&row.results).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                execution_id, workflow_id, status, results, error_message,
                execution_time_seconds, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, NULL)
            "#,
        )
        .bind(row.execution_id.to_string())
        .bind(&row.workflow_id)
        .bind(row.status.as_str())
        .bind(results)
        .bind(row.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn update_workflow_execution(
        &self,
        execution_id: WorkflowExecutionId,
        patch: WorkflowExecutionPatch,
    ) -> Result<(), StoreError> {
        let current = self.get_workflow_execution(execution_id).await?;
        let status = patch.status.unwrap_or(current.status);
        let results = patch.results.unwrap_or(current.results);
        let error_message = patch.error_message.or(current.error_message);
        let execution_time_seconds = patch
            .execution_time_seconds
            .or(current.execution_time_seconds);
        let completed_at = patch.completed_at.or(current.completed_at);

        let results_json =
            serde_json::to_string(&results).map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE workflow_executions SET status = ?2, results = ?3, error_message = ?4,
                execution_time_seconds = ?5, completed_at = ?6
            WHERE execution_id = ?1
            "#,
        )
        .bind(execution_id.to_string())
        .bind(status.as_str())
        .bind(results_json)
        .bind(&error_message)
        .bind(execution_time_seconds)
        .bind(completed_at.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_workflow_execution(
        &self,
        execution_id: WorkflowExecutionId,
    ) -> Result<WorkflowExecution, StoreError> {
        let row = sqlx::query(r#"SELECT * FROM workflow_executions WHERE execution_id = ?1"#)
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;

        let results: String = row.try_get("results").map_err(store_err)?;
        let status: String = row.try_get("status").map_err(store_err)?;

        Ok(WorkflowExecution {
            execution_id,
            workflow_id: row.try_get("workflow_id").map_err(store_err)?,
            status: parse_workflow_status(&status),
            results: serde_json::from_str::<HashMap<String, StepOutcome>>(&results)
                .unwrap_or_default(),
            error_message: row.try_get("error_message").map_err(store_err)?,
            execution_time_seconds: row.try_get("execution_time_seconds").map_err(store_err)?,
            created_at: ts_to_utc(row.try_get("created_at").map_err(store_err)?),
            completed_at: row
                .try_get::<Option<i64>, _>("completed_at")
                .map_err(store_err)?
                .map(ts_to_utc),
        })
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "pending" => TaskStatus::Pending,
        "running" => TaskStatus::Running,
        "success" => TaskStatus::Success,
        "timeout" => TaskStatus::Timeout,
        _ => TaskStatus::Error,
    }
}

fn parse_workflow_status(s: &str) -> WorkflowStatus {
    match s {
        "running" => WorkflowStatus::Running,
        "success" => WorkflowStatus::Success,
        "timeout" => WorkflowStatus::Timeout,
        _ => WorkflowStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    fn registration(skill_id: &str, version: &str) -> SkillRegistration {
        SkillRegistration {
            skill_id: skill_id.to_string(),
            version: version.to_string(),
            language: Language::Python,
            code: b"print('hi')".to_vec(),
            dependencies: vec![],
            input_schema: serde_json::json!({}),
            output_schema: None,
            default_timeout_seconds: 30,
            info: SkillInfo::default(),
        }
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let store = store().await;
        store.register(registration("add", "1.0.0")).await.unwrap();
        let meta = store.get("add").await.unwrap();
        assert_eq!(meta.skill_id, "add");
        assert_eq!(meta.default_timeout_seconds, 30);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let store = store().await;
        store.register(registration("add", "1.0.0")).await.unwrap();
        let err = store.register(registration("add", "1.0.0")).await.unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn unknown_skill_lookup_fails() {
        let store = store().await;
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn task_lifecycle_persists_patches() {
        let store = store().await;
        let task_id = uuid::Uuid::new_v4();
        let row = SkillExecution::new_pending(task_id, "add", serde_json::json!({"a": 1}));
        store.create_task(row).await.unwrap();

        store
            .update_task(task_id, TaskPatch::started(Utc::now()))
            .await
            .unwrap();
        let mid = store.get_task(task_id).await.unwrap();
        assert_eq!(mid.status, TaskStatus::Running);

        store
            .update_task(
                task_id,
                TaskPatch::terminal(
                    TaskStatus::Success,
                    Some(serde_json::json!({"sum": 2})),
                    None,
                    Some("container-1".into()),
                    1.5,
                    Utc::now(),
                ),
            )
            .await
            .unwrap();
        let done = store.get_task(task_id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Success);
        assert_eq!(done.outputs, Some(serde_json::json!({"sum": 2})));
    }

    #[tokio::test]
    async fn workflow_execution_round_trips() {
        let store = store().await;
        let execution_id = uuid::Uuid::new_v4();
        store
            .create_workflow_execution(WorkflowExecution::new_running(execution_id, "wf-1"))
            .await
            .unwrap();

        let mut results = HashMap::new();
        results.insert(
            "step1".to_string(),
            StepOutcome {
                status: wishub_core::workflow::StepStatus::Success,
                outputs: Some(serde_json::json!({"ok": true})),
                error: None,
                container_id: Some("c1".into()),
                started_at: Utc::now(),
                completed_at: Utc::now(),
            },
        );

        store
            .update_workflow_execution(
                execution_id,
                WorkflowExecutionPatch {
                    status: Some(WorkflowStatus::Success),
                    results: Some(results),
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let loaded = store.get_workflow_execution(execution_id).await.unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Success);
        assert!(loaded.results.contains_key("step1"));
    }
}
