//! The Docker-backed `SandboxRunner`: one sandboxed invocation per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;
use wishub_core::traits::{RunResult, SandboxRunner};
use wishub_core::Language;

use crate::engine::{ContainerEngine, MountSpec, RunSpec, WaitOutcome};
use crate::entrypoint::entrypoint_for;

const CONTAINER_WORKDIR: &str = "/workspace";
const MEMORY_LIMIT_BYTES: i64 = 512 * 1024 * 1024;
const CPU_SHARES: i64 = 512;

/// Sandboxes a skill invocation in a freshly created, network-disabled
/// container, mounting a scratch workspace containing the skill source and
/// its inputs.
///
/// Isolation policy (not configurable per-call, per the platform's "required,
/// not negotiable" stance on container isolation):
/// - 512 MiB memory ceiling, CPU share weight 512/1024
/// - network disabled
/// - read-only root filesystem except the mounted scratch workspace
/// - container named `skill_<skill_id>_<short_uuid>`
/// - `WISHUB_SKILL=true` marks the process as platform-managed
pub struct DockerSandboxRunner<E: ContainerEngine> {
    engine: Arc<E>,
    scratch_root: std::path::PathBuf,
}

impl<E: ContainerEngine> DockerSandboxRunner<E> {
    pub fn new(engine: Arc<E>, scratch_root: std::path::PathBuf) -> Self {
        DockerSandboxRunner {
            engine,
            scratch_root,
        }
    }

    fn container_name(skill_id: &str) -> String {
        let short = Uuid::new_v4().simple().to_string();
        format!("skill_{skill_id}_{}", &short[..8])
    }

    /// Take the last non-empty stdout line as the skill's JSON result.
    fn parse_result(stdout: &str) -> Result<serde_json::Value, String> {
        let last_line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| "skill produced no stdout output".to_string())?;
        serde_json::from_str(last_line)
            .map_err(|e| format!("final stdout line was not valid JSON: {e}"))
    }
}

#[async_trait]
impl<E: ContainerEngine> SandboxRunner for DockerSandboxRunner<E> {
    async fn execute(
        &self,
        skill_id: &str,
        language: Language,
        code: &[u8],
        inputs: &serde_json::Value,
        timeout_seconds: u32,
    ) -> RunResult {
        let entrypoint = entrypoint_for(language);
        let task_dir = self.scratch_root.join(Uuid::new_v4().to_string());

        if let Err(e) = std::fs::create_dir_all(&task_dir) {
            return RunResult::Error {
                message: format!("failed to create scratch workspace: {e}"),
                container_id: None,
            };
        }
        if let Err(e) = std::fs::write(task_dir.join(entrypoint.file_name), code) {
            return RunResult::Error {
                message: format!("failed to write skill source: {e}"),
                container_id: None,
            };
        }
        let inputs_json = serde_json::to_vec_pretty(inputs).unwrap_or_else(|_| b"{}".to_vec());
        if let Err(e) = std::fs::write(task_dir.join("inputs.json"), inputs_json) {
            return RunResult::Error {
                message: format!("failed to write inputs: {e}"),
                container_id: None,
            };
        }

        let mut env = HashMap::new();
        env.insert("WISHUB_SKILL".to_string(), "true".to_string());

        let name = Self::container_name(skill_id);
        let spec = RunSpec {
            name: name.clone(),
            image: entrypoint.image.to_string(),
            command: entrypoint.command.iter().map(|s| s.to_string()).collect(),
            working_dir: CONTAINER_WORKDIR.to_string(),
            mounts: vec![MountSpec {
                host_path: task_dir.to_string_lossy().to_string(),
                container_path: CONTAINER_WORKDIR.to_string(),
                read_only: false,
            }],
            env,
            memory_bytes: MEMORY_LIMIT_BYTES,
            cpu_shares: CPU_SHARES,
            network_disabled: true,
        };

        info!(skill_id, container = %name, "starting sandboxed execution");
        let container_id = match self.engine.create_and_start(spec).await {
            Ok(id) => id,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&task_dir);
                return RunResult::Error {
                    message: format!("failed to start container: {e}"),
                    container_id: None,
                };
            }
        };

        let deadline = Duration::from_secs(timeout_seconds as u64);
        let started = Instant::now();
        let outcome = self.engine.wait(&container_id, deadline).await;
        let elapsed = started.elapsed();

        let result = match outcome {
            WaitOutcome::TimedOut => {
                warn!(
                    container = %container_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "sandbox timed out, killing container"
                );
                self.engine.kill(&container_id).await;
                RunResult::Timeout {
                    container_id: container_id.clone(),
                }
            }
            WaitOutcome::Exited { exit_code } => {
                let logs = self.engine.logs(&container_id).await;
                match exit_code {
                    Some(0) => match Self::parse_result(&logs.stdout) {
                        Ok(outputs) => RunResult::Success {
                            outputs,
                            container_id: container_id.clone(),
                        },
                        Err(message) => RunResult::Error {
                            message,
                            container_id: Some(container_id.clone()),
                        },
                    },
                    other => RunResult::Error {
                        message: format!(
                            "skill exited with code {other:?}: {}",
                            logs.stderr.trim()
                        ),
                        container_id: Some(container_id.clone()),
                    },
                }
            }
        };

        self.engine.remove(&container_id).await;
        let _ = std::fs::remove_dir_all(&task_dir);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeEngine {
        removed: AtomicUsize,
        killed: AtomicUsize,
        behavior: Mutex<FakeBehavior>,
    }

    enum FakeBehavior {
        Success(String),
        Timeout,
        NonZeroExit(i32, String),
        CreateFails,
    }

    impl FakeEngine {
        fn new(behavior: FakeBehavior) -> Self {
            FakeEngine {
                removed: AtomicUsize::new(0),
                killed: AtomicUsize::new(0),
                behavior: Mutex::new(behavior),
            }
        }
    }

    #[async_trait]
    impl ContainerEngine for FakeEngine {
        async fn create_and_start(
            &self,
            spec: RunSpec,
        ) -> Result<String, crate::engine::EngineError> {
            assert!(spec.network_disabled);
            assert_eq!(spec.memory_bytes, MEMORY_LIMIT_BYTES);
            assert_eq!(spec.cpu_shares, CPU_SHARES);
            if matches!(&*self.behavior.lock().unwrap(), FakeBehavior::CreateFails) {
                return Err(crate::engine::EngineError::Create("daemon unreachable".into()));
            }
            Ok(spec.name)
        }

        async fn wait(&self, _container_id: &str, _timeout: Duration) -> WaitOutcome {
            match &*self.behavior.lock().unwrap() {
                FakeBehavior::Success(_) => WaitOutcome::Exited {
                    exit_code: Some(0),
                },
                FakeBehavior::Timeout => WaitOutcome::TimedOut,
                FakeBehavior::NonZeroExit(code, _) => WaitOutcome::Exited {
                    exit_code: Some(*code),
                },
                FakeBehavior::CreateFails => unreachable!("wait called after create failed"),
            }
        }

        async fn logs(&self, _container_id: &str) -> crate::engine::Logs {
            match &*self.behavior.lock().unwrap() {
                FakeBehavior::Success(line) => crate::engine::Logs {
                    stdout: line.clone(),
                    stderr: String::new(),
                },
                FakeBehavior::Timeout => crate::engine::Logs {
                    stdout: String::new(),
                    stderr: String::new(),
                },
                FakeBehavior::NonZeroExit(_, stderr) => crate::engine::Logs {
                    stdout: String::new(),
                    stderr: stderr.clone(),
                },
                FakeBehavior::CreateFails => unreachable!("logs called after create failed"),
            }
        }

        async fn kill(&self, _container_id: &str) {
            self.killed.fetch_add(1, Ordering::SeqCst);
        }

        async fn remove(&self, _container_id: &str) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }

        async fn ping(&self) -> bool {
            true
        }
    }

    fn scratch_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("wishub-sandbox-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn successful_run_parses_last_stdout_line() {
        let engine = Arc::new(FakeEngine::new(FakeBehavior::Success(
            "noise\n{\"sum\": 3}".to_string(),
        )));
        let runner = DockerSandboxRunner::new(engine.clone(), scratch_dir());
        let result = runner
            .execute(
                "add",
                Language::Python,
                b"print(1)",
                &serde_json::json!({"a": 1, "b": 2}),
                5,
            )
            .await;
        match result {
            RunResult::Success { outputs, .. } => {
                assert_eq!(outputs, serde_json::json!({"sum": 3}))
            }
            other => panic!("expected success, got {other}"),
        }
        assert_eq!(engine.removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_kills_and_removes_container() {
        let engine = Arc::new(FakeEngine::new(FakeBehavior::Timeout));
        let runner = DockerSandboxRunner::new(engine.clone(), scratch_dir());
        let result = runner
            .execute("slow", Language::Python, b"", &serde_json::json!({}), 1)
            .await;
        assert!(matches!(result, RunResult::Timeout { .. }));
        assert_eq!(engine.killed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_stderr() {
        let engine = Arc::new(FakeEngine::new(FakeBehavior::NonZeroExit(
            1,
            "boom".to_string(),
        )));
        let runner = DockerSandboxRunner::new(engine.clone(), scratch_dir());
        let result = runner
            .execute("broken", Language::Python, b"", &serde_json::json!({}), 5)
            .await;
        match result {
            RunResult::Error { message, .. } => assert!(message.contains("boom")),
            other => panic!("expected error, got {other}"),
        }
        assert_eq!(engine.removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_final_line_is_an_error_not_a_panic() {
        let engine = Arc::new(FakeEngine::new(FakeBehavior::Success("not json".into())));
        let runner = DockerSandboxRunner::new(engine.clone(), scratch_dir());
        let result = runner
            .execute("bad-output", Language::Python, b"", &serde_json::json!({}), 5)
            .await;
        assert!(matches!(result, RunResult::Error { .. }));
        assert_eq!(engine.removed.load(Ordering::SeqCst), 1);
    }

    /// No container is ever created when the daemon rejects the create
    /// call, so there is nothing for `remove` to clean up — the scratch
    /// directory is still removed.
    #[tokio::test]
    async fn container_create_failure_leaks_nothing() {
        let engine = Arc::new(FakeEngine::new(FakeBehavior::CreateFails));
        let dir = scratch_dir();
        let runner = DockerSandboxRunner::new(engine.clone(), dir.clone());
        let result = runner
            .execute("add", Language::Python, b"print(1)", &serde_json::json!({}), 5)
            .await;
        assert!(matches!(result, RunResult::Error { .. }));
        assert_eq!(engine.removed.load(Ordering::SeqCst), 0);
        assert_eq!(engine.killed.load(Ordering::SeqCst), 0);
    }
}
