//! Thin container-engine seam between `DockerSandboxRunner` and `bollard`.
//!
//! Splitting this out lets the runner's workspace/timeout/cleanup logic be
//! unit-tested against a fake engine without a live Docker daemon.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("docker connection failed: {0}")]
    Connect(String),
    #[error("container create failed: {0}")]
    Create(String),
    #[error("container start failed: {0}")]
    Start(String),
    #[error("container inspect failed: {0}")]
    Inspect(String),
}

/// One read-only or read-write bind mount into the container.
pub struct MountSpec {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

/// Everything needed to create and start one skill container.
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub mounts: Vec<MountSpec>,
    pub env: HashMap<String, String>,
    pub memory_bytes: i64,
    pub cpu_shares: i64,
    pub network_disabled: bool,
}

pub struct Logs {
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of waiting on a started container.
pub enum WaitOutcome {
    Exited { exit_code: Option<i32> },
    TimedOut,
}

/// The subset of Docker Engine operations the sandbox runner needs.
///
/// Grounded in `bollard`'s `Docker` client; a production implementation
/// (`BollardEngine`) wraps that client directly, one method per API call.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn create_and_start(&self, spec: RunSpec) -> Result<String, EngineError>;
    async fn wait(&self, container_id: &str, timeout: std::time::Duration) -> WaitOutcome;
    async fn logs(&self, container_id: &str) -> Logs;
    async fn kill(&self, container_id: &str);
    async fn remove(&self, container_id: &str);
    async fn ping(&self) -> bool;
}

/// Default production engine, backed by the local Docker daemon via `bollard`.
pub struct BollardEngine {
    docker: bollard::Docker,
}

impl BollardEngine {
    pub fn connect() -> Result<Self, EngineError> {
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Connect(e.to_string()))?;
        Ok(BollardEngine { docker })
    }
}

#[async_trait]
impl ContainerEngine for BollardEngine {
    async fn create_and_start(&self, spec: RunSpec) -> Result<String, EngineError> {
        use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
        use bollard::models::{HostConfig, Mount, MountTypeEnum};

        let mounts: Vec<Mount> = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.container_path.clone()),
                source: Some(m.host_path.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let network_mode = if spec.network_disabled {
            "none".to_string()
        } else {
            "bridge".to_string()
        };

        let host_config = HostConfig {
            mounts: if mounts.is_empty() { None } else { Some(mounts) },
            network_mode: Some(network_mode),
            nano_cpus: None,
            cpu_shares: Some(spec.cpu_shares),
            memory: Some(spec.memory_bytes),
            readonly_rootfs: Some(true),
            auto_remove: Some(false),
            ..Default::default()
        };

        let env_list: Vec<String> = spec
            .env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        let config = Config::<String> {
            image: Some(spec.image),
            cmd: Some(spec.command),
            working_dir: Some(spec.working_dir),
            env: if env_list.is_empty() {
                None
            } else {
                Some(env_list)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_opts = CreateContainerOptions {
            name: spec.name,
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_opts), config)
            .await
            .map_err(|e| EngineError::Create(e.to_string()))?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::Start(e.to_string()))?;

        Ok(container.id)
    }

    async fn wait(&self, container_id: &str, timeout: std::time::Duration) -> WaitOutcome {
        use bollard::container::WaitContainerOptions;
        use futures::stream::StreamExt;

        let wait_result = tokio::time::timeout(timeout, async {
            let mut stream = self.docker.wait_container(
                container_id,
                Some(WaitContainerOptions {
                    condition: "not-running",
                }),
            );
            stream.next().await
        })
        .await;

        if wait_result.is_err() {
            return WaitOutcome::TimedOut;
        }

        let exit_code = match self.docker.inspect_container(container_id, None).await {
            Ok(inspect) => inspect.state.and_then(|s| s.exit_code).map(|c| c as i32),
            Err(_) => None,
        };
        WaitOutcome::Exited { exit_code }
    }

    async fn logs(&self, container_id: &str) -> Logs {
        use bollard::container::{LogOutput, LogsOptions};
        use futures::stream::StreamExt;

        let mut stdout = String::new();
        let mut stderr = String::new();

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            timestamps: false,
            follow: false,
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_id, Some(options));
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message))
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message))
                }
                _ => {}
            }
        }
        Logs { stdout, stderr }
    }

    async fn kill(&self, container_id: &str) {
        use bollard::container::KillContainerOptions;
        let _ = self
            .docker
            .kill_container(container_id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await;
    }

    async fn remove(&self, container_id: &str) {
        use bollard::container::RemoveContainerOptions;
        let _ = self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
    }

    async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

/// Check whether the local Docker daemon is reachable.
pub async fn is_docker_available() -> bool {
    match BollardEngine::connect() {
        Ok(engine) => engine.ping().await,
        Err(_) => false,
    }
}
