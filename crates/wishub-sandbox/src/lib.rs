//! Docker-backed sandbox for skill execution.
//!
//! This crate supplies the production `SandboxRunner` implementation:
//! each invocation gets a fresh, network-disabled container with a
//! read-only root filesystem and a single scratch-workspace mount.

pub mod engine;
pub mod entrypoint;
pub mod runner;

pub use engine::{is_docker_available, BollardEngine, ContainerEngine, EngineError};
pub use entrypoint::{entrypoint_for, LanguageEntrypoint};
pub use runner::DockerSandboxRunner;
