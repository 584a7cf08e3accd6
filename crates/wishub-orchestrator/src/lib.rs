//! Workflow orchestration: graph validation, reference resolution, skill
//! invocation, and scheduling.

pub mod graph;
pub mod invocation;
pub mod orchestrator;
pub mod resolver;

pub use graph::{GraphError, GraphValidator};
pub use invocation::{InvocationError, InvocationService};
pub use orchestrator::{OrchestrationResult, Orchestrator, OrchestratorError};
pub use resolver::ReferenceResolver;
