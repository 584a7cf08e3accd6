//! Dependency-graph validation: cycle detection and layering for hybrid
//! scheduling.

use std::collections::{HashMap, HashSet};
use thiserror::Error;
use wishub_core::workflow::WorkflowStep;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("workflow must contain at least one step")]
    Empty,
    #[error("cyclic dependency detected")]
    Cycle,
    #[error("step '{0}' depends on unknown step '{1}'")]
    UnknownDependency(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates a workflow's step graph and computes execution layers.
pub struct GraphValidator;

impl GraphValidator {
    /// Check the step list for unknown dependencies and cycles.
    ///
    /// Uses an explicit stack rather than recursion so pathologically deep
    /// or adversarial dependency chains can't blow the call stack.
    pub fn validate(steps: &[WorkflowStep]) -> Result<(), GraphError> {
        if steps.is_empty() {
            return Err(GraphError::Empty);
        }

        let ids: HashSet<&str> = steps.iter().map(|s| s.step_id.as_str()).collect();
        for step in steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(GraphError::UnknownDependency(
                        step.step_id.clone(),
                        dep.clone(),
                    ));
                }
            }
        }

        let graph: HashMap<&str, &[String]> = steps
            .iter()
            .map(|s| (s.step_id.as_str(), s.depends_on.as_slice()))
            .collect();

        let mut color: HashMap<&str, Color> =
            steps.iter().map(|s| (s.step_id.as_str(), Color::White)).collect();

        for start in steps.iter().map(|s| s.step_id.as_str()) {
            if color[start] != Color::White {
                continue;
            }

            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            color.insert(start, Color::Gray);

            while let Some((node, idx)) = stack.pop() {
                let deps = graph[node];
                if idx < deps.len() {
                    stack.push((node, idx + 1));
                    let dep = deps[idx].as_str();
                    match color.get(dep) {
                        Some(Color::Gray) => return Err(GraphError::Cycle),
                        Some(Color::White) => {
                            color.insert(dep, Color::Gray);
                            stack.push((dep, 0));
                        }
                        _ => {}
                    }
                } else {
                    color.insert(node, Color::Black);
                }
            }
        }

        Ok(())
    }

    /// Kahn-style layering: each layer is a set of steps whose dependencies
    /// are all satisfied by prior layers. Used by hybrid-mode scheduling to
    /// run each layer's steps concurrently.
    pub fn layers<'a>(steps: &'a [WorkflowStep]) -> Vec<Vec<&'a WorkflowStep>> {
        let mut remaining: Vec<&WorkflowStep> = steps.iter().collect();
        let mut completed: HashSet<&str> = HashSet::new();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let (ready, pending): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|s| s.depends_on.iter().all(|d| completed.contains(d.as_str())));

            if ready.is_empty() {
                // validate() should have caught this; fail safe by flushing
                // whatever remains into one last layer rather than looping.
                layers.push(pending);
                break;
            }

            for step in &ready {
                completed.insert(step.step_id.as_str());
            }
            layers.push(ready);
            remaining = pending;
        }

        layers
    }
}
