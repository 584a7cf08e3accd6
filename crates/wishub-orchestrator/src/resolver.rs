//! `{{step_id.field}}` placeholder substitution from prior step outputs.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use wishub_core::workflow::{StepOutcome, StepStatus};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\.(\w+)\}\}").unwrap())
}

/// Resolves `{{step_id.field}}` references against successful prior steps.
///
/// A single pass: references inside a resolved value are never re-resolved.
/// References to a step that hasn't completed, didn't succeed, or doesn't
/// expose the named field are left untouched in the string.
pub struct ReferenceResolver;

impl ReferenceResolver {
    pub fn resolve(
        inputs: &serde_json::Value,
        results: &HashMap<String, StepOutcome>,
    ) -> serde_json::Value {
        match inputs {
            serde_json::Value::String(s) => {
                serde_json::Value::String(Self::resolve_string(s, results))
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(
                items.iter().map(|v| Self::resolve(v, results)).collect(),
            ),
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::resolve(v, results)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn resolve_string(value: &str, results: &HashMap<String, StepOutcome>) -> String {
        placeholder_re()
            .replace_all(value, |caps: &regex::Captures| {
                let step_id = &caps[1];
                let field = &caps[2];
                match results.get(step_id) {
                    Some(outcome) if outcome.status == StepStatus::Success => outcome
                        .outputs
                        .as_ref()
                        .and_then(|o| o.get(field))
                        .map(value_as_replacement)
                        .unwrap_or_else(|| caps[0].to_string()),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn value_as_replacement(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
