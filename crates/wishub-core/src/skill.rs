//! Skill metadata: the immutable unit of user-supplied code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ApiError, ErrorCode};

/// Supported skill languages. Each has a pinned base image and bootstrap in
/// `wishub-sandbox`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Typescript,
    Go,
    Java,
    Rust,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Typescript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "typescript" | "ts" => Ok(Language::Typescript),
            "go" | "golang" => Ok(Language::Go),
            "java" => Ok(Language::Java),
            "rust" | "rs" => Ok(Language::Rust),
            other => Err(ApiError::new(
                ErrorCode::Skill999,
                format!("unsupported language: {other}"),
            )),
        }
    }
}

/// An opaque pointer to a code blob, resolved by an `ArtifactStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePointer(pub String);

impl CodePointer {
    pub fn new(skill_id: &str, version: &str) -> Self {
        CodePointer(format!("{skill_id}/{version}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form metadata carried on a skill but never inspected by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub category: Option<String>,
}

/// The catalog-facing view of a skill: everything `SandboxRunner` and
/// `InvocationService` need, and nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMeta {
    pub skill_id: String,
    pub version: String,
    pub language: Language,
    pub code_pointer: CodePointer,
    pub dependencies: Vec<String>,
    pub input_schema: serde_json::Value,
    pub output_schema: Option<serde_json::Value>,
    pub default_timeout_seconds: u32,
    pub info: SkillInfo,
}

impl SkillMeta {
    /// Clamp a caller-supplied timeout to `[1, default_timeout_seconds]`.
    pub fn effective_timeout(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(t) => t.clamp(1, self.default_timeout_seconds),
            None => self.default_timeout_seconds,
        }
    }
}

/// A full skill record as held by the catalog, including registration
/// bookkeeping (`downloads`/`rating` are plain counters, not a ranking
/// surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub meta: SkillMeta,
    pub downloads: u64,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request payload to register a new skill version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRegistration {
    pub skill_id: String,
    pub version: String,
    pub language: Language,
    pub code: Vec<u8>,
    pub dependencies: Vec<String>,
    pub input_schema: serde_json::Value,
    pub output_schema: Option<serde_json::Value>,
    pub default_timeout_seconds: u32,
    pub info: SkillInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(default_timeout: u32) -> SkillMeta {
        SkillMeta {
            skill_id: "add".into(),
            version: "1.0.0".into(),
            language: Language::Python,
            code_pointer: CodePointer::new("add", "1.0.0"),
            dependencies: vec![],
            input_schema: serde_json::json!({}),
            output_schema: None,
            default_timeout_seconds: default_timeout,
            info: SkillInfo::default(),
        }
    }

    #[test]
    fn effective_timeout_clamps_to_default() {
        let m = meta(5);
        assert_eq!(m.effective_timeout(Some(30)), 5);
        assert_eq!(m.effective_timeout(Some(2)), 2);
        assert_eq!(m.effective_timeout(None), 5);
        assert_eq!(m.effective_timeout(Some(0)), 1);
    }

    #[test]
    fn language_round_trips_through_str() {
        for lang in [
            Language::Python,
            Language::Typescript,
            Language::Go,
            Language::Java,
            Language::Rust,
        ] {
            let parsed: Language = lang.as_str().parse().unwrap();
            assert_eq!(parsed, lang);
        }
    }

    #[test]
    fn unknown_language_is_rejected() {
        assert!("cobol".parse::<Language>().is_err());
    }
}
