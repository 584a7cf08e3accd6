//! Stable error taxonomy shared by every layer of wishub-skill.
//!
//! Codes are part of the wire contract and must not be renumbered; add new
//! variants rather than repurpose old ones.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Skill001,
    Skill002,
    Skill999,
    SkillReg001,
    SkillReg003,
    SkillReg999,
    Workflow002,
    Workflow003,
    Workflow999,
    SkillDisc999,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Skill001 => "SKILL_001",
            ErrorCode::Skill002 => "SKILL_002",
            ErrorCode::Skill999 => "SKILL_999",
            ErrorCode::SkillReg001 => "SKILL_REG_001",
            ErrorCode::SkillReg003 => "SKILL_REG_003",
            ErrorCode::SkillReg999 => "SKILL_REG_999",
            ErrorCode::Workflow002 => "WORKFLOW_002",
            ErrorCode::Workflow003 => "WORKFLOW_003",
            ErrorCode::Workflow999 => "WORKFLOW_999",
            ErrorCode::SkillDisc999 => "SKILL_DISC_999",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User-visible error envelope. `details` is always derived from an error's
/// `Display` text, never its `Debug` representation, so internal stack
/// frames or field dumps never leak to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub details: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, details: impl Into<String>) -> Self {
        ApiError {
            code,
            details: details.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.details)
    }
}

impl std::error::Error for ApiError {}
