//! Lint finding contract shared by the validator and its pluggable rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a lint finding. Only `error` blocks a submit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LintLevel {
    Error,
    Warn,
}

impl LintLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LintLevel::Error => "error",
            LintLevel::Warn => "warn",
        }
    }
}

impl fmt::Display for LintLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One advisory or blocking finding produced by the lint rule set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintFinding {
    pub level: LintLevel,
    pub code: String,
    pub message: String,
}

impl LintFinding {
    pub fn warn(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: LintLevel::Warn,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: LintLevel::Error,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.level == LintLevel::Error
    }
}
