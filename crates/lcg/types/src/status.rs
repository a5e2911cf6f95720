//! Lifecycle status and derived readiness classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one record version.
///
/// `deprecated` has no outgoing transitions; a record moves past it only by
/// spawning a new draft version of the same `record_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Draft,
    Submitted,
    Returned,
    Confirmed,
    Deprecated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Submitted => "submitted",
            Status::Returned => "returned",
            Status::Confirmed => "confirmed",
            Status::Deprecated => "deprecated",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Status::Draft),
            "submitted" => Some(Status::Submitted),
            "returned" => Some(Status::Returned),
            "confirmed" => Some(Status::Confirmed),
            "deprecated" => Some(Status::Deprecated),
            _ => None,
        }
    }

    /// Terminal for in-place edits: content of a version never changes, and
    /// a deprecated or confirmed version cannot be re-submitted directly.
    pub fn accepts_force_submit(&self) -> bool {
        !matches!(self, Status::Deprecated | Status::Confirmed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived classification of a workflow's referenced task versions.
///
/// Never cached: referenced task statuses are mutable, so callers recompute
/// on every decision point (submit, confirm, export).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    AwaitingTaskConfirmation,
    Invalid,
}

impl Readiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Ready => "ready",
            Readiness::AwaitingTaskConfirmation => "awaiting_task_confirmation",
            Readiness::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            Status::Draft,
            Status::Submitted,
            Status::Returned,
            Status::Confirmed,
            Status::Deprecated,
        ] {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert_eq!(Status::parse("archived"), None);
    }

    #[test]
    fn force_submit_sources() {
        assert!(Status::Draft.accepts_force_submit());
        assert!(Status::Returned.accepts_force_submit());
        assert!(Status::Submitted.accepts_force_submit());
        assert!(!Status::Confirmed.accepts_force_submit());
        assert!(!Status::Deprecated.accepts_force_submit());
    }
}
