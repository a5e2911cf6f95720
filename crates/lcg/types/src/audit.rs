//! Append-only audit trail model.

use crate::{EntityKind, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audited lifecycle action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Submit,
    Confirm,
    ReturnForChanges,
    NewVersion,
    ForceSubmit,
    ForceConfirm,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Submit => "submit",
            AuditAction::Confirm => "confirm",
            AuditAction::ReturnForChanges => "return_for_changes",
            AuditAction::NewVersion => "new_version",
            AuditAction::ForceSubmit => "force_submit",
            AuditAction::ForceConfirm => "force_confirm",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(AuditAction::Create),
            "submit" => Some(AuditAction::Submit),
            "confirm" => Some(AuditAction::Confirm),
            "return_for_changes" => Some(AuditAction::ReturnForChanges),
            "new_version" => Some(AuditAction::NewVersion),
            "force_submit" => Some(AuditAction::ForceSubmit),
            "force_confirm" => Some(AuditAction::ForceConfirm),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit append payload. Sequence ids are assigned by storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditAppend {
    pub entity_kind: EntityKind,
    pub record_id: RecordId,
    pub version: u32,
    pub action: AuditAction,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

impl AuditAppend {
    pub fn new(
        entity_kind: EntityKind,
        record_id: RecordId,
        version: u32,
        action: AuditAction,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_kind,
            record_id,
            version,
            action,
            actor: actor.into(),
            at,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Persisted audit event; never updated or deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: u64,
    pub entity_kind: EntityKind,
    pub record_id: RecordId,
    pub version: u32,
    pub action: AuditAction,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_roundtrip() {
        for action in [
            AuditAction::Create,
            AuditAction::Submit,
            AuditAction::Confirm,
            AuditAction::ReturnForChanges,
            AuditAction::NewVersion,
            AuditAction::ForceSubmit,
            AuditAction::ForceConfirm,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
    }
}
