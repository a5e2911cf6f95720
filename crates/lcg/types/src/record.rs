//! Versioned record model: metadata shared by all entity kinds plus the
//! kind-specific content bodies.

use crate::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier shared by all versions of a logical record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three governed entity kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Workflow,
    Assessment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Task => "task",
            EntityKind::Workflow => "workflow",
            EntityKind::Assessment => "assessment",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "task" => Some(EntityKind::Task),
            "workflow" => Some(EntityKind::Workflow),
            "assessment" => Some(EntityKind::Assessment),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle metadata of one record version.
///
/// The only fields ever mutated in place after insert are `status`,
/// `updated_at/by`, and `reviewed_at/by`; everything else is frozen with the
/// version row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub record_id: RecordId,
    pub version: u32,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    /// Required when creating version N > 1.
    pub change_note: Option<String>,
    pub needs_review_flag: bool,
    pub needs_review_note: Option<String>,
}

/// One ordered procedure step of a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    pub completion: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Step {
    pub fn new(text: impl Into<String>, completion: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completion: completion.into(),
            actions: vec![],
        }
    }
}

/// Source-traceability link attached to a task (ingestion provenance).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAsset {
    pub url: String,
    pub kind: String,
    pub label: String,
}

/// Content body of a Task version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskBody {
    pub title: String,
    pub outcome: String,
    pub facts: Vec<String>,
    pub concepts: Vec<String>,
    pub procedure_name: String,
    pub steps: Vec<Step>,
    pub dependencies: Vec<String>,
    pub irreversible_flag: bool,
    /// Governance scope; must be set and non-empty before submit.
    pub domain: String,
    #[serde(default)]
    pub assets: Vec<TaskAsset>,
}

/// Pinned reference to one exact task version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef {
    pub task_record_id: RecordId,
    pub task_version: u32,
}

impl TaskRef {
    pub fn new(record_id: impl Into<String>, version: u32) -> Self {
        Self {
            task_record_id: RecordId::new(record_id),
            task_version: version,
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.task_record_id, self.task_version)
    }
}

/// Content body of a Workflow version. Domains are derived from the
/// referenced task versions, never authored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBody {
    pub title: String,
    pub objective: String,
    pub task_refs: Vec<TaskRef>,
}

/// Multiple-choice option key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
}

impl OptionKey {
    pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::A => "A",
            OptionKey::B => "B",
            OptionKey::C => "C",
            OptionKey::D => "D",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "A" => Some(OptionKey::A),
            "B" => Some(OptionKey::B),
            "C" => Some(OptionKey::C),
            "D" => Some(OptionKey::D),
            _ => None,
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One keyed answer option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub key: OptionKey,
    pub text: String,
}

impl AnswerOption {
    pub fn new(key: OptionKey, text: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
        }
    }
}

/// What an assessment item claims to measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentClaim {
    Fact,
    Concept,
    ProcedureProxy,
}

impl AssessmentClaim {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentClaim::Fact => "fact",
            AssessmentClaim::Concept => "concept",
            AssessmentClaim::ProcedureProxy => "procedure_proxy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fact" => Some(AssessmentClaim::Fact),
            "concept" => Some(AssessmentClaim::Concept),
            "procedure_proxy" => Some(AssessmentClaim::ProcedureProxy),
            _ => None,
        }
    }
}

/// Kind of record an assessment references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Task,
    Workflow,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::Task => "task",
            RefKind::Workflow => "workflow",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "task" => Some(RefKind::Task),
            "workflow" => Some(RefKind::Workflow),
            _ => None,
        }
    }
}

/// Pinned reference from an assessment to a task or workflow version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssessmentRef {
    pub kind: RefKind,
    pub record_id: RecordId,
    pub version: u32,
}

/// Content body of an Assessment version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssessmentBody {
    pub stem: String,
    pub options: Vec<AnswerOption>,
    pub correct_key: OptionKey,
    pub rationale: String,
    pub claim: AssessmentClaim,
    pub refs: Vec<AssessmentRef>,
}

/// Kind-specific content of one record version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    Task(TaskBody),
    Workflow(WorkflowBody),
    Assessment(AssessmentBody),
}

impl RecordBody {
    pub fn kind(&self) -> EntityKind {
        match self {
            RecordBody::Task(_) => EntityKind::Task,
            RecordBody::Workflow(_) => EntityKind::Workflow,
            RecordBody::Assessment(_) => EntityKind::Assessment,
        }
    }

    /// Human-readable label used in listings and audit summaries.
    pub fn title(&self) -> &str {
        match self {
            RecordBody::Task(task) => &task.title,
            RecordBody::Workflow(workflow) => &workflow.title,
            RecordBody::Assessment(assessment) => &assessment.stem,
        }
    }

    pub fn as_task(&self) -> Option<&TaskBody> {
        match self {
            RecordBody::Task(task) => Some(task),
            _ => None,
        }
    }

    pub fn as_workflow(&self) -> Option<&WorkflowBody> {
        match self {
            RecordBody::Workflow(workflow) => Some(workflow),
            _ => None,
        }
    }

    pub fn as_assessment(&self) -> Option<&AssessmentBody> {
        match self {
            RecordBody::Assessment(assessment) => Some(assessment),
            _ => None,
        }
    }
}

/// One immutable version of a governed record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub meta: RecordMeta,
    pub body: RecordBody,
}

impl VersionedRecord {
    pub fn kind(&self) -> EntityKind {
        self.body.kind()
    }
}

/// Latest-version listing row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub record_id: RecordId,
    pub latest_version: u32,
    pub title: String,
    pub status: Status,
    pub needs_review_flag: bool,
    /// A newer draft/submitted version exists above a confirmed one.
    pub update_pending_confirmation: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_kind_and_title() {
        let body = RecordBody::Workflow(WorkflowBody {
            title: "Provision a mail host".to_string(),
            objective: "Stand up postfix end to end".to_string(),
            task_refs: vec![TaskRef::new("t-1", 1)],
        });
        assert_eq!(body.kind(), EntityKind::Workflow);
        assert_eq!(body.title(), "Provision a mail host");
        assert!(body.as_workflow().is_some());
        assert!(body.as_task().is_none());
    }

    #[test]
    fn option_key_roundtrip() {
        for key in OptionKey::ALL {
            assert_eq!(OptionKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(OptionKey::parse("E"), None);
    }

    #[test]
    fn task_ref_display() {
        assert_eq!(TaskRef::new("abc", 3).to_string(), "abc@3");
    }
}
