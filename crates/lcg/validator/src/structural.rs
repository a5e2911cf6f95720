//! Submit-time structural completeness checks.

use crate::lint::{DefaultLintRules, LintRules};
use lcg_types::{
    AssessmentBody, LintFinding, OptionKey, RecordBody, TaskBody, WorkflowBody,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Structural validation failures; surfaced with field-level detail.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0}")]
    Incomplete(String),

    #[error("lint errors block submit: {0}")]
    LintBlocked(String),
}

/// Runs the structural checks plus the lint rule set before a submit
/// transition. Warnings pass through to the caller; `error`-level findings
/// block.
pub struct ContentValidator {
    rules: Arc<dyn LintRules>,
}

impl ContentValidator {
    pub fn new(rules: Arc<dyn LintRules>) -> Self {
        Self { rules }
    }

    /// Validate a body for submission. Returns the advisory findings on
    /// success.
    pub fn validate_for_submit(&self, body: &RecordBody) -> Result<Vec<LintFinding>, ValidationError> {
        match body {
            RecordBody::Task(task) => validate_task(task)?,
            RecordBody::Workflow(workflow) => validate_workflow(workflow)?,
            RecordBody::Assessment(assessment) => validate_assessment(assessment)?,
        }

        let findings = self.rules.lint(body);
        let blocking: Vec<&LintFinding> = findings.iter().filter(|f| f.is_blocking()).collect();
        if !blocking.is_empty() {
            let summary = blocking
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ValidationError::LintBlocked(summary));
        }
        Ok(findings)
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(Arc::new(DefaultLintRules))
    }
}

fn validate_task(task: &TaskBody) -> Result<(), ValidationError> {
    if task.steps.is_empty() {
        return Err(ValidationError::Incomplete(
            "at least one step is required".to_string(),
        ));
    }
    for (index, step) in task.steps.iter().enumerate() {
        let number = index + 1;
        if step.text.trim().is_empty() {
            return Err(ValidationError::Incomplete(format!(
                "step {number}: step text is required"
            )));
        }
        if step.completion.trim().is_empty() {
            return Err(ValidationError::Incomplete(format!(
                "step {number}: completion text is required"
            )));
        }
    }
    Ok(())
}

fn validate_workflow(workflow: &WorkflowBody) -> Result<(), ValidationError> {
    if workflow.task_refs.is_empty() {
        return Err(ValidationError::Incomplete(
            "workflow must reference at least one task version".to_string(),
        ));
    }
    Ok(())
}

fn validate_assessment(assessment: &AssessmentBody) -> Result<(), ValidationError> {
    if assessment.stem.trim().is_empty() {
        return Err(ValidationError::Incomplete("stem is required".to_string()));
    }
    if assessment.options.len() != 4 {
        return Err(ValidationError::Incomplete(format!(
            "exactly 4 options are required, found {}",
            assessment.options.len()
        )));
    }

    let keys: BTreeSet<OptionKey> = assessment.options.iter().map(|option| option.key).collect();
    if keys.len() != 4 {
        return Err(ValidationError::Incomplete(
            "options must use each key A-D exactly once".to_string(),
        ));
    }

    for option in &assessment.options {
        if option.text.trim().is_empty() {
            return Err(ValidationError::Incomplete(format!(
                "option {}: text is required",
                option.key
            )));
        }
    }

    let texts: BTreeSet<&str> = assessment
        .options
        .iter()
        .map(|option| option.text.trim())
        .collect();
    if texts.len() != 4 {
        return Err(ValidationError::Incomplete(
            "option texts must be distinct".to_string(),
        ));
    }

    if !assessment
        .options
        .iter()
        .any(|option| option.key == assessment.correct_key)
    {
        return Err(ValidationError::Incomplete(format!(
            "correct_key {} does not match any option",
            assessment.correct_key
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcg_types::{AnswerOption, AssessmentClaim, AssessmentRef, RecordId, RefKind, Step, TaskRef};

    fn valid_task() -> RecordBody {
        RecordBody::Task(TaskBody {
            title: "Mount a volume".to_string(),
            outcome: "Volume mounted at boot".to_string(),
            facts: vec![],
            concepts: vec![],
            procedure_name: "Mounting".to_string(),
            steps: vec![Step::new(
                "Append the entry to `/etc/fstab`",
                "Run `mount -a`; verify exit code 0",
            )],
            dependencies: vec![],
            irreversible_flag: false,
            domain: "linux".to_string(),
            assets: vec![],
        })
    }

    fn valid_assessment() -> AssessmentBody {
        AssessmentBody {
            stem: "Which file controls boot-time mounts?".to_string(),
            options: vec![
                AnswerOption::new(OptionKey::A, "/etc/fstab"),
                AnswerOption::new(OptionKey::B, "/etc/mtab"),
                AnswerOption::new(OptionKey::C, "/proc/mounts"),
                AnswerOption::new(OptionKey::D, "/etc/mounts"),
            ],
            correct_key: OptionKey::A,
            rationale: "fstab is consulted at boot".to_string(),
            claim: AssessmentClaim::Fact,
            refs: vec![AssessmentRef {
                kind: RefKind::Task,
                record_id: RecordId::new("t-1"),
                version: 1,
            }],
        }
    }

    #[test]
    fn valid_task_passes_with_no_blocking_findings() {
        let validator = ContentValidator::default();
        let findings = validator.validate_for_submit(&valid_task()).unwrap();
        assert!(findings.iter().all(|f| !f.is_blocking()));
    }

    #[test]
    fn step_without_completion_is_incomplete() {
        let mut body = valid_task();
        if let RecordBody::Task(task) = &mut body {
            task.steps.push(Step::new("Reboot the host", ""));
        }
        let validator = ContentValidator::default();
        let err = validator.validate_for_submit(&body).unwrap_err();
        assert!(err.to_string().contains("step 2"));
        assert!(err.to_string().contains("completion"));
    }

    #[test]
    fn workflow_needs_at_least_one_ref() {
        let body = RecordBody::Workflow(WorkflowBody {
            title: "Empty".to_string(),
            objective: "Nothing".to_string(),
            task_refs: vec![],
        });
        let validator = ContentValidator::default();
        assert!(validator.validate_for_submit(&body).is_err());

        let body = RecordBody::Workflow(WorkflowBody {
            title: "One".to_string(),
            objective: "Something".to_string(),
            task_refs: vec![TaskRef::new("t-1", 1)],
        });
        assert!(validator.validate_for_submit(&body).is_ok());
    }

    #[test]
    fn assessment_requires_four_distinct_options() {
        let validator = ContentValidator::default();

        let mut short = valid_assessment();
        short.options.pop();
        assert!(validator
            .validate_for_submit(&RecordBody::Assessment(short))
            .is_err());

        let mut duplicate_keys = valid_assessment();
        duplicate_keys.options[1].key = OptionKey::A;
        assert!(validator
            .validate_for_submit(&RecordBody::Assessment(duplicate_keys))
            .is_err());

        let mut duplicate_text = valid_assessment();
        duplicate_text.options[1].text = "/etc/fstab".to_string();
        assert!(validator
            .validate_for_submit(&RecordBody::Assessment(duplicate_text))
            .is_err());
    }

    #[test]
    fn error_level_lint_blocks_submit() {
        let mut assessment = valid_assessment();
        // Same text modulo whitespace and case passes the structural
        // distinctness check but trips the duplicate-option lint.
        assessment.options[1].text = "/etc/FSTAB".to_string();
        let validator = ContentValidator::default();
        let err = validator
            .validate_for_submit(&RecordBody::Assessment(assessment))
            .unwrap_err();
        assert!(matches!(err, ValidationError::LintBlocked(_)));
    }

    #[test]
    fn warnings_pass_through() {
        let mut body = valid_task();
        if let RecordBody::Task(task) = &mut body {
            task.steps
                .push(Step::new("Install the package", "Package shows in list"));
        }
        let validator = ContentValidator::default();
        let findings = validator.validate_for_submit(&body).unwrap();
        assert!(findings.iter().any(|f| f.code == "unverified-state-change"));
    }
}
