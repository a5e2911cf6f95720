//! Pluggable lint rule set.
//!
//! Heuristics over authored content. Everything here is advisory except
//! duplicate options, which block an assessment submit.

use lcg_types::{AssessmentBody, AssessmentClaim, LintFinding, RecordBody, TaskBody};

/// A replaceable set of lint heuristics.
pub trait LintRules: Send + Sync {
    fn lint(&self, body: &RecordBody) -> Vec<LintFinding>;
}

/// The built-in rule set.
pub struct DefaultLintRules;

/// Verbs that bundle several actions behind one vague instruction.
const ABSTRACT_VERBS: [&str; 9] = [
    "edit",
    "configure",
    "set up",
    "setup",
    "manage",
    "ensure",
    "handle",
    "prepare",
    "troubleshoot",
];

/// Verbs that change system state and should be followed by a check.
const STATE_CHANGE_VERBS: [&str; 8] = [
    "install", "mount", "enable", "add", "update", "remove", "create", "delete",
];

/// Words that overstate in answer options.
const ABSOLUTE_TERMS: [&str; 7] = ["always", "never", "all", "none", "only", "every", "guaranteed"];

/// Cues that a stem frames a concrete scenario rather than a recall prompt.
const SCENARIO_CUES: [&str; 7] = [
    "you are", "a user", "an administrator", "scenario", "while", "after", "during",
];

impl LintRules for DefaultLintRules {
    fn lint(&self, body: &RecordBody) -> Vec<LintFinding> {
        match body {
            RecordBody::Task(task) => lint_task(task),
            RecordBody::Workflow(_) => vec![],
            RecordBody::Assessment(assessment) => lint_assessment(assessment),
        }
    }
}

fn lint_task(task: &TaskBody) -> Vec<LintFinding> {
    let mut findings = Vec::new();

    for (index, step) in task.steps.iter().enumerate() {
        let number = index + 1;
        let text = step.text.trim();
        let low = text.to_lowercase();

        if let Some(verb) = ABSTRACT_VERBS
            .iter()
            .find(|verb| starts_with_verb(&low, verb))
        {
            if !has_inline_code(text) && !has_verification_cue(&low) {
                findings.push(LintFinding::warn(
                    "abstract-verb",
                    format!(
                        "step {number}: starts with abstract verb '{verb}'; prefer decomposed \
                         steps with an explicit method and completion check"
                    ),
                ));
            }
        }

        if ["and", "then", "also", "as well as"]
            .iter()
            .any(|conjunction| contains_word(&low, conjunction))
        {
            findings.push(LintFinding::warn(
                "multi-action",
                format!("step {number}: may bundle multiple actions; consider splitting"),
            ));
        }

        if STATE_CHANGE_VERBS
            .iter()
            .any(|verb| starts_with_verb(&low, verb))
            && !has_verification_cue(&low)
            && !has_inline_code(text)
        {
            findings.push(LintFinding::warn(
                "unverified-state-change",
                format!(
                    "step {number}: appears to change state; include an observable \
                     confirmation check or follow with a check step"
                ),
            ));
        }
    }

    findings
}

fn lint_assessment(assessment: &AssessmentBody) -> Vec<LintFinding> {
    let mut findings = Vec::new();

    for option in &assessment.options {
        let low = option.text.to_lowercase();
        if let Some(term) = ABSOLUTE_TERMS.iter().find(|term| contains_word(&low, term)) {
            findings.push(LintFinding::warn(
                "absolute-term",
                format!("option {}: contains absolute term '{term}'", option.key),
            ));
        }
    }

    // Duplicate options make the item unanswerable; this one blocks.
    let normalized: Vec<(String, &lcg_types::AnswerOption)> = assessment
        .options
        .iter()
        .map(|option| (normalize(&option.text), option))
        .collect();
    for (i, (text_a, option_a)) in normalized.iter().enumerate() {
        for (text_b, option_b) in normalized.iter().skip(i + 1) {
            if !text_a.is_empty() && text_a == text_b {
                findings.push(LintFinding::error(
                    "duplicate-option",
                    format!(
                        "options {} and {} have the same text",
                        option_a.key, option_b.key
                    ),
                ));
            }
        }
    }

    let lengths: Vec<usize> = assessment
        .options
        .iter()
        .map(|option| option.text.trim().chars().count())
        .filter(|length| *length > 0)
        .collect();
    if let (Some(&shortest), Some(&longest)) = (lengths.iter().min(), lengths.iter().max()) {
        if longest >= 30 && longest * 2 >= shortest * 5 {
            findings.push(LintFinding::warn(
                "option-length-imbalance",
                format!(
                    "longest option ({longest} chars) dwarfs the shortest ({shortest} chars); \
                     length often telegraphs the answer"
                ),
            ));
        }
    }

    if assessment.claim == AssessmentClaim::ProcedureProxy {
        let low = assessment.stem.to_lowercase();
        if !SCENARIO_CUES.iter().any(|cue| low.contains(cue)) {
            findings.push(LintFinding::warn(
                "scenario-framing",
                "procedure_proxy items should frame a concrete scenario in the stem".to_string(),
            ));
        }
    }

    findings
}

fn starts_with_verb(low: &str, verb: &str) -> bool {
    low == verb || low.starts_with(&format!("{verb} "))
}

fn has_inline_code(text: &str) -> bool {
    text.matches('`').count() >= 2
}

fn has_verification_cue(low: &str) -> bool {
    ["confirm", "verify", "check"]
        .iter()
        .any(|cue| contains_word(low, cue))
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcg_types::{AnswerOption, AssessmentRef, LintLevel, OptionKey, RecordBody, RefKind, Step};

    fn task_with_steps(steps: Vec<Step>) -> RecordBody {
        RecordBody::Task(TaskBody {
            title: "t".to_string(),
            outcome: "o".to_string(),
            facts: vec![],
            concepts: vec![],
            procedure_name: "p".to_string(),
            steps,
            dependencies: vec![],
            irreversible_flag: false,
            domain: "linux".to_string(),
            assets: vec![],
        })
    }

    fn assessment(options: Vec<AnswerOption>, claim: AssessmentClaim, stem: &str) -> RecordBody {
        RecordBody::Assessment(AssessmentBody {
            stem: stem.to_string(),
            options,
            correct_key: OptionKey::A,
            rationale: "r".to_string(),
            claim,
            refs: vec![AssessmentRef {
                kind: RefKind::Task,
                record_id: lcg_types::RecordId::new("t-1"),
                version: 1,
            }],
        })
    }

    #[test]
    fn abstract_verb_without_check_warns() {
        let body = task_with_steps(vec![Step::new("Configure the firewall", "It runs")]);
        let findings = DefaultLintRules.lint(&body);
        assert!(findings.iter().any(|f| f.code == "abstract-verb"));
    }

    #[test]
    fn abstract_verb_with_inline_code_passes() {
        let body = task_with_steps(vec![Step::new(
            "Configure the firewall with `ufw allow 22`",
            "Port 22 listed in `ufw status`",
        )]);
        let findings = DefaultLintRules.lint(&body);
        assert!(!findings.iter().any(|f| f.code == "abstract-verb"));
    }

    #[test]
    fn conjunction_warns_about_bundled_actions() {
        let body = task_with_steps(vec![Step::new(
            "Stop the service and delete the unit file",
            "Unit is gone",
        )]);
        let findings = DefaultLintRules.lint(&body);
        assert!(findings.iter().any(|f| f.code == "multi-action"));
    }

    #[test]
    fn state_change_without_verification_warns() {
        let body = task_with_steps(vec![Step::new("Install the package", "Done")]);
        let findings = DefaultLintRules.lint(&body);
        assert!(findings.iter().any(|f| f.code == "unverified-state-change"));
    }

    #[test]
    fn duplicate_options_are_error_level() {
        let body = assessment(
            vec![
                AnswerOption::new(OptionKey::A, "The kernel"),
                AnswerOption::new(OptionKey::B, "the  kernel"),
                AnswerOption::new(OptionKey::C, "The shell"),
                AnswerOption::new(OptionKey::D, "The loader"),
            ],
            AssessmentClaim::Fact,
            "What loads first?",
        );
        let findings = DefaultLintRules.lint(&body);
        let duplicate = findings
            .iter()
            .find(|f| f.code == "duplicate-option")
            .expect("duplicate finding");
        assert_eq!(duplicate.level, LintLevel::Error);
    }

    #[test]
    fn absolute_terms_warn_only() {
        let body = assessment(
            vec![
                AnswerOption::new(OptionKey::A, "It always fails"),
                AnswerOption::new(OptionKey::B, "It may fail"),
                AnswerOption::new(OptionKey::C, "It can be retried"),
                AnswerOption::new(OptionKey::D, "It logs a warning"),
            ],
            AssessmentClaim::Fact,
            "What happens on timeout?",
        );
        let findings = DefaultLintRules.lint(&body);
        let absolute = findings.iter().find(|f| f.code == "absolute-term").unwrap();
        assert_eq!(absolute.level, LintLevel::Warn);
    }

    #[test]
    fn procedure_proxy_wants_scenario_framing() {
        let body = assessment(
            vec![
                AnswerOption::new(OptionKey::A, "mount -a"),
                AnswerOption::new(OptionKey::B, "umount /data"),
                AnswerOption::new(OptionKey::C, "mkfs.ext4"),
                AnswerOption::new(OptionKey::D, "fsck"),
            ],
            AssessmentClaim::ProcedureProxy,
            "Which command mounts everything?",
        );
        let findings = DefaultLintRules.lint(&body);
        assert!(findings.iter().any(|f| f.code == "scenario-framing"));

        let framed = assessment(
            vec![
                AnswerOption::new(OptionKey::A, "mount -a"),
                AnswerOption::new(OptionKey::B, "umount /data"),
                AnswerOption::new(OptionKey::C, "mkfs.ext4"),
                AnswerOption::new(OptionKey::D, "fsck"),
            ],
            AssessmentClaim::ProcedureProxy,
            "You are an administrator adding a volume to fstab. Which command applies it?",
        );
        let findings = DefaultLintRules.lint(&framed);
        assert!(!findings.iter().any(|f| f.code == "scenario-framing"));
    }
}
