//! Workflow composition resolver.
//!
//! Readiness and derived domains depend on the mutable status of other
//! entities, so both are recomputed on every call and never cached.

use crate::{EngineError, EngineResult};
use lcg_store::GovernanceStore;
use lcg_types::{EntityKind, Readiness, RecordBody, RefKind, Status, TaskRef};
use std::collections::BTreeSet;

/// Classify a workflow's pinned task references.
///
/// Empty refs, a missing reference, or a deprecated reference make the
/// workflow `invalid` (returning on the first such reference); any reference
/// that is not yet confirmed leaves it `awaiting_task_confirmation`.
pub async fn compute_readiness(
    store: &dyn GovernanceStore,
    refs: &[TaskRef],
) -> EngineResult<Readiness> {
    if refs.is_empty() {
        return Ok(Readiness::Invalid);
    }

    let mut awaiting = false;
    for reference in refs {
        match store.task_ref_state(reference).await? {
            None => return Ok(Readiness::Invalid),
            Some(state) => {
                if state.status == Status::Deprecated {
                    return Ok(Readiness::Invalid);
                }
                if state.status != Status::Confirmed {
                    awaiting = true;
                }
            }
        }
    }

    Ok(if awaiting {
        Readiness::AwaitingTaskConfirmation
    } else {
        Readiness::Ready
    })
}

/// Derive the sorted domain set of a record body.
///
/// Tasks carry their own single domain; workflows union the domains of the
/// exact task versions they pin; assessments union over their refs, going
/// through a referenced workflow's own derivation.
pub async fn derive_domains(
    store: &dyn GovernanceStore,
    body: &RecordBody,
) -> EngineResult<BTreeSet<String>> {
    let mut domains = BTreeSet::new();
    match body {
        RecordBody::Task(task) => {
            let domain = task.domain.trim();
            if !domain.is_empty() {
                domains.insert(domain.to_string());
            }
        }
        RecordBody::Workflow(workflow) => {
            collect_task_ref_domains(store, &workflow.task_refs, &mut domains).await?;
        }
        RecordBody::Assessment(assessment) => {
            for reference in &assessment.refs {
                match reference.kind {
                    RefKind::Task => {
                        let task_ref = TaskRef {
                            task_record_id: reference.record_id.clone(),
                            task_version: reference.version,
                        };
                        collect_task_ref_domains(
                            store,
                            std::slice::from_ref(&task_ref),
                            &mut domains,
                        )
                        .await?;
                    }
                    RefKind::Workflow => {
                        let workflow = store
                            .get_record(EntityKind::Workflow, &reference.record_id, reference.version)
                            .await?
                            .ok_or_else(|| {
                                EngineError::Conflict(format!(
                                    "assessment references missing workflow {}@{}",
                                    reference.record_id, reference.version
                                ))
                            })?;
                        let body = workflow.body.as_workflow().ok_or_else(|| {
                            EngineError::Internal("workflow row with non-workflow body".to_string())
                        })?;
                        collect_task_ref_domains(store, &body.task_refs, &mut domains).await?;
                    }
                }
            }
        }
    }
    Ok(domains)
}

async fn collect_task_ref_domains(
    store: &dyn GovernanceStore,
    refs: &[TaskRef],
    domains: &mut BTreeSet<String>,
) -> EngineResult<()> {
    for reference in refs {
        let state = store.task_ref_state(reference).await?.ok_or_else(|| {
            EngineError::Conflict(format!("missing task reference {reference}"))
        })?;
        let domain = state.domain.trim();
        if !domain.is_empty() {
            domains.insert(domain.to_string());
        }
    }
    Ok(())
}
