//! LCG Transition Engine.
//!
//! The central component of the governance core: it executes guarded
//! lifecycle transitions, applies their side effects (deprecating a
//! superseded confirmed version), and emits audit events as part of the
//! same store transaction as the state change they describe.
//!
//! Two independent gates guard every transition: the role-action matrix
//! and the domain entitlement authority. The latter applies only to
//! submit/confirm/return, never to create or to reads.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod resolve;
pub mod versioning;

pub use error::{EngineError, EngineResult};

use chrono::Utc;
use lcg_policy::{require_role, EntitlementAuthority};
use lcg_store::{ConfirmRequest, GovernanceStore, QueryWindow, TransitionUpdate};
use lcg_types::{
    Action, Actor, AuditAction, AuditAppend, AuditEvent, ContentAction, Domain, EntityKind,
    LintFinding, Readiness, RecordBody, RecordId, RecordMeta, RecordSummary, Status,
    VersionedRecord,
};
use lcg_validator::{ContentValidator, LintRules};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Draft-creation payload, from manual authoring or ingestion.
///
/// Ingestion-produced drafts set `needs_review_note` so the human review
/// queue can see what the extractor was unsure about.
#[derive(Clone, Debug)]
pub struct DraftRequest {
    pub body: RecordBody,
    pub change_note: Option<String>,
    pub needs_review_note: Option<String>,
}

impl DraftRequest {
    pub fn new(body: RecordBody) -> Self {
        Self {
            body,
            change_note: None,
            needs_review_note: None,
        }
    }

    pub fn with_change_note(mut self, note: impl Into<String>) -> Self {
        self.change_note = Some(note.into());
        self
    }

    pub fn needing_review(mut self, note: impl Into<String>) -> Self {
        self.needs_review_note = Some(note.into());
        self
    }
}

/// Outcome of a submit: the updated record plus advisory lint findings.
#[derive(Clone, Debug)]
pub struct SubmitOutcome {
    pub record: VersionedRecord,
    pub warnings: Vec<LintFinding>,
}

/// The governance engine, bound to one explicit store handle.
pub struct GovernanceEngine {
    store: Arc<dyn GovernanceStore>,
    authority: EntitlementAuthority,
    validator: ContentValidator,
}

impl GovernanceEngine {
    pub fn new(store: Arc<dyn GovernanceStore>) -> Self {
        Self {
            authority: EntitlementAuthority::new(store.clone()),
            validator: ContentValidator::default(),
            store,
        }
    }

    /// Swap in a different lint rule set (the rules are a pluggable
    /// collaborator).
    pub fn with_lint_rules(store: Arc<dyn GovernanceStore>, rules: Arc<dyn LintRules>) -> Self {
        Self {
            authority: EntitlementAuthority::new(store.clone()),
            validator: ContentValidator::new(rules),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn GovernanceStore> {
        &self.store
    }

    // ============ Authoring ============

    /// Create version 1 of a new record, status `draft`.
    pub async fn create_draft(
        &self,
        actor: &Actor,
        request: DraftRequest,
    ) -> EngineResult<VersionedRecord> {
        let kind = request.body.kind();
        require_role(actor.role, Action::Content(kind, ContentAction::Create))?;

        let now = Utc::now();
        let record = VersionedRecord {
            meta: RecordMeta {
                record_id: RecordId::generate(),
                version: 1,
                status: Status::Draft,
                created_at: now,
                updated_at: now,
                created_by: actor.username.clone(),
                updated_by: actor.username.clone(),
                reviewed_at: None,
                reviewed_by: None,
                change_note: request.change_note,
                needs_review_flag: request.needs_review_note.is_some(),
                needs_review_note: request.needs_review_note,
            },
            body: request.body,
        };

        let audit = AuditAppend::new(
            kind,
            record.meta.record_id.clone(),
            1,
            AuditAction::Create,
            actor.username.clone(),
            now,
        );
        self.store.insert_version(&record, audit).await?;
        tracing::info!(
            kind = %kind,
            record_id = %record.meta.record_id,
            actor = %actor.username,
            "created draft"
        );
        Ok(record)
    }

    /// Spawn a new draft version from any existing version.
    ///
    /// The source row is untouched; the new version gets `max(existing)+1`
    /// and always starts at `draft`. A non-empty change note is required;
    /// when the source version was `returned`, the note is chained to the
    /// most recent return's author and timestamp.
    pub async fn revise_to_new_version(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        source_version: u32,
        new_body: Option<RecordBody>,
        change_note: &str,
    ) -> EngineResult<VersionedRecord> {
        require_role(actor.role, Action::Content(kind, ContentAction::Revise))?;

        let note = change_note.trim();
        if note.is_empty() {
            return Err(EngineError::Validation(
                "change_note is required when creating a new version".to_string(),
            ));
        }

        let source = self.load(kind, record_id, source_version).await?;
        if let Some(body) = &new_body {
            if body.kind() != kind {
                return Err(EngineError::Validation(format!(
                    "body kind {} does not match record kind {kind}",
                    body.kind()
                )));
            }
        }

        let note = if source.meta.status == Status::Returned {
            let events = self.store.list_audit_for_record(kind, record_id).await?;
            versioning::chain_to_return(&events, note)
        } else {
            note.to_string()
        };

        let version = versioning::next_version(self.store.as_ref(), kind, record_id).await?;
        let now = Utc::now();
        let record = VersionedRecord {
            meta: RecordMeta {
                record_id: record_id.clone(),
                version,
                status: Status::Draft,
                created_at: now,
                updated_at: now,
                created_by: actor.username.clone(),
                updated_by: actor.username.clone(),
                reviewed_at: None,
                reviewed_by: None,
                change_note: Some(note.clone()),
                needs_review_flag: source.meta.needs_review_flag,
                needs_review_note: source.meta.needs_review_note.clone(),
            },
            body: new_body.unwrap_or(source.body),
        };

        let audit = AuditAppend::new(
            kind,
            record_id.clone(),
            version,
            AuditAction::NewVersion,
            actor.username.clone(),
            now,
        )
        .with_note(format!("from v{source_version}: {note}"));
        self.store.insert_version(&record, audit).await?;
        tracing::info!(
            kind = %kind,
            record_id = %record_id,
            version,
            actor = %actor.username,
            "created new version"
        );
        Ok(record)
    }

    // ============ Review lifecycle ============

    /// `draft` -> `submitted`, gated on role, structural validation, a
    /// non-empty domain set, and entitlement to every derived domain.
    pub async fn submit(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<SubmitOutcome> {
        require_role(actor.role, Action::Content(kind, ContentAction::Submit))?;
        self.submit_inner(actor, kind, record_id, version, vec![Status::Draft], false)
            .await
    }

    /// Admin bypass of the role and entitlement gates; structural and state
    /// guards still apply. Accepts any source status except `deprecated`
    /// and `confirmed`.
    pub async fn force_submit(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<SubmitOutcome> {
        require_role(actor.role, Action::Content(kind, ContentAction::ForceSubmit))?;
        self.submit_inner(
            actor,
            kind,
            record_id,
            version,
            vec![Status::Draft, Status::Submitted, Status::Returned],
            true,
        )
        .await
    }

    async fn submit_inner(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
        expected_from: Vec<Status>,
        force: bool,
    ) -> EngineResult<SubmitOutcome> {
        let record = self.load(kind, record_id, version).await?;
        let warnings = self.validator.validate_for_submit(&record.body)?;

        if let RecordBody::Workflow(workflow) = &record.body {
            let readiness =
                resolve::compute_readiness(self.store.as_ref(), &workflow.task_refs).await?;
            if readiness == Readiness::Invalid {
                return Err(EngineError::Conflict(
                    "workflow contains missing or deprecated task references".to_string(),
                ));
            }
        }

        let domains = resolve::derive_domains(self.store.as_ref(), &record.body).await?;
        if domains.is_empty() {
            return Err(EngineError::Conflict(
                "domain must be set before submit".to_string(),
            ));
        }
        if !force {
            self.authority.require_entitled_all(actor, &domains).await?;
        }

        let now = Utc::now();
        let action = if force {
            AuditAction::ForceSubmit
        } else {
            AuditAction::Submit
        };
        self.store
            .apply_transition(
                TransitionUpdate {
                    kind,
                    record_id: record_id.clone(),
                    version,
                    expected_from,
                    to: Status::Submitted,
                    actor: actor.username.clone(),
                    at: now,
                },
                AuditAppend::new(
                    kind,
                    record_id.clone(),
                    version,
                    action,
                    actor.username.clone(),
                    now,
                ),
            )
            .await?;
        tracing::info!(
            kind = %kind,
            record_id = %record_id,
            version,
            actor = %actor.username,
            force,
            "submitted record"
        );

        let record = self.load(kind, record_id, version).await?;
        Ok(SubmitOutcome { record, warnings })
    }

    /// `submitted` -> `confirmed`. Any other confirmed version of the same
    /// record is deprecated in the same transaction. A workflow must be
    /// `ready` at confirm time, recomputed on every call.
    pub async fn confirm(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<VersionedRecord> {
        require_role(actor.role, Action::Content(kind, ContentAction::Confirm))?;
        self.confirm_inner(actor, kind, record_id, version, vec![Status::Submitted], false)
            .await
    }

    /// Admin bypass of the role and entitlement gates. Structural
    /// correctness still holds: a workflow must be `ready`, and a
    /// deprecated version can never be confirmed.
    pub async fn force_confirm(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<VersionedRecord> {
        require_role(actor.role, Action::Content(kind, ContentAction::ForceConfirm))?;
        self.confirm_inner(
            actor,
            kind,
            record_id,
            version,
            vec![
                Status::Draft,
                Status::Submitted,
                Status::Returned,
                Status::Confirmed,
            ],
            true,
        )
        .await
    }

    async fn confirm_inner(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
        expected_from: Vec<Status>,
        force: bool,
    ) -> EngineResult<VersionedRecord> {
        let record = self.load(kind, record_id, version).await?;

        if let RecordBody::Workflow(workflow) = &record.body {
            let readiness =
                resolve::compute_readiness(self.store.as_ref(), &workflow.task_refs).await?;
            if readiness != Readiness::Ready {
                return Err(EngineError::Conflict(format!(
                    "workflow readiness is {readiness}, not ready"
                )));
            }
        }

        if !force {
            let domains = resolve::derive_domains(self.store.as_ref(), &record.body).await?;
            self.authority.require_entitled_all(actor, &domains).await?;
        }

        let now = Utc::now();
        let action = if force {
            AuditAction::ForceConfirm
        } else {
            AuditAction::Confirm
        };
        self.store
            .confirm_version(
                ConfirmRequest {
                    kind,
                    record_id: record_id.clone(),
                    version,
                    expected_from,
                    actor: actor.username.clone(),
                    at: now,
                },
                AuditAppend::new(
                    kind,
                    record_id.clone(),
                    version,
                    action,
                    actor.username.clone(),
                    now,
                ),
            )
            .await?;
        tracing::info!(
            kind = %kind,
            record_id = %record_id,
            version,
            actor = %actor.username,
            force,
            "confirmed record"
        );

        self.load(kind, record_id, version).await
    }

    /// `submitted` -> `returned`, with a mandatory reviewer note that the
    /// next revision's change note will reference.
    pub async fn return_for_changes(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
        note: &str,
    ) -> EngineResult<VersionedRecord> {
        require_role(actor.role, Action::Content(kind, ContentAction::Return))?;
        let note = note.trim();
        if note.is_empty() {
            return Err(EngineError::Validation(
                "a return note is required".to_string(),
            ));
        }

        let record = self.load(kind, record_id, version).await?;
        let domains = resolve::derive_domains(self.store.as_ref(), &record.body).await?;
        self.authority.require_entitled_all(actor, &domains).await?;

        let now = Utc::now();
        self.store
            .apply_transition(
                TransitionUpdate {
                    kind,
                    record_id: record_id.clone(),
                    version,
                    expected_from: vec![Status::Submitted],
                    to: Status::Returned,
                    actor: actor.username.clone(),
                    at: now,
                },
                AuditAppend::new(
                    kind,
                    record_id.clone(),
                    version,
                    AuditAction::ReturnForChanges,
                    actor.username.clone(),
                    now,
                )
                .with_note(note),
            )
            .await?;
        tracing::info!(
            kind = %kind,
            record_id = %record_id,
            version,
            actor = %actor.username,
            "returned record for changes"
        );

        self.load(kind, record_id, version).await
    }

    // ============ Reads ============

    /// Reads are gated by authentication only, never by role or domain.
    pub async fn get_record(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<VersionedRecord> {
        self.load(kind, record_id, version).await
    }

    pub async fn list_by_status(
        &self,
        kind: EntityKind,
        status: Option<Status>,
    ) -> EngineResult<Vec<RecordSummary>> {
        Ok(self.store.list_latest(kind, status).await?)
    }

    /// Recompute a workflow version's readiness.
    pub async fn compute_readiness(
        &self,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<Readiness> {
        let record = self.load(EntityKind::Workflow, record_id, version).await?;
        let workflow = record
            .body
            .as_workflow()
            .ok_or_else(|| EngineError::Internal("workflow row with non-workflow body".to_string()))?;
        resolve::compute_readiness(self.store.as_ref(), &workflow.task_refs).await
    }

    /// Derive the sorted domain set of any record body.
    pub async fn derive_domains(&self, body: &RecordBody) -> EngineResult<BTreeSet<String>> {
        resolve::derive_domains(self.store.as_ref(), body).await
    }

    pub async fn list_audit_for_record(
        &self,
        actor: &Actor,
        kind: EntityKind,
        record_id: &RecordId,
    ) -> EngineResult<Vec<AuditEvent>> {
        require_role(actor.role, Action::AuditView)?;
        Ok(self.store.list_audit_for_record(kind, record_id).await?)
    }

    pub async fn list_audit(
        &self,
        actor: &Actor,
        window: QueryWindow,
    ) -> EngineResult<Vec<AuditEvent>> {
        require_role(actor.role, Action::AuditView)?;
        Ok(self.store.list_audit(window).await?)
    }

    // ============ Registry administration ============

    pub async fn create_domain(&self, actor: &Actor, name: &str) -> EngineResult<()> {
        require_admin(actor)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("domain name is required".to_string()));
        }
        Ok(self.store.create_domain(name).await?)
    }

    pub async fn disable_domain(&self, actor: &Actor, name: &str) -> EngineResult<()> {
        require_admin(actor)?;
        Ok(self.store.disable_domain(name, Utc::now()).await?)
    }

    pub async fn remove_domain(&self, actor: &Actor, name: &str) -> EngineResult<()> {
        require_admin(actor)?;
        Ok(self.store.remove_domain(name).await?)
    }

    pub async fn active_domains(&self) -> EngineResult<Vec<Domain>> {
        Ok(self.store.active_domains().await?)
    }

    /// Grant a user authorization in a domain. Disabled domains are
    /// excluded from new grants; existing grants are untouched.
    pub async fn grant_entitlement(
        &self,
        actor: &Actor,
        username: &str,
        domain: &str,
    ) -> EngineResult<()> {
        require_admin(actor)?;
        let entry = self
            .store
            .get_domain(domain)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("domain {domain} not found")))?;
        if !entry.is_active() {
            return Err(EngineError::Conflict(format!(
                "domain {domain} is disabled and closed to new grants"
            )));
        }
        Ok(self.store.grant_entitlement(username, domain).await?)
    }

    pub async fn revoke_entitlement(
        &self,
        actor: &Actor,
        username: &str,
        domain: &str,
    ) -> EngineResult<()> {
        require_admin(actor)?;
        Ok(self.store.revoke_entitlement(username, domain).await?)
    }

    pub async fn entitled_domains(&self, username: &str) -> EngineResult<BTreeSet<String>> {
        Ok(self.store.entitled_domains(username).await?)
    }

    // ============ Internals ============

    async fn load(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<VersionedRecord> {
        self.store
            .get_record(kind, record_id, version)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("{kind} {record_id}@{version} not found"))
            })
    }
}

fn require_admin(actor: &Actor) -> EngineResult<()> {
    if actor.role.is_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "{} requires the admin role",
            actor.username
        )))
    }
}
