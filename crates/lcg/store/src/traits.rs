use crate::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lcg_types::{
    AuditAppend, AuditEvent, Domain, EntityKind, RecordId, RecordSummary, Status, TaskRef,
    VersionedRecord,
};
use std::collections::BTreeSet;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Guarded in-place status change of one version row.
///
/// Adapters apply this as a single conditional write (`WHERE status IN
/// expected_from`) and append the audit event in the same transaction.
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub kind: EntityKind,
    pub record_id: RecordId,
    pub version: u32,
    pub expected_from: Vec<Status>,
    pub to: Status,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// Promotion of one version to `confirmed`.
///
/// Any other currently-confirmed version of the same `record_id` is set to
/// `deprecated` in the same transaction, so at most one version is ever
/// confirmed.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub kind: EntityKind,
    pub record_id: RecordId,
    pub version: u32,
    pub expected_from: Vec<Status>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

/// Status and governance domain of one exact task version, as needed by the
/// workflow composition resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRefState {
    pub status: Status,
    pub domain: String,
}

/// Storage interface for versioned content records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new immutable version row. Fails with `Conflict` if the
    /// `(record_id, version)` pair already exists.
    async fn insert_version(
        &self,
        record: &VersionedRecord,
        audit: AuditAppend,
    ) -> StoreResult<()>;

    /// Get one exact version.
    async fn get_record(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> StoreResult<Option<VersionedRecord>>;

    /// Highest existing version for a record, if any.
    async fn latest_version(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
    ) -> StoreResult<Option<u32>>;

    /// One row per record id at its latest version, optionally filtered by
    /// that latest version's status. Ordered by record id.
    async fn list_latest(
        &self,
        kind: EntityKind,
        status: Option<Status>,
    ) -> StoreResult<Vec<RecordSummary>>;

    /// Apply a guarded status transition plus its audit event atomically.
    async fn apply_transition(
        &self,
        update: TransitionUpdate,
        audit: AuditAppend,
    ) -> StoreResult<()>;

    /// Confirm one version, deprecating any previously confirmed version of
    /// the same record and stamping `reviewed_at/by`, atomically with the
    /// audit event.
    async fn confirm_version(&self, request: ConfirmRequest, audit: AuditAppend)
        -> StoreResult<()>;

    /// Resolver support: status and domain of one exact task version.
    async fn task_ref_state(&self, reference: &TaskRef) -> StoreResult<Option<TaskRefState>>;
}

/// Storage interface for the domain registry.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn create_domain(&self, name: &str) -> StoreResult<()>;

    /// Soft-disable: excluded from `active_domains`, nothing else changes.
    async fn disable_domain(&self, name: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// Hard delete of the registry row and its entitlement grants. Content
    /// rows referencing the domain are untouched.
    async fn remove_domain(&self, name: &str) -> StoreResult<()>;

    async fn get_domain(&self, name: &str) -> StoreResult<Option<Domain>>;

    /// Active domains, ordered by name.
    async fn active_domains(&self) -> StoreResult<Vec<Domain>>;
}

/// Storage interface for per-domain entitlement grants.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Idempotent additive grant.
    async fn grant_entitlement(&self, username: &str, domain: &str) -> StoreResult<()>;

    /// Idempotent revocation.
    async fn revoke_entitlement(&self, username: &str, domain: &str) -> StoreResult<()>;

    async fn entitled_domains(&self, username: &str) -> StoreResult<BTreeSet<String>>;

    async fn is_entitled(&self, username: &str, domain: &str) -> StoreResult<bool>;
}

/// Storage interface for the append-only audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one event and return it with its assigned sequence id. Used
    /// for events that do not ride along with a record write.
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditEvent>;

    /// Events for one record across all versions, newest-first.
    async fn list_audit_for_record(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
    ) -> StoreResult<Vec<AuditEvent>>;

    /// Most recent events across all records, newest-first.
    async fn list_audit(&self, window: QueryWindow) -> StoreResult<Vec<AuditEvent>>;
}

/// Unified storage bundle consumed by the governance engine.
pub trait GovernanceStore:
    RecordStore + DomainStore + EntitlementStore + AuditStore + Send + Sync
{
}

impl<T> GovernanceStore for T where
    T: RecordStore + DomainStore + EntitlementStore + AuditStore + Send + Sync
{
}
