//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly. Deployments use the SQLite adapter as
//! the source of truth.

use crate::traits::{
    AuditStore, ConfirmRequest, DomainStore, EntitlementStore, QueryWindow, RecordStore,
    TaskRefState, TransitionUpdate,
};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lcg_types::{
    AuditAppend, AuditEvent, Domain, EntityKind, RecordId, RecordSummary, Status, TaskRef,
    VersionedRecord,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

type RecordKey = (EntityKind, String, u32);

/// In-memory governance store.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordKey, VersionedRecord>>,
    domains: RwLock<BTreeMap<String, Domain>>,
    entitlements: RwLock<BTreeSet<(String, String)>>,
    audit: RwLock<Vec<AuditEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_audit(audit: &mut Vec<AuditEvent>, event: AuditAppend) -> AuditEvent {
        let stored = AuditEvent {
            id: audit.len() as u64 + 1,
            entity_kind: event.entity_kind,
            record_id: event.record_id,
            version: event.version,
            action: event.action,
            actor: event.actor,
            at: event.at,
            note: event.note,
        };
        audit.push(stored.clone());
        stored
    }
}

fn lock_poisoned(what: &str) -> StoreError {
    StoreError::Backend(format!("{what} lock poisoned"))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_version(
        &self,
        record: &VersionedRecord,
        audit: AuditAppend,
    ) -> StoreResult<()> {
        if record.meta.version == 0 {
            return Err(StoreError::InvalidInput(
                "version numbers start at 1".to_string(),
            ));
        }
        let kind = record.kind();
        let key = (
            kind,
            record.meta.record_id.0.clone(),
            record.meta.version,
        );

        let mut records = self.records.write().map_err(|_| lock_poisoned("records"))?;
        if records.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{} {}@{} already exists",
                kind, record.meta.record_id, record.meta.version
            )));
        }
        records.insert(key, record.clone());

        let mut events = self.audit.write().map_err(|_| lock_poisoned("audit"))?;
        Self::push_audit(&mut events, audit);
        Ok(())
    }

    async fn get_record(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> StoreResult<Option<VersionedRecord>> {
        let records = self.records.read().map_err(|_| lock_poisoned("records"))?;
        Ok(records
            .get(&(kind, record_id.0.clone(), version))
            .cloned())
    }

    async fn latest_version(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
    ) -> StoreResult<Option<u32>> {
        let records = self.records.read().map_err(|_| lock_poisoned("records"))?;
        Ok(records
            .keys()
            .filter(|(k, rid, _)| *k == kind && rid == &record_id.0)
            .map(|(_, _, version)| *version)
            .max())
    }

    async fn list_latest(
        &self,
        kind: EntityKind,
        status: Option<Status>,
    ) -> StoreResult<Vec<RecordSummary>> {
        let records = self.records.read().map_err(|_| lock_poisoned("records"))?;

        let mut latest: BTreeMap<String, u32> = BTreeMap::new();
        let mut confirmed: BTreeMap<String, u32> = BTreeMap::new();
        for ((k, rid, version), record) in records.iter() {
            if *k != kind {
                continue;
            }
            let entry = latest.entry(rid.clone()).or_insert(*version);
            if *version > *entry {
                *entry = *version;
            }
            if record.meta.status == Status::Confirmed {
                let entry = confirmed.entry(rid.clone()).or_insert(*version);
                if *version > *entry {
                    *entry = *version;
                }
            }
        }

        let mut items = Vec::new();
        for (rid, latest_version) in latest {
            let record = records
                .get(&(kind, rid.clone(), latest_version))
                .ok_or_else(|| StoreError::InvariantViolation(format!("missing row {rid}")))?;
            if let Some(wanted) = status {
                if record.meta.status != wanted {
                    continue;
                }
            }
            let update_pending = confirmed
                .get(&rid)
                .map(|confirmed_version| {
                    latest_version > *confirmed_version
                        && matches!(record.meta.status, Status::Draft | Status::Submitted)
                })
                .unwrap_or(false);
            items.push(RecordSummary {
                record_id: RecordId::new(rid),
                latest_version,
                title: record.body.title().to_string(),
                status: record.meta.status,
                needs_review_flag: record.meta.needs_review_flag,
                update_pending_confirmation: update_pending,
            });
        }
        Ok(items)
    }

    async fn apply_transition(
        &self,
        update: TransitionUpdate,
        audit: AuditAppend,
    ) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| lock_poisoned("records"))?;
        let key = (update.kind, update.record_id.0.clone(), update.version);
        let record = records.get_mut(&key).ok_or_else(|| {
            StoreError::NotFound(format!(
                "{} {}@{} not found",
                update.kind, update.record_id, update.version
            ))
        })?;

        if !update.expected_from.contains(&record.meta.status) {
            return Err(StoreError::Conflict(format!(
                "{} {}@{} is {}, cannot move to {}",
                update.kind, update.record_id, update.version, record.meta.status, update.to
            )));
        }

        record.meta.status = update.to;
        record.meta.updated_at = update.at;
        record.meta.updated_by = update.actor;

        let mut events = self.audit.write().map_err(|_| lock_poisoned("audit"))?;
        Self::push_audit(&mut events, audit);
        Ok(())
    }

    async fn confirm_version(
        &self,
        request: ConfirmRequest,
        audit: AuditAppend,
    ) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| lock_poisoned("records"))?;
        let key = (request.kind, request.record_id.0.clone(), request.version);

        let current = records.get(&key).ok_or_else(|| {
            StoreError::NotFound(format!(
                "{} {}@{} not found",
                request.kind, request.record_id, request.version
            ))
        })?;
        if !request.expected_from.contains(&current.meta.status) {
            return Err(StoreError::Conflict(format!(
                "{} {}@{} is {}, cannot confirm",
                request.kind, request.record_id, request.version, current.meta.status
            )));
        }

        // Deprecate any other confirmed version of the same record.
        for ((k, rid, version), record) in records.iter_mut() {
            if *k == request.kind
                && rid == &request.record_id.0
                && *version != request.version
                && record.meta.status == Status::Confirmed
            {
                record.meta.status = Status::Deprecated;
                record.meta.updated_at = request.at;
                record.meta.updated_by = request.actor.clone();
            }
        }

        let record = records
            .get_mut(&key)
            .ok_or_else(|| StoreError::InvariantViolation("confirm target vanished".to_string()))?;
        record.meta.status = Status::Confirmed;
        record.meta.updated_at = request.at;
        record.meta.updated_by = request.actor.clone();
        record.meta.reviewed_at = Some(request.at);
        record.meta.reviewed_by = Some(request.actor);

        let mut events = self.audit.write().map_err(|_| lock_poisoned("audit"))?;
        Self::push_audit(&mut events, audit);
        Ok(())
    }

    async fn task_ref_state(&self, reference: &TaskRef) -> StoreResult<Option<TaskRefState>> {
        let records = self.records.read().map_err(|_| lock_poisoned("records"))?;
        let key = (
            EntityKind::Task,
            reference.task_record_id.0.clone(),
            reference.task_version,
        );
        Ok(records.get(&key).map(|record| {
            let domain = record
                .body
                .as_task()
                .map(|task| task.domain.clone())
                .unwrap_or_default();
            TaskRefState {
                status: record.meta.status,
                domain,
            }
        }))
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn create_domain(&self, name: &str) -> StoreResult<()> {
        let mut domains = self.domains.write().map_err(|_| lock_poisoned("domains"))?;
        if domains.contains_key(name) {
            return Err(StoreError::Conflict(format!(
                "domain {name} already exists"
            )));
        }
        domains.insert(name.to_string(), Domain::new(name));
        Ok(())
    }

    async fn disable_domain(&self, name: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut domains = self.domains.write().map_err(|_| lock_poisoned("domains"))?;
        let domain = domains
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("domain {name} not found")))?;
        if domain.disabled_at.is_none() {
            domain.disabled_at = Some(at);
        }
        Ok(())
    }

    async fn remove_domain(&self, name: &str) -> StoreResult<()> {
        let mut domains = self.domains.write().map_err(|_| lock_poisoned("domains"))?;
        if domains.remove(name).is_none() {
            return Err(StoreError::NotFound(format!("domain {name} not found")));
        }
        let mut entitlements = self
            .entitlements
            .write()
            .map_err(|_| lock_poisoned("entitlements"))?;
        entitlements.retain(|(_, domain)| domain != name);
        Ok(())
    }

    async fn get_domain(&self, name: &str) -> StoreResult<Option<Domain>> {
        let domains = self.domains.read().map_err(|_| lock_poisoned("domains"))?;
        Ok(domains.get(name).cloned())
    }

    async fn active_domains(&self) -> StoreResult<Vec<Domain>> {
        let domains = self.domains.read().map_err(|_| lock_poisoned("domains"))?;
        Ok(domains
            .values()
            .filter(|domain| domain.is_active())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn grant_entitlement(&self, username: &str, domain: &str) -> StoreResult<()> {
        let mut entitlements = self
            .entitlements
            .write()
            .map_err(|_| lock_poisoned("entitlements"))?;
        entitlements.insert((username.to_string(), domain.to_string()));
        Ok(())
    }

    async fn revoke_entitlement(&self, username: &str, domain: &str) -> StoreResult<()> {
        let mut entitlements = self
            .entitlements
            .write()
            .map_err(|_| lock_poisoned("entitlements"))?;
        entitlements.remove(&(username.to_string(), domain.to_string()));
        Ok(())
    }

    async fn entitled_domains(&self, username: &str) -> StoreResult<BTreeSet<String>> {
        let entitlements = self
            .entitlements
            .read()
            .map_err(|_| lock_poisoned("entitlements"))?;
        Ok(entitlements
            .iter()
            .filter(|(user, _)| user == username)
            .map(|(_, domain)| domain.clone())
            .collect())
    }

    async fn is_entitled(&self, username: &str, domain: &str) -> StoreResult<bool> {
        let entitlements = self
            .entitlements
            .read()
            .map_err(|_| lock_poisoned("entitlements"))?;
        Ok(entitlements.contains(&(username.to_string(), domain.to_string())))
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditEvent> {
        let mut events = self.audit.write().map_err(|_| lock_poisoned("audit"))?;
        Ok(Self::push_audit(&mut events, event))
    }

    async fn list_audit_for_record(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
    ) -> StoreResult<Vec<AuditEvent>> {
        let events = self.audit.read().map_err(|_| lock_poisoned("audit"))?;
        let mut matching: Vec<_> = events
            .iter()
            .filter(|event| event.entity_kind == kind && event.record_id == *record_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(matching)
    }

    async fn list_audit(&self, window: QueryWindow) -> StoreResult<Vec<AuditEvent>> {
        let events = self.audit.read().map_err(|_| lock_poisoned("audit"))?;
        let mut all = events.clone();
        all.sort_by(|a, b| b.id.cmp(&a.id));
        let iter = all.into_iter().skip(window.offset);
        Ok(if window.limit == 0 {
            iter.collect()
        } else {
            iter.take(window.limit).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcg_types::{AuditAction, RecordBody, RecordMeta, Step, TaskBody};

    fn task_record(record_id: &str, version: u32, status: Status, domain: &str) -> VersionedRecord {
        let now = Utc::now();
        VersionedRecord {
            meta: RecordMeta {
                record_id: RecordId::new(record_id),
                version,
                status,
                created_at: now,
                updated_at: now,
                created_by: "author-1".to_string(),
                updated_by: "author-1".to_string(),
                reviewed_at: None,
                reviewed_by: None,
                change_note: (version > 1).then(|| "tighten completion checks".to_string()),
                needs_review_flag: false,
                needs_review_note: None,
            },
            body: RecordBody::Task(TaskBody {
                title: format!("Task {record_id}"),
                outcome: "outcome".to_string(),
                facts: vec![],
                concepts: vec![],
                procedure_name: "procedure".to_string(),
                steps: vec![Step::new("Run `true`", "Exit code is 0")],
                dependencies: vec![],
                irreversible_flag: false,
                domain: domain.to_string(),
                assets: vec![],
            }),
        }
    }

    fn append(record: &VersionedRecord, action: AuditAction) -> AuditAppend {
        AuditAppend::new(
            record.kind(),
            record.meta.record_id.clone(),
            record.meta.version,
            action,
            record.meta.updated_by.clone(),
            record.meta.updated_at,
        )
    }

    #[tokio::test]
    async fn duplicate_version_is_a_conflict() {
        let store = MemoryStore::new();
        let record = task_record("t-1", 1, Status::Draft, "linux");
        store
            .insert_version(&record, append(&record, AuditAction::Create))
            .await
            .unwrap();
        let result = store
            .insert_version(&record, append(&record, AuditAction::Create))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn transition_requires_expected_source_status() {
        let store = MemoryStore::new();
        let record = task_record("t-1", 1, Status::Draft, "linux");
        store
            .insert_version(&record, append(&record, AuditAction::Create))
            .await
            .unwrap();

        let update = TransitionUpdate {
            kind: EntityKind::Task,
            record_id: RecordId::new("t-1"),
            version: 1,
            expected_from: vec![Status::Submitted],
            to: Status::Confirmed,
            actor: "reviewer-1".to_string(),
            at: Utc::now(),
        };
        let result = store
            .apply_transition(update, append(&record, AuditAction::Confirm))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn confirm_deprecates_previous_confirmed_version() {
        let store = MemoryStore::new();
        let v1 = task_record("t-1", 1, Status::Confirmed, "linux");
        let v2 = task_record("t-1", 2, Status::Submitted, "linux");
        store
            .insert_version(&v1, append(&v1, AuditAction::Create))
            .await
            .unwrap();
        store
            .insert_version(&v2, append(&v2, AuditAction::NewVersion))
            .await
            .unwrap();

        let request = ConfirmRequest {
            kind: EntityKind::Task,
            record_id: RecordId::new("t-1"),
            version: 2,
            expected_from: vec![Status::Submitted],
            actor: "reviewer-1".to_string(),
            at: Utc::now(),
        };
        store
            .confirm_version(request, append(&v2, AuditAction::Confirm))
            .await
            .unwrap();

        let old = store
            .get_record(EntityKind::Task, &RecordId::new("t-1"), 1)
            .await
            .unwrap()
            .unwrap();
        let new = store
            .get_record(EntityKind::Task, &RecordId::new("t-1"), 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.meta.status, Status::Deprecated);
        assert_eq!(new.meta.status, Status::Confirmed);
        assert_eq!(new.meta.reviewed_by.as_deref(), Some("reviewer-1"));
    }

    #[tokio::test]
    async fn list_latest_flags_update_pending_confirmation() {
        let store = MemoryStore::new();
        let v1 = task_record("t-1", 1, Status::Confirmed, "linux");
        let v2 = task_record("t-1", 2, Status::Draft, "linux");
        store
            .insert_version(&v1, append(&v1, AuditAction::Create))
            .await
            .unwrap();
        store
            .insert_version(&v2, append(&v2, AuditAction::NewVersion))
            .await
            .unwrap();

        let items = store.list_latest(EntityKind::Task, None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].latest_version, 2);
        assert!(items[0].update_pending_confirmation);
    }

    #[tokio::test]
    async fn disabled_domain_leaves_entitlements_in_place() {
        let store = MemoryStore::new();
        store.create_domain("linux").await.unwrap();
        store.grant_entitlement("amira", "linux").await.unwrap();
        store.disable_domain("linux", Utc::now()).await.unwrap();

        assert!(store.active_domains().await.unwrap().is_empty());
        assert!(store.is_entitled("amira", "linux").await.unwrap());
    }
}
