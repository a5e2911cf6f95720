//! SQLite adapter: the transactional source-of-truth backend.
//!
//! Single-writer store. Lock contention is absorbed by a bounded busy
//! timeout on the connection; waits that exceed it surface as a retryable
//! `StoreError::Busy`. Guarded transitions are conditional updates
//! (`WHERE status IN expected`) and the audit insert rides in the same
//! transaction as the write it describes.

use crate::traits::{
    AuditStore, ConfirmRequest, DomainStore, EntitlementStore, QueryWindow, RecordStore,
    TaskRefState, TransitionUpdate,
};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lcg_types::{
    AnswerOption, AssessmentBody, AssessmentClaim, AssessmentRef, AuditAction, AuditAppend,
    AuditEvent, Domain, EntityKind, OptionKey, RecordBody, RecordId, RecordMeta, RecordSummary,
    RefKind, Status, Step, TaskAsset, TaskBody, TaskRef, VersionedRecord, WorkflowBody,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// SQLite-backed governance store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file and initialize the schema.
    pub async fn connect(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path_display = path.as_ref().display().to_string();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to open sqlite store: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        tracing::debug!(path = %path_display, "opened sqlite governance store");
        Ok(store)
    }

    /// Private in-memory database, for tests and scratch work.
    pub async fn connect_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to open sqlite store: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                record_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                title TEXT NOT NULL,
                outcome TEXT NOT NULL,
                facts_json TEXT NOT NULL,
                concepts_json TEXT NOT NULL,
                procedure_name TEXT NOT NULL,
                steps_json TEXT NOT NULL,
                dependencies_json TEXT NOT NULL,
                irreversible_flag INTEGER NOT NULL,
                domain TEXT NOT NULL,
                assets_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                reviewed_at TEXT,
                reviewed_by TEXT,
                change_note TEXT,
                needs_review_flag INTEGER NOT NULL DEFAULT 0,
                needs_review_note TEXT,
                PRIMARY KEY (record_id, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                record_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                title TEXT NOT NULL,
                objective TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                reviewed_at TEXT,
                reviewed_by TEXT,
                change_note TEXT,
                needs_review_flag INTEGER NOT NULL DEFAULT 0,
                needs_review_note TEXT,
                PRIMARY KEY (record_id, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS workflow_task_refs (
                workflow_record_id TEXT NOT NULL,
                workflow_version INTEGER NOT NULL,
                order_index INTEGER NOT NULL,
                task_record_id TEXT NOT NULL,
                task_version INTEGER NOT NULL,
                PRIMARY KEY (workflow_record_id, workflow_version, order_index)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS assessment_items (
                record_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                stem TEXT NOT NULL,
                options_json TEXT NOT NULL,
                correct_key TEXT NOT NULL,
                rationale TEXT NOT NULL,
                claim TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                reviewed_at TEXT,
                reviewed_by TEXT,
                change_note TEXT,
                needs_review_flag INTEGER NOT NULL DEFAULT 0,
                needs_review_note TEXT,
                PRIMARY KEY (record_id, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS assessment_refs (
                assessment_record_id TEXT NOT NULL,
                assessment_version INTEGER NOT NULL,
                order_index INTEGER NOT NULL,
                ref_kind TEXT NOT NULL,
                ref_record_id TEXT NOT NULL,
                ref_version INTEGER NOT NULL,
                PRIMARY KEY (assessment_record_id, assessment_version, order_index)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_kind TEXT NOT NULL,
                record_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                action TEXT NOT NULL,
                actor TEXT NOT NULL,
                at TEXT NOT NULL,
                note TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS domains (
                name TEXT PRIMARY KEY,
                disabled_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_domains (
                username TEXT NOT NULL,
                domain TEXT NOT NULL,
                PRIMARY KEY (username, domain)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
            "CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status)",
            "CREATE INDEX IF NOT EXISTS idx_assessment_items_status ON assessment_items(status)",
            "CREATE INDEX IF NOT EXISTS idx_audit_log_record ON audit_log(entity_kind, record_id)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

fn table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Task => "tasks",
        EntityKind::Workflow => "workflows",
        EntityKind::Assessment => "assessment_items",
    }
}

fn title_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Task | EntityKind::Workflow => "title",
        EntityKind::Assessment => "stem",
    }
}

fn map_sqlx_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
            let message = db_err.message();
            if message.contains("database is locked") || message.contains("table is locked") {
                return StoreError::Busy;
            }
            StoreError::Backend(message.to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Busy,
        _ => StoreError::Backend(err.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn get_column<'r, T>(row: &'r SqliteRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("column {column}: {e}")))
}

fn parse_status(raw: &str) -> StoreResult<Status> {
    Status::parse(raw)
        .ok_or_else(|| StoreError::Serialization(format!("unknown status `{raw}`")))
}

fn read_meta(row: &SqliteRow) -> StoreResult<RecordMeta> {
    let status: String = get_column(row, "status")?;
    Ok(RecordMeta {
        record_id: RecordId::new(get_column::<String>(row, "record_id")?),
        version: get_column::<i64>(row, "version")? as u32,
        status: parse_status(&status)?,
        created_at: get_column::<DateTime<Utc>>(row, "created_at")?,
        updated_at: get_column::<DateTime<Utc>>(row, "updated_at")?,
        created_by: get_column(row, "created_by")?,
        updated_by: get_column(row, "updated_by")?,
        reviewed_at: get_column::<Option<DateTime<Utc>>>(row, "reviewed_at")?,
        reviewed_by: get_column::<Option<String>>(row, "reviewed_by")?,
        change_note: get_column::<Option<String>>(row, "change_note")?,
        needs_review_flag: get_column::<bool>(row, "needs_review_flag")?,
        needs_review_note: get_column::<Option<String>>(row, "needs_review_note")?,
    })
}

fn task_row_to_record(row: &SqliteRow) -> StoreResult<VersionedRecord> {
    let facts_json: String = get_column(row, "facts_json")?;
    let concepts_json: String = get_column(row, "concepts_json")?;
    let steps_json: String = get_column(row, "steps_json")?;
    let dependencies_json: String = get_column(row, "dependencies_json")?;
    let assets_json: String = get_column(row, "assets_json")?;

    let body = TaskBody {
        title: get_column(row, "title")?,
        outcome: get_column(row, "outcome")?,
        facts: from_json::<Vec<String>>(&facts_json)?,
        concepts: from_json::<Vec<String>>(&concepts_json)?,
        procedure_name: get_column(row, "procedure_name")?,
        steps: from_json::<Vec<Step>>(&steps_json)?,
        dependencies: from_json::<Vec<String>>(&dependencies_json)?,
        irreversible_flag: get_column(row, "irreversible_flag")?,
        domain: get_column(row, "domain")?,
        assets: from_json::<Vec<TaskAsset>>(&assets_json)?,
    };
    Ok(VersionedRecord {
        meta: read_meta(row)?,
        body: RecordBody::Task(body),
    })
}

fn assessment_row_to_record(
    row: &SqliteRow,
    refs: Vec<AssessmentRef>,
) -> StoreResult<VersionedRecord> {
    let options_json: String = get_column(row, "options_json")?;
    let correct_key: String = get_column(row, "correct_key")?;
    let claim: String = get_column(row, "claim")?;

    let body = AssessmentBody {
        stem: get_column(row, "stem")?,
        options: from_json::<Vec<AnswerOption>>(&options_json)?,
        correct_key: OptionKey::parse(&correct_key)
            .ok_or_else(|| StoreError::Serialization(format!("unknown option key `{correct_key}`")))?,
        rationale: get_column(row, "rationale")?,
        claim: AssessmentClaim::parse(&claim)
            .ok_or_else(|| StoreError::Serialization(format!("unknown claim `{claim}`")))?,
        refs,
    };
    Ok(VersionedRecord {
        meta: read_meta(row)?,
        body: RecordBody::Assessment(body),
    })
}

fn audit_row_to_event(row: &SqliteRow) -> StoreResult<AuditEvent> {
    let entity_kind: String = get_column(row, "entity_kind")?;
    let action: String = get_column(row, "action")?;
    Ok(AuditEvent {
        id: get_column::<i64>(row, "id")? as u64,
        entity_kind: EntityKind::parse(&entity_kind)
            .ok_or_else(|| StoreError::Serialization(format!("unknown entity kind `{entity_kind}`")))?,
        record_id: RecordId::new(get_column::<String>(row, "record_id")?),
        version: get_column::<i64>(row, "version")? as u32,
        action: AuditAction::parse(&action)
            .ok_or_else(|| StoreError::Serialization(format!("unknown audit action `{action}`")))?,
        actor: get_column(row, "actor")?,
        at: get_column::<DateTime<Utc>>(row, "at")?,
        note: get_column::<Option<String>>(row, "note")?,
    })
}

async fn insert_audit_tx(
    tx: &mut Transaction<'_, Sqlite>,
    event: &AuditAppend,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO audit_log (entity_kind, record_id, version, action, actor, at, note) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.entity_kind.as_str())
    .bind(event.record_id.as_str())
    .bind(event.version as i64)
    .bind(event.action.as_str())
    .bind(event.actor.as_str())
    .bind(event.at)
    .bind(event.note.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_err)?;
    Ok(())
}

fn in_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl RecordStore for SqliteStore {
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
        let meta = &record.meta;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        match &record.body {
            RecordBody::Task(task) => {
                sqlx::query(
                    r#"
                    INSERT INTO tasks (
                        record_id, version, status,
                        title, outcome, facts_json, concepts_json, procedure_name,
                        steps_json, dependencies_json, irreversible_flag, domain, assets_json,
                        created_at, updated_at, created_by, updated_by,
                        reviewed_at, reviewed_by, change_note,
                        needs_review_flag, needs_review_note
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(meta.record_id.as_str())
                .bind(meta.version as i64)
                .bind(meta.status.as_str())
                .bind(&task.title)
                .bind(&task.outcome)
                .bind(to_json(&task.facts)?)
                .bind(to_json(&task.concepts)?)
                .bind(&task.procedure_name)
                .bind(to_json(&task.steps)?)
                .bind(to_json(&task.dependencies)?)
                .bind(task.irreversible_flag)
                .bind(&task.domain)
                .bind(to_json(&task.assets)?)
                .bind(meta.created_at)
                .bind(meta.updated_at)
                .bind(&meta.created_by)
                .bind(&meta.updated_by)
                .bind(meta.reviewed_at)
                .bind(meta.reviewed_by.as_deref())
                .bind(meta.change_note.as_deref())
                .bind(meta.needs_review_flag)
                .bind(meta.needs_review_note.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            }
            RecordBody::Workflow(workflow) => {
                sqlx::query(
                    r#"
                    INSERT INTO workflows (
                        record_id, version, status, title, objective,
                        created_at, updated_at, created_by, updated_by,
                        reviewed_at, reviewed_by, change_note,
                        needs_review_flag, needs_review_note
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(meta.record_id.as_str())
                .bind(meta.version as i64)
                .bind(meta.status.as_str())
                .bind(&workflow.title)
                .bind(&workflow.objective)
                .bind(meta.created_at)
                .bind(meta.updated_at)
                .bind(&meta.created_by)
                .bind(&meta.updated_by)
                .bind(meta.reviewed_at)
                .bind(meta.reviewed_by.as_deref())
                .bind(meta.change_note.as_deref())
                .bind(meta.needs_review_flag)
                .bind(meta.needs_review_note.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;

                for (index, reference) in workflow.task_refs.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO workflow_task_refs \
                         (workflow_record_id, workflow_version, order_index, task_record_id, task_version) \
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(meta.record_id.as_str())
                    .bind(meta.version as i64)
                    .bind(index as i64 + 1)
                    .bind(reference.task_record_id.as_str())
                    .bind(reference.task_version as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_err)?;
                }
            }
            RecordBody::Assessment(assessment) => {
                sqlx::query(
                    r#"
                    INSERT INTO assessment_items (
                        record_id, version, status, stem, options_json, correct_key, rationale, claim,
                        created_at, updated_at, created_by, updated_by,
                        reviewed_at, reviewed_by, change_note,
                        needs_review_flag, needs_review_note
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(meta.record_id.as_str())
                .bind(meta.version as i64)
                .bind(meta.status.as_str())
                .bind(&assessment.stem)
                .bind(to_json(&assessment.options)?)
                .bind(assessment.correct_key.as_str())
                .bind(&assessment.rationale)
                .bind(assessment.claim.as_str())
                .bind(meta.created_at)
                .bind(meta.updated_at)
                .bind(&meta.created_by)
                .bind(&meta.updated_by)
                .bind(meta.reviewed_at)
                .bind(meta.reviewed_by.as_deref())
                .bind(meta.change_note.as_deref())
                .bind(meta.needs_review_flag)
                .bind(meta.needs_review_note.as_deref())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;

                for (index, reference) in assessment.refs.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO assessment_refs \
                         (assessment_record_id, assessment_version, order_index, ref_kind, ref_record_id, ref_version) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(meta.record_id.as_str())
                    .bind(meta.version as i64)
                    .bind(index as i64 + 1)
                    .bind(reference.kind.as_str())
                    .bind(reference.record_id.as_str())
                    .bind(reference.version as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_err)?;
                }
            }
        }

        insert_audit_tx(&mut tx, &audit).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn get_record(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
        version: u32,
    ) -> StoreResult<Option<VersionedRecord>> {
        let sql = format!(
            "SELECT * FROM {} WHERE record_id = ? AND version = ?",
            table(kind)
        );
        let row = sqlx::query(&sql)
            .bind(record_id.as_str())
            .bind(version as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        let Some(row) = row else {
            return Ok(None);
        };

        match kind {
            EntityKind::Task => Ok(Some(task_row_to_record(&row)?)),
            EntityKind::Workflow => {
                let refs = sqlx::query(
                    "SELECT task_record_id, task_version FROM workflow_task_refs \
                     WHERE workflow_record_id = ? AND workflow_version = ? ORDER BY order_index",
                )
                .bind(record_id.as_str())
                .bind(version as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
                let task_refs = refs
                    .iter()
                    .map(|r| {
                        Ok(TaskRef {
                            task_record_id: RecordId::new(get_column::<String>(r, "task_record_id")?),
                            task_version: get_column::<i64>(r, "task_version")? as u32,
                        })
                    })
                    .collect::<StoreResult<Vec<_>>>()?;
                let body = WorkflowBody {
                    title: get_column(&row, "title")?,
                    objective: get_column(&row, "objective")?,
                    task_refs,
                };
                Ok(Some(VersionedRecord {
                    meta: read_meta(&row)?,
                    body: RecordBody::Workflow(body),
                }))
            }
            EntityKind::Assessment => {
                let refs = sqlx::query(
                    "SELECT ref_kind, ref_record_id, ref_version FROM assessment_refs \
                     WHERE assessment_record_id = ? AND assessment_version = ? ORDER BY order_index",
                )
                .bind(record_id.as_str())
                .bind(version as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
                let refs = refs
                    .iter()
                    .map(|r| {
                        let kind_raw: String = get_column(r, "ref_kind")?;
                        Ok(AssessmentRef {
                            kind: RefKind::parse(&kind_raw).ok_or_else(|| {
                                StoreError::Serialization(format!("unknown ref kind `{kind_raw}`"))
                            })?,
                            record_id: RecordId::new(get_column::<String>(r, "ref_record_id")?),
                            version: get_column::<i64>(r, "ref_version")? as u32,
                        })
                    })
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(Some(assessment_row_to_record(&row, refs)?))
            }
        }
    }

    async fn latest_version(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
    ) -> StoreResult<Option<u32>> {
        let sql = format!(
            "SELECT MAX(version) AS latest FROM {} WHERE record_id = ?",
            table(kind)
        );
        let row = sqlx::query(&sql)
            .bind(record_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        let latest: Option<i64> = get_column(&row, "latest")?;
        Ok(latest.map(|v| v as u32))
    }

    async fn list_latest(
        &self,
        kind: EntityKind,
        status: Option<Status>,
    ) -> StoreResult<Vec<RecordSummary>> {
        let sql = format!(
            "SELECT record_id, MAX(version) AS latest_version FROM {} \
             GROUP BY record_id ORDER BY record_id",
            table(kind)
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let mut items = Vec::new();
        for row in rows {
            let record_id: String = get_column(&row, "record_id")?;
            let latest_version = get_column::<i64>(&row, "latest_version")? as u32;

            let detail_sql = format!(
                "SELECT {} AS title, status, needs_review_flag FROM {} \
                 WHERE record_id = ? AND version = ?",
                title_column(kind),
                table(kind)
            );
            let detail = sqlx::query(&detail_sql)
                .bind(&record_id)
                .bind(latest_version as i64)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            let status_raw: String = get_column(&detail, "status")?;
            let latest_status = parse_status(&status_raw)?;
            if let Some(wanted) = status {
                if latest_status != wanted {
                    continue;
                }
            }

            let confirmed_sql = format!(
                "SELECT MAX(version) AS confirmed FROM {} \
                 WHERE record_id = ? AND status = 'confirmed'",
                table(kind)
            );
            let confirmed_row = sqlx::query(&confirmed_sql)
                .bind(&record_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
            let confirmed: Option<i64> = get_column(&confirmed_row, "confirmed")?;
            let update_pending = confirmed
                .map(|confirmed_version| {
                    latest_version > confirmed_version as u32
                        && matches!(latest_status, Status::Draft | Status::Submitted)
                })
                .unwrap_or(false);

            items.push(RecordSummary {
                record_id: RecordId::new(record_id),
                latest_version,
                title: get_column(&detail, "title")?,
                status: latest_status,
                needs_review_flag: get_column(&detail, "needs_review_flag")?,
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
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let sql = format!(
            "UPDATE {} SET status = ?, updated_at = ?, updated_by = ? \
             WHERE record_id = ? AND version = ? AND status IN ({})",
            table(update.kind),
            in_placeholders(update.expected_from.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(update.to.as_str())
            .bind(update.at)
            .bind(&update.actor)
            .bind(update.record_id.as_str())
            .bind(update.version as i64);
        for expected in &update.expected_from {
            query = query.bind(expected.as_str());
        }
        let result = query.execute(&mut *tx).await.map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            let probe_sql = format!(
                "SELECT status FROM {} WHERE record_id = ? AND version = ?",
                table(update.kind)
            );
            let probe = sqlx::query(&probe_sql)
                .bind(update.record_id.as_str())
                .bind(update.version as i64)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            return Err(match probe {
                Some(row) => {
                    let current: String = get_column(&row, "status")?;
                    StoreError::Conflict(format!(
                        "{} {}@{} is {current}, cannot move to {}",
                        update.kind, update.record_id, update.version, update.to
                    ))
                }
                None => StoreError::NotFound(format!(
                    "{} {}@{} not found",
                    update.kind, update.record_id, update.version
                )),
            });
        }

        insert_audit_tx(&mut tx, &audit).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn confirm_version(
        &self,
        request: ConfirmRequest,
        audit: AuditAppend,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let confirm_sql = format!(
            "UPDATE {} SET status = 'confirmed', reviewed_at = ?, reviewed_by = ?, \
             updated_at = ?, updated_by = ? \
             WHERE record_id = ? AND version = ? AND status IN ({})",
            table(request.kind),
            in_placeholders(request.expected_from.len())
        );
        let mut query = sqlx::query(&confirm_sql)
            .bind(request.at)
            .bind(&request.actor)
            .bind(request.at)
            .bind(&request.actor)
            .bind(request.record_id.as_str())
            .bind(request.version as i64);
        for expected in &request.expected_from {
            query = query.bind(expected.as_str());
        }
        let result = query.execute(&mut *tx).await.map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            let probe_sql = format!(
                "SELECT status FROM {} WHERE record_id = ? AND version = ?",
                table(request.kind)
            );
            let probe = sqlx::query(&probe_sql)
                .bind(request.record_id.as_str())
                .bind(request.version as i64)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            return Err(match probe {
                Some(row) => {
                    let current: String = get_column(&row, "status")?;
                    StoreError::Conflict(format!(
                        "{} {}@{} is {current}, cannot confirm",
                        request.kind, request.record_id, request.version
                    ))
                }
                None => StoreError::NotFound(format!(
                    "{} {}@{} not found",
                    request.kind, request.record_id, request.version
                )),
            });
        }

        // Deprecate the superseded confirmed version in the same transaction,
        // so at most one version is confirmed at any commit point.
        let deprecate_sql = format!(
            "UPDATE {} SET status = 'deprecated', updated_at = ?, updated_by = ? \
             WHERE record_id = ? AND status = 'confirmed' AND version <> ?",
            table(request.kind)
        );
        sqlx::query(&deprecate_sql)
            .bind(request.at)
            .bind(&request.actor)
            .bind(request.record_id.as_str())
            .bind(request.version as i64)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        insert_audit_tx(&mut tx, &audit).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn task_ref_state(&self, reference: &TaskRef) -> StoreResult<Option<TaskRefState>> {
        let row = sqlx::query("SELECT status, domain FROM tasks WHERE record_id = ? AND version = ?")
            .bind(reference.task_record_id.as_str())
            .bind(reference.task_version as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        row.map(|row| {
            let status_raw: String = get_column(&row, "status")?;
            Ok(TaskRefState {
                status: parse_status(&status_raw)?,
                domain: get_column(&row, "domain")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl DomainStore for SqliteStore {
    async fn create_domain(&self, name: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO domains (name, disabled_at) VALUES (?, NULL)")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn disable_domain(&self, name: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE domains SET disabled_at = ? WHERE name = ? AND disabled_at IS NULL")
            .bind(at)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            let exists = self.get_domain(name).await?.is_some();
            if !exists {
                return Err(StoreError::NotFound(format!("domain {name} not found")));
            }
        }
        Ok(())
    }

    async fn remove_domain(&self, name: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let result = sqlx::query("DELETE FROM domains WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("domain {name} not found")));
        }
        sqlx::query("DELETE FROM user_domains WHERE domain = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn get_domain(&self, name: &str) -> StoreResult<Option<Domain>> {
        let row = sqlx::query("SELECT name, disabled_at FROM domains WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        row.map(|row| {
            Ok(Domain {
                name: get_column(&row, "name")?,
                disabled_at: get_column::<Option<DateTime<Utc>>>(&row, "disabled_at")?,
            })
        })
        .transpose()
    }

    async fn active_domains(&self) -> StoreResult<Vec<Domain>> {
        let rows = sqlx::query("SELECT name, disabled_at FROM domains WHERE disabled_at IS NULL ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        rows.iter()
            .map(|row| {
                Ok(Domain {
                    name: get_column(row, "name")?,
                    disabled_at: get_column::<Option<DateTime<Utc>>>(row, "disabled_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EntitlementStore for SqliteStore {
    async fn grant_entitlement(&self, username: &str, domain: &str) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO user_domains (username, domain) VALUES (?, ?)")
            .bind(username)
            .bind(domain)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn revoke_entitlement(&self, username: &str, domain: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM user_domains WHERE username = ? AND domain = ?")
            .bind(username)
            .bind(domain)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn entitled_domains(&self, username: &str) -> StoreResult<BTreeSet<String>> {
        let rows = sqlx::query("SELECT domain FROM user_domains WHERE username = ? ORDER BY domain")
            .bind(username)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        rows.iter()
            .map(|row| get_column::<String>(row, "domain"))
            .collect()
    }

    async fn is_entitled(&self, username: &str, domain: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 AS hit FROM user_domains WHERE username = ? AND domain = ?")
            .bind(username)
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append_audit(&self, event: AuditAppend) -> StoreResult<AuditEvent> {
        let result = sqlx::query(
            "INSERT INTO audit_log (entity_kind, record_id, version, action, actor, at, note) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.entity_kind.as_str())
        .bind(event.record_id.as_str())
        .bind(event.version as i64)
        .bind(event.action.as_str())
        .bind(event.actor.as_str())
        .bind(event.at)
        .bind(event.note.as_deref())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(AuditEvent {
            id: result.last_insert_rowid() as u64,
            entity_kind: event.entity_kind,
            record_id: event.record_id,
            version: event.version,
            action: event.action,
            actor: event.actor,
            at: event.at,
            note: event.note,
        })
    }

    async fn list_audit_for_record(
        &self,
        kind: EntityKind,
        record_id: &RecordId,
    ) -> StoreResult<Vec<AuditEvent>> {
        let rows = sqlx::query(
            "SELECT id, entity_kind, record_id, version, action, actor, at, note \
             FROM audit_log WHERE entity_kind = ? AND record_id = ? ORDER BY id DESC",
        )
        .bind(kind.as_str())
        .bind(record_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        rows.iter().map(audit_row_to_event).collect()
    }

    async fn list_audit(&self, window: QueryWindow) -> StoreResult<Vec<AuditEvent>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                "SELECT id, entity_kind, record_id, version, action, actor, at, note \
                 FROM audit_log ORDER BY id DESC LIMIT -1 OFFSET ?",
            )
            .bind(window.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
        } else {
            sqlx::query(
                "SELECT id, entity_kind, record_id, version, action, actor, at, note \
                 FROM audit_log ORDER BY id DESC LIMIT ? OFFSET ?",
            )
            .bind(window.limit as i64)
            .bind(window.offset as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
        };
        rows.iter().map(audit_row_to_event).collect()
    }
}
