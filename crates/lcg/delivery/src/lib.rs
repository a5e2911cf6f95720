//! LCG delivery surface.
//!
//! Renders a workflow and its pinned task versions to markdown. Two paths:
//! - `export` for publication: content publishers only, and only for
//!   confirmed workflows whose readiness recomputes to `ready`;
//! - `preview` for review: any viewing role, any state, with a banner when
//!   the content is not ready for publication.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

use lcg_engine::{resolve, EngineError, EngineResult};
use lcg_policy::require_role;
use lcg_store::GovernanceStore;
use lcg_types::{
    Action, Actor, EntityKind, Readiness, RecordId, Status, TaskBody, VersionedRecord,
    WorkflowBody,
};
use std::sync::Arc;

/// Markdown rendering of workflows over an explicit store handle.
pub struct DeliveryService {
    store: Arc<dyn GovernanceStore>,
}

impl DeliveryService {
    pub fn new(store: Arc<dyn GovernanceStore>) -> Self {
        Self { store }
    }

    /// Publication export. Consumes only confirmed, ready workflows.
    pub async fn export_workflow_markdown(
        &self,
        actor: &Actor,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<String> {
        require_role(actor.role, Action::DeliveryExport)?;

        let (workflow, body) = self.load_workflow(record_id, version).await?;
        if workflow.meta.status != Status::Confirmed {
            return Err(EngineError::Conflict(format!(
                "workflow {record_id}@{version} is {}, only confirmed workflows export",
                workflow.meta.status
            )));
        }
        let readiness = resolve::compute_readiness(self.store.as_ref(), &body.task_refs).await?;
        if readiness != Readiness::Ready {
            return Err(EngineError::Conflict(format!(
                "workflow readiness is {readiness}, not ready"
            )));
        }

        let tasks = self.load_tasks(&body).await?;
        tracing::info!(
            record_id = %record_id,
            version,
            actor = %actor.username,
            "exported workflow"
        );
        Ok(render(&body, &tasks, None))
    }

    /// Review preview. Renders any state; unready content gets a banner.
    pub async fn preview_workflow_markdown(
        &self,
        actor: &Actor,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<String> {
        require_role(actor.role, Action::DeliveryView)?;

        let (_, body) = self.load_workflow(record_id, version).await?;
        let readiness = resolve::compute_readiness(self.store.as_ref(), &body.task_refs).await?;
        let banner = (readiness != Readiness::Ready).then_some(readiness);

        let tasks = self.load_tasks(&body).await?;
        Ok(render(&body, &tasks, banner))
    }

    async fn load_workflow(
        &self,
        record_id: &RecordId,
        version: u32,
    ) -> EngineResult<(VersionedRecord, WorkflowBody)> {
        let workflow = self
            .store
            .get_record(EntityKind::Workflow, record_id, version)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("workflow {record_id}@{version} not found"))
            })?;
        let body = workflow
            .body
            .as_workflow()
            .cloned()
            .ok_or_else(|| EngineError::Internal("workflow row with non-workflow body".to_string()))?;
        Ok((workflow, body))
    }

    async fn load_tasks(
        &self,
        body: &WorkflowBody,
    ) -> EngineResult<Vec<Option<VersionedRecord>>> {
        let mut tasks = Vec::with_capacity(body.task_refs.len());
        for reference in &body.task_refs {
            tasks.push(
                self.store
                    .get_record(EntityKind::Task, &reference.task_record_id, reference.task_version)
                    .await?,
            );
        }
        Ok(tasks)
    }
}

fn render(
    body: &WorkflowBody,
    tasks: &[Option<VersionedRecord>],
    banner: Option<Readiness>,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# {}", body.title));
    lines.push(String::new());

    if let Some(readiness) = banner {
        lines.push(
            "> **DRAFT EXPORT** - this workflow contains task versions that are not confirmed."
                .to_string(),
        );
        lines.push(format!("> Derived readiness: `{readiness}`"));
        lines.push(String::new());
    }

    lines.push(format!("**Objective:** {}", body.objective));
    lines.push(String::new());

    for (index, (reference, task)) in body.task_refs.iter().zip(tasks).enumerate() {
        let number = index + 1;
        let Some(task_record) = task else {
            lines.push(format!("## Task {number}: missing reference ({reference})"));
            lines.push(String::new());
            continue;
        };
        let Some(task_body) = task_record.body.as_task() else {
            continue;
        };

        lines.push(format!(
            "## Task {number}: {} ({reference})",
            task_body.title
        ));
        if task_record.meta.status != Status::Confirmed {
            lines.push(format!(
                "**Task status:** {} (unconfirmed)",
                task_record.meta.status
            ));
        }
        lines.push(String::new());
        lines.push(format!("**Outcome:** {}", task_body.outcome));
        lines.push(String::new());

        push_list(&mut lines, "Facts", &task_body.facts);
        push_list(&mut lines, "Concepts", &task_body.concepts);
        push_list(&mut lines, "Dependencies", &task_body.dependencies);

        lines.push(format!("**Procedure:** {}", task_body.procedure_name));
        lines.push(String::new());
        push_steps(&mut lines, task_body);
        lines.push(String::new());
    }

    lines.join("\n")
}

fn push_list(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("**{heading}:**"));
    for item in items {
        lines.push(format!("- {item}"));
    }
    lines.push(String::new());
}

fn push_steps(lines: &mut Vec<String>, task: &TaskBody) {
    for (index, step) in task.steps.iter().enumerate() {
        lines.push(format!("{}. {}", index + 1, step.text));
        if !step.completion.is_empty() {
            lines.push(format!("   - Completion: {}", step.completion));
        }
        for action in &step.actions {
            lines.push(format!("   - Action: {action}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcg_engine::{DraftRequest, GovernanceEngine};
    use lcg_store::MemoryStore;
    use lcg_types::{RecordBody, Role, Step, TaskRef};

    fn task_body(domain: &str) -> RecordBody {
        RecordBody::Task(TaskBody {
            title: "Partition the disk".to_string(),
            outcome: "Disk has a single data partition".to_string(),
            facts: vec!["GPT supports >2TB disks".to_string()],
            concepts: vec![],
            procedure_name: "Partitioning".to_string(),
            steps: vec![Step::new(
                "Run `parted /dev/sdb mklabel gpt`",
                "Verify `parted /dev/sdb print` shows gpt",
            )],
            dependencies: vec![],
            irreversible_flag: true,
            domain: domain.to_string(),
            assets: vec![],
        })
    }

    async fn governed_setup() -> (GovernanceEngine, DeliveryService, RecordId) {
        let store: Arc<dyn GovernanceStore> = Arc::new(MemoryStore::new());
        let engine = GovernanceEngine::new(store.clone());
        let delivery = DeliveryService::new(store);

        let admin = Actor::new("root", Role::Admin);
        let author = Actor::new("amira", Role::Author);

        engine.create_domain(&admin, "storage").await.unwrap();
        for user in ["amira", "rima"] {
            engine
                .grant_entitlement(&admin, user, "storage")
                .await
                .unwrap();
        }

        let task = engine
            .create_draft(&author, DraftRequest::new(task_body("storage")))
            .await
            .unwrap();
        let task_id = task.meta.record_id.clone();
        engine
            .submit(&author, EntityKind::Task, &task_id, 1)
            .await
            .unwrap();

        let workflow = engine
            .create_draft(
                &author,
                DraftRequest::new(RecordBody::Workflow(WorkflowBody {
                    title: "Bring up a data disk".to_string(),
                    objective: "Disk partitioned and mounted".to_string(),
                    task_refs: vec![TaskRef {
                        task_record_id: task_id.clone(),
                        task_version: 1,
                    }],
                })),
            )
            .await
            .unwrap();

        (engine, delivery, workflow.meta.record_id.clone())
    }

    #[tokio::test]
    async fn preview_banners_unready_content() {
        let (_engine, delivery, workflow_id) = governed_setup().await;
        let viewer = Actor::new("vera", Role::Viewer);

        let markdown = delivery
            .preview_workflow_markdown(&viewer, &workflow_id, 1)
            .await
            .unwrap();
        assert!(markdown.contains("DRAFT EXPORT"));
        assert!(markdown.contains("awaiting_task_confirmation"));
        assert!(markdown.contains("**Task status:** submitted (unconfirmed)"));
        assert!(markdown.contains("- Completion: Verify `parted /dev/sdb print` shows gpt"));
    }

    #[tokio::test]
    async fn export_requires_publisher_role_and_confirmed_ready_content() {
        let (engine, delivery, workflow_id) = governed_setup().await;
        let author = Actor::new("amira", Role::Author);
        let reviewer = Actor::new("rima", Role::Reviewer);
        let publisher = Actor::new("pia", Role::ContentPublisher);

        // Role gate.
        let err = delivery
            .export_workflow_markdown(&author, &workflow_id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        // Not confirmed yet.
        let err = delivery
            .export_workflow_markdown(&publisher, &workflow_id, 1)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);

        // Confirm the referenced task, then the workflow.
        let workflow = engine
            .get_record(EntityKind::Workflow, &workflow_id, 1)
            .await
            .unwrap();
        let task_ref = workflow.body.as_workflow().unwrap().task_refs[0].clone();
        engine
            .confirm(&reviewer, EntityKind::Task, &task_ref.task_record_id, 1)
            .await
            .unwrap();
        engine
            .submit(&author, EntityKind::Workflow, &workflow_id, 1)
            .await
            .unwrap();
        engine
            .confirm(&reviewer, EntityKind::Workflow, &workflow_id, 1)
            .await
            .unwrap();

        let markdown = delivery
            .export_workflow_markdown(&publisher, &workflow_id, 1)
            .await
            .unwrap();
        assert!(markdown.starts_with("# Bring up a data disk"));
        assert!(!markdown.contains("DRAFT EXPORT"));
        assert!(markdown.contains("**Objective:** Disk partitioned and mounted"));
    }
}
