//! Version assignment and reviewer-feedback attribution.

use crate::EngineResult;
use lcg_store::GovernanceStore;
use lcg_types::{AuditAction, AuditEvent, EntityKind, RecordId};

/// Next version number: `max(existing) + 1`, or 1 for a new record.
pub async fn next_version(
    store: &dyn GovernanceStore,
    kind: EntityKind,
    record_id: &RecordId,
) -> EngineResult<u32> {
    Ok(store
        .latest_version(kind, record_id)
        .await?
        .map(|latest| latest + 1)
        .unwrap_or(1))
}

/// Prefix a change note with a reference to the most recent return, chaining
/// the revision back to the reviewer feedback it answers.
///
/// `events` is the record's audit trail, newest-first.
pub fn chain_to_return(events: &[AuditEvent], note: &str) -> String {
    match events
        .iter()
        .find(|event| event.action == AuditAction::ReturnForChanges)
    {
        Some(event) => format!(
            "[re: return by {} at {}] {}",
            event.actor,
            event.at.to_rfc3339(),
            note
        ),
        None => note.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn chains_to_the_most_recent_return() {
        let older = AuditEvent {
            id: 1,
            entity_kind: EntityKind::Task,
            record_id: RecordId::new("t-1"),
            version: 1,
            action: AuditAction::ReturnForChanges,
            actor: "old-reviewer".to_string(),
            at: Utc::now(),
            note: Some("first pass".to_string()),
        };
        let newer = AuditEvent {
            id: 2,
            action: AuditAction::ReturnForChanges,
            actor: "new-reviewer".to_string(),
            ..older.clone()
        };

        // Newest-first ordering, as the audit store returns it.
        let chained = chain_to_return(&[newer.clone(), older], "fixed the steps");
        assert!(chained.contains("new-reviewer"));
        assert!(chained.contains(&newer.at.to_rfc3339()));
        assert!(chained.ends_with("fixed the steps"));
    }

    #[test]
    fn no_return_leaves_note_unchanged() {
        assert_eq!(chain_to_return(&[], "plain note"), "plain note");
    }
}
