//! The role-action matrix: a pure, total function over the enumerated
//! action space.

use crate::{PolicyError, PolicyResult};
use lcg_types::{Action, ContentAction, EntityKind, Role};

/// May `role` perform `action` at all, irrespective of domains.
///
/// Admin overrides everything ("break-glass"). Reviewers confirm and return
/// but never author; authors and assessment authors are disjoint capability
/// sets; force actions are admin-only; export is the content publisher's.
pub fn can_perform(role: Role, action: Action) -> bool {
    if role.is_admin() {
        return true;
    }

    match action {
        Action::Content(kind, content_action) => match content_action {
            ContentAction::Confirm | ContentAction::Return => role == Role::Reviewer,
            ContentAction::ForceSubmit | ContentAction::ForceConfirm => false,
            ContentAction::Create | ContentAction::Revise | ContentAction::Submit => match kind {
                EntityKind::Assessment => role == Role::AssessmentAuthor,
                EntityKind::Task | EntityKind::Workflow => role == Role::Author,
            },
        },
        Action::DeliveryExport => role == Role::ContentPublisher,
        Action::DeliveryView => matches!(
            role,
            Role::Viewer
                | Role::Author
                | Role::AssessmentAuthor
                | Role::ContentPublisher
                | Role::Reviewer
        ),
        // Audit reads follow the universal-read posture: any authenticated
        // role may inspect the trail.
        Action::AuditView => true,
        Action::DbSwitch => false,
    }
}

/// Role gate as a result, for use in `?` chains.
pub fn require_role(role: Role, action: Action) -> PolicyResult<()> {
    if can_perform(role, action) {
        Ok(())
    } else {
        Err(PolicyError::RoleDenied {
            role,
            action: action.key(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviewers_confirm_and_return_but_never_author() {
        for kind in [EntityKind::Task, EntityKind::Workflow, EntityKind::Assessment] {
            assert!(can_perform(
                Role::Reviewer,
                Action::Content(kind, ContentAction::Confirm)
            ));
            assert!(can_perform(
                Role::Reviewer,
                Action::Content(kind, ContentAction::Return)
            ));
            assert!(!can_perform(
                Role::Reviewer,
                Action::Content(kind, ContentAction::Create)
            ));
            assert!(!can_perform(
                Role::Reviewer,
                Action::Content(kind, ContentAction::Revise)
            ));
            assert!(!can_perform(
                Role::Reviewer,
                Action::Content(kind, ContentAction::Submit)
            ));
        }
    }

    #[test]
    fn content_and_assessment_authoring_are_disjoint() {
        assert!(can_perform(
            Role::Author,
            Action::Content(EntityKind::Task, ContentAction::Submit)
        ));
        assert!(!can_perform(
            Role::Author,
            Action::Content(EntityKind::Assessment, ContentAction::Submit)
        ));
        assert!(can_perform(
            Role::AssessmentAuthor,
            Action::Content(EntityKind::Assessment, ContentAction::Create)
        ));
        assert!(!can_perform(
            Role::AssessmentAuthor,
            Action::Content(EntityKind::Workflow, ContentAction::Create)
        ));
    }

    #[test]
    fn force_actions_are_admin_only() {
        for role in [
            Role::Viewer,
            Role::Author,
            Role::AssessmentAuthor,
            Role::Reviewer,
            Role::ContentPublisher,
        ] {
            assert!(!can_perform(
                role,
                Action::Content(EntityKind::Task, ContentAction::ForceSubmit)
            ));
            assert!(!can_perform(
                role,
                Action::Content(EntityKind::Workflow, ContentAction::ForceConfirm)
            ));
        }
        assert!(can_perform(
            Role::Admin,
            Action::Content(EntityKind::Task, ContentAction::ForceSubmit)
        ));
    }

    #[test]
    fn delivery_gates() {
        assert!(can_perform(Role::ContentPublisher, Action::DeliveryExport));
        assert!(!can_perform(Role::Author, Action::DeliveryExport));
        for role in [
            Role::Viewer,
            Role::Author,
            Role::AssessmentAuthor,
            Role::ContentPublisher,
            Role::Reviewer,
        ] {
            assert!(can_perform(role, Action::DeliveryView));
        }
    }

    #[test]
    fn db_switch_is_admin_only() {
        assert!(can_perform(Role::Admin, Action::DbSwitch));
        assert!(!can_perform(Role::Reviewer, Action::DbSwitch));
    }

    #[test]
    fn admin_overrides_everything() {
        for kind in [EntityKind::Task, EntityKind::Workflow, EntityKind::Assessment] {
            for action in [
                ContentAction::Create,
                ContentAction::Revise,
                ContentAction::Submit,
                ContentAction::Confirm,
                ContentAction::Return,
                ContentAction::ForceSubmit,
                ContentAction::ForceConfirm,
            ] {
                assert!(can_perform(Role::Admin, Action::Content(kind, action)));
            }
        }
    }
}
