//! Authenticated actors, roles, and the enumerated action space.

use crate::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role attached to an authenticated session.
///
/// Authors and assessment authors are disjoint capability sets; reviewers
/// never author content. Admin overrides every role gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Author,
    AssessmentAuthor,
    Reviewer,
    ContentPublisher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Author => "author",
            Role::AssessmentAuthor => "assessment_author",
            Role::Reviewer => "reviewer",
            Role::ContentPublisher => "content_publisher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "viewer" => Some(Role::Viewer),
            "author" => Some(Role::Author),
            "assessment_author" => Some(Role::AssessmentAuthor),
            "reviewer" => Some(Role::Reviewer),
            "content_publisher" => Some(Role::ContentPublisher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated `(username, role)` pair supplied by the session layer.
///
/// This is the entire identity contract: the engine never sees passwords,
/// cookies, or sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.username, self.role)
    }
}

/// Content lifecycle actions, applied per entity kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentAction {
    Create,
    Revise,
    Submit,
    Confirm,
    Return,
    ForceSubmit,
    ForceConfirm,
}

impl ContentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentAction::Create => "create",
            ContentAction::Revise => "revise",
            ContentAction::Submit => "submit",
            ContentAction::Confirm => "confirm",
            ContentAction::Return => "return",
            ContentAction::ForceSubmit => "force_submit",
            ContentAction::ForceConfirm => "force_confirm",
        }
    }
}

/// The full enumerated action space of the role-action matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Content(EntityKind, ContentAction),
    DeliveryView,
    DeliveryExport,
    AuditView,
    DbSwitch,
}

impl Action {
    /// Canonical `kind:action` key, e.g. `task:submit` or `delivery:export`.
    pub fn key(&self) -> String {
        match self {
            Action::Content(kind, action) => format!("{}:{}", kind.as_str(), action.as_str()),
            Action::DeliveryView => "delivery:view".to_string(),
            Action::DeliveryExport => "delivery:export".to_string(),
            Action::AuditView => "audit:view".to_string(),
            Action::DbSwitch => "db:switch".to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_keys() {
        assert_eq!(
            Action::Content(EntityKind::Task, ContentAction::Submit).key(),
            "task:submit"
        );
        assert_eq!(
            Action::Content(EntityKind::Assessment, ContentAction::ForceConfirm).key(),
            "assessment:force_confirm"
        );
        assert_eq!(Action::DeliveryExport.key(), "delivery:export");
    }

    #[test]
    fn role_roundtrip() {
        for role in [
            Role::Viewer,
            Role::Author,
            Role::AssessmentAuthor,
            Role::Reviewer,
            Role::ContentPublisher,
            Role::Admin,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }
}
