//! Domain registry entries and entitlement grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Governance scope used to gate submit/confirm/return.
///
/// Disabling a domain removes it from new assignments only; existing
/// records and entitlements that reference it stay valid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub disabled_at: Option<DateTime<Utc>>,
}

impl Domain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disabled_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.disabled_at.is_none()
    }
}

/// Additive per-domain grant; not derived from roles.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserDomainEntitlement {
    pub username: String,
    pub domain: String,
}

impl UserDomainEntitlement {
    pub fn new(username: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            domain: domain.into(),
        }
    }
}
