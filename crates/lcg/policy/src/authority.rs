//! Domain entitlement authority.

use lcg_store::{GovernanceStore, StoreError};
use lcg_types::{Actor, Domain, Role};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Result type for policy decisions.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Authorization failures.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("role {role} may not perform {action}")]
    RoleDenied { role: Role, action: String },

    #[error("{username} is not entitled to domain {domain}")]
    NotEntitled { username: String, domain: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-domain additive authorization, independent of roles.
///
/// Two users with the same role can hold disjoint entitlements. The admin
/// role short-circuits to "entitled to everything" without a registry
/// lookup.
pub struct EntitlementAuthority {
    store: Arc<dyn GovernanceStore>,
}

impl EntitlementAuthority {
    pub fn new(store: Arc<dyn GovernanceStore>) -> Self {
        Self { store }
    }

    pub async fn is_entitled(&self, actor: &Actor, domain: &str) -> PolicyResult<bool> {
        if actor.role.is_admin() {
            return Ok(true);
        }
        Ok(self.store.is_entitled(&actor.username, domain).await?)
    }

    pub async fn entitled_domains(&self, actor: &Actor) -> PolicyResult<BTreeSet<String>> {
        if actor.role.is_admin() {
            return Ok(self
                .store
                .active_domains()
                .await?
                .into_iter()
                .map(|domain| domain.name)
                .collect());
        }
        Ok(self.store.entitled_domains(&actor.username).await?)
    }

    /// Require entitlement to every domain in the set. Applied to
    /// submit/confirm/return; never to create or read.
    pub async fn require_entitled_all(
        &self,
        actor: &Actor,
        domains: &BTreeSet<String>,
    ) -> PolicyResult<()> {
        if actor.role.is_admin() {
            return Ok(());
        }
        for domain in domains {
            if !self.store.is_entitled(&actor.username, domain).await? {
                tracing::debug!(
                    username = %actor.username,
                    domain = %domain,
                    "entitlement check failed"
                );
                return Err(PolicyError::NotEntitled {
                    username: actor.username.clone(),
                    domain: domain.clone(),
                });
            }
        }
        Ok(())
    }

    /// Active (not disabled) domains, ordered by name.
    pub async fn active_domains(&self) -> PolicyResult<Vec<Domain>> {
        Ok(self.store.active_domains().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcg_store::MemoryStore;
    use lcg_store::{DomainStore, EntitlementStore};

    fn authority_over(store: Arc<MemoryStore>) -> EntitlementAuthority {
        EntitlementAuthority::new(store)
    }

    #[tokio::test]
    async fn grants_are_additive_and_per_user() {
        let store = Arc::new(MemoryStore::new());
        store.create_domain("linux").await.unwrap();
        store.create_domain("networking").await.unwrap();
        store.grant_entitlement("amira", "linux").await.unwrap();

        let authority = authority_over(store);
        let amira = Actor::new("amira", Role::Author);
        let noor = Actor::new("noor", Role::Author);

        assert!(authority.is_entitled(&amira, "linux").await.unwrap());
        assert!(!authority.is_entitled(&amira, "networking").await.unwrap());
        assert!(!authority.is_entitled(&noor, "linux").await.unwrap());
    }

    #[tokio::test]
    async fn admin_short_circuits_without_grants() {
        let store = Arc::new(MemoryStore::new());
        let authority = authority_over(store);
        let admin = Actor::new("root", Role::Admin);
        assert!(authority.is_entitled(&admin, "anything").await.unwrap());

        let mut domains = BTreeSet::new();
        domains.insert("anything".to_string());
        authority
            .require_entitled_all(&admin, &domains)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn require_all_names_the_missing_domain() {
        let store = Arc::new(MemoryStore::new());
        store.create_domain("linux").await.unwrap();
        store.grant_entitlement("amira", "linux").await.unwrap();
        let authority = authority_over(store);

        let amira = Actor::new("amira", Role::Author);
        let mut domains = BTreeSet::new();
        domains.insert("linux".to_string());
        domains.insert("storage".to_string());

        let err = authority
            .require_entitled_all(&amira, &domains)
            .await
            .unwrap_err();
        match err {
            PolicyError::NotEntitled { domain, .. } => assert_eq!(domain, "storage"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
