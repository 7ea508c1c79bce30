//! Directory domain facade
//!
//! Bundles a validated configuration with one adapter and hands out the
//! provisioner, resolver and lookup services that share them.

use crate::adapter::DirectoryAdapter;
use crate::config::DirectoryConfig;
use crate::error::Result;
use crate::lookup::DirectoryLookup;
use crate::provisioner::HierarchyProvisioner;
use crate::resolver::{EffectiveRoles, MembershipResolver};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Entry point for provisioning and resolving against one directory
pub struct DirectoryDomain {
    config: Arc<DirectoryConfig>,
    provisioner: HierarchyProvisioner,
    resolver: MembershipResolver,
    lookup: DirectoryLookup,
}

impl DirectoryDomain {
    /// Validate `config` and wire the services to `adapter`
    pub fn new(adapter: Arc<dyn DirectoryAdapter>, config: DirectoryConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        info!(
            "Directory domain ready (users: {}, groups: {}, archives: {})",
            config.users_context, config.groups_context, config.archives_context
        );

        Ok(Self {
            provisioner: HierarchyProvisioner::new(adapter.clone(), config.clone()),
            resolver: MembershipResolver::new(adapter.clone(), config.clone()),
            lookup: DirectoryLookup::new(adapter, config.clone()),
            config,
        })
    }

    /// Build from legacy `LDAP_*` properties
    pub fn from_properties(
        adapter: Arc<dyn DirectoryAdapter>,
        properties: &HashMap<String, String>,
    ) -> Result<Self> {
        Self::new(adapter, DirectoryConfig::from_properties(properties)?)
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn provisioner(&self) -> &HierarchyProvisioner {
        &self.provisioner
    }

    pub fn resolver(&self) -> &MembershipResolver {
        &self.resolver
    }

    pub fn lookup(&self) -> &DirectoryLookup {
        &self.lookup
    }

    /// Shorthand for [`MembershipResolver::resolve_effective_roles`]
    pub fn effective_roles(&self, user_id: &str) -> Result<EffectiveRoles> {
        self.resolver.resolve_effective_roles(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;
    use crate::template::PathTemplate;
    use crate::test_support::{seed_user, seeded_directory};

    #[test]
    fn test_rejects_invalid_config() {
        let config = DirectoryConfig {
            role_template: PathTemplate::new("ou=%s,ou=Roles,dc=test").unwrap(),
            ..Default::default()
        };
        let result = DirectoryDomain::new(seeded_directory(), config);
        assert!(matches!(result, Err(DirectoryError::Configuration(_))));
    }

    #[test]
    fn test_services_share_adapter() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let domain = DirectoryDomain::new(dir.clone(), DirectoryConfig::default()).unwrap();

        domain.provisioner().assign_user_to_role("u1", "Admin", "A1").unwrap();
        assert!(domain.lookup().archive_exists("A1").unwrap());
        assert!(domain.effective_roles("u1").unwrap().has_role("A1", "Admin"));
        assert_eq!(dir.active_sessions(), 0);
    }
}
