//! Directory layout configuration
//!
//! Built once, validated, then shared as `Arc<DirectoryConfig>` by the
//! provisioner, resolver and lookup services. Every field has a default that
//! matches the conventional test layout:
//!
//! ```text
//! dc=test
//! ├── ou=Members      users:   cn=<user>
//! ├── ou=Groups       groups:  ou=<group> / cn=<user>
//! └── ou=Archives     archives: ou=<archive> / ou=Roles / ou=<role> / cn=<principal>
//! ```

use crate::dn::Dn;
use crate::error::{DirectoryError, Result};
use crate::filter::Filter;
use crate::template::PathTemplate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Directory layout, attribute names and templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    // Object classes
    /// Object class of user entries (default `inetOrgPerson`)
    pub user_object_class: String,
    /// Object class of membership/participation records (default `dsGroupMember`)
    pub membership_object_class: String,
    /// Object class of archive, roles and role containers (default `organizationalUnit`)
    pub container_object_class: String,

    // User attributes
    /// User id attribute (default `uid`)
    pub user_id_attribute: String,
    /// User password attribute (default `userPassword`); never read by this crate
    pub user_password_attribute: String,
    /// User given name attribute (default `givenName`)
    pub user_first_name_attribute: String,
    /// User surname attribute (default `sn`)
    pub user_last_name_attribute: String,

    // Group and archive attributes
    /// Group (and role) naming attribute (default `ou`)
    pub group_id_attribute: String,
    /// Group description attribute (default `description`)
    pub group_description_attribute: String,
    /// Archive naming attribute (default `ou`)
    pub archive_name_attribute: String,
    /// Attribute holding a member's path in membership records (default `memberObject`)
    pub member_attribute: String,
    /// Naming attribute of membership records (default `cn`)
    pub member_name_attribute: String,

    // Templates
    /// `ou=%s,ou=Archives,dc=test`
    pub archive_template: PathTemplate,
    /// `ou=Roles,ou=%s,ou=Archives,dc=test`
    pub roles_template: PathTemplate,
    /// `ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test` (role, archive)
    pub role_template: PathTemplate,
    /// `ou=%s,ou=Groups,dc=test`
    pub group_template: PathTemplate,
    /// `cn=%s,ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test` (principal, role, archive)
    pub user_in_role_template: PathTemplate,
    /// `ou=%s,ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test` (group, role, archive)
    pub group_in_role_template: PathTemplate,
    /// `cn=%s,ou=%s,ou=Groups,dc=test` (user, group)
    pub user_in_group_template: PathTemplate,
    /// `cn=%s,ou=Members,dc=test`
    pub user_template: PathTemplate,
    /// `cn=%s,ou=%s,ou=ForeignUsers,dc=test` (user, domain)
    pub foreign_user_template: PathTemplate,
    /// `ou=%s,ou=ForeignUsers,dc=test`
    pub foreign_domain_template: PathTemplate,

    // Search filters
    /// Users below the users context (default `(cn=*)`)
    pub user_search_filter: String,
    /// Groups below the groups context (default `(ou=*)`)
    pub group_search_filter: String,
    /// Roles below a roles container (default `(ou=*)`)
    pub role_search_filter: String,
    /// Archives below the archives context (default `(ou=*)`)
    pub archive_search_filter: String,

    // Contexts
    /// Users context (default `ou=Members,dc=test`)
    pub users_context: Dn,
    /// Global groups context (default `ou=Groups,dc=test`)
    pub groups_context: Dn,
    /// Archives context (default `ou=Archives,dc=test`)
    pub archives_context: Dn,
}

fn template(raw: &str) -> PathTemplate {
    // Defaults are constants covered by `test_defaults_are_valid`
    PathTemplate::new(raw).unwrap_or_else(|e| panic!("invalid built-in template '{}': {}", raw, e))
}

fn context(raw: &str) -> Dn {
    Dn::parse(raw).unwrap_or_else(|e| panic!("invalid built-in context '{}': {}", raw, e))
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            user_object_class: "inetOrgPerson".to_string(),
            membership_object_class: "dsGroupMember".to_string(),
            container_object_class: "organizationalUnit".to_string(),

            user_id_attribute: "uid".to_string(),
            user_password_attribute: "userPassword".to_string(),
            user_first_name_attribute: "givenName".to_string(),
            user_last_name_attribute: "sn".to_string(),

            group_id_attribute: "ou".to_string(),
            group_description_attribute: "description".to_string(),
            archive_name_attribute: "ou".to_string(),
            member_attribute: "memberObject".to_string(),
            member_name_attribute: "cn".to_string(),

            archive_template: template("ou=%s,ou=Archives,dc=test"),
            roles_template: template("ou=Roles,ou=%s,ou=Archives,dc=test"),
            role_template: template("ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test"),
            group_template: template("ou=%s,ou=Groups,dc=test"),
            user_in_role_template: template("cn=%s,ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test"),
            group_in_role_template: template("ou=%s,ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test"),
            user_in_group_template: template("cn=%s,ou=%s,ou=Groups,dc=test"),
            user_template: template("cn=%s,ou=Members,dc=test"),
            foreign_user_template: template("cn=%s,ou=%s,ou=ForeignUsers,dc=test"),
            foreign_domain_template: template("ou=%s,ou=ForeignUsers,dc=test"),

            user_search_filter: "(cn=*)".to_string(),
            group_search_filter: "(ou=*)".to_string(),
            role_search_filter: "(ou=*)".to_string(),
            archive_search_filter: "(ou=*)".to_string(),

            users_context: context("ou=Members,dc=test"),
            groups_context: context("ou=Groups,dc=test"),
            archives_context: context("ou=Archives,dc=test"),
        }
    }
}

impl DirectoryConfig {
    /// Build from legacy `LDAP_*` properties, falling back to defaults
    ///
    /// Recognised keys: `LDAP_USER_OBJECT_CLASS`, `LDAP_USER_ID`,
    /// `LDAP_USER_PASSWORD`, `LDAP_USER_FIRST_NAME`, `LDAP_USER_LAST_NAME`,
    /// `LDAP_GROUP_ID`, `LDAP_GROUP_DESCRIPTION`, `LDAP_ARCHIVE_NAME_ATTRIBUTE`,
    /// the `LDAP_*_DN_TEMPLATE` keys, the `LDAP_*_SEARCH_FILTER` keys and the
    /// `LDAP_USER_CONTEXT` / `LDAP_GROUP_CONTEXT` / `LDAP_ARCHIVES_CONTEXT` keys.
    /// Unknown keys are ignored (they usually belong to the adapter).
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        let text = |key: &str, field: &mut String| {
            if let Some(value) = props.get(key) {
                *field = value.clone();
            }
        };
        text("LDAP_USER_OBJECT_CLASS", &mut config.user_object_class);
        text("LDAP_USER_ID", &mut config.user_id_attribute);
        text("LDAP_USER_PASSWORD", &mut config.user_password_attribute);
        text("LDAP_USER_FIRST_NAME", &mut config.user_first_name_attribute);
        text("LDAP_USER_LAST_NAME", &mut config.user_last_name_attribute);
        text("LDAP_GROUP_ID", &mut config.group_id_attribute);
        text("LDAP_GROUP_DESCRIPTION", &mut config.group_description_attribute);
        text("LDAP_ARCHIVE_NAME_ATTRIBUTE", &mut config.archive_name_attribute);
        text("LDAP_USER_SEARCH_FILTER", &mut config.user_search_filter);
        text("LDAP_GROUP_SEARCH_FILTER", &mut config.group_search_filter);
        text("LDAP_ROLE_SEARCH_FILTER", &mut config.role_search_filter);
        text("LDAP_ARCHIVE_SEARCH_FILTER", &mut config.archive_search_filter);

        let templates: [(&str, &mut PathTemplate); 10] = [
            ("LDAP_ARCHIVE_DN_TEMPLATE", &mut config.archive_template),
            ("LDAP_ROLES_DN_TEMPLATE", &mut config.roles_template),
            ("LDAP_ROLE_DN_TEMPLATE", &mut config.role_template),
            ("LDAP_GROUP_DN_TEMPLATE", &mut config.group_template),
            ("LDAP_USER_IN_ROLE_DN_TEMPLATE", &mut config.user_in_role_template),
            ("LDAP_GROUP_IN_ROLE_DN_TEMPLATE", &mut config.group_in_role_template),
            ("LDAP_USER_IN_GROUP_DN_TEMPLATE", &mut config.user_in_group_template),
            ("LDAP_USER_DN_TEMPLATE", &mut config.user_template),
            ("LDAP_FOREIGN_USER_DN_TEMPLATE", &mut config.foreign_user_template),
            ("LDAP_FOREIGN_DOMAIN_DN_TEMPLATE", &mut config.foreign_domain_template),
        ];
        for (key, field) in templates {
            if let Some(value) = props.get(key) {
                *field = PathTemplate::new(value)?;
            }
        }

        let contexts: [(&str, &mut Dn); 3] = [
            ("LDAP_USER_CONTEXT", &mut config.users_context),
            ("LDAP_GROUP_CONTEXT", &mut config.groups_context),
            ("LDAP_ARCHIVES_CONTEXT", &mut config.archives_context),
        ];
        for (key, field) in contexts {
            if let Some(value) = props.get(key) {
                *field = Dn::parse(value).map_err(|e| {
                    DirectoryError::configuration(format!("Invalid {} '{}': {}", key, value, e))
                })?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check template arities, filters and required names
    pub fn validate(&self) -> Result<()> {
        for (name, template, expected) in self.templates() {
            if template.placeholder_count() != expected {
                return Err(DirectoryError::configuration(format!(
                    "{} '{}' must have {} placeholder(s), found {}",
                    name,
                    template,
                    expected,
                    template.placeholder_count()
                )));
            }
        }

        for (name, filter) in [
            ("user_search_filter", &self.user_search_filter),
            ("group_search_filter", &self.group_search_filter),
            ("role_search_filter", &self.role_search_filter),
            ("archive_search_filter", &self.archive_search_filter),
        ] {
            Filter::parse(filter).map_err(|e| {
                DirectoryError::configuration(format!("{} is invalid: {}", name, e))
            })?;
        }

        for (name, value) in [
            ("user_object_class", &self.user_object_class),
            ("membership_object_class", &self.membership_object_class),
            ("container_object_class", &self.container_object_class),
            ("user_id_attribute", &self.user_id_attribute),
            ("group_id_attribute", &self.group_id_attribute),
            ("archive_name_attribute", &self.archive_name_attribute),
            ("member_attribute", &self.member_attribute),
            ("member_name_attribute", &self.member_name_attribute),
        ] {
            if value.trim().is_empty() {
                return Err(DirectoryError::configuration(format!("{} cannot be empty", name)));
            }
        }

        for (name, ctx) in [
            ("users_context", &self.users_context),
            ("groups_context", &self.groups_context),
            ("archives_context", &self.archives_context),
        ] {
            if ctx.is_empty() {
                return Err(DirectoryError::configuration(format!("{} cannot be empty", name)));
            }
        }

        Ok(())
    }

    /// Every template with its name and expected placeholder count
    fn templates(&self) -> [(&'static str, &PathTemplate, usize); 10] {
        [
            ("archive_template", &self.archive_template, 1),
            ("roles_template", &self.roles_template, 1),
            ("role_template", &self.role_template, 2),
            ("group_template", &self.group_template, 1),
            ("user_in_role_template", &self.user_in_role_template, 3),
            ("group_in_role_template", &self.group_in_role_template, 3),
            ("user_in_group_template", &self.user_in_group_template, 2),
            ("user_template", &self.user_template, 1),
            ("foreign_user_template", &self.foreign_user_template, 2),
            ("foreign_domain_template", &self.foreign_domain_template, 1),
        ]
    }

    /// Parsed user search filter
    pub fn user_filter(&self) -> Result<Filter> {
        Filter::parse(&self.user_search_filter)
    }

    /// Parsed group search filter
    pub fn group_filter(&self) -> Result<Filter> {
        Filter::parse(&self.group_search_filter)
    }

    /// Parsed role search filter
    pub fn role_filter(&self) -> Result<Filter> {
        Filter::parse(&self.role_search_filter)
    }

    /// Parsed archive search filter
    pub fn archive_filter(&self) -> Result<Filter> {
        Filter::parse(&self.archive_search_filter)
    }

    // Path composition helpers

    /// `archive_template(archive)`
    pub fn archive_path(&self, archive: &str) -> Result<Dn> {
        self.archive_template.compose(&[archive])
    }

    /// `roles_template(archive)`
    pub fn roles_path(&self, archive: &str) -> Result<Dn> {
        self.roles_template.compose(&[archive])
    }

    /// `role_template(role, archive)`
    pub fn role_path(&self, role: &str, archive: &str) -> Result<Dn> {
        self.role_template.compose(&[role, archive])
    }

    /// `group_template(group)`
    pub fn group_path(&self, group: &str) -> Result<Dn> {
        self.group_template.compose(&[group])
    }

    /// `user_template(user)`
    pub fn user_path(&self, user: &str) -> Result<Dn> {
        self.user_template.compose(&[user])
    }

    /// `user_in_role_template(principal, role, archive)`
    pub fn user_in_role_path(&self, principal: &str, role: &str, archive: &str) -> Result<Dn> {
        self.user_in_role_template.compose(&[principal, role, archive])
    }

    /// `group_in_role_template(group, role, archive)`
    pub fn group_in_role_path(&self, group: &str, role: &str, archive: &str) -> Result<Dn> {
        self.group_in_role_template.compose(&[group, role, archive])
    }

    /// `user_in_group_template(user, group)`
    pub fn user_in_group_path(&self, user: &str, group: &str) -> Result<Dn> {
        self.user_in_group_template.compose(&[user, group])
    }

    /// `foreign_user_template(user, domain)`
    pub fn foreign_user_path(&self, user: &str, domain: &str) -> Result<Dn> {
        self.foreign_user_template.compose(&[user, domain])
    }

    /// `foreign_domain_template(domain)`
    pub fn foreign_domain_path(&self, domain: &str) -> Result<Dn> {
        self.foreign_domain_template.compose(&[domain])
    }
}
