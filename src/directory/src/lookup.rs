//! Read-only lookups and listings
//!
//! Existence checks and single-level enumerations over the configured
//! layout. Absence is never an error: a missing entry is `None`/`false` and
//! an empty or missing container lists as an empty `Vec`.

use crate::adapter::{AttributeSelection, DirectoryAdapter, DirectorySession, Entry};
use crate::config::DirectoryConfig;
use crate::dn::{Dn, Rdn};
use crate::error::{DirectoryError, Result};
use crate::filter::Filter;
use crate::provisioner::exists;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Public profile of a user entry
///
/// The password attribute is never requested from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub path: Dn,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Path of the user entry directly below the users context with `user_id`
pub(crate) fn find_user_path_in(
    session: &mut dyn DirectorySession,
    config: &DirectoryConfig,
    user_id: &str,
) -> Result<Option<Dn>> {
    let selection = AttributeSelection::only(&[config.user_id_attribute.as_str()]);
    Ok(find_user_entry(session, config, user_id, &selection)?.map(|entry| entry.path().clone()))
}

fn find_user_entry(
    session: &mut dyn DirectorySession,
    config: &DirectoryConfig,
    user_id: &str,
    selection: &AttributeSelection,
) -> Result<Option<Entry>> {
    let filter = Filter::and(vec![
        Filter::object_class(config.user_object_class.as_str()),
        Filter::equals(config.user_id_attribute.as_str(), user_id),
        config.user_filter()?,
    ]);
    let mut hits = session
        .search_one_level(&config.users_context, &filter, selection)
        .map_err(|e| DirectoryError::read_failure(&config.users_context, e))?;
    if hits.len() > 1 {
        warn!(
            "{} entries below {} have {}={}; using the first",
            hits.len(),
            config.users_context,
            config.user_id_attribute,
            user_id
        );
    }
    Ok(if hits.is_empty() { None } else { Some(hits.swap_remove(0)) })
}

/// Lookup and listing helpers
pub struct DirectoryLookup {
    adapter: Arc<dyn DirectoryAdapter>,
    config: Arc<DirectoryConfig>,
}

impl DirectoryLookup {
    pub fn new(adapter: Arc<dyn DirectoryAdapter>, config: Arc<DirectoryConfig>) -> Self {
        Self { adapter, config }
    }

    /// The path itself if an entry of any class exists there
    pub fn find_object(&self, path: &Dn) -> Result<Option<Dn>> {
        Ok(self.path_exists(path)?.then(|| path.clone()))
    }

    /// Whether an entry exists at `path`
    pub fn path_exists(&self, path: &Dn) -> Result<bool> {
        let mut session = self.adapter.open_session()?;
        exists(session.as_mut(), path)
    }

    /// Whether the archive exists
    pub fn archive_exists(&self, archive: &str) -> Result<bool> {
        self.path_exists(&self.config.archive_path(archive)?)
    }

    /// Whether the global group exists
    pub fn global_group_exists(&self, group: &str) -> Result<bool> {
        self.path_exists(&self.config.group_path(group)?)
    }

    /// Path of the user with `user_id`, if any
    pub fn find_user_path(&self, user_id: &str) -> Result<Option<Dn>> {
        let mut session = self.adapter.open_session()?;
        find_user_path_in(session.as_mut(), &self.config, user_id)
    }

    /// Profile of the user with `user_id`, if any
    pub fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let config = &self.config;
        let selection = AttributeSelection::only(&[
            config.user_id_attribute.as_str(),
            config.user_first_name_attribute.as_str(),
            config.user_last_name_attribute.as_str(),
        ]);

        let mut session = self.adapter.open_session()?;
        let entry = find_user_entry(session.as_mut(), config, user_id, &selection)?;
        Ok(entry.map(|entry| UserProfile {
            user_id: entry
                .first(&config.user_id_attribute)
                .unwrap_or(user_id)
                .to_string(),
            path: entry.path().clone(),
            first_name: entry.first(&config.user_first_name_attribute).map(str::to_string),
            last_name: entry.first(&config.user_last_name_attribute).map(str::to_string),
        }))
    }

    /// Whether `user_id` has a membership record in `group`
    ///
    /// `group` is normally a group name. Values starting with `ou=` are taken
    /// as a full group path, as stored by older access-control lists.
    pub fn is_member_of_global_group(&self, user_id: &str, group: &str) -> Result<bool> {
        let record = if group.starts_with("ou=") {
            let group_path = Dn::parse(group).map_err(|e| {
                DirectoryError::configuration(format!("Invalid group path '{}': {}", group, e))
            })?;
            let rdn = Rdn::new(self.config.member_name_attribute.as_str(), user_id).map_err(|e| {
                DirectoryError::configuration(format!("Invalid user id '{}': {}", user_id, e))
            })?;
            group_path.child(rdn)
        } else {
            self.config.user_in_group_path(user_id, group)?
        };
        self.path_exists(&record)
    }

    /// Names of all archives
    pub fn archives(&self) -> Result<Vec<String>> {
        let filter = self.config.archive_filter()?;
        let entries = self.list(&self.config.archives_context, &filter)?;
        Ok(simple_names(&entries))
    }

    /// Names of all global groups
    pub fn global_groups(&self) -> Result<Vec<String>> {
        let filter = self.config.group_filter()?;
        let entries = self.list(&self.config.groups_context, &filter)?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                entry
                    .first(&self.config.group_id_attribute)
                    .or_else(|| entry.path().simple_name())
                    .map(str::to_string)
            })
            .collect())
    }

    /// Names of the roles defined in `archive`
    pub fn roles_in_archive(&self, archive: &str) -> Result<Vec<String>> {
        let base = self.config.roles_path(archive)?;
        let filter = self.config.role_filter()?;
        let entries = self.list(&base, &filter)?;
        Ok(simple_names(&entries))
    }

    /// Short names of the principals recorded directly below `group`
    pub fn principals_in_group(&self, group: &str) -> Result<Vec<String>> {
        let base = self.config.group_path(group)?;
        self.principals_below(&base)
    }

    /// Short names of the principals recorded directly below a role
    ///
    /// A group assigned to the role has two records and is listed twice.
    pub fn principals_in_role(&self, role: &str, archive: &str) -> Result<Vec<String>> {
        let base = self.config.role_path(role, archive)?;
        self.principals_below(&base)
    }

    fn principals_below(&self, base: &Dn) -> Result<Vec<String>> {
        let filter = Filter::object_class(self.config.membership_object_class.as_str());
        let entries = self.list(base, &filter)?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                entry.first(&self.config.member_name_attribute).or_else(|| {
                    debug!(
                        "Membership record {} has no {} attribute, using its leaf name",
                        entry.path(),
                        self.config.member_name_attribute
                    );
                    entry.path().simple_name()
                })
            })
            .map(str::to_string)
            .collect())
    }

    fn list(&self, base: &Dn, filter: &Filter) -> Result<Vec<Entry>> {
        let mut session = self.adapter.open_session()?;
        session
            .search_one_level(base, filter, &AttributeSelection::All)
            .map_err(|e| DirectoryError::read_failure(base, e))
    }
}

fn simple_names(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.path().simple_name())
        .map(str::to_string)
        .collect()
}
