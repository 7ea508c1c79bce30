//! Membership resolution
//!
//! Computes the roles a user holds in each archive, either directly or
//! through one level of global-group membership. Nothing is cached; every
//! call recomputes from the directory in at most three searches:
//!
//! 1. membership records below the groups context naming the user
//! 2. participation records below the archives context naming the user
//! 3. participation records naming any group found in step 1 (skipped
//!    when the user belongs to no group)
//!
//! Record paths are matched against the configured templates rather than
//! indexed by position, so a record in an unexpected place is reported as a
//! [`DirectoryError::Read`] naming the path.

use crate::adapter::{AttributeSelection, DirectoryAdapter, DirectorySession, Entry};
use crate::config::DirectoryConfig;
use crate::dn::Dn;
use crate::error::{DirectoryError, Result};
use crate::filter::Filter;
use crate::lookup::find_user_path_in;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Roles held by a principal, grouped by archive
///
/// Archives without roles are never present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveRoles(BTreeMap<String, BTreeSet<String>>);

impl EffectiveRoles {
    /// Empty assignment
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role; returns `false` if it was already present
    pub fn insert(&mut self, archive: impl Into<String>, role: impl Into<String>) -> bool {
        self.0.entry(archive.into()).or_default().insert(role.into())
    }

    /// Roles held in `archive`
    pub fn roles_in(&self, archive: &str) -> Option<&BTreeSet<String>> {
        self.0.get(archive)
    }

    /// Whether `role` is held in `archive`
    pub fn has_role(&self, archive: &str, role: &str) -> bool {
        self.0.get(archive).is_some_and(|roles| roles.contains(role))
    }

    /// Archives with at least one role, in order
    pub fn archives(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate `(archive, roles)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(archive, roles)| (archive.as_str(), roles))
    }

    /// Number of archives
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, BTreeSet<String>> {
        self.0
    }
}

impl From<EffectiveRoles> for BTreeMap<String, BTreeSet<String>> {
    fn from(roles: EffectiveRoles) -> Self {
        roles.0
    }
}

impl<A: Into<String>, R: Into<String>> FromIterator<(A, R)> for EffectiveRoles {
    fn from_iter<I: IntoIterator<Item = (A, R)>>(iter: I) -> Self {
        let mut roles = Self::new();
        for (archive, role) in iter {
            roles.insert(archive, role);
        }
        roles
    }
}

/// Result of a resolution including the user's direct groups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Global groups the user is a direct member of
    pub groups: BTreeSet<String>,
    /// Roles per archive, direct and through groups
    pub roles: EffectiveRoles,
}

/// Resolves effective roles from membership and participation records
pub struct MembershipResolver {
    adapter: Arc<dyn DirectoryAdapter>,
    config: Arc<DirectoryConfig>,
}

impl MembershipResolver {
    pub fn new(adapter: Arc<dyn DirectoryAdapter>, config: Arc<DirectoryConfig>) -> Self {
        Self { adapter, config }
    }

    /// Roles per archive held by `user_id`
    ///
    /// Fails with [`DirectoryError::InvalidParameter`] for an unknown user.
    pub fn resolve_effective_roles(&self, user_id: &str) -> Result<EffectiveRoles> {
        Ok(self.resolve_with_groups(user_id)?.roles)
    }

    /// Like [`resolve_effective_roles`](Self::resolve_effective_roles), also
    /// returning the groups found in the first phase
    pub fn resolve_with_groups(&self, user_id: &str) -> Result<Resolution> {
        let mut session = self.adapter.open_session()?;
        let session = session.as_mut();

        let user_path = find_user_path_in(session, &self.config, user_id)?.ok_or_else(|| {
            DirectoryError::invalid_parameter(format!(
                "The specified user is unknown to the system: \"{}\"",
                user_id
            ))
        })?;

        let mut resolution = Resolution::default();

        // Phase 1: direct group membership
        let groups = self.search_members(session, &self.config.groups_context, &[&user_path])?;
        let mut group_paths = Vec::new();
        for entry in &groups {
            let group = self.group_of(entry.path())?;
            trace!("User \"{}\" is member of group \"{}\"", user_id, group);
            if resolution.groups.insert(group.clone()) {
                group_paths.push(self.config.group_path(&group)?);
            }
        }

        // Phase 2: direct role participation
        let direct = self.search_members(session, &self.config.archives_context, &[&user_path])?;
        for entry in &direct {
            let (archive, role) = self.archive_and_role_of(entry.path())?;
            trace!(
                "User \"{}\" participates directly in role \"{}\" in archive \"{}\"",
                user_id, role, archive
            );
            resolution.roles.insert(archive, role);
        }

        // Phase 3: role participation through groups
        if group_paths.is_empty() {
            debug!("User \"{}\" belongs to no global group", user_id);
        } else {
            let members: Vec<&Dn> = group_paths.iter().collect();
            let indirect = self.search_members(session, &self.config.archives_context, &members)?;
            for entry in &indirect {
                let (archive, role) = self.archive_and_role_of(entry.path())?;
                trace!(
                    "User \"{}\" participates in role \"{}\" in archive \"{}\" through a group",
                    user_id, role, archive
                );
                resolution.roles.insert(archive, role);
            }
        }

        debug!(
            "Resolved {} group(s) and {} archive(s) for user \"{}\"",
            resolution.groups.len(),
            resolution.roles.len(),
            user_id
        );
        Ok(resolution)
    }

    /// Membership records below `base` whose member is any of `members`
    fn search_members(
        &self,
        session: &mut dyn DirectorySession,
        base: &Dn,
        members: &[&Dn],
    ) -> Result<Vec<Entry>> {
        let member_filter = Filter::or(
            members
                .iter()
                .map(|m| Filter::equals(self.config.member_attribute.as_str(), m.to_string()))
                .collect(),
        );
        let filter = Filter::and(vec![
            Filter::object_class(self.config.membership_object_class.as_str()),
            member_filter,
        ]);
        let selection = AttributeSelection::only(&[self.config.member_attribute.as_str()]);
        session
            .search_subtree(base, &filter, &selection)
            .map_err(|e| DirectoryError::read_failure(base, e))
    }

    fn group_of(&self, record: &Dn) -> Result<String> {
        self.config
            .user_in_group_template
            .extract(record)
            .and_then(|mut args| args.pop())
            .ok_or_else(|| {
                DirectoryError::read(
                    record,
                    format!(
                        "group membership record does not match '{}'",
                        self.config.user_in_group_template
                    ),
                )
            })
    }

    fn archive_and_role_of(&self, record: &Dn) -> Result<(String, String)> {
        let args = self
            .config
            .user_in_role_template
            .extract(record)
            .or_else(|| self.config.group_in_role_template.extract(record));

        match args.as_deref() {
            Some([_, role, archive]) => Ok((archive.clone(), role.clone())),
            _ => Err(DirectoryError::read(
                record,
                format!(
                    "role participation record matches neither '{}' nor '{}'",
                    self.config.user_in_role_template, self.config.group_in_role_template
                ),
            )),
        }
    }
}
