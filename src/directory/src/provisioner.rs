//! Hierarchy provisioner
//!
//! Ensures the container chain needed to record a role participation exists,
//! strictly top-down:
//!
//! ```text
//! archive → roles container → role → participation record
//! ```
//!
//! Each step looks the path up and creates it only when absent. The lookup
//! and the create are not atomic, so a create that fails because the entry
//! appeared in between is treated as success: two callers racing on the same
//! path both end up with the one entry and neither sees an error.
//!
//! Provisioning is not transactional. Containers created before a failing
//! step stay in place and a retry resumes from the first missing one.

use crate::adapter::{
    AdapterError, AttributeSelection, Attributes, DirectoryAdapter, DirectorySession, Entry,
};
use crate::config::DirectoryConfig;
use crate::dn::Dn;
use crate::error::{DirectoryError, ProvisionStep, Result};
use crate::filter::Filter;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Kind of principal being assigned to a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    /// A user entry
    User,
    /// A global group entry
    Group,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Group => f.write_str("group"),
        }
    }
}

/// Creates archives, roles, groups and membership records on demand
pub struct HierarchyProvisioner {
    adapter: Arc<dyn DirectoryAdapter>,
    config: Arc<DirectoryConfig>,
}

impl HierarchyProvisioner {
    /// Create a provisioner over `adapter` laid out by `config`
    pub fn new(adapter: Arc<dyn DirectoryAdapter>, config: Arc<DirectoryConfig>) -> Self {
        Self { adapter, config }
    }

    /// Ensure the archive container exists and return its path
    pub fn ensure_archive(&self, archive: &str) -> Result<Dn> {
        let mut session = self.session()?;
        self.ensure_archive_in(session.as_mut(), archive)
    }

    /// Ensure the archive and its roles container exist; returns the container path
    pub fn ensure_roles_container(&self, archive: &str) -> Result<Dn> {
        let mut session = self.session()?;
        self.ensure_roles_container_in(session.as_mut(), archive)
    }

    /// Ensure the role (and everything above it) exists; returns the role path
    pub fn ensure_role(&self, role: &str, archive: &str) -> Result<Dn> {
        let mut session = self.session()?;
        self.ensure_role_in(session.as_mut(), role, archive)
    }

    /// Ensure a global group exists; returns its path
    ///
    /// The description is only written when the group is created.
    pub fn ensure_global_group(&self, group: &str, description: Option<&str>) -> Result<Dn> {
        let path = self.config.group_path(group)?;
        let mut attributes = naming_attributes(&path, &[(&self.config.group_id_attribute, group)]);
        if let Some(description) = description {
            attributes.insert(
                self.config.group_description_attribute.clone(),
                vec![description.to_string()],
            );
        }

        let mut session = self.session()?;
        self.ensure_in(
            session.as_mut(),
            ProvisionStep::GlobalGroup,
            &path,
            &self.config.container_object_class,
            attributes,
        )
    }

    /// Record that a principal participates in a role
    ///
    /// Fails with [`DirectoryError::InvalidParameter`] before any write when
    /// no entry exists at `principal_path`. Otherwise ensures archive, roles
    /// container and role, then the participation record keyed by
    /// `principal_name`. For groups an additional group-keyed record is
    /// ensured ahead of the participation record.
    ///
    /// Returns the path of the participation record.
    pub fn assign_principal_to_role(
        &self,
        principal_path: &Dn,
        principal_name: &str,
        role: &str,
        archive: &str,
        kind: PrincipalKind,
    ) -> Result<Dn> {
        // Compose everything up front so a bad argument writes nothing
        let participation_path = self.config.user_in_role_path(principal_name, role, archive)?;
        let group_participation_path = match kind {
            PrincipalKind::Group => Some(self.config.group_in_role_path(principal_name, role, archive)?),
            PrincipalKind::User => None,
        };

        let mut session = self.session()?;
        if !exists(session.as_mut(), principal_path)? {
            return Err(DirectoryError::invalid_parameter(format!(
                "The specified {} is unknown to the system: \"{}\" ({})",
                kind, principal_name, principal_path
            )));
        }

        self.ensure_role_in(session.as_mut(), role, archive)?;

        if let Some(path) = group_participation_path {
            self.ensure_membership_record(
                session.as_mut(),
                ProvisionStep::GroupParticipation,
                &path,
                principal_path,
                principal_name,
            )?;
        }

        self.ensure_membership_record(
            session.as_mut(),
            ProvisionStep::Participation,
            &participation_path,
            principal_path,
            principal_name,
        )?;

        debug!(
            "{} \"{}\" participates in role \"{}\" in archive \"{}\"",
            kind, principal_name, role, archive
        );
        Ok(participation_path)
    }

    /// Assign a user, identified by id, to a role
    pub fn assign_user_to_role(&self, user_id: &str, role: &str, archive: &str) -> Result<Dn> {
        let user_path = self.config.user_path(user_id)?;
        self.assign_principal_to_role(&user_path, user_id, role, archive, PrincipalKind::User)
    }

    /// Assign a global group, identified by name, to a role
    pub fn assign_group_to_role(&self, group: &str, role: &str, archive: &str) -> Result<Dn> {
        let group_path = self.config.group_path(group)?;
        self.assign_principal_to_role(&group_path, group, role, archive, PrincipalKind::Group)
    }

    /// Record that a user is a member of a global group
    ///
    /// Both the user and the group must exist; otherwise nothing is written.
    pub fn assign_user_to_group(&self, user_id: &str, group: &str) -> Result<Dn> {
        let user_path = self.config.user_path(user_id)?;
        let group_path = self.config.group_path(group)?;
        let membership_path = self.config.user_in_group_path(user_id, group)?;

        let mut session = self.session()?;
        if !exists(session.as_mut(), &user_path)? {
            return Err(DirectoryError::invalid_parameter(format!(
                "The specified user is unknown to the system: \"{}\" ({})",
                user_id, user_path
            )));
        }
        if !exists(session.as_mut(), &group_path)? {
            return Err(DirectoryError::invalid_parameter(format!(
                "The specified global group is unknown to the system: \"{}\" ({})",
                group, group_path
            )));
        }

        self.ensure_membership_record(
            session.as_mut(),
            ProvisionStep::GroupMembership,
            &membership_path,
            &user_path,
            user_id,
        )
    }

    fn session(&self) -> Result<Box<dyn DirectorySession + '_>> {
        Ok(self.adapter.open_session()?)
    }

    fn ensure_archive_in(&self, session: &mut dyn DirectorySession, archive: &str) -> Result<Dn> {
        let path = self.config.archive_path(archive)?;
        let attributes = naming_attributes(&path, &[(&self.config.archive_name_attribute, archive)]);
        self.ensure_in(
            session,
            ProvisionStep::Archive,
            &path,
            &self.config.container_object_class,
            attributes,
        )
    }

    fn ensure_roles_container_in(&self, session: &mut dyn DirectorySession, archive: &str) -> Result<Dn> {
        let path = self.config.roles_path(archive)?;
        self.ensure_archive_in(session, archive)?;
        let attributes = naming_attributes(&path, &[]);
        self.ensure_in(
            session,
            ProvisionStep::RolesContainer,
            &path,
            &self.config.container_object_class,
            attributes,
        )
    }

    fn ensure_role_in(&self, session: &mut dyn DirectorySession, role: &str, archive: &str) -> Result<Dn> {
        let path = self.config.role_path(role, archive)?;
        self.ensure_roles_container_in(session, archive)?;
        let attributes = naming_attributes(&path, &[(&self.config.group_id_attribute, role)]);
        self.ensure_in(
            session,
            ProvisionStep::Role,
            &path,
            &self.config.container_object_class,
            attributes,
        )
    }

    fn ensure_membership_record(
        &self,
        session: &mut dyn DirectorySession,
        step: ProvisionStep,
        path: &Dn,
        member_path: &Dn,
        member_name: &str,
    ) -> Result<Dn> {
        let member = member_path.to_string();
        let attributes = naming_attributes(
            path,
            &[
                (&self.config.member_name_attribute, member_name),
                (&self.config.member_attribute, member.as_str()),
            ],
        );
        self.ensure_owned_by(
            session,
            step,
            path,
            &self.config.membership_object_class,
            attributes,
            Some(member_path),
        )
    }

    fn ensure_in(
        &self,
        session: &mut dyn DirectorySession,
        step: ProvisionStep,
        path: &Dn,
        object_class: &str,
        attributes: Attributes,
    ) -> Result<Dn> {
        self.ensure_owned_by(session, step, path, object_class, attributes, None)
    }

    /// Like `ensure_in`, but an entry found at `path` (before the create or
    /// after losing the race for it) must record `member` in the member
    /// attribute when one is given
    fn ensure_owned_by(
        &self,
        session: &mut dyn DirectorySession,
        step: ProvisionStep,
        path: &Dn,
        object_class: &str,
        attributes: Attributes,
        member: Option<&Dn>,
    ) -> Result<Dn> {
        let selection = match member {
            Some(_) => AttributeSelection::only(&[self.config.member_attribute.as_str()]),
            None => AttributeSelection::Only(Vec::new()),
        };

        if let Some(existing) = find(session, path, &selection)? {
            self.check_member(step, &existing, member)?;
            debug!("{} {} already exists", step, path);
            return Ok(path.clone());
        }

        match session.create_entry(path, &[object_class.to_string()], &attributes) {
            Ok(()) => {
                info!("Created {} {}", step, path);
                Ok(path.clone())
            }
            Err(AdapterError::AlreadyExists(_)) => {
                warn!("{} {} was created concurrently; using existing entry", step, path);
                if member.is_some() {
                    if let Some(existing) = find(session, path, &selection)? {
                        self.check_member(step, &existing, member)?;
                    }
                }
                Ok(path.clone())
            }
            Err(source) => Err(DirectoryError::Write {
                step,
                path: path.to_string(),
                source,
            }),
        }
    }

    /// Reject a membership record that belongs to another principal
    fn check_member(&self, step: ProvisionStep, entry: &Entry, member: Option<&Dn>) -> Result<()> {
        let Some(member) = member else {
            return Ok(());
        };
        let recorded = entry.values(&self.config.member_attribute);
        let owned = recorded.iter().any(|value| match Dn::parse(value) {
            Ok(path) => &path == member,
            Err(_) => value.eq_ignore_ascii_case(&member.to_string()),
        });
        if owned {
            return Ok(());
        }

        let holder = if recorded.is_empty() {
            format!("no {}", self.config.member_attribute)
        } else {
            recorded.join("; ")
        };
        Err(DirectoryError::invalid_parameter(format!(
            "{} {} exists but records {} instead of {}",
            step,
            entry.path(),
            holder,
            member
        )))
    }
}

/// Whether any entry exists at `path`
pub(crate) fn exists(session: &mut dyn DirectorySession, path: &Dn) -> Result<bool> {
    Ok(find(session, path, &AttributeSelection::Only(Vec::new()))?.is_some())
}

fn find(
    session: &mut dyn DirectorySession,
    path: &Dn,
    selection: &AttributeSelection,
) -> Result<Option<Entry>> {
    session
        .find_by_path(path, &Filter::any(), selection)
        .map_err(|e| DirectoryError::read_failure(path, e))
}

/// The path's own naming attribute plus `extra`, de-duplicated by name
fn naming_attributes(path: &Dn, extra: &[(&String, &str)]) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(rdn) = path.leaf() {
        attributes.insert(rdn.attr().to_string(), vec![rdn.value().to_string()]);
    }
    for (name, value) in extra {
        let present = attributes.keys().any(|k| k.eq_ignore_ascii_case(name));
        if !present {
            attributes.insert(name.to_string(), vec![value.to_string()]);
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryDirectory;
    use crate::test_support::{dn, seed_group, seed_user, seeded_directory};

    fn provisioner(dir: &Arc<InMemoryDirectory>) -> HierarchyProvisioner {
        HierarchyProvisioner::new(dir.clone(), Arc::new(DirectoryConfig::default()))
    }

    #[test]
    fn test_ensure_archive_is_idempotent() {
        let dir = seeded_directory();
        let provisioner = provisioner(&dir);

        let first = provisioner.ensure_archive("A1").unwrap();
        let second = provisioner.ensure_archive("A1").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_string(), "ou=A1,ou=Archives,dc=test");
        assert_eq!(dir.descendants_of(&dn("ou=Archives,dc=test")).len(), 1);
        assert_eq!(dir.write_count(), 1);

        let entry = dir.get(&first).unwrap();
        assert_eq!(entry.first("ou"), Some("A1"));
        assert_eq!(entry.object_classes(), &["organizationalUnit".to_string()]);
    }

    #[test]
    fn test_ensure_role_creates_chain_top_down() {
        let dir = seeded_directory();
        let provisioner = provisioner(&dir);

        let role = provisioner.ensure_role("Admin", "A1").unwrap();
        assert_eq!(role.to_string(), "ou=Admin,ou=Roles,ou=A1,ou=Archives,dc=test");

        let created: Vec<String> = dir
            .journal()
            .into_iter()
            .filter_map(|op| match op {
                crate::adapter::Operation::Create { path } => Some(path.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(
            created,
            vec![
                "ou=A1,ou=Archives,dc=test",
                "ou=Roles,ou=A1,ou=Archives,dc=test",
                "ou=Admin,ou=Roles,ou=A1,ou=Archives,dc=test",
            ]
        );
    }

    #[test]
    fn test_assign_user_twice_yields_one_record() {
        let dir = seeded_directory();
        let user = seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);

        let first = provisioner.assign_user_to_role("u1", "R1", "A1").unwrap();
        let second = provisioner.assign_user_to_role("u1", "R1", "A1").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), "cn=u1,ou=R1,ou=Roles,ou=A1,ou=Archives,dc=test");

        let role = dn("ou=R1,ou=Roles,ou=A1,ou=Archives,dc=test");
        assert_eq!(dir.descendants_of(&role), vec![first.clone()]);

        let record = dir.get(&first).unwrap();
        assert_eq!(record.first("cn"), Some("u1"));
        assert_eq!(record.first("memberObject"), Some(user.to_string().as_str()));
        assert_eq!(record.object_classes(), &["dsGroupMember".to_string()]);
    }

    #[test]
    fn test_unknown_user_writes_nothing() {
        let dir = seeded_directory();
        let provisioner = provisioner(&dir);

        let err = provisioner.assign_user_to_role("ghost", "R1", "A1").unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidParameter(_)));
        assert_eq!(dir.write_count(), 0);
        assert!(dir.descendants_of(&dn("ou=Archives,dc=test")).is_empty());
    }

    #[test]
    fn test_assign_group_creates_both_records() {
        let dir = seeded_directory();
        let group = seed_group(&dir, "g1");
        let provisioner = provisioner(&dir);

        let path = provisioner.assign_group_to_role("g1", "Viewer", "A2").unwrap();
        assert_eq!(path.to_string(), "cn=g1,ou=Viewer,ou=Roles,ou=A2,ou=Archives,dc=test");

        let group_record = dn("ou=g1,ou=Viewer,ou=Roles,ou=A2,ou=Archives,dc=test");
        for record in [&path, &group_record] {
            let entry = dir.get(record).unwrap();
            assert_eq!(entry.first("memberObject"), Some(group.to_string().as_str()));
            assert_eq!(entry.first("cn"), Some("g1"));
        }
    }

    #[test]
    fn test_lost_create_race_is_success() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);

        let role = dn("ou=R1,ou=Roles,ou=A1,ou=Archives,dc=test");
        dir.race_create_of(&role);

        let path = provisioner.assign_user_to_role("u1", "R1", "A1").unwrap();
        assert!(dir.contains(&role));
        assert!(dir.contains(&path));
    }

    #[test]
    fn test_record_held_by_other_principal_is_rejected() {
        let dir = seeded_directory();
        seed_user(&dir, "staff");
        let group = seed_group(&dir, "staff");
        let provisioner = provisioner(&dir);

        let record = provisioner.assign_group_to_role("staff", "Reader", "A1").unwrap();
        let writes = dir.write_count();

        let err = provisioner.assign_user_to_role("staff", "Reader", "A1").unwrap_err();
        match err {
            DirectoryError::InvalidParameter(msg) => assert!(msg.contains(&record.to_string())),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(dir.write_count(), writes);
        assert_eq!(
            dir.get(&record).unwrap().first("memberObject"),
            Some(group.to_string().as_str())
        );
    }

    #[test]
    fn test_record_won_by_other_principal_is_rejected() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);

        let record = dn("cn=u1,ou=R1,ou=Roles,ou=A1,ou=Archives,dc=test");
        dir.race_create_as(
            &record,
            &["dsGroupMember"],
            &[("cn", "u1"), ("memberObject", "ou=u1,ou=Groups,dc=test")],
        );

        let err = provisioner.assign_user_to_role("u1", "R1", "A1").unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidParameter(_)));
    }

    #[test]
    fn test_existing_record_matches_member_as_path() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);
        provisioner.ensure_role("R1", "A1").unwrap();

        let record = dn("cn=u1,ou=R1,ou=Roles,ou=A1,ou=Archives,dc=test");
        dir.seed(
            &record,
            &["dsGroupMember"],
            &[("cn", "u1"), ("memberObject", "CN=u1, ou=Members, dc=test")],
        );

        assert_eq!(provisioner.assign_user_to_role("u1", "R1", "A1").unwrap(), record);
    }

    #[test]
    fn test_refused_lookup_is_read_error() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);

        let archives = dn("ou=Archives,dc=test");
        dir.fail_reads_at(&archives, AdapterError::Rejected("insufficient access".to_string()));

        let err = provisioner.ensure_archive("A1").unwrap_err();
        match err {
            DirectoryError::Read { path, .. } => assert_eq!(path, "ou=A1,ou=Archives,dc=test"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(dir.write_count(), 0);
    }

    #[test]
    fn test_write_failure_reports_step_and_keeps_earlier_containers() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);

        let role = dn("ou=R1,ou=Roles,ou=A1,ou=Archives,dc=test");
        dir.fail_writes_to(&role, AdapterError::Rejected("schema violation".to_string()));

        let err = provisioner.assign_user_to_role("u1", "R1", "A1").unwrap_err();
        match err {
            DirectoryError::Write { step, path, source } => {
                assert_eq!(step, ProvisionStep::Role);
                assert_eq!(path, role.to_string());
                assert!(matches!(source, AdapterError::Rejected(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(dir.contains(&dn("ou=Roles,ou=A1,ou=Archives,dc=test")));

        // Retry resumes
        provisioner.assign_user_to_role("u1", "R1", "A1").unwrap();
        assert!(dir.contains(&role));
    }

    #[test]
    fn test_assign_user_to_group_validates_both_sides() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);

        let err = provisioner.assign_user_to_group("u1", "g1").unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidParameter(_)));
        assert_eq!(dir.write_count(), 0);

        provisioner.ensure_global_group("g1", Some("First group")).unwrap();
        let path = provisioner.assign_user_to_group("u1", "g1").unwrap();
        assert_eq!(path.to_string(), "cn=u1,ou=g1,ou=Groups,dc=test");

        let group = dir.get(&dn("ou=g1,ou=Groups,dc=test")).unwrap();
        assert_eq!(group.first("description"), Some("First group"));
    }

    #[test]
    fn test_bad_argument_is_configuration_error() {
        let dir = seeded_directory();
        seed_user(&dir, "u1");
        let provisioner = provisioner(&dir);

        let err = provisioner.assign_user_to_role("u1", "", "A1").unwrap_err();
        assert!(matches!(err, DirectoryError::Configuration(_)));
        assert_eq!(dir.write_count(), 0);
    }

    #[test]
    fn test_session_released_on_error() {
        let dir = seeded_directory();
        let provisioner = provisioner(&dir);

        assert!(provisioner.assign_user_to_role("ghost", "R1", "A1").is_err());
        assert_eq!(dir.active_sessions(), 0);
        assert_eq!(dir.sessions_opened(), 1);
    }
}
