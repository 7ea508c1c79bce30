//! Shared fixtures for unit tests

use crate::adapter::InMemoryDirectory;
use crate::config::DirectoryConfig;
use crate::dn::Dn;
use std::sync::Arc;

pub(crate) fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

/// Directory with `dc=test` and the three default contexts
pub(crate) fn seeded_directory() -> Arc<InMemoryDirectory> {
    let dir = InMemoryDirectory::with_suffix(&dn("dc=test"));
    for name in ["Members", "Groups", "Archives"] {
        dir.seed(
            &dn(&format!("ou={},dc=test", name)),
            &["organizationalUnit"],
            &[("ou", name)],
        );
    }
    Arc::new(dir)
}

/// Add a user entry at the default user path
pub(crate) fn seed_user(dir: &InMemoryDirectory, user_id: &str) -> Dn {
    let path = DirectoryConfig::default().user_path(user_id).unwrap();
    dir.seed(
        &path,
        &["inetOrgPerson"],
        &[
            ("cn", user_id),
            ("uid", user_id),
            ("givenName", "Test"),
            ("sn", user_id),
            ("userPassword", "secret"),
        ],
    );
    path
}

/// Add a global group entry at the default group path
pub(crate) fn seed_group(dir: &InMemoryDirectory, group: &str) -> Dn {
    let path = DirectoryConfig::default().group_path(group).unwrap();
    dir.seed(&path, &["organizationalUnit"], &[("ou", group)]);
    path
}
