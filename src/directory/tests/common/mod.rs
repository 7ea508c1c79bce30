//! Shared fixtures for integration tests

#![allow(dead_code)]

use cretoai_directory::{DirectoryConfig, DirectoryDomain, Dn, InMemoryDirectory};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber honouring `RUST_LOG`; repeated calls are harmless
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

/// `dc=test` with the members, groups and archives contexts
pub fn seeded_directory() -> Arc<InMemoryDirectory> {
    let dir = InMemoryDirectory::with_suffix(&dn("dc=test"));
    for ou in ["Members", "Groups", "Archives"] {
        dir.seed(&dn(&format!("ou={},dc=test", ou)), &["organizationalUnit"], &[("ou", ou)]);
    }
    Arc::new(dir)
}

/// Seed users at `cn=<id>,ou=Members,dc=test`
pub fn seed_users(dir: &InMemoryDirectory, ids: &[&str]) {
    for &id in ids {
        dir.seed(
            &dn(&format!("cn={},ou=Members,dc=test", id)),
            &["inetOrgPerson"],
            &[("cn", id), ("uid", id), ("sn", id), ("userPassword", "secret")],
        );
    }
}

/// Seeded directory plus a domain with default configuration
pub fn domain_with_users(ids: &[&str]) -> (Arc<InMemoryDirectory>, DirectoryDomain) {
    init_tracing();
    let dir = seeded_directory();
    seed_users(&dir, ids);
    let domain = DirectoryDomain::new(dir.clone(), DirectoryConfig::default()).unwrap();
    (dir, domain)
}
