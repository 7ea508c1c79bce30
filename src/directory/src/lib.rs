//! # CretoAI Directory
//!
//! Archive, role and group provisioning with effective-role resolution over a
//! hierarchical directory.
//!
//! ## Features
//!
//! - **Path templates** with escaping of directory-reserved characters
//! - **Idempotent provisioning** of archive → roles container → role → participation
//! - **Race tolerant**: a create that loses to a concurrent writer counts as success
//! - **Effective roles** per archive, direct and through global groups
//! - **Pluggable adapter** with an in-memory implementation for tests and tooling
//!
//! ## Example
//!
//! ```rust
//! use cretoai_directory::{DirectoryConfig, DirectoryDomain, Dn, InMemoryDirectory};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = Arc::new(InMemoryDirectory::with_suffix(&Dn::parse("dc=test")?));
//! for ou in ["Members", "Groups", "Archives"] {
//!     dir.seed(&Dn::parse(&format!("ou={},dc=test", ou))?, &["organizationalUnit"], &[("ou", ou)]);
//! }
//! dir.seed(
//!     &Dn::parse("cn=alice,ou=Members,dc=test")?,
//!     &["inetOrgPerson"],
//!     &[("cn", "alice"), ("uid", "alice")],
//! );
//!
//! let domain = DirectoryDomain::new(dir, DirectoryConfig::default())?;
//! domain.provisioner().assign_user_to_role("alice", "Admin", "A1")?;
//!
//! let roles = domain.effective_roles("alice")?;
//! assert!(roles.has_role("A1", "Admin"));
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod dn;
pub mod domain;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod provisioner;
pub mod resolver;
pub mod template;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use adapter::{
    AdapterError, AttributeSelection, Attributes, DirectoryAdapter, DirectorySession, Entry,
    InMemoryDirectory, Operation,
};
pub use config::DirectoryConfig;
pub use dn::{Dn, DnError, Rdn};
pub use domain::DirectoryDomain;
pub use error::{DirectoryError, ProvisionStep, Result};
pub use filter::Filter;
pub use lookup::{DirectoryLookup, UserProfile};
pub use provisioner::{HierarchyProvisioner, PrincipalKind};
pub use resolver::{EffectiveRoles, MembershipResolver, Resolution};
pub use template::PathTemplate;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
