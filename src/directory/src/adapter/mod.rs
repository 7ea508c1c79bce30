//! Directory adapter capability
//!
//! The core never talks to a concrete directory client. It opens a session
//! through [`DirectoryAdapter`] for each operation and issues the four
//! primitives on [`DirectorySession`]. Sessions release their resources on
//! `Drop`, so every exit path of an operation (including `?`) closes them.
//!
//! Adapters must report a search below a missing base as an empty result
//! and a lookup of a missing path as `None`; absence is never an error.

pub mod memory;

pub use memory::{InMemoryDirectory, Operation};

use crate::dn::Dn;
use crate::filter::Filter;
use std::collections::BTreeMap;
use thiserror::Error;

/// Attribute name to values
pub type Attributes = BTreeMap<String, Vec<String>>;

/// Failures reported by an adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// An entry already exists at the path
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// The parent of the path does not exist
    #[error("parent entry does not exist: {0}")]
    NoSuchParent(String),

    /// The directory refused the operation (schema, access, ...)
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// Transport or session failure
    #[error("connection failure: {0}")]
    Connection(String),
}

/// Attributes a search should return
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttributeSelection {
    /// Every user attribute
    #[default]
    All,
    /// Only the named attributes (empty = none)
    Only(Vec<String>),
}

impl AttributeSelection {
    /// Select the named attributes
    pub fn only(attrs: &[&str]) -> Self {
        AttributeSelection::Only(attrs.iter().map(|a| a.to_string()).collect())
    }

    /// Whether `attr` is selected
    pub fn includes(&self, attr: &str) -> bool {
        match self {
            AttributeSelection::All => true,
            AttributeSelection::Only(attrs) => attrs.iter().any(|a| a.eq_ignore_ascii_case(attr)),
        }
    }
}

/// An entry read from the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    path: Dn,
    attributes: Attributes,
}

impl Entry {
    /// Create an entry
    pub fn new(path: Dn, attributes: Attributes) -> Self {
        Self { path, attributes }
    }

    /// Entry path
    pub fn path(&self) -> &Dn {
        &self.path
    }

    /// All attributes
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Values of an attribute (name compared case-insensitively)
    pub fn values(&self, attr: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attr))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of an attribute
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.values(attr).first().map(String::as_str)
    }

    /// Object classes of the entry
    pub fn object_classes(&self) -> &[String] {
        self.values("objectClass")
    }

    /// Copy of the entry restricted to the selected attributes
    pub fn project(&self, selection: &AttributeSelection) -> Entry {
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| selection.includes(name))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();
        Entry {
            path: self.path.clone(),
            attributes,
        }
    }
}

/// An open directory session
pub trait DirectorySession {
    /// Read the entry at `path` if it exists and matches `filter`
    fn find_by_path(
        &mut self,
        path: &Dn,
        filter: &Filter,
        attributes: &AttributeSelection,
    ) -> Result<Option<Entry>, AdapterError>;

    /// Immediate children of `base` matching `filter`
    fn search_one_level(
        &mut self,
        base: &Dn,
        filter: &Filter,
        attributes: &AttributeSelection,
    ) -> Result<Vec<Entry>, AdapterError>;

    /// `base` and all entries below it matching `filter`
    fn search_subtree(
        &mut self,
        base: &Dn,
        filter: &Filter,
        attributes: &AttributeSelection,
    ) -> Result<Vec<Entry>, AdapterError>;

    /// Create an entry; fails with [`AdapterError::AlreadyExists`] if one is present
    fn create_entry(
        &mut self,
        path: &Dn,
        object_classes: &[String],
        attributes: &Attributes,
    ) -> Result<(), AdapterError>;
}

/// Source of directory sessions
pub trait DirectoryAdapter: Send + Sync {
    /// Open a session; it is released when dropped
    fn open_session(&self) -> Result<Box<dyn DirectorySession + '_>, AdapterError>;
}
