//! Error types for directory provisioning and resolution

use crate::adapter::AdapterError;
use std::fmt;
use thiserror::Error;

/// The provisioning step that was executing when a write failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStep {
    /// Archive container
    Archive,
    /// Roles container below an archive
    RolesContainer,
    /// Role container below the roles container
    Role,
    /// Participation record below a role
    Participation,
    /// Group-keyed participation record below a role
    GroupParticipation,
    /// Global group container
    GlobalGroup,
    /// Membership record below a global group
    GroupMembership,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Archive => "archive",
            Self::RolesContainer => "roles container",
            Self::Role => "role",
            Self::Participation => "role participation",
            Self::GroupParticipation => "group role participation",
            Self::GlobalGroup => "global group",
            Self::GroupMembership => "group membership",
        };
        f.write_str(name)
    }
}

/// Directory core errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Malformed template, composed path or configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Directory returned data that could not be interpreted
    #[error("Directory read error at {path}: {reason}")]
    Read {
        /// Offending path
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Entry creation failed for a reason other than "already exists"
    #[error("Directory write error creating {step} {path}: {source}")]
    Write {
        /// Step that failed
        step: ProvisionStep,
        /// Path that could not be created
        path: String,
        /// Underlying adapter failure
        #[source]
        source: AdapterError,
    },

    /// Caller referenced a principal or container that does not exist
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The directory could not be reached or the session failed
    #[error("Directory connection error: {0}")]
    Connection(String),
}

impl DirectoryError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        DirectoryError::Configuration(msg.into())
    }

    /// Create a read error naming the offending path
    pub fn read(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        DirectoryError::Read {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        DirectoryError::InvalidParameter(msg.into())
    }

    /// Classify an adapter failure while reading at `path`
    ///
    /// Transport failures stay connection errors; a refused or otherwise
    /// failed read becomes a read error naming the path.
    pub fn read_failure(path: impl fmt::Display, err: AdapterError) -> Self {
        match err {
            AdapterError::Connection(msg) => DirectoryError::Connection(msg),
            other => DirectoryError::read(path, other.to_string()),
        }
    }
}

/// Opening a session can only fail at the transport level.
impl From<AdapterError> for DirectoryError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Connection(msg) => DirectoryError::Connection(msg),
            other => DirectoryError::Connection(other.to_string()),
        }
    }
}

/// Result type for directory operations
pub type Result<T> = std::result::Result<T, DirectoryError>;
