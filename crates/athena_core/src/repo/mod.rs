//! Repository layer over the key-value store.
//!
//! # Responsibility
//! - Own the serialized shape of every persisted record.
//! - Isolate key names and JSON details from service orchestration.
//!
//! # Invariants
//! - The active profile is written only as one whole record.
//! - Corrupt records surface as `RepoError::InvalidData` on strict reads and
//!   as the guest/default value on soft reads.

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod preferences_repo;
pub mod profile_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for profile, directory and preference records.
#[derive(Debug)]
pub enum RepoError {
    /// No logged-in profile is stored.
    ProfileNotFound,
    Store(StoreError),
    Serialize(serde_json::Error),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProfileNotFound => write!(f, "no logged-in profile"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Serialize(err) => write!(f, "failed to serialize record: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Serialize(err) => Some(err),
            Self::ProfileNotFound | Self::InvalidData(_) => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl RepoError {
    /// Whether the failure came from the storage backend rather than from
    /// domain state.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Serialize(_))
    }
}
