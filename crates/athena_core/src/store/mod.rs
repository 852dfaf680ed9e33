//! Flat key-value persistence shared by every core component.
//!
//! # Responsibility
//! - Define the synchronous string-keyed store contract.
//! - Name the well-known record keys in one place.
//!
//! # Invariants
//! - Every key holds one independently written value; there is no
//!   multi-key transaction.
//! - Writes are last-write-wins.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

/// Active-session user profile record.
pub const KEY_ACTIVE_USER: &str = "athena_user";
/// Directory of registered accounts (JSON array).
pub const KEY_REGISTERED_USERS: &str = "athena_registered_users";
/// Logged-in session flag.
pub const KEY_SESSION_TOKEN: &str = "athena_token";
/// UI theme preference, `dark` or `light`.
pub const KEY_THEME: &str = "athena_theme";
/// One-shot intro flag.
pub const KEY_HAS_SEEN_INTRO: &str = "athena_has_seen_intro";
/// Book id to resume opening after an interstitial login.
pub const KEY_PENDING_BOOK: &str = "pending_book";

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failure.
#[derive(Debug)]
pub enum StoreError {
    /// Key is empty after trimming.
    InvalidKey,
    /// Write would exceed the configured capacity.
    QuotaExceeded { key: String, limit_bytes: usize },
    /// Underlying database failure.
    Backend(DbError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "store key must not be empty"),
            Self::QuotaExceeded { key, limit_bytes } => {
                write!(f, "store quota of {limit_bytes} bytes exceeded writing `{key}`")
            }
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Backend(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Backend(DbError::Sqlite(value))
    }
}

/// Synchronous, string-keyed persistent map.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    fn remove(&self, key: &str) -> StoreResult<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        (**self).remove(key)
    }
}

pub(crate) fn validate_key(key: &str) -> StoreResult<&str> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey);
    }
    Ok(key)
}
