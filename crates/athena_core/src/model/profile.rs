//! User profile and account directory records.
//!
//! # Responsibility
//! - Define the single persisted per-user record and its mutation helpers.
//! - Define the directory record used to recover state on a later login.
//!
//! # Invariants
//! - `exp` is unsigned; debits go through `try_debit` and never underflow.
//! - `favorites` holds each book id at most once, in insertion order.
//! - A profile is logged in only when id, username and email are all set.

use crate::model::book::BookId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Opaque account identifier.
pub type UserId = Uuid;

/// Identity triple shared by profile and directory records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

/// Last rendered position in one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub current_page: u32,
    pub total_pages: u32,
    /// Unix epoch milliseconds of the render that produced this entry.
    #[serde(rename = "lastRead")]
    pub last_read_ms: i64,
}

impl ReadingProgress {
    /// Completion percentage rounded to the nearest integer.
    pub fn percent_complete(&self) -> u32 {
        if self.total_pages == 0 {
            return 0;
        }
        let ratio = f64::from(self.current_page) / f64::from(self.total_pages);
        (ratio * 100.0).round().min(100.0) as u32
    }
}

/// Active-session profile.
///
/// Every field has a serde default so a partial record still parses; the
/// repository decides whether the identity part is complete enough.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    pub username: String,
    pub email: String,
    /// EXP balance.
    pub exp: u64,
    pub unlocked_books: BTreeSet<BookId>,
    pub favorites: Vec<BookId>,
    pub reading_progress: BTreeMap<BookId, ReadingProgress>,
}

impl UserProfile {
    /// Returns the empty guest profile.
    pub fn guest() -> Self {
        Self::default()
    }

    /// Creates a fresh profile for a new account.
    pub fn new_account(
        identity: UserIdentity,
        starting_exp: u64,
        free_books: impl IntoIterator<Item = BookId>,
    ) -> Self {
        Self {
            id: Some(identity.id),
            username: identity.username,
            email: identity.email,
            exp: starting_exp,
            unlocked_books: free_books.into_iter().collect(),
            favorites: Vec::new(),
            reading_progress: BTreeMap::new(),
        }
    }

    /// Returns the identity when all identity fields are present.
    pub fn identity(&self) -> Option<UserIdentity> {
        let id = self.id?;
        if self.username.trim().is_empty() || self.email.trim().is_empty() {
            return None;
        }
        Some(UserIdentity {
            id,
            username: self.username.clone(),
            email: self.email.clone(),
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.identity().is_some()
    }

    /// Subtracts `amount` when the balance covers it.
    ///
    /// Returns the new balance, or `None` with the balance untouched.
    pub fn try_debit(&mut self, amount: u64) -> Option<u64> {
        self.exp = self.exp.checked_sub(amount)?;
        Some(self.exp)
    }

    /// Adds `amount`, saturating at `u64::MAX`.
    pub fn credit(&mut self, amount: u64) -> u64 {
        self.exp = self.exp.saturating_add(amount);
        self.exp
    }

    pub fn is_favorite(&self, book_id: BookId) -> bool {
        self.favorites.contains(&book_id)
    }

    /// Returns `true` when the book was not yet a favorite.
    pub fn add_favorite(&mut self, book_id: BookId) -> bool {
        if self.is_favorite(book_id) {
            return false;
        }
        self.favorites.push(book_id);
        true
    }

    /// Returns `true` when the book was a favorite.
    pub fn remove_favorite(&mut self, book_id: BookId) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|id| *id != book_id);
        before != self.favorites.len()
    }

    /// Replaces the progress entry for `book_id` wholesale.
    pub fn record_progress(&mut self, book_id: BookId, progress: ReadingProgress) {
        self.reading_progress.insert(book_id, progress);
    }

    /// Copies the mutable fields of a directory record into this profile.
    pub fn restore_from(&mut self, record: &RegisteredUser) {
        self.exp = record.exp;
        self.unlocked_books = record.unlocked_books.clone();
        self.favorites = record.favorites.clone();
        self.reading_progress = record.reading_progress.clone();
    }
}

/// How a directory account was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Local,
    Google,
    Github,
}

impl AuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            _ => None,
        }
    }
}

/// Account directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string; `None` for federated accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    #[serde(default)]
    pub exp: u64,
    #[serde(default)]
    pub unlocked_books: BTreeSet<BookId>,
    #[serde(default)]
    pub favorites: Vec<BookId>,
    #[serde(default)]
    pub reading_progress: BTreeMap<BookId, ReadingProgress>,
    pub created_at_ms: i64,
}

impl RegisteredUser {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    /// Case-insensitive match on username or email.
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        self.username.eq_ignore_ascii_case(identifier) || self.email.eq_ignore_ascii_case(identifier)
    }

    /// Copies the mutable fields and identity edits of `profile` into this
    /// record.
    pub fn absorb(&mut self, profile: &UserProfile) {
        self.username = profile.username.clone();
        self.email = profile.email.clone();
        self.exp = profile.exp;
        self.unlocked_books = profile.unlocked_books.clone();
        self.favorites = profile.favorites.clone();
        self.reading_progress = profile.reading_progress.clone();
    }
}
