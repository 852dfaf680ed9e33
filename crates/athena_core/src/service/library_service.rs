//! Favorites, reading progress and account edits for the active profile.
//!
//! # Responsibility
//! - Back the favorites, owned-library and account views.
//! - Route every write through `ProfileRepository::modify`.
//!
//! # Invariants
//! - Progress entries are replaced wholesale, never merged.
//! - Favorites may only reference catalog books.
//! - Username/email edits stay unique across the account directory.

use crate::catalog::BookCatalog;
use crate::clock::now_epoch_ms;
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::model::book::{BookId, BookRecord};
use crate::model::profile::{ReadingProgress, RegisteredUser, UserProfile};
use crate::repo::profile_repo::ProfileRepository;
use crate::repo::RepoError;
use crate::service::validation::{normalize_email, normalize_username};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Library use-case error.
#[derive(Debug)]
pub enum LibraryError {
    ProfileNotFound,
    BookNotFound(BookId),
    InvalidUsername,
    InvalidEmail,
    /// Another directory account already uses this username or email.
    IdentityTaken,
    InvalidPage { page: u32, total_pages: u32 },
    Repo(RepoError),
}

impl Display for LibraryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProfileNotFound => write!(f, "log in to manage your library"),
            Self::BookNotFound(id) => write!(f, "book not found: {id}"),
            Self::InvalidUsername => write!(f, "username must be at least 3 characters"),
            Self::InvalidEmail => write!(f, "please enter a valid email"),
            Self::IdentityTaken => write!(f, "username or email already exists"),
            Self::InvalidPage { page, total_pages } => {
                write!(f, "page {page} is outside 1..={total_pages}")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LibraryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LibraryError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ProfileNotFound => Self::ProfileNotFound,
            other => Self::Repo(other),
        }
    }
}

/// One reading-progress row joined with its catalog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry<'a> {
    pub book: &'a BookRecord,
    pub progress: ReadingProgress,
    pub percent: u32,
}

/// Account page counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LibraryStats {
    pub exp: u64,
    pub unlocked_count: usize,
    pub favorites_count: usize,
    pub books_started: usize,
}

/// Use-case service for favorites, progress and account edits.
pub struct LibraryService<'a, R: ProfileRepository> {
    repo: R,
    catalog: &'a BookCatalog,
    notifier: Option<Arc<ChangeNotifier>>,
}

impl<'a, R: ProfileRepository> LibraryService<'a, R> {
    pub fn new(repo: R, catalog: &'a BookCatalog) -> Self {
        Self {
            repo,
            catalog,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn is_favorite(&self, book_id: BookId) -> bool {
        self.repo.load().is_favorite(book_id)
    }

    /// Adds a favorite; returns `false` when it already was one.
    pub fn add_favorite(&self, book_id: BookId) -> Result<bool, LibraryError> {
        self.require_book(book_id)?;
        let added = self
            .repo
            .modify(|profile| Ok::<_, LibraryError>(profile.add_favorite(book_id)))?;
        if added {
            self.after_favorites_write(book_id, true);
        }
        Ok(added)
    }

    /// Removes a favorite; returns `false` when it was not one.
    ///
    /// Ids missing from the catalog can still be removed.
    pub fn remove_favorite(&self, book_id: BookId) -> Result<bool, LibraryError> {
        let removed = self
            .repo
            .modify(|profile| Ok::<_, LibraryError>(profile.remove_favorite(book_id)))?;
        if removed {
            self.after_favorites_write(book_id, false);
        }
        Ok(removed)
    }

    /// Flips favorite state and returns the new state.
    pub fn toggle_favorite(&self, book_id: BookId) -> Result<bool, LibraryError> {
        if self.is_favorite(book_id) {
            self.remove_favorite(book_id).map(|_| false)
        } else {
            self.add_favorite(book_id).map(|_| true)
        }
    }

    /// Favorite books in the order they were added; unknown ids are skipped.
    pub fn favorite_books(&self) -> Vec<&'a BookRecord> {
        self.repo
            .load()
            .favorites
            .iter()
            .filter_map(|id| self.catalog.get(*id))
            .collect()
    }

    /// Replaces the progress entry for `book_id`.
    pub fn record_progress(
        &self,
        book_id: BookId,
        current_page: u32,
        total_pages: u32,
    ) -> Result<ReadingProgress, LibraryError> {
        self.require_book(book_id)?;
        if current_page == 0 || current_page > total_pages {
            return Err(LibraryError::InvalidPage {
                page: current_page,
                total_pages,
            });
        }
        let progress = ReadingProgress {
            current_page,
            total_pages,
            last_read_ms: now_epoch_ms(),
        };
        self.repo.modify(|profile| {
            profile.record_progress(book_id, progress);
            Ok::<_, LibraryError>(())
        })?;
        Ok(progress)
    }

    /// Progress rows for catalog books, most recently read first.
    pub fn progress_entries(&self) -> Vec<ProgressEntry<'a>> {
        let mut entries = self
            .repo
            .load()
            .reading_progress
            .into_iter()
            .filter_map(|(book_id, progress)| {
                self.catalog.get(book_id).map(|book| ProgressEntry {
                    book,
                    progress,
                    percent: progress.percent_complete(),
                })
            })
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| {
            b.progress
                .last_read_ms
                .cmp(&a.progress.last_read_ms)
                .then(a.book.id.cmp(&b.book.id))
        });
        entries
    }

    pub fn stats(&self) -> LibraryStats {
        let profile = self.repo.load();
        LibraryStats {
            exp: profile.exp,
            unlocked_count: profile.unlocked_books.len(),
            favorites_count: profile.favorites.len(),
            books_started: profile.reading_progress.len(),
        }
    }

    /// Changes the active username.
    pub fn update_username(&self, username: &str) -> Result<String, LibraryError> {
        let username = normalize_username(username).ok_or(LibraryError::InvalidUsername)?;
        self.update_identity(|profile, users| {
            if users.iter().any(|user| {
                Some(user.id) != profile.id && user.username.eq_ignore_ascii_case(&username)
            }) {
                return Err(LibraryError::IdentityTaken);
            }
            profile.username = username.clone();
            Ok(())
        })?;
        Ok(username)
    }

    /// Changes the active email.
    pub fn update_email(&self, email: &str) -> Result<String, LibraryError> {
        let email = normalize_email(email).ok_or(LibraryError::InvalidEmail)?;
        self.update_identity(|profile, users| {
            if users
                .iter()
                .any(|user| Some(user.id) != profile.id && user.email.eq_ignore_ascii_case(&email))
            {
                return Err(LibraryError::IdentityTaken);
            }
            profile.email = email.clone();
            Ok(())
        })?;
        Ok(email)
    }

    fn update_identity(
        &self,
        edit: impl FnOnce(&mut UserProfile, &[RegisteredUser]) -> Result<(), LibraryError>,
    ) -> Result<(), LibraryError> {
        let users = self.repo.registered_users()?;
        self.repo.modify(|profile| edit(profile, &users))?;
        self.sync_directory();
        info!("event=identity_update module=library status=ok");
        self.notify(ChangeEvent::ProfileChanged);
        Ok(())
    }

    fn require_book(&self, book_id: BookId) -> Result<&'a BookRecord, LibraryError> {
        self.catalog
            .get(book_id)
            .ok_or(LibraryError::BookNotFound(book_id))
    }

    fn after_favorites_write(&self, book_id: BookId, favorite: bool) {
        self.sync_directory();
        self.notify(ChangeEvent::FavoritesChanged { book_id, favorite });
    }

    fn sync_directory(&self) {
        if let Err(err) = self.repo.sync_registered() {
            warn!("event=directory_sync module=library status=error error={err}");
        }
    }

    fn notify(&self, event: ChangeEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.emit(event);
        }
    }
}
