//! Theme, intro and pending-book use cases.

use crate::events::{ChangeEvent, ChangeNotifier};
use crate::model::book::BookId;
use crate::repo::preferences_repo::{PreferencesRepository, Theme};
use crate::repo::RepoResult;
use crate::store::KeyValueStore;
use log::info;
use std::sync::Arc;

/// Preference service emitting `ThemeChanged` on theme writes.
pub struct PreferencesService<S: KeyValueStore> {
    repo: PreferencesRepository<S>,
    notifier: Option<Arc<ChangeNotifier>>,
}

impl<S: KeyValueStore> PreferencesService<S> {
    pub fn new(store: S) -> Self {
        Self {
            repo: PreferencesRepository::new(store),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn theme(&self, system_prefers_dark: bool) -> RepoResult<Theme> {
        self.repo.theme(system_prefers_dark)
    }

    pub fn set_theme(&self, theme: Theme) -> RepoResult<()> {
        self.repo.set_theme(theme)?;
        info!("event=set_theme module=preferences status=ok theme={}", theme.as_str());
        if let Some(notifier) = &self.notifier {
            notifier.emit(ChangeEvent::ThemeChanged { theme });
        }
        Ok(())
    }

    /// Flips the effective theme and returns the new one.
    pub fn toggle_theme(&self, system_prefers_dark: bool) -> RepoResult<Theme> {
        let next = self.theme(system_prefers_dark)?.toggled();
        self.set_theme(next)?;
        Ok(next)
    }

    /// Returns `true` exactly once per installation (until reset).
    pub fn should_show_intro(&self) -> RepoResult<bool> {
        if self.repo.has_seen_intro()? {
            return Ok(false);
        }
        self.repo.mark_intro_seen()?;
        Ok(true)
    }

    pub fn reset_intro(&self) -> RepoResult<()> {
        self.repo.reset_intro()
    }

    pub fn set_pending_book(&self, book_id: BookId) -> RepoResult<()> {
        self.repo.set_pending_book(book_id)
    }

    pub fn take_pending_book(&self) -> RepoResult<Option<BookId>> {
        self.repo.take_pending_book()
    }
}
