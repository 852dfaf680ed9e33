//! Small per-installation preference records.

use crate::model::book::BookId;
use crate::repo::RepoResult;
use crate::store::{KeyValueStore, KEY_HAS_SEEN_INTRO, KEY_PENDING_BOOK, KEY_THEME};
use log::warn;

/// UI color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// Theme, intro flag and pending-book marker.
pub struct PreferencesRepository<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> PreferencesRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Stored theme; `None` when the user never chose one.
    pub fn stored_theme(&self) -> RepoResult<Option<Theme>> {
        Ok(self
            .store
            .get(KEY_THEME)?
            .and_then(|value| Theme::parse(&value)))
    }

    /// Effective theme: the stored choice, else the system preference.
    pub fn theme(&self, system_prefers_dark: bool) -> RepoResult<Theme> {
        Ok(self.stored_theme()?.unwrap_or(if system_prefers_dark {
            Theme::Dark
        } else {
            Theme::Light
        }))
    }

    pub fn set_theme(&self, theme: Theme) -> RepoResult<()> {
        self.store.set(KEY_THEME, theme.as_str())?;
        Ok(())
    }

    pub fn has_seen_intro(&self) -> RepoResult<bool> {
        Ok(self.store.get(KEY_HAS_SEEN_INTRO)?.as_deref() == Some("true"))
    }

    pub fn mark_intro_seen(&self) -> RepoResult<()> {
        self.store.set(KEY_HAS_SEEN_INTRO, "true")?;
        Ok(())
    }

    pub fn reset_intro(&self) -> RepoResult<()> {
        self.store.remove(KEY_HAS_SEEN_INTRO)?;
        Ok(())
    }

    /// Remembers a book the user tried to open before logging in.
    pub fn set_pending_book(&self, book_id: BookId) -> RepoResult<()> {
        self.store.set(KEY_PENDING_BOOK, &book_id.to_string())?;
        Ok(())
    }

    /// Reads and clears the pending-book marker.
    pub fn take_pending_book(&self) -> RepoResult<Option<BookId>> {
        let Some(raw) = self.store.get(KEY_PENDING_BOOK)? else {
            return Ok(None);
        };
        self.store.remove(KEY_PENDING_BOOK)?;
        match raw.trim().parse::<BookId>() {
            Ok(book_id) => Ok(Some(book_id)),
            Err(_) => {
                warn!("event=pending_book_take module=repo status=degraded error_code=unparsable_book_id");
                Ok(None)
            }
        }
    }
}
