//! One open reader view.
//!
//! # Responsibility
//! - Open a book only for a logged-in profile that may read it.
//! - Route navigation, zoom and render completions into the sequencer.
//! - Keep session-local bookmarks, contents and the checkpoint quiz.
//!
//! # Invariants
//! - Bookmarks are never persisted.
//! - The quiz reward is credited at most once per finished quiz.

use crate::catalog::resolve_pdf_location;
use crate::catalog::BookCatalog;
use crate::clock::now_epoch_ms;
use crate::config::{DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_ZOOM};
use crate::events::ChangeNotifier;
use crate::model::book::{BookId, BookRecord};
use crate::reader::engine::{
    check_pdf_header, DocumentError, DocumentSource, PdfDocument, PdfEngine, RenderError,
};
use crate::reader::quiz::{AnswerFeedback, CheckpointQuiz, QuizResult};
use crate::reader::sequencer::{PageRequest, PaginationSequencer, RenderEvent};
use crate::reader::ReaderError;
use crate::repo::preferences_repo::PreferencesRepository;
use crate::repo::profile_repo::ProfileRepository;
use crate::service::entitlement_service::{is_unlocked, EntitlementService};
use crate::service::library_service::LibraryService;
use crate::store::KeyValueStore;
use log::{info, warn};
use std::sync::Arc;

const TOC_STRIDE: u32 = 10;

/// Reader tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReaderOptions {
    pub checkpoint_interval: u32,
    pub zoom: f32,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            zoom: DEFAULT_ZOOM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub page: u32,
    pub created_at_ms: i64,
    pub note: String,
}

/// Table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub page: u32,
    pub label: String,
    /// The current page falls in this entry's range.
    pub active: bool,
}

/// Reader keyboard commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderCommand {
    PreviousPage,
    NextPage,
    FirstPage,
    LastPage,
    ZoomIn,
    ZoomOut,
    ToggleFavorite,
}

impl ReaderCommand {
    /// Maps a keyboard key name to a command.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowLeft" | "PageUp" => Some(Self::PreviousPage),
            "ArrowRight" | "PageDown" | " " => Some(Self::NextPage),
            "Home" => Some(Self::FirstPage),
            "End" => Some(Self::LastPage),
            "+" | "=" => Some(Self::ZoomIn),
            "-" => Some(Self::ZoomOut),
            "f" => Some(Self::ToggleFavorite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Page(PageRequest),
    Favorite(bool),
}

/// Finished quiz with the credited reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizOutcome {
    pub result: QuizResult,
    pub balance: u64,
    pub next_checkpoint_page: u32,
}

/// Login and entitlement gate for opening `book_id`.
///
/// Guests get `LoginRequired` and the id is stored as the pending book so
/// the open can resume after login.
pub fn check_access<'c, R: ProfileRepository, S: KeyValueStore>(
    book_id: BookId,
    catalog: &'c BookCatalog,
    profiles: &R,
    preferences: &PreferencesRepository<S>,
) -> Result<&'c BookRecord, ReaderError> {
    let book = catalog
        .get(book_id)
        .ok_or(ReaderError::BookNotFound(book_id))?;

    let profile = profiles.load();
    if !profile.is_logged_in() {
        if let Err(err) = preferences.set_pending_book(book_id) {
            warn!("event=reader_open module=reader status=degraded book_id={book_id} error_code=pending_book_not_saved error={err}");
        }
        info!("event=reader_open module=reader status=rejected book_id={book_id} reason=login_required");
        return Err(ReaderError::LoginRequired(book_id));
    }
    if !is_unlocked(book, &profile) {
        info!("event=reader_open module=reader status=rejected book_id={book_id} reason=locked");
        return Err(ReaderError::BookLocked {
            book_id,
            price: book.price,
        });
    }
    Ok(book)
}

/// Reader state for one open book.
pub struct ReaderSession<'a, R: ProfileRepository> {
    catalog: &'a BookCatalog,
    profiles: R,
    book: &'a BookRecord,
    sequencer: PaginationSequencer<Box<dyn PdfDocument>>,
    bookmarks: Vec<Bookmark>,
    quiz: Option<CheckpointQuiz>,
    notifier: Option<Arc<ChangeNotifier>>,
}

impl<'a, R: ProfileRepository> ReaderSession<'a, R> {
    /// Opens `book_id` and requests page 1.
    ///
    /// # Errors
    /// - `BookNotFound` for ids missing from the catalog.
    /// - `LoginRequired` for guests; the id is stored as the pending book.
    /// - `BookLocked` for premium books the profile has not unlocked.
    /// - `MissingPdfLocation` / `DocumentLoadFailed` when no document could
    ///   be opened.
    pub fn open<S: KeyValueStore>(
        book_id: BookId,
        catalog: &'a BookCatalog,
        profiles: R,
        preferences: &PreferencesRepository<S>,
        engine: &dyn PdfEngine,
        source: &dyn DocumentSource,
        options: ReaderOptions,
    ) -> Result<Self, ReaderError> {
        let book = check_access(book_id, catalog, &profiles, preferences)?;

        let location = resolve_pdf_location(&book.pdf_location)
            .ok_or(ReaderError::MissingPdfLocation(book_id))?;
        let load_failed = |err: DocumentError| ReaderError::DocumentLoadFailed {
            book_id,
            source: err,
        };
        let bytes = source.fetch(&location).map_err(load_failed)?;
        check_pdf_header(&bytes).map_err(load_failed)?;
        let document = engine.open_document(bytes).map_err(load_failed)?;
        if document.page_count() == 0 {
            return Err(load_failed(DocumentError::Invalid(
                "document has no pages".to_string(),
            )));
        }

        let mut sequencer =
            PaginationSequencer::new(book_id, document, options.checkpoint_interval, options.zoom);
        info!(
            "event=reader_open module=reader status=ok book_id={book_id} total_pages={}",
            sequencer.total_pages()
        );
        sequencer.request_page(1);

        Ok(Self {
            catalog,
            profiles,
            book,
            sequencer,
            bookmarks: Vec::new(),
            quiz: None,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn book(&self) -> &'a BookRecord {
        self.book
    }

    pub fn sequencer(&self) -> &PaginationSequencer<Box<dyn PdfDocument>> {
        &self.sequencer
    }

    pub fn current_page(&self) -> u32 {
        self.sequencer.current_page()
    }

    pub fn total_pages(&self) -> u32 {
        self.sequencer.total_pages()
    }

    /// Page stored by an earlier session, if any.
    pub fn resume_page(&self) -> Option<u32> {
        self.profiles
            .load()
            .reading_progress
            .get(&self.book.id)
            .map(|progress| progress.current_page.min(self.total_pages()))
    }

    pub fn go_to_page(&mut self, page: u32) -> PageRequest {
        self.sequencer.request_page(page)
    }

    pub fn set_zoom(&mut self, scale: f32) -> PageRequest {
        self.sequencer.set_zoom(scale)
    }

    /// Delivers the in-flight render's outcome.
    pub fn complete_render(&mut self, outcome: Result<(), RenderError>) -> Option<RenderEvent> {
        self.sequencer.complete_render(outcome, &self.profiles)
    }

    pub fn dispatch(&mut self, command: ReaderCommand) -> Result<CommandOutcome, ReaderError> {
        let request = match command {
            ReaderCommand::PreviousPage => self.sequencer.previous_page(),
            ReaderCommand::NextPage => self.sequencer.next_page(),
            ReaderCommand::FirstPage => self.sequencer.first_page(),
            ReaderCommand::LastPage => self.sequencer.last_page(),
            ReaderCommand::ZoomIn => self.sequencer.zoom_in(),
            ReaderCommand::ZoomOut => self.sequencer.zoom_out(),
            ReaderCommand::ToggleFavorite => {
                return self.toggle_favorite().map(CommandOutcome::Favorite)
            }
        };
        Ok(CommandOutcome::Page(request))
    }

    pub fn is_favorite(&self) -> bool {
        self.profiles.load().is_favorite(self.book.id)
    }

    pub fn toggle_favorite(&self) -> Result<bool, ReaderError> {
        Ok(self.library().toggle_favorite(self.book.id)?)
    }

    /// Bookmarks the current page; `note` defaults to "Bookmark at page N".
    pub fn add_bookmark(&mut self, note: Option<&str>) -> &Bookmark {
        let page = self.current_page();
        let note = note
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Bookmark at page {page}"));
        let index = self.bookmarks.len();
        self.bookmarks.push(Bookmark {
            page,
            created_at_ms: now_epoch_ms(),
            note,
        });
        &self.bookmarks[index]
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn remove_bookmark(&mut self, index: usize) -> Result<Bookmark, ReaderError> {
        if index >= self.bookmarks.len() {
            return Err(ReaderError::BookmarkNotFound(index));
        }
        Ok(self.bookmarks.remove(index))
    }

    pub fn go_to_bookmark(&mut self, index: usize) -> Result<PageRequest, ReaderError> {
        let page = self
            .bookmarks
            .get(index)
            .map(|bookmark| bookmark.page)
            .ok_or(ReaderError::BookmarkNotFound(index))?;
        Ok(self.sequencer.request_page(page))
    }

    /// One entry every ten pages, with the current range marked active.
    pub fn table_of_contents(&self) -> Vec<TocEntry> {
        let active_start = (self.current_page() - 1) / TOC_STRIDE * TOC_STRIDE + 1;
        (1..=self.total_pages())
            .step_by(TOC_STRIDE as usize)
            .map(|page| TocEntry {
                page,
                label: format!("Page {page}"),
                active: page == active_start,
            })
            .collect()
    }

    pub fn start_quiz(&mut self) -> Result<&CheckpointQuiz, ReaderError> {
        if !self.sequencer.checkpoint_available() {
            return Err(ReaderError::NoCheckpoint);
        }
        Ok(self.quiz.insert(CheckpointQuiz::default()))
    }

    pub fn quiz(&self) -> Option<&CheckpointQuiz> {
        self.quiz.as_ref()
    }

    pub fn answer_quiz(&mut self, option: usize) -> Result<AnswerFeedback, ReaderError> {
        let quiz = self.quiz.as_mut().ok_or(ReaderError::QuizNotStarted)?;
        Ok(quiz.answer(option)?)
    }

    /// Moves to the next question; returns whether one remains.
    pub fn advance_quiz(&mut self) -> Result<bool, ReaderError> {
        let quiz = self.quiz.as_mut().ok_or(ReaderError::QuizNotStarted)?;
        Ok(quiz.advance())
    }

    /// Scores the quiz, credits the reward and dismisses the checkpoint.
    pub fn finish_quiz(&mut self) -> Result<QuizOutcome, ReaderError> {
        let result = self
            .quiz
            .as_ref()
            .ok_or(ReaderError::QuizNotStarted)?
            .finish()?;
        let balance = self.entitlements().award_currency(result.reward)?;
        self.quiz = None;
        let next_checkpoint_page = self.sequencer.acknowledge_checkpoint();
        info!(
            "event=quiz_finish module=reader status=ok book_id={} percent={} reward={}",
            self.book.id, result.percent, result.reward
        );
        Ok(QuizOutcome {
            result,
            balance,
            next_checkpoint_page,
        })
    }

    /// Abandons any quiz and dismisses the checkpoint without a reward.
    pub fn close_quiz(&mut self) -> u32 {
        self.quiz = None;
        self.sequencer.acknowledge_checkpoint()
    }

    fn library(&self) -> LibraryService<'a, &R> {
        let service = LibraryService::new(&self.profiles, self.catalog);
        match &self.notifier {
            Some(notifier) => service.with_notifier(Arc::clone(notifier)),
            None => service,
        }
    }

    fn entitlements(&self) -> EntitlementService<'a, &R> {
        let service = EntitlementService::new(&self.profiles, self.catalog);
        match &self.notifier {
            Some(notifier) => service.with_notifier(Arc::clone(notifier)),
            None => service,
        }
    }
}
