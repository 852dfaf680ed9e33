//! Book reader: document collaborator seams, page sequencing, session state
//! and checkpoint quizzes.
//!
//! # Responsibility
//! - Gate book opening on login and entitlement.
//! - Drive single-flight page rendering for the open document.
//! - Hold session-local reader state (bookmarks, contents, quiz).
//!
//! # Invariants
//! - Reader failures are reported as values; nothing here panics the host.

use crate::model::book::BookId;
use crate::reader::engine::DocumentError;
use crate::reader::quiz::QuizError;
use crate::repo::RepoError;
use crate::service::entitlement_service::EntitlementError;
use crate::service::library_service::LibraryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod engine;
pub mod quiz;
pub mod sequencer;
pub mod session;

pub use sequencer::{MAX_ZOOM, MIN_ZOOM, ZOOM_STEP};

/// Reader use-case error.
#[derive(Debug)]
pub enum ReaderError {
    BookNotFound(BookId),
    /// Guest tried to open a book; the id was stored as the pending book.
    LoginRequired(BookId),
    BookLocked { book_id: BookId, price: u64 },
    MissingPdfLocation(BookId),
    DocumentLoadFailed { book_id: BookId, source: DocumentError },
    BookmarkNotFound(usize),
    /// No checkpoint is currently available.
    NoCheckpoint,
    QuizNotStarted,
    Quiz(QuizError),
    Library(LibraryError),
    Entitlement(EntitlementError),
    Repo(RepoError),
}

impl Display for ReaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BookNotFound(id) => write!(f, "book not found: {id}"),
            Self::LoginRequired(_) => write!(f, "please log in to read this book"),
            Self::BookLocked { book_id, price } => {
                write!(f, "book {book_id} is locked; unlock it for {price} EXP")
            }
            Self::MissingPdfLocation(id) => write!(f, "book {id} has no PDF location"),
            Self::DocumentLoadFailed { book_id, source } => {
                write!(f, "failed to load book {book_id}: {source}")
            }
            Self::BookmarkNotFound(index) => write!(f, "bookmark {index} does not exist"),
            Self::NoCheckpoint => write!(f, "no comprehension check is available yet"),
            Self::QuizNotStarted => write!(f, "no quiz in progress"),
            Self::Quiz(err) => write!(f, "{err}"),
            Self::Library(err) => write!(f, "{err}"),
            Self::Entitlement(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DocumentLoadFailed { source, .. } => Some(source),
            Self::Quiz(err) => Some(err),
            Self::Library(err) => Some(err),
            Self::Entitlement(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QuizError> for ReaderError {
    fn from(value: QuizError) -> Self {
        Self::Quiz(value)
    }
}

impl From<LibraryError> for ReaderError {
    fn from(value: LibraryError) -> Self {
        Self::Library(value)
    }
}

impl From<EntitlementError> for ReaderError {
    fn from(value: EntitlementError) -> Self {
        Self::Entitlement(value)
    }
}

impl From<RepoError> for ReaderError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}
