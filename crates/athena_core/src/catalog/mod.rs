//! Read-only book catalog.
//!
//! # Responsibility
//! - Load and validate catalog documents into `BookRecord`s.
//! - Answer lookups by id, category, genre and tier.
//!
//! # Invariants
//! - Book ids are unique within one catalog.
//! - Lookup results preserve catalog document order.

use crate::model::book::{BookId, BookRecord, BookTier, BookValidationError, RawBookRecord};
use log::{info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod location;

pub use location::{resolve_pdf_location, PdfLocation};

const BUILTIN_CATALOG_JSON: &str = include_str!("books.json");
const CATEGORY_FEATURED: &str = "featured";
const CATEGORY_KIDS: &str = "kids";

/// Catalog loading failure.
#[derive(Debug)]
pub enum CatalogError {
    Malformed(serde_json::Error),
    InvalidBook(BookValidationError),
    DuplicateId(BookId),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed catalog document: {err}"),
            Self::InvalidBook(err) => write!(f, "{err}"),
            Self::DuplicateId(id) => write!(f, "duplicate book id in catalog: {id}"),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::InvalidBook(err) => Some(err),
            Self::DuplicateId(_) => None,
        }
    }
}

impl From<BookValidationError> for CatalogError {
    fn from(value: BookValidationError) -> Self {
        Self::InvalidBook(value)
    }
}

/// Immutable set of validated books.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookCatalog {
    books: Vec<BookRecord>,
}

impl BookCatalog {
    /// Validates `raw` entries into a catalog.
    pub fn from_raw(raw: Vec<RawBookRecord>) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        let mut books = Vec::with_capacity(raw.len());
        for entry in raw {
            let book = BookRecord::try_from(entry)?;
            if !seen.insert(book.id) {
                return Err(CatalogError::DuplicateId(book.id));
            }
            books.push(book);
        }
        Ok(Self { books })
    }

    /// Parses and validates a JSON array of catalog entries.
    pub fn from_json(document: &str) -> Result<Self, CatalogError> {
        let raw: Vec<RawBookRecord> =
            serde_json::from_str(document).map_err(CatalogError::Malformed)?;
        let catalog = Self::from_raw(raw).inspect_err(|err| {
            warn!("event=catalog_load module=catalog status=error error={err}");
        })?;
        info!(
            "event=catalog_load module=catalog status=ok books={} premium={}",
            catalog.len(),
            catalog.premium_books().len()
        );
        Ok(catalog)
    }

    /// Returns the catalog bundled with the application.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG_JSON)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn all(&self) -> &[BookRecord] {
        &self.books
    }

    pub fn get(&self, id: BookId) -> Option<&BookRecord> {
        self.books.iter().find(|book| book.id == id)
    }

    pub fn by_category(&self, category: &str) -> Vec<&BookRecord> {
        self.filter(|book| book.category.eq_ignore_ascii_case(category))
    }

    pub fn by_genre(&self, genre: &str) -> Vec<&BookRecord> {
        self.filter(|book| book.genre.eq_ignore_ascii_case(genre))
    }

    pub fn by_tier(&self, tier: BookTier) -> Vec<&BookRecord> {
        self.filter(|book| book.tier == tier)
    }

    pub fn free_books(&self) -> Vec<&BookRecord> {
        self.by_tier(BookTier::Free)
    }

    pub fn premium_books(&self) -> Vec<&BookRecord> {
        self.by_tier(BookTier::Premium)
    }

    /// Ids of every free book, used to bootstrap new accounts.
    pub fn free_book_ids(&self) -> BTreeSet<BookId> {
        self.free_books().into_iter().map(|book| book.id).collect()
    }

    /// Free books shown in the home page recommendations row.
    pub fn featured(&self) -> Vec<&BookRecord> {
        self.filter(|book| book.is_free() && book.category == CATEGORY_FEATURED)
    }

    /// Free books shown in the kids row.
    pub fn kids(&self) -> Vec<&BookRecord> {
        self.filter(|book| book.is_free() && book.category == CATEGORY_KIDS)
    }

    /// Case-insensitive substring search over title and author.
    ///
    /// Blank queries match nothing.
    pub fn search(&self, text: &str) -> Vec<&BookRecord> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.filter(|book| {
            book.title.to_lowercase().contains(&needle)
                || book.author.to_lowercase().contains(&needle)
        })
    }

    fn filter(&self, predicate: impl Fn(&BookRecord) -> bool) -> Vec<&BookRecord> {
        self.books.iter().filter(|book| predicate(book)).collect()
    }
}
