//! Book catalog record.
//!
//! # Responsibility
//! - Define the validated, immutable book record consumed by every service.
//! - Convert loosely shaped catalog input into that record exactly once.
//!
//! # Invariants
//! - `id` is positive.
//! - Free books cost 0 EXP; premium books cost more than 0 EXP.
//! - Display defaults are applied at construction, never by consumers.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable catalog identifier.
pub type BookId = u32;

const DEFAULT_AUTHOR: &str = "Unknown Author";
const DEFAULT_DESCRIPTION: &str = "No description available.";
const DEFAULT_CLASSIFICATION: &str = "general";

/// Access tier of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookTier {
    /// Readable by every logged-in user.
    Free,
    /// Readable after spending EXP to unlock.
    Premium,
}

impl BookTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

/// Validated catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookRecord {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub description: String,
    /// Cover image reference; empty when the catalog has none.
    pub cover_ref: String,
    /// Unresolved PDF location as written in the catalog.
    pub pdf_location: String,
    pub tier: BookTier,
    /// Unlock price in EXP. Always 0 for free books.
    pub price: u64,
    pub category: String,
    pub genre: String,
    pub popularity: u32,
}

impl BookRecord {
    pub fn is_free(&self) -> bool {
        self.tier == BookTier::Free
    }
}

/// Catalog input shape before validation.
///
/// Field names follow the catalog JSON documents (`expCost`, `pdfFile`,
/// `type`), and every field except `id`, `title` and `type` may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBookRecord {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub pdf_file: Option<String>,
    #[serde(rename = "type")]
    pub tier: Option<BookTier>,
    #[serde(default)]
    pub exp_cost: Option<u64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub popularity: Option<u32>,
}

/// Validation failure for one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookValidationError {
    NonPositiveId(i64),
    EmptyTitle(BookId),
    MissingTier(BookId),
    MissingPdfLocation(BookId),
    PricedFreeBook { id: BookId, price: u64 },
    UnpricedPremiumBook(BookId),
}

impl Display for BookValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveId(id) => write!(f, "book id must be a positive integer, got {id}"),
            Self::EmptyTitle(id) => write!(f, "book {id} has an empty title"),
            Self::MissingTier(id) => write!(f, "book {id} has no tier"),
            Self::MissingPdfLocation(id) => write!(f, "book {id} has no pdf location"),
            Self::PricedFreeBook { id, price } => {
                write!(f, "free book {id} must cost 0 EXP, got {price}")
            }
            Self::UnpricedPremiumBook(id) => write!(f, "premium book {id} must cost more than 0 EXP"),
        }
    }
}

impl Error for BookValidationError {}

impl TryFrom<RawBookRecord> for BookRecord {
    type Error = BookValidationError;

    fn try_from(raw: RawBookRecord) -> Result<Self, Self::Error> {
        let id = BookId::try_from(raw.id)
            .ok()
            .filter(|id| *id > 0)
            .ok_or(BookValidationError::NonPositiveId(raw.id))?;

        let title = raw.title.trim().to_string();
        if title.is_empty() {
            return Err(BookValidationError::EmptyTitle(id));
        }

        let tier = raw.tier.ok_or(BookValidationError::MissingTier(id))?;
        let pdf_location = non_blank(raw.pdf_file)
            .ok_or(BookValidationError::MissingPdfLocation(id))?;

        let price = raw.exp_cost.unwrap_or(0);
        match tier {
            BookTier::Free if price != 0 => {
                return Err(BookValidationError::PricedFreeBook { id, price })
            }
            BookTier::Premium if price == 0 => {
                return Err(BookValidationError::UnpricedPremiumBook(id))
            }
            _ => {}
        }

        let category = non_blank(raw.category);
        let genre = non_blank(raw.genre);

        Ok(Self {
            id,
            title,
            author: non_blank(raw.author).unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            description: non_blank(raw.description)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            cover_ref: non_blank(raw.cover).unwrap_or_default(),
            pdf_location,
            tier,
            price,
            category: category
                .clone()
                .or_else(|| genre.clone())
                .unwrap_or_else(|| DEFAULT_CLASSIFICATION.to_string()),
            genre: genre
                .or(category)
                .unwrap_or_else(|| DEFAULT_CLASSIFICATION.to_string()),
            popularity: raw.popularity.unwrap_or(0),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
