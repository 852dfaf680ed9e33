//! Book access gating, purchases and EXP awards.
//!
//! # Responsibility
//! - Decide whether a book is readable for a profile.
//! - Run purchases as one read-modify-write of the active profile.
//! - Build the shop and owned-library listings.
//!
//! # Invariants
//! - Free books are always unlocked; the unlocked set is consulted only for
//!   premium books.
//! - A purchase never drives the balance negative and never charges twice.
//! - Change events are emitted only after the profile write succeeded.

use crate::catalog::BookCatalog;
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::model::book::{BookId, BookRecord, BookTier};
use crate::model::profile::UserProfile;
use crate::repo::profile_repo::ProfileRepository;
use crate::repo::RepoError;
use log::{info, warn};
use std::cmp::Reverse;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Returns whether `profile` may read `book`.
pub fn is_unlocked(book: &BookRecord, profile: &UserProfile) -> bool {
    match book.tier {
        BookTier::Free => true,
        BookTier::Premium => profile.unlocked_books.contains(&book.id),
    }
}

/// Entitlement use-case error.
#[derive(Debug)]
pub enum EntitlementError {
    /// Guest session; nothing was mutated.
    ProfileNotFound,
    BookNotFound(BookId),
    /// Book is already readable; balance unchanged.
    AlreadyOwned(BookId),
    InsufficientFunds {
        book_id: BookId,
        balance: u64,
        price: u64,
    },
    /// Award amounts must be positive.
    InvalidAmount,
    Repo(RepoError),
}

impl Display for EntitlementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProfileNotFound => write!(f, "log in to unlock books"),
            Self::BookNotFound(id) => write!(f, "book not found: {id}"),
            Self::AlreadyOwned(id) => write!(f, "book {id} is already unlocked"),
            Self::InsufficientFunds {
                book_id,
                balance,
                price,
            } => write!(
                f,
                "not enough EXP for book {book_id}: balance {balance}, price {price}"
            ),
            Self::InvalidAmount => write!(f, "EXP award must be greater than zero"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EntitlementError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EntitlementError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ProfileNotFound => Self::ProfileNotFound,
            other => Self::Repo(other),
        }
    }
}

/// Result of a committed purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurchaseReceipt {
    pub book_id: BookId,
    pub price: u64,
    /// Balance after the debit.
    pub balance: u64,
}

/// Shop ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShopSort {
    /// Highest id first.
    #[default]
    Newest,
    PriceLowToHigh,
    PriceHighToLow,
    Popular,
}

impl ShopSort {
    /// Parses the shop's sort selector values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "newest" => Some(Self::Newest),
            "exp-low" => Some(Self::PriceLowToHigh),
            "exp-high" => Some(Self::PriceHighToLow),
            "popular" => Some(Self::Popular),
            _ => None,
        }
    }
}

/// Shop listing filter.
#[derive(Debug, Clone, Default)]
pub struct ShopQuery {
    /// Genre filter; `None` lists every genre.
    pub genre: Option<String>,
    pub sort: ShopSort,
}

/// One purchasable book as shown in the shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopOffer<'a> {
    pub book: &'a BookRecord,
    pub can_afford: bool,
}

/// Use-case service for access checks, purchases and EXP awards.
pub struct EntitlementService<'a, R: ProfileRepository> {
    repo: R,
    catalog: &'a BookCatalog,
    notifier: Option<Arc<ChangeNotifier>>,
}

impl<'a, R: ProfileRepository> EntitlementService<'a, R> {
    pub fn new(repo: R, catalog: &'a BookCatalog) -> Self {
        Self {
            repo,
            catalog,
            notifier: None,
        }
    }

    /// Emits change events through `notifier` after successful writes.
    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Current EXP balance; 0 for guests.
    pub fn balance(&self) -> u64 {
        self.repo.load().exp
    }

    /// Access check against the stored profile.
    ///
    /// Unknown books are never unlocked.
    pub fn is_book_unlocked(&self, book_id: BookId) -> bool {
        self.catalog
            .get(book_id)
            .is_some_and(|book| is_unlocked(book, &self.repo.load()))
    }

    /// Spends EXP to unlock a premium book.
    ///
    /// # Errors
    /// - `ProfileNotFound` for guests.
    /// - `BookNotFound` for ids missing from the catalog.
    /// - `AlreadyOwned` when the book is free or already unlocked.
    /// - `InsufficientFunds` when the balance is below the price.
    /// - `Repo` when the profile could not be read or written; nothing is
    ///   persisted in that case.
    pub fn purchase(&self, book_id: BookId) -> Result<PurchaseReceipt, EntitlementError> {
        let book = self
            .catalog
            .get(book_id)
            .ok_or(EntitlementError::BookNotFound(book_id))?;

        let result = self.repo.modify(|profile| {
            if is_unlocked(book, profile) {
                return Err(EntitlementError::AlreadyOwned(book.id));
            }
            let balance = profile.exp;
            let remaining =
                profile
                    .try_debit(book.price)
                    .ok_or(EntitlementError::InsufficientFunds {
                        book_id: book.id,
                        balance,
                        price: book.price,
                    })?;
            profile.unlocked_books.insert(book.id);
            Ok(PurchaseReceipt {
                book_id: book.id,
                price: book.price,
                balance: remaining,
            })
        });

        match &result {
            Ok(receipt) => {
                info!(
                    "event=purchase module=entitlement status=ok book_id={} price={} balance={}",
                    receipt.book_id, receipt.price, receipt.balance
                );
                self.notify(ChangeEvent::EntitlementChanged { book_id: book.id });
                self.notify(ChangeEvent::CurrencyChanged {
                    balance: receipt.balance,
                    delta: -signed(receipt.price),
                });
            }
            Err(err) => warn!(
                "event=purchase module=entitlement status=rejected book_id={book_id} error={err}"
            ),
        }
        result
    }

    /// Adds `amount` EXP to the active profile and returns the new balance.
    pub fn award_currency(&self, amount: u64) -> Result<u64, EntitlementError> {
        if amount == 0 {
            return Err(EntitlementError::InvalidAmount);
        }
        let balance = self
            .repo
            .modify(|profile| Ok::<_, EntitlementError>(profile.credit(amount)))?;
        if let Err(err) = self.repo.sync_registered() {
            warn!("event=award_sync module=entitlement status=error error={err}");
        }

        info!("event=award module=entitlement status=ok amount={amount} balance={balance}");
        self.notify(ChangeEvent::CurrencyChanged {
            balance,
            delta: signed(amount),
        });
        Ok(balance)
    }

    /// Adds any free book missing from the active profile's unlocked set.
    ///
    /// Returns the number of ids added; 0 for guests.
    pub fn reconcile_free_books(&self) -> Result<usize, EntitlementError> {
        if !self.repo.is_logged_in() {
            return Ok(0);
        }
        let free_ids = self.catalog.free_book_ids();
        let added = self.repo.modify(|profile| {
            let before = profile.unlocked_books.len();
            profile.unlocked_books.extend(free_ids.iter().copied());
            Ok::<_, EntitlementError>(profile.unlocked_books.len() - before)
        })?;
        if added > 0 {
            info!("event=reconcile_free_books module=entitlement status=ok added={added}");
        }
        Ok(added)
    }

    /// Premium books the active profile has not unlocked yet.
    pub fn shop_listing(&self, query: &ShopQuery) -> Vec<ShopOffer<'a>> {
        let profile = self.repo.load();
        let mut books = self
            .catalog
            .premium_books()
            .into_iter()
            .filter(|book| !is_unlocked(book, &profile))
            .filter(|book| {
                query
                    .genre
                    .as_deref()
                    .map_or(true, |genre| book.genre.eq_ignore_ascii_case(genre))
            })
            .collect::<Vec<_>>();

        match query.sort {
            ShopSort::Newest => books.sort_by_key(|book| Reverse(book.id)),
            ShopSort::PriceLowToHigh => books.sort_by_key(|book| book.price),
            ShopSort::PriceHighToLow => books.sort_by_key(|book| Reverse(book.price)),
            ShopSort::Popular => books.sort_by_key(|book| Reverse(book.popularity)),
        }

        books
            .into_iter()
            .map(|book| ShopOffer {
                book,
                can_afford: profile.exp >= book.price,
            })
            .collect()
    }

    /// Books readable by the active profile, in catalog order.
    pub fn owned_books(&self) -> Vec<&'a BookRecord> {
        let profile = self.repo.load();
        self.catalog
            .all()
            .iter()
            .filter(|book| is_unlocked(book, &profile))
            .collect()
    }

    fn notify(&self, event: ChangeEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.emit(event);
        }
    }
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}
