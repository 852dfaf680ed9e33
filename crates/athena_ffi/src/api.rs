//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level functions to Dart via FRB.
//! - Map core errors to flat envelopes the UI can render directly.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every call opens the store, runs one use case and drops the connection.
//! - The open reader lives on the calling thread; reader calls must come
//!   from the UI isolate that opened it.
//! - Messages are UTF-8 strings with stable meaning.

use athena_core::db::open_db;
use athena_core::reader::session::CommandOutcome;
use athena_core::{
    check_access, core_version as core_version_inner, init_logging as init_logging_inner,
    is_unlocked, ping as ping_inner, resolve_pdf_location, reward_for_score, AuthError,
    AuthProvider, AuthService, BookCatalog, BookId, BookRecord, ChangeNotifier, CoreConfig,
    CredentialHasher, DirectoryAuthenticator, DocumentError, DocumentSource, EntitlementError,
    EntitlementService, KvProfileRepository, LibraryError, LibraryService, PdfDocument,
    PdfEngine, PdfLocation, PreferencesRepository, PreferencesService, ProfileRepository,
    ReaderCommand, ReaderError, ReaderOptions, ReaderSession, RegisteredUser,
    RegistrationRequest, RenderError, RenderEvent, RepoResult, ShopQuery, ShopSort,
    SqliteKeyValueStore, StoreError, UserIdentity, UserProfile,
};
use log::{info, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Mutex, OnceLock};

static CONFIG: OnceLock<CoreConfig> = OnceLock::new();
static CATALOG: OnceLock<Result<BookCatalog, String>> = OnceLock::new();
static NOTIFIER: OnceLock<Arc<ChangeNotifier>> = OnceLock::new();
static PENDING_EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

thread_local! {
    static READER: RefCell<Option<OpenReader>> = const { RefCell::new(None) };
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Book card data for list and detail screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookItem {
    pub id: u32,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover_ref: String,
    /// Resolved document location; empty when the catalog has none.
    pub pdf_location: String,
    /// `free|premium`.
    pub tier: String,
    pub price: u64,
    pub category: String,
    pub genre: String,
    pub popularity: u32,
    /// Free books, and premium books the active profile owns.
    pub unlocked: bool,
    /// No one is logged in; opening any book routes to login first.
    pub login_required: bool,
    pub favorite: bool,
}

/// Book list envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookListResponse {
    pub items: Vec<BookItem>,
    /// Empty on success; diagnostic text otherwise.
    pub message: String,
}

impl BookListResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            message: message.into(),
        }
    }
}

/// Login/registration envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub ok: bool,
    pub username: Option<String>,
    pub email: Option<String>,
    /// Book the guest tried to open before logging in, consumed by this call.
    pub pending_book_id: Option<u32>,
    /// Form field the error refers to (`username|email|password|...`).
    pub error_field: Option<String>,
    pub message: String,
}

impl AuthResponse {
    fn success(identity: UserIdentity, pending_book_id: Option<BookId>) -> Self {
        Self {
            ok: true,
            username: Some(identity.username),
            email: Some(identity.email),
            pending_book_id,
            error_field: None,
            message: String::new(),
        }
    }

    fn failure(err: &AuthError) -> Self {
        let error_field = match err {
            AuthError::InvalidInput { field, .. } => Some(field.as_str().to_string()),
            _ => None,
        };
        Self {
            ok: false,
            username: None,
            email: None,
            pending_book_id: None,
            error_field,
            message: err.to_string(),
        }
    }

    fn message_only(ok: bool, message: impl Into<String>) -> Self {
        Self {
            ok,
            username: None,
            email: None,
            pending_book_id: None,
            error_field: None,
            message: message.into(),
        }
    }
}

/// Snapshot of the active profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileResponse {
    pub logged_in: bool,
    pub username: String,
    pub email: String,
    pub exp: u64,
    pub unlocked_count: u32,
    pub favorites_count: u32,
    pub books_started: u32,
    pub message: String,
}

/// Generic action envelope for purchases, awards and toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Balance after the action when it touched EXP.
    pub balance: Option<u64>,
    /// New favorite state for favorite toggles.
    pub favorite: Option<bool>,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            balance: None,
            favorite: None,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            balance: None,
            favorite: None,
            message: message.into(),
        }
    }

    fn with_balance(mut self, balance: u64) -> Self {
        self.balance = Some(balance);
        self
    }
}

/// Result of the reader's open gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderAccessResponse {
    pub ok: bool,
    pub book_id: u32,
    pub title: String,
    /// Resolved document location to fetch.
    pub pdf_location: Option<String>,
    /// Last saved page for this book.
    pub resume_page: Option<u32>,
    /// Guest attempt; the UI should route to login.
    pub login_required: bool,
    /// Unlock price when the book is locked.
    pub price: Option<u64>,
    pub message: String,
}

impl ReaderAccessResponse {
    fn failure(book_id: u32, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            book_id,
            title: String::new(),
            pdf_location: None,
            resume_page: None,
            login_required: false,
            price: None,
            message: message.into(),
        }
    }
}

/// State of the open reader after one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderViewResponse {
    pub ok: bool,
    pub book_id: u32,
    pub title: String,
    /// Last page the shell reported as rendered.
    pub current_page: u32,
    pub total_pages: u32,
    pub zoom_percent: u32,
    /// Page the shell must render now, at `render_scale`.
    ///
    /// `None` means nothing new is due; keep showing the current page.
    pub render_page: Option<u32>,
    pub render_scale: Option<f32>,
    /// Latest request waiting behind the in-flight render.
    pub pending_page: Option<u32>,
    pub checkpoint_available: bool,
    /// Page whose completion this call applied.
    pub rendered_page: Option<u32>,
    /// `Some(false)` when the page is shown but progress was not persisted.
    pub progress_saved: Option<bool>,
    pub favorite: bool,
    /// Set when a checkpoint is dismissed.
    pub next_checkpoint_page: Option<u32>,
    /// Guest attempt; the book is remembered for after login.
    pub login_required: bool,
    /// Unlock price when the book is locked.
    pub price: Option<u64>,
    pub message: String,
}

impl ReaderViewResponse {
    fn failure(book_id: u32, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            book_id,
            title: String::new(),
            current_page: 0,
            total_pages: 0,
            zoom_percent: 0,
            render_page: None,
            render_scale: None,
            pending_page: None,
            checkpoint_available: false,
            rendered_page: None,
            progress_saved: None,
            favorite: false,
            next_checkpoint_page: None,
            login_required: false,
            price: None,
            message: message.into(),
        }
    }

    /// Current view, handing over any render the sequencer started.
    fn snapshot(reader: &OpenReader) -> Self {
        let session = &reader.session;
        let sequencer = session.sequencer();
        let due = reader.due.take();
        Self {
            ok: true,
            book_id: session.book().id,
            title: session.book().title.clone(),
            current_page: session.current_page(),
            total_pages: session.total_pages(),
            zoom_percent: sequencer.zoom_percent(),
            render_page: due.map(|(page, _)| page),
            render_scale: due.map(|(_, scale)| scale),
            pending_page: sequencer.pending_page(),
            checkpoint_available: sequencer.checkpoint_available(),
            rendered_page: None,
            progress_saved: None,
            favorite: session.is_favorite(),
            next_checkpoint_page: None,
            login_required: false,
            price: None,
            message: String::new(),
        }
    }
}

/// One row of the account page's reading history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressItem {
    pub book_id: u32,
    pub title: String,
    pub current_page: u32,
    pub total_pages: u32,
    pub percent: u32,
    pub last_read_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressListResponse {
    pub items: Vec<ProgressItem>,
    pub message: String,
}

/// Lists catalog books, optionally filtered by category.
///
/// # FFI contract
/// - Sync call, DB-backed execution (for unlock/favorite flags).
/// - Empty `category` lists the whole catalog.
#[flutter_rust_bridge::frb(sync)]
pub fn catalog_list(category: String) -> BookListResponse {
    let category = category.trim();
    list_books(|catalog| {
        if category.is_empty() {
            catalog.all().iter().collect()
        } else {
            catalog.by_category(category)
        }
    })
}

/// Case-insensitive title/author search.
#[flutter_rust_bridge::frb(sync)]
pub fn catalog_search(text: String) -> BookListResponse {
    list_books(|catalog| catalog.search(&text))
}

/// Registers a local account and logs it in.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_register(
    username: String,
    email: String,
    password: String,
    confirm_password: String,
    accepted_terms: bool,
) -> AuthResponse {
    let request = RegistrationRequest {
        username,
        email,
        password,
        confirm_password,
        accepted_terms,
    };
    run_auth(|service| service.register(&request))
}

/// Logs in with username or email and password.
///
/// On success the pending book (if any) is consumed and returned so the UI
/// can continue straight into the reader.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_login(identifier: String, password: String) -> AuthResponse {
    run_auth(|service| service.login(&identifier, &password))
}

/// Logs in with an identity asserted by an external provider.
///
/// `provider` is `google|github`; `display_name` may be empty.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_federated_login(
    email: String,
    display_name: String,
    provider: String,
) -> AuthResponse {
    let Some(provider) = AuthProvider::parse(&provider) else {
        return AuthResponse::message_only(false, format!("unsupported provider: {provider}"));
    };
    let display_name = Some(display_name.as_str()).filter(|name| !name.trim().is_empty());
    run_auth(|service| service.federated_login(&email, display_name, provider))
}

/// Ends the active session; saved account state stays in the directory.
#[flutter_rust_bridge::frb(sync)]
pub fn auth_logout() -> AuthResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let service = auth_service(store, catalog);
        service.logout().map_err(|err| err.to_string())
    });
    match result {
        Ok(()) => AuthResponse::message_only(true, "logged out"),
        Err(message) => AuthResponse::message_only(false, message),
    }
}

/// Returns the active profile; guests get `logged_in = false`.
#[flutter_rust_bridge::frb(sync)]
pub fn profile_get() -> ProfileResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let profile = repo.load();
        let stats = LibraryService::new(&repo, catalog).stats();
        Ok((profile, stats))
    });
    match result {
        Ok((profile, stats)) => ProfileResponse {
            logged_in: profile.is_logged_in(),
            username: profile.username,
            email: profile.email,
            exp: stats.exp,
            unlocked_count: to_u32(stats.unlocked_count),
            favorites_count: to_u32(stats.favorites_count),
            books_started: to_u32(stats.books_started),
            message: String::new(),
        },
        Err(message) => ProfileResponse {
            logged_in: false,
            username: String::new(),
            email: String::new(),
            exp: 0,
            unlocked_count: 0,
            favorites_count: 0,
            books_started: 0,
            message,
        },
    }
}

/// Lists premium books for the shop.
///
/// `genre`: empty or `all` lists every genre.
/// `sort`: `newest|exp-low|exp-high|popular`; unknown values fall back to
/// `newest`.
#[flutter_rust_bridge::frb(sync)]
pub fn shop_list(genre: String, sort: String) -> BookListResponse {
    let genre = genre.trim();
    let query = ShopQuery {
        genre: (!genre.is_empty() && genre != "all").then(|| genre.to_string()),
        sort: ShopSort::parse(&sort).unwrap_or_default(),
    };
    list_books_for_profile(|repo, catalog| {
        EntitlementService::new(repo, catalog)
            .shop_listing(&query)
            .into_iter()
            .map(|offer| offer.book)
            .collect()
    })
}

/// Spends EXP to unlock a premium book.
#[flutter_rust_bridge::frb(sync)]
pub fn shop_purchase(book_id: u32) -> ActionResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let service = EntitlementService::new(&repo, catalog).with_notifier(notifier());
        Ok(service.purchase(book_id))
    });
    match result {
        Ok(Ok(receipt)) => {
            ActionResponse::success(format!("unlocked book {}", receipt.book_id))
                .with_balance(receipt.balance)
        }
        Ok(Err(EntitlementError::InsufficientFunds { balance, .. })) => ActionResponse::failure(
            "not enough EXP to unlock this book",
        )
        .with_balance(balance),
        Ok(Err(err)) => ActionResponse::failure(err.to_string()),
        Err(message) => ActionResponse::failure(message),
    }
}

/// Credits EXP to the active profile.
#[flutter_rust_bridge::frb(sync)]
pub fn exp_award(amount: u64) -> ActionResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let service = EntitlementService::new(&repo, catalog).with_notifier(notifier());
        service.award_currency(amount).map_err(|err| err.to_string())
    });
    match result {
        Ok(balance) => ActionResponse::success(format!("earned {amount} EXP")).with_balance(balance),
        Err(message) => ActionResponse::failure(message),
    }
}

/// Flips the favorite flag for `book_id`.
#[flutter_rust_bridge::frb(sync)]
pub fn favorites_toggle(book_id: u32) -> ActionResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let service = LibraryService::new(&repo, catalog).with_notifier(notifier());
        service.toggle_favorite(book_id).map_err(|err| err.to_string())
    });
    match result {
        Ok(favorite) => {
            let message = if favorite {
                "added to favorites"
            } else {
                "removed from favorites"
            };
            let mut response = ActionResponse::success(message);
            response.favorite = Some(favorite);
            response
        }
        Err(message) => ActionResponse::failure(message),
    }
}

/// Favorite books in the order they were added.
#[flutter_rust_bridge::frb(sync)]
pub fn favorites_list() -> BookListResponse {
    list_books_for_profile(|repo, catalog| LibraryService::new(repo, catalog).favorite_books())
}

/// Every book the active profile may open.
#[flutter_rust_bridge::frb(sync)]
pub fn owned_list() -> BookListResponse {
    list_books_for_profile(|repo, catalog| EntitlementService::new(repo, catalog).owned_books())
}

/// Returns the effective theme (`light|dark`).
#[flutter_rust_bridge::frb(sync)]
pub fn theme_get(system_prefers_dark: bool) -> String {
    with_store(|store| {
        PreferencesService::new(store)
            .theme(system_prefers_dark)
            .map_err(|err| err.to_string())
    })
    .map(|theme| theme.as_str().to_string())
    .unwrap_or_else(|message| {
        warn!("event=theme_get module=ffi status=degraded error={message}");
        fallback_theme(system_prefers_dark).to_string()
    })
}

/// Flips and persists the theme; returns the new value.
#[flutter_rust_bridge::frb(sync)]
pub fn theme_toggle(system_prefers_dark: bool) -> String {
    with_store(|store| {
        PreferencesService::new(store)
            .with_notifier(notifier())
            .toggle_theme(system_prefers_dark)
            .map_err(|err| err.to_string())
    })
    .map(|theme| theme.as_str().to_string())
    .unwrap_or_else(|message| {
        warn!("event=theme_toggle module=ffi status=degraded error={message}");
        fallback_theme(system_prefers_dark).to_string()
    })
}

/// Returns `true` the first time it is called on an installation.
#[flutter_rust_bridge::frb(sync)]
pub fn intro_should_show() -> bool {
    with_store(|store| {
        PreferencesService::new(store)
            .should_show_intro()
            .map_err(|err| err.to_string())
    })
    .unwrap_or(false)
}

/// Runs the reader open gate for `book_id`.
///
/// Guests are told to log in and the book is remembered for after login.
#[flutter_rust_bridge::frb(sync)]
pub fn reader_check_access(book_id: u32) -> ReaderAccessResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let preferences = PreferencesRepository::new(store);
        let outcome = check_access(book_id, catalog, &repo, &preferences).map(|book| {
            let resume_page = repo
                .load()
                .reading_progress
                .get(&book_id)
                .map(|progress| progress.current_page);
            (book.clone(), resume_page)
        });
        Ok(outcome)
    });
    match result {
        Ok(Ok((book, resume_page))) => ReaderAccessResponse {
            ok: true,
            book_id,
            pdf_location: resolve_pdf_location(&book.pdf_location)
                .map(|location| location.as_str().to_string()),
            title: book.title,
            resume_page,
            login_required: false,
            price: None,
            message: String::new(),
        },
        Ok(Err(err)) => {
            let mut response = ReaderAccessResponse::failure(book_id, err.to_string());
            match err {
                ReaderError::LoginRequired(_) => response.login_required = true,
                ReaderError::BookLocked { price, .. } => response.price = Some(price),
                _ => {}
            }
            response
        }
        Err(message) => ReaderAccessResponse::failure(book_id, message),
    }
}

/// Opens `book_id` for reading and requests its first page.
///
/// Input semantics:
/// - `document`: the book's bytes as fetched by the shell from
///   `pdf_location`; they must start with a `%PDF-` header.
/// - `page_count`: page count reported by the shell's PDF renderer.
///
/// # FFI contract
/// - Replaces any reader opened earlier on this thread.
/// - The saved page, if any, is queued behind page 1.
/// - The returned `render_page` is the first page the shell must draw.
#[flutter_rust_bridge::frb(sync)]
pub fn reader_open(book_id: u32, document: Vec<u8>, page_count: u32) -> ReaderViewResponse {
    let catalog = match catalog() {
        Ok(catalog) => catalog,
        Err(message) => return ReaderViewResponse::failure(book_id, message),
    };
    let due = Rc::new(Cell::new(None));
    let engine = HostEngine {
        pages: page_count,
        due: Rc::clone(&due),
    };
    let source = HostBytes(Cell::new(document));
    let options = ReaderOptions {
        checkpoint_interval: config().checkpoint_interval,
        zoom: config().default_zoom,
    };

    let opened = with_store(|store| {
        let preferences = PreferencesRepository::new(store);
        Ok(ReaderSession::open(
            book_id,
            catalog,
            StoreProfiles,
            &preferences,
            &engine,
            &source,
            options,
        ))
    });
    let mut session = match opened {
        Ok(Ok(session)) => session.with_notifier(notifier()),
        Ok(Err(err)) => {
            let mut response = ReaderViewResponse::failure(book_id, err.to_string());
            match err {
                ReaderError::LoginRequired(_) => response.login_required = true,
                ReaderError::BookLocked { price, .. } => response.price = Some(price),
                _ => {}
            }
            return response;
        }
        Err(message) => return ReaderViewResponse::failure(book_id, message),
    };
    if let Some(page) = session.resume_page().filter(|page| *page > 1) {
        session.go_to_page(page);
    }

    let reader = OpenReader { session, due };
    let response = ReaderViewResponse::snapshot(&reader);
    match READER.try_with(|slot| slot.try_borrow_mut().map(|mut slot| *slot = Some(reader))) {
        Ok(Ok(())) => {
            info!("event=reader_open module=ffi status=ok book_id={book_id}");
            response
        }
        _ => ReaderViewResponse::failure(book_id, "reader is busy"),
    }
}

/// Requests `page` (clamped to the document) through the single-flight
/// renderer.
#[flutter_rust_bridge::frb(sync)]
pub fn reader_request_page(page: u32) -> ReaderViewResponse {
    with_reader(|reader| {
        reader.session.go_to_page(page);
        ReaderViewResponse::snapshot(reader)
    })
}

/// Sets the zoom scale (clamped to `0.5..=3.0`) and re-renders the target
/// page.
#[flutter_rust_bridge::frb(sync)]
pub fn reader_set_zoom(scale: f32) -> ReaderViewResponse {
    with_reader(|reader| {
        reader.session.set_zoom(scale);
        ReaderViewResponse::snapshot(reader)
    })
}

/// Applies a keyboard key (`ArrowLeft`, `ArrowRight`, `Home`, `End`, `+`,
/// `-`, `f`, ...).
#[flutter_rust_bridge::frb(sync)]
pub fn reader_key(key: String) -> ReaderViewResponse {
    let Some(command) = ReaderCommand::from_key(&key) else {
        return ReaderViewResponse::failure(0, format!("unsupported reader key: {key}"));
    };
    with_reader(|reader| match reader.session.dispatch(command) {
        Ok(CommandOutcome::Page(_)) => ReaderViewResponse::snapshot(reader),
        Ok(CommandOutcome::Favorite(favorite)) => {
            let mut response = ReaderViewResponse::snapshot(reader);
            response.favorite = favorite;
            response.message = if favorite {
                "added to favorites".to_string()
            } else {
                "removed from favorites".to_string()
            };
            response
        }
        Err(err) => {
            let mut response = ReaderViewResponse::snapshot(reader);
            response.ok = false;
            response.message = err.to_string();
            response
        }
    })
}

/// Reports the outcome of the render the shell was last asked to draw.
///
/// `reason` is only read when `ok` is false. A failed render keeps the
/// previous page on screen and is reported with `ok = false`.
#[flutter_rust_bridge::frb(sync)]
pub fn reader_complete_render(ok: bool, reason: String) -> ReaderViewResponse {
    let outcome = if ok {
        Ok(())
    } else {
        Err(RenderError::Backend(reason))
    };
    with_reader(|reader| {
        let event = reader.session.complete_render(outcome);
        let mut response = ReaderViewResponse::snapshot(reader);
        match event {
            Some(RenderEvent::Rendered {
                page,
                progress_saved,
                ..
            }) => {
                response.rendered_page = Some(page);
                response.progress_saved = Some(progress_saved);
                if !progress_saved {
                    response.message = format!("page {page} shown but progress was not saved");
                }
            }
            Some(RenderEvent::Failed { page, reason }) => {
                response.ok = false;
                response.message = format!("failed to render page {page}: {reason}");
            }
            None => {
                response.ok = false;
                response.message = "no page render in flight".to_string();
            }
        }
        response
    })
}

/// Dismisses the available comprehension checkpoint.
///
/// Rewards are credited separately through `quiz_reward`.
#[flutter_rust_bridge::frb(sync)]
pub fn reader_dismiss_checkpoint() -> ReaderViewResponse {
    with_reader(|reader| {
        let next = reader.session.close_quiz();
        let mut response = ReaderViewResponse::snapshot(reader);
        response.next_checkpoint_page = Some(next);
        response
    })
}

/// Closes the open reader; saved progress is kept.
#[flutter_rust_bridge::frb(sync)]
pub fn reader_close() -> ActionResponse {
    let closed = READER.try_with(|slot| slot.try_borrow_mut().map(|mut slot| slot.take()));
    match closed {
        Ok(Ok(Some(reader))) => {
            ActionResponse::success(format!("closed book {}", reader.session.book().id))
        }
        Ok(Ok(None)) => ActionResponse::success("no book was open"),
        _ => ActionResponse::failure("reader is busy"),
    }
}

/// Books the active profile has started, most recently read first.
#[flutter_rust_bridge::frb(sync)]
pub fn progress_list() -> ProgressListResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let items = LibraryService::new(&repo, catalog)
            .progress_entries()
            .into_iter()
            .map(|entry| ProgressItem {
                book_id: entry.book.id,
                title: entry.book.title.clone(),
                current_page: entry.progress.current_page,
                total_pages: entry.progress.total_pages,
                percent: entry.percent,
                last_read_ms: entry.progress.last_read_ms,
            })
            .collect();
        Ok(items)
    });
    match result {
        Ok(items) => ProgressListResponse {
            items,
            message: String::new(),
        },
        Err(message) => ProgressListResponse {
            items: Vec::new(),
            message,
        },
    }
}

/// Replaces the active account's password.
#[flutter_rust_bridge::frb(sync)]
pub fn account_change_password(current_password: String, new_password: String) -> AuthResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        Ok(auth_service(store, catalog).change_password(&current_password, &new_password))
    });
    match result {
        Ok(Ok(())) => AuthResponse::message_only(true, "password changed"),
        Ok(Err(err)) => AuthResponse::failure(&err),
        Err(message) => AuthResponse::message_only(false, message),
    }
}

/// Renames the active account; names are unique across accounts.
#[flutter_rust_bridge::frb(sync)]
pub fn account_update_username(username: String) -> AuthResponse {
    update_identity("username", |library| library.update_username(&username))
}

/// Changes the active account's email; emails are unique across accounts.
#[flutter_rust_bridge::frb(sync)]
pub fn account_update_email(email: String) -> AuthResponse {
    update_identity("email", |library| library.update_email(&email))
}

/// Scores a finished checkpoint quiz and credits the reward.
#[flutter_rust_bridge::frb(sync)]
pub fn quiz_reward(correct: u32, total: u32) -> ActionResponse {
    if total == 0 || correct > total {
        return ActionResponse::failure(format!("invalid quiz score {correct}/{total}"));
    }
    let reward = reward_for_score(correct, total);
    let mut response = exp_award(reward);
    if response.ok {
        response.message = format!("scored {correct}/{total}; earned {reward} EXP");
    }
    response
}

/// Drains change notifications raised since the last call.
///
/// Values are stable event names (`currency_changed`, `theme_changed`, ...).
#[flutter_rust_bridge::frb(sync)]
pub fn poll_change_events() -> Vec<String> {
    // Make sure the subscriber exists before the first mutation.
    notifier();
    match PENDING_EVENTS.lock() {
        Ok(mut events) => std::mem::take(&mut *events),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    }
}

fn config() -> &'static CoreConfig {
    CONFIG.get_or_init(|| {
        CoreConfig::from_env().unwrap_or_else(|err| {
            warn!("event=config_load module=ffi status=degraded error={err}");
            CoreConfig::default()
        })
    })
}

fn catalog() -> Result<&'static BookCatalog, String> {
    CATALOG
        .get_or_init(|| BookCatalog::builtin().map_err(|err| format!("catalog load failed: {err}")))
        .as_ref()
        .map_err(Clone::clone)
}

fn notifier() -> Arc<ChangeNotifier> {
    NOTIFIER
        .get_or_init(|| {
            let notifier = ChangeNotifier::new();
            notifier.subscribe(|event| {
                let name = event.name().to_string();
                match PENDING_EVENTS.lock() {
                    Ok(mut events) => events.push(name),
                    Err(poisoned) => poisoned.into_inner().push(name),
                }
            });
            Arc::new(notifier)
        })
        .clone()
}

fn with_store<T>(
    f: impl FnOnce(&SqliteKeyValueStore<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let conn = open_db(&config().store_path).map_err(|err| format!("store open failed: {err}"))?;
    let store = SqliteKeyValueStore::new(&conn);
    f(&store)
}

type StoreAuthService<'s> = AuthService<
    'static,
    KvProfileRepository<&'s SqliteKeyValueStore<'s>>,
    DirectoryAuthenticator<KvProfileRepository<&'s SqliteKeyValueStore<'s>>>,
>;

fn auth_service<'s>(
    store: &'s SqliteKeyValueStore<'s>,
    catalog: &'static BookCatalog,
) -> StoreAuthService<'s> {
    let hasher = CredentialHasher::default();
    let authenticator = DirectoryAuthenticator::new(KvProfileRepository::new(store), hasher.clone());
    AuthService::new(KvProfileRepository::new(store), authenticator, hasher, catalog)
        .with_starting_exp(config().starting_exp)
        .with_notifier(notifier())
}

fn run_auth(
    action: impl FnOnce(&StoreAuthService<'_>) -> Result<UserIdentity, AuthError>,
) -> AuthResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let service = auth_service(store, catalog);
        let identity = match action(&service) {
            Ok(identity) => identity,
            Err(err) => return Ok(Err(err)),
        };
        let pending = PreferencesService::new(store)
            .take_pending_book()
            .unwrap_or_else(|err| {
                warn!("event=pending_book module=ffi status=degraded error={err}");
                None
            });
        Ok(Ok((identity, pending)))
    });
    match result {
        Ok(Ok((identity, pending))) => AuthResponse::success(identity, pending),
        Ok(Err(err)) => AuthResponse::failure(&err),
        Err(message) => AuthResponse::message_only(false, message),
    }
}

fn update_identity(
    field: &str,
    edit: impl FnOnce(
        &LibraryService<'static, &KvProfileRepository<&SqliteKeyValueStore<'_>>>,
    ) -> Result<String, LibraryError>,
) -> AuthResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let library = LibraryService::new(&repo, catalog).with_notifier(notifier());
        Ok(edit(&library).map(|_| repo.load()))
    });
    match result {
        Ok(Ok(profile)) => AuthResponse {
            ok: true,
            username: Some(profile.username),
            email: Some(profile.email),
            pending_book_id: None,
            error_field: None,
            message: format!("{field} updated"),
        },
        Ok(Err(err)) => {
            let mut response = AuthResponse::message_only(false, err.to_string());
            if matches!(
                err,
                LibraryError::InvalidUsername
                    | LibraryError::InvalidEmail
                    | LibraryError::IdentityTaken
            ) {
                response.error_field = Some(field.to_string());
            }
            response
        }
        Err(message) => AuthResponse::message_only(false, message),
    }
}

/// Reader opened through `reader_open`, plus the render the sequencer last
/// asked the shell to draw.
struct OpenReader {
    session: ReaderSession<'static, StoreProfiles>,
    due: Rc<Cell<Option<(u32, f32)>>>,
}

fn with_reader(f: impl FnOnce(&mut OpenReader) -> ReaderViewResponse) -> ReaderViewResponse {
    let result = READER.try_with(|slot| {
        let Ok(mut slot) = slot.try_borrow_mut() else {
            return ReaderViewResponse::failure(0, "reader is busy");
        };
        match slot.as_mut() {
            Some(reader) => f(reader),
            None => ReaderViewResponse::failure(0, "no book is open"),
        }
    });
    result.unwrap_or_else(|_| ReaderViewResponse::failure(0, "reader is shutting down"))
}

/// Profile repository that opens the store for every call, so an open
/// reader does not hold a connection between calls.
struct StoreProfiles;

impl StoreProfiles {
    fn with_repo<T>(
        f: impl FnOnce(&KvProfileRepository<&SqliteKeyValueStore<'_>>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let conn = open_db(&config().store_path).map_err(StoreError::from)?;
        let store = SqliteKeyValueStore::new(&conn);
        f(&KvProfileRepository::new(&store))
    }
}

impl ProfileRepository for StoreProfiles {
    fn try_load(&self) -> RepoResult<Option<UserProfile>> {
        Self::with_repo(|repo| repo.try_load())
    }

    fn save(&self, profile: &UserProfile) -> RepoResult<()> {
        Self::with_repo(|repo| repo.save(profile))
    }

    fn clear(&self) -> RepoResult<()> {
        Self::with_repo(|repo| repo.clear())
    }

    fn registered_users(&self) -> RepoResult<Vec<RegisteredUser>> {
        Self::with_repo(|repo| repo.registered_users())
    }

    fn save_registered_users(&self, users: &[RegisteredUser]) -> RepoResult<()> {
        Self::with_repo(|repo| repo.save_registered_users(users))
    }

    fn set_session_flag(&self, logged_in: bool) -> RepoResult<()> {
        Self::with_repo(|repo| repo.set_session_flag(logged_in))
    }
}

/// Document rasterized by the shell. Starting a render only records the
/// page and scale the shell must draw next.
struct HostDocument {
    pages: u32,
    due: Rc<Cell<Option<(u32, f32)>>>,
}

impl PdfDocument for HostDocument {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn start_render(&mut self, page: u32, scale: f32) {
        self.due.set(Some((page, scale)));
    }
}

struct HostEngine {
    pages: u32,
    due: Rc<Cell<Option<(u32, f32)>>>,
}

impl PdfEngine for HostEngine {
    fn open_document(&self, _bytes: Vec<u8>) -> Result<Box<dyn PdfDocument>, DocumentError> {
        Ok(Box::new(HostDocument {
            pages: self.pages,
            due: Rc::clone(&self.due),
        }))
    }
}

/// Bytes handed over by the shell; fetched at most once.
struct HostBytes(Cell<Vec<u8>>);

impl DocumentSource for HostBytes {
    fn fetch(&self, _location: &PdfLocation) -> Result<Vec<u8>, DocumentError> {
        Ok(self.0.take())
    }
}

fn list_books(
    select: impl FnOnce(&'static BookCatalog) -> Vec<&'static BookRecord>,
) -> BookListResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let profile = KvProfileRepository::new(store).load();
        Ok(to_items(select(catalog), &profile))
    });
    match result {
        Ok(items) => BookListResponse {
            items,
            message: String::new(),
        },
        Err(message) => BookListResponse::failure(message),
    }
}

fn list_books_for_profile(
    select: impl FnOnce(
        &KvProfileRepository<&SqliteKeyValueStore<'_>>,
        &'static BookCatalog,
    ) -> Vec<&'static BookRecord>,
) -> BookListResponse {
    let result = with_store(|store| {
        let catalog = catalog()?;
        let repo = KvProfileRepository::new(store);
        let profile = repo.load();
        Ok(to_items(select(&repo, catalog), &profile))
    });
    match result {
        Ok(items) => BookListResponse {
            items,
            message: String::new(),
        },
        Err(message) => BookListResponse::failure(message),
    }
}

fn to_items(books: Vec<&BookRecord>, profile: &UserProfile) -> Vec<BookItem> {
    books
        .into_iter()
        .map(|book| BookItem {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            description: book.description.clone(),
            cover_ref: book.cover_ref.clone(),
            pdf_location: resolve_pdf_location(&book.pdf_location)
                .map(|location| location.as_str().to_string())
                .unwrap_or_default(),
            tier: book.tier.as_str().to_string(),
            price: book.price,
            category: book.category.clone(),
            genre: book.genre.clone(),
            popularity: book.popularity,
            unlocked: is_unlocked(book, profile),
            login_required: !profile.is_logged_in(),
            favorite: profile.is_favorite(book.id),
        })
        .collect()
}

fn fallback_theme(system_prefers_dark: bool) -> &'static str {
    if system_prefers_dark {
        "dark"
    } else {
        "light"
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        account_change_password, account_update_email, account_update_username,
        auth_federated_login, auth_login, auth_logout, auth_register, catalog_list,
        catalog_search, core_version, favorites_list, favorites_toggle, init_logging, ping,
        profile_get, progress_list, quiz_reward, reader_check_access, reader_close,
        reader_complete_render, reader_dismiss_checkpoint, reader_key, reader_open,
        reader_request_page, reader_set_zoom, shop_list, shop_purchase,
    };
    use std::sync::{Mutex, MutexGuard};
    use std::time::{SystemTime, UNIX_EPOCH};

    // Every test shares one store file and one active-session slot.
    static SESSION_LOCK: Mutex<()> = Mutex::new(());

    fn session() -> MutexGuard<'static, ()> {
        SESSION_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn catalog_lists_by_category_and_search() {
        let _guard = session();
        let kids = catalog_list("kids".to_string());
        assert!(kids.message.is_empty(), "{}", kids.message);
        assert_eq!(kids.items.len(), 5);
        assert!(kids.items.iter().all(|item| item.tier == "free"));

        let all = catalog_list(String::new());
        assert_eq!(all.items.len(), 15);

        let hits = catalog_search("aurelius".to_string());
        assert_eq!(hits.items.len(), 1);
        assert_eq!(hits.items[0].id, 11);
    }

    #[test]
    fn shop_lists_premium_books_in_requested_order() {
        let _guard = session();
        // Guests see every premium book; owned ones are hidden from members.
        assert!(auth_logout().ok);
        let listing = shop_list("all".to_string(), "exp-low".to_string());
        let prices: Vec<u64> = listing.items.iter().map(|item| item.price).collect();
        assert_eq!(prices, vec![400, 450, 500, 550, 600]);

        let self_help = shop_list("self-help".to_string(), "bogus".to_string());
        let ids: Vec<u32> = self_help.items.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![14, 12]);
    }

    #[test]
    fn guest_open_is_resumed_after_login() {
        let _guard = session();
        let name = unique_token("reader");
        let registered = auth_register(
            name.clone(),
            format!("{name}@example.com"),
            "secret1".to_string(),
            "secret1".to_string(),
            true,
        );
        assert!(registered.ok, "{}", registered.message);
        assert!(auth_logout().ok);
        assert!(!profile_get().logged_in);

        let gated = reader_check_access(3);
        assert!(!gated.ok);
        assert!(gated.login_required);

        let login = auth_login(name.clone(), "secret1".to_string());
        assert!(login.ok, "{}", login.message);
        assert_eq!(login.pending_book_id, Some(3));

        let opened = reader_check_access(3);
        assert!(opened.ok, "{}", opened.message);
        assert_eq!(
            opened.pdf_location.as_deref(),
            Some("books/the-brothers-karamazov.pdf")
        );

        let view = reader_open(3, pdf_bytes(), 10);
        assert!(view.ok, "{}", view.message);
        assert_eq!(view.render_page, Some(1));
        assert!(reader_complete_render(true, String::new()).ok);
        assert_eq!(reader_request_page(4).render_page, Some(4));
        assert_eq!(reader_complete_render(true, String::new()).progress_saved, Some(true));
        assert!(reader_close().ok);
        assert_eq!(reader_check_access(3).resume_page, Some(4));

        let reopened = reader_open(3, pdf_bytes(), 10);
        assert_eq!(reopened.render_page, Some(1));
        assert_eq!(reopened.pending_page, Some(4));
        assert!(reader_close().ok);
    }

    #[test]
    fn reader_renders_one_page_at_a_time() {
        let _guard = session();
        let email = format!("{}@example.com", unique_token("paging"));
        assert!(auth_federated_login(email, String::new(), "google".to_string()).ok);

        let opened = reader_open(1, pdf_bytes(), 12);
        assert!(opened.ok, "{}", opened.message);
        assert_eq!((opened.current_page, opened.total_pages), (1, 12));

        let queued = reader_request_page(3);
        assert_eq!(queued.render_page, None);
        assert_eq!(queued.pending_page, Some(3));
        reader_request_page(7);
        assert_eq!(reader_request_page(2).pending_page, Some(2));

        let first = reader_complete_render(true, String::new());
        assert_eq!(first.rendered_page, Some(1));
        assert_eq!(first.render_page, Some(2));
        assert_eq!(first.pending_page, None);
        let second = reader_complete_render(true, String::new());
        assert_eq!((second.rendered_page, second.current_page), (Some(2), 2));
        assert_eq!(second.render_page, None);
        assert!(!reader_complete_render(true, String::new()).ok);

        let far = reader_request_page(99);
        assert_eq!(far.render_page, Some(12));
        let failed = reader_complete_render(false, "decode error".to_string());
        assert!(!failed.ok);
        assert_eq!(failed.current_page, 2);

        // Zooming re-renders the page still on screen.
        let zoomed = reader_set_zoom(9.0);
        assert_eq!(zoomed.zoom_percent, 300);
        assert_eq!(zoomed.render_page, Some(2));
        assert_eq!(zoomed.render_scale, Some(3.0));
        assert!(reader_complete_render(true, String::new()).ok);
        assert_eq!(reader_key("End".to_string()).render_page, Some(12));
        assert!(!reader_key("q".to_string()).ok);

        let history = progress_list();
        assert_eq!(history.items.len(), 1);
        assert_eq!((history.items[0].book_id, history.items[0].current_page), (1, 2));
        assert!(reader_close().ok);
        assert!(!reader_request_page(2).ok);
    }

    #[test]
    fn reader_raises_checkpoints_and_rejects_non_pdf_bytes() {
        let _guard = session();
        let email = format!("{}@example.com", unique_token("quiz"));
        assert!(auth_federated_login(email, String::new(), "github".to_string()).ok);

        assert!(!reader_open(2, b"<html>".to_vec(), 12).ok);
        assert!(!reader_open(2, pdf_bytes(), 0).ok);
        let locked = reader_open(11, pdf_bytes(), 12);
        assert_eq!(locked.price, Some(500));

        reader_open(2, pdf_bytes(), 30);
        reader_complete_render(true, String::new());
        reader_request_page(10);
        let checkpoint = reader_complete_render(true, String::new());
        assert!(checkpoint.checkpoint_available);

        let dismissed = reader_dismiss_checkpoint();
        assert!(!dismissed.checkpoint_available);
        assert!(dismissed.next_checkpoint_page > Some(10));
        assert!(reader_close().ok);

        assert!(auth_logout().ok);
        let guest = reader_open(2, pdf_bytes(), 30);
        assert!(guest.login_required);
    }

    #[test]
    fn account_edits_apply_to_the_active_account() {
        let _guard = session();
        let name = unique_token("acct");
        assert!(
            auth_register(
                name.clone(),
                format!("{name}@example.com"),
                "secret1".to_string(),
                "secret1".to_string(),
                true,
            )
            .ok
        );

        let renamed = account_update_username(format!("{name}x"));
        assert!(renamed.ok, "{}", renamed.message);
        assert_eq!(renamed.username, Some(format!("{name}x")));
        let bad_email = account_update_email("nope".to_string());
        assert_eq!(bad_email.error_field.as_deref(), Some("email"));
        assert!(account_update_email(format!("{name}x@example.com")).ok);

        assert!(!account_change_password("wrong12".to_string(), "secret2".to_string()).ok);
        assert!(account_change_password("secret1".to_string(), "secret2".to_string()).ok);
        assert!(auth_logout().ok);
        assert!(!auth_login(format!("{name}x"), "secret1".to_string()).ok);
        assert!(auth_login(format!("{name}x@example.com"), "secret2".to_string()).ok);
    }

    #[test]
    fn guests_see_free_books_unlocked_behind_login() {
        let _guard = session();
        assert!(auth_logout().ok);
        let books = catalog_list(String::new()).items;
        let free = books.iter().find(|item| item.id == 1).expect("free book");
        assert!(free.unlocked);
        assert!(free.login_required);
        let premium = books.iter().find(|item| item.id == 11).expect("premium book");
        assert!(!premium.unlocked);
    }

    #[test]
    fn purchase_spends_exp_and_rejects_shortfall() {
        let _guard = session();
        let email = format!("{}@example.com", unique_token("buyer"));
        let login = auth_federated_login(email, String::new(), "google".to_string());
        assert!(login.ok, "{}", login.message);
        assert_eq!(profile_get().exp, 1000);

        let locked = reader_check_access(13);
        assert_eq!(locked.price, Some(600));

        let bought = shop_purchase(13);
        assert!(bought.ok, "{}", bought.message);
        assert_eq!(bought.balance, Some(400));

        let short = shop_purchase(11);
        assert!(!short.ok);
        assert_eq!(short.balance, Some(400));

        let reward = quiz_reward(3, 3);
        assert_eq!(reward.balance, Some(425));
        assert!(!quiz_reward(4, 3).ok);
    }

    #[test]
    fn favorites_toggle_round_trips() {
        let _guard = session();
        let email = format!("{}@example.com", unique_token("fan"));
        assert!(auth_federated_login(email, "Fan".to_string(), "github".to_string()).ok);

        let added = favorites_toggle(6);
        assert_eq!(added.favorite, Some(true));
        assert_eq!(
            favorites_list()
                .items
                .iter()
                .map(|item| item.id)
                .collect::<Vec<_>>(),
            vec![6]
        );
        assert_eq!(favorites_toggle(6).favorite, Some(false));
        assert!(favorites_list().items.is_empty());
        assert!(!favorites_toggle(999).ok);
    }

    #[test]
    fn registration_reports_offending_field() {
        let _guard = session();
        let response = auth_register(
            "ab".to_string(),
            "a@example.com".to_string(),
            "secret1".to_string(),
            "secret1".to_string(),
            true,
        );
        assert!(!response.ok);
        assert_eq!(response.error_field.as_deref(), Some("username"));

        let unsupported = auth_federated_login(
            "a@example.com".to_string(),
            String::new(),
            "myspace".to_string(),
        );
        assert!(!unsupported.ok);
    }

    fn pdf_bytes() -> Vec<u8> {
        b"%PDF-1.7\n".to_vec()
    }

    fn unique_token(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time went backwards")
            .as_nanos();
        format!("{prefix}{nanos}")
    }
}
