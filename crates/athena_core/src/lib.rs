//! Core domain logic for the Athena reader.
//! This crate is the single source of truth for business invariants.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod db;
pub mod events;
pub mod logging;
pub mod model;
pub mod reader;
pub mod repo;
pub mod service;
pub mod store;

pub use catalog::{resolve_pdf_location, BookCatalog, CatalogError, PdfLocation};
pub use config::{ConfigError, CoreConfig};
pub use events::{ChangeEvent, ChangeNotifier};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::book::{BookId, BookRecord, BookTier, RawBookRecord};
pub use model::profile::{
    AuthProvider, ReadingProgress, RegisteredUser, UserId, UserIdentity, UserProfile,
};
pub use reader::engine::{
    DocumentError, DocumentSource, FsDocumentSource, PdfDocument, PdfEngine, RenderError,
};
pub use reader::quiz::{reward_for_score, CheckpointQuiz, QuizResult};
pub use reader::sequencer::{
    PageRequest, PaginationSequencer, ProgressRecorder, RenderEvent, SequencerState,
};
pub use reader::session::{check_access, ReaderCommand, ReaderOptions, ReaderSession};
pub use reader::ReaderError;
pub use repo::preferences_repo::{PreferencesRepository, Theme};
pub use repo::profile_repo::{KvProfileRepository, ProfileRepository};
pub use repo::{RepoError, RepoResult};
pub use service::auth_service::{AuthError, AuthService, RegistrationRequest};
pub use service::credentials::{Authenticator, CredentialHasher, DirectoryAuthenticator};
pub use service::entitlement_service::{
    is_unlocked, EntitlementError, EntitlementService, PurchaseReceipt, ShopQuery, ShopSort,
};
pub use service::library_service::{LibraryError, LibraryService, LibraryStats};
pub use service::preferences_service::PreferencesService;
pub use store::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StoreError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
