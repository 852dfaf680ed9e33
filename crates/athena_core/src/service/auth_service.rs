//! Registration, login and logout orchestration.
//!
//! # Responsibility
//! - Validate account input and maintain the registered-users directory.
//! - Turn an authenticated identity into the active-session profile.
//!
//! # Invariants
//! - New accounts start with `starting_exp` and every free catalog book.
//! - Logging in restores the directory record's mutable state.
//! - Switching accounts syncs the previous session before replacing it.

use crate::catalog::BookCatalog;
use crate::clock::now_epoch_ms;
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::model::profile::{AuthProvider, RegisteredUser, UserIdentity, UserProfile};
use crate::repo::profile_repo::ProfileRepository;
use crate::repo::RepoError;
use crate::service::credentials::{Authenticator, CredentialHasher};
use crate::service::validation::{is_acceptable_password, normalize_email, normalize_username};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// EXP granted to newly created accounts.
pub const DEFAULT_STARTING_EXP: u64 = 1000;

/// Form field an input error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthField {
    Identifier,
    Username,
    Email,
    Password,
    ConfirmPassword,
    Terms,
    Provider,
}

impl AuthField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Username => "username",
            Self::Email => "email",
            Self::Password => "password",
            Self::ConfirmPassword => "confirm_password",
            Self::Terms => "terms",
            Self::Provider => "provider",
        }
    }
}

/// Authentication use-case error.
#[derive(Debug)]
pub enum AuthError {
    InvalidInput {
        field: AuthField,
        message: &'static str,
    },
    /// Username or email already registered.
    AccountExists,
    InvalidCredentials,
    /// No logged-in profile (or no directory record for it).
    ProfileNotFound,
    PasswordHash(String),
    Repo(RepoError),
}

impl AuthError {
    fn input(field: AuthField, message: &'static str) -> Self {
        Self::InvalidInput { field, message }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput { message, .. } => write!(f, "{message}"),
            Self::AccountExists => write!(f, "username or email already exists"),
            Self::InvalidCredentials => write!(f, "invalid username/email or password"),
            Self::ProfileNotFound => write!(f, "no logged-in account"),
            Self::PasswordHash(message) => write!(f, "password hashing failed: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for AuthError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ProfileNotFound => Self::ProfileNotFound,
            other => Self::Repo(other),
        }
    }
}

/// Registration form input.
#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub accepted_terms: bool,
}

/// Account lifecycle service.
pub struct AuthService<'a, R: ProfileRepository, A: Authenticator> {
    repo: R,
    authenticator: A,
    hasher: CredentialHasher,
    catalog: &'a BookCatalog,
    starting_exp: u64,
    notifier: Option<Arc<ChangeNotifier>>,
}

impl<'a, R: ProfileRepository, A: Authenticator> AuthService<'a, R, A> {
    pub fn new(repo: R, authenticator: A, hasher: CredentialHasher, catalog: &'a BookCatalog) -> Self {
        Self {
            repo,
            authenticator,
            hasher,
            catalog,
            starting_exp: DEFAULT_STARTING_EXP,
            notifier: None,
        }
    }

    pub fn with_starting_exp(mut self, starting_exp: u64) -> Self {
        self.starting_exp = starting_exp;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Identity of the active session; `None` for guests.
    pub fn current_identity(&self) -> Option<UserIdentity> {
        self.repo.load().identity()
    }

    /// Creates a local account and logs it in.
    ///
    /// # Errors
    /// - `InvalidInput` naming the first offending field.
    /// - `AccountExists` when the username or email is already registered.
    pub fn register(&self, request: &RegistrationRequest) -> Result<UserIdentity, AuthError> {
        let username = normalize_username(&request.username).ok_or(AuthError::input(
            AuthField::Username,
            "username must be at least 3 characters",
        ))?;
        let email = normalize_email(&request.email)
            .ok_or(AuthError::input(AuthField::Email, "please enter a valid email"))?;
        if !is_acceptable_password(&request.password) {
            return Err(AuthError::input(
                AuthField::Password,
                "password must be at least 6 characters",
            ));
        }
        if request.password != request.confirm_password {
            return Err(AuthError::input(
                AuthField::ConfirmPassword,
                "passwords do not match",
            ));
        }
        if !request.accepted_terms {
            return Err(AuthError::input(
                AuthField::Terms,
                "you must agree to the terms",
            ));
        }

        let mut users = self.repo.registered_users()?;
        if users.iter().any(|user| {
            user.username.eq_ignore_ascii_case(&username) || user.email.eq_ignore_ascii_case(&email)
        }) {
            warn!("event=register module=auth status=rejected error_code=account_exists");
            return Err(AuthError::AccountExists);
        }

        let password_hash = self.hasher.hash(&request.password)?;
        let record = self.new_record(username, email, Some(password_hash), AuthProvider::Local);
        let identity = record.identity();
        users.push(record);
        self.repo.save_registered_users(&users)?;

        self.start_session(&identity, None)?;
        info!("event=register module=auth status=ok provider=local");
        Ok(identity)
    }

    /// Authenticates and restores the account's saved state.
    pub fn login(&self, identifier: &str, secret: &str) -> Result<UserIdentity, AuthError> {
        if identifier.trim().is_empty() {
            return Err(AuthError::input(
                AuthField::Identifier,
                "username or email is required",
            ));
        }
        if secret.is_empty() {
            return Err(AuthError::input(AuthField::Password, "password is required"));
        }

        let identity = match self.authenticator.authenticate(identifier, secret) {
            Ok(identity) => identity,
            Err(err) => {
                warn!("event=login module=auth status=rejected error={err}");
                return Err(err);
            }
        };
        let users = self.repo.registered_users()?;
        let record = users.iter().find(|user| user.id == identity.id);
        self.start_session(&identity, record)?;
        info!("event=login module=auth status=ok provider=local");
        Ok(identity)
    }

    /// Logs in with an identity asserted by an external provider, creating a
    /// password-less account on first use.
    pub fn federated_login(
        &self,
        email: &str,
        display_name: Option<&str>,
        provider: AuthProvider,
    ) -> Result<UserIdentity, AuthError> {
        if provider == AuthProvider::Local {
            return Err(AuthError::input(
                AuthField::Provider,
                "local accounts must log in with a password",
            ));
        }
        let email = normalize_email(email)
            .ok_or(AuthError::input(AuthField::Email, "please enter a valid email"))?;

        let mut users = self.repo.registered_users()?;
        let existing = users
            .iter()
            .position(|user| user.email.eq_ignore_ascii_case(&email));
        let index = match existing {
            Some(index) => index,
            None => {
                let username = display_name
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
                users.push(self.new_record(username, email, None, provider));
                self.repo.save_registered_users(&users)?;
                users.len() - 1
            }
        };

        let identity = users[index].identity();
        self.start_session(&identity, Some(&users[index]))?;
        info!(
            "event=federated_login module=auth status=ok provider={} created={}",
            provider.as_str(),
            existing.is_none()
        );
        Ok(identity)
    }

    /// Replaces the active account's password.
    pub fn change_password(&self, current: &str, new_password: &str) -> Result<(), AuthError> {
        let profile = self.repo.try_load()?.ok_or(AuthError::ProfileNotFound)?;
        let id = profile.id.ok_or(AuthError::ProfileNotFound)?;
        if !is_acceptable_password(new_password) {
            return Err(AuthError::input(
                AuthField::Password,
                "password must be at least 6 characters",
            ));
        }

        let mut users = self.repo.registered_users()?;
        let record = users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(AuthError::ProfileNotFound)?;
        let Some(phc) = record.password_hash.as_deref() else {
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(current, phc)? {
            return Err(AuthError::InvalidCredentials);
        }
        record.password_hash = Some(self.hasher.hash(new_password)?);
        self.repo.save_registered_users(&users)?;
        info!("event=change_password module=auth status=ok");
        Ok(())
    }

    /// Syncs the active profile into the directory and ends the session.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.repo.logout()?;
        info!("event=logout module=auth status=ok");
        self.notify(ChangeEvent::AuthStateChanged { logged_in: false });
        Ok(())
    }

    fn new_record(
        &self,
        username: String,
        email: String,
        password_hash: Option<String>,
        provider: AuthProvider,
    ) -> RegisteredUser {
        RegisteredUser {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            provider,
            exp: self.starting_exp,
            unlocked_books: self.catalog.free_book_ids(),
            favorites: Vec::new(),
            reading_progress: Default::default(),
            created_at_ms: now_epoch_ms(),
        }
    }

    fn start_session(
        &self,
        identity: &UserIdentity,
        record: Option<&RegisteredUser>,
    ) -> Result<(), AuthError> {
        let active = self.repo.load();
        let profile = if active.id == Some(identity.id) {
            // The active record is at least as new as the directory copy.
            let mut profile = active;
            profile.unlocked_books.extend(self.catalog.free_book_ids());
            profile
        } else {
            if active.is_logged_in() {
                self.repo.logout()?;
            }
            let mut profile = UserProfile::new_account(
                identity.clone(),
                self.starting_exp,
                self.catalog.free_book_ids(),
            );
            if let Some(record) = record {
                profile.restore_from(record);
                profile
                    .unlocked_books
                    .extend(self.catalog.free_book_ids());
            }
            profile
        };
        self.repo.save(&profile)?;
        self.repo.set_session_flag(true)?;
        if let Err(err) = self.repo.sync_registered() {
            warn!("event=session_sync module=auth status=error error={err}");
        }
        self.notify(ChangeEvent::AuthStateChanged { logged_in: true });
        Ok(())
    }

    fn notify(&self, event: ChangeEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthError, AuthField, AuthService, RegistrationRequest};
    use crate::catalog::BookCatalog;
    use crate::model::profile::AuthProvider;
    use crate::repo::profile_repo::{KvProfileRepository, ProfileRepository};
    use crate::service::credentials::{CredentialHasher, DirectoryAuthenticator};
    use crate::store::MemoryKeyValueStore;

    fn request(username: &str, email: &str) -> RegistrationRequest {
        RegistrationRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret1".to_string(),
            accepted_terms: true,
        }
    }

    fn hasher() -> CredentialHasher {
        CredentialHasher::with_cost(64, 1).expect("params")
    }

    #[test]
    fn register_validates_fields_in_form_order() {
        let catalog = BookCatalog::builtin().expect("catalog");
        let store = MemoryKeyValueStore::new();
        let repo = KvProfileRepository::new(&store);
        let auth = AuthService::new(
            &repo,
            DirectoryAuthenticator::new(&repo, hasher()),
            hasher(),
            &catalog,
        );

        let field = |req: RegistrationRequest| match auth.register(&req) {
            Err(AuthError::InvalidInput { field, .. }) => Some(field),
            _ => None,
        };
        assert_eq!(field(request("al", "a@b.co")), Some(AuthField::Username));
        assert_eq!(field(request("alice", "nope")), Some(AuthField::Email));
        let mut mismatch = request("alice", "alice@example.com");
        mismatch.confirm_password = "other12".to_string();
        assert_eq!(field(mismatch), Some(AuthField::ConfirmPassword));
        let mut no_terms = request("alice", "alice@example.com");
        no_terms.accepted_terms = false;
        assert_eq!(field(no_terms), Some(AuthField::Terms));
        assert!(store.is_empty());
    }

    #[test]
    fn register_rejects_case_insensitive_duplicates() {
        let catalog = BookCatalog::builtin().expect("catalog");
        let store = MemoryKeyValueStore::new();
        let repo = KvProfileRepository::new(&store);
        let auth = AuthService::new(
            &repo,
            DirectoryAuthenticator::new(&repo, hasher()),
            hasher(),
            &catalog,
        );
        auth.register(&request("alice", "alice@example.com"))
            .expect("first registration");
        assert!(matches!(
            auth.register(&request("ALICE", "other@example.com")),
            Err(AuthError::AccountExists)
        ));
        assert!(matches!(
            auth.register(&request("bob", "Alice@Example.com")),
            Err(AuthError::AccountExists)
        ));
    }

    #[test]
    fn federated_login_reuses_account_by_email() {
        let catalog = BookCatalog::builtin().expect("catalog");
        let store = MemoryKeyValueStore::new();
        let repo = KvProfileRepository::new(&store);
        let auth = AuthService::new(
            &repo,
            DirectoryAuthenticator::new(&repo, hasher()),
            hasher(),
            &catalog,
        );

        let first = auth
            .federated_login("reader@example.com", None, AuthProvider::Github)
            .expect("first login");
        assert_eq!(first.username, "reader");
        auth.logout().expect("logout");

        let second = auth
            .federated_login("READER@example.com", Some("Someone"), AuthProvider::Github)
            .expect("second login");
        assert_eq!(first.id, second.id);
        assert_eq!(repo.registered_users().expect("users").len(), 1);

        assert!(matches!(
            auth.login("reader", "anything"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn change_password_requires_current_secret() {
        let catalog = BookCatalog::builtin().expect("catalog");
        let store = MemoryKeyValueStore::new();
        let repo = KvProfileRepository::new(&store);
        let auth = AuthService::new(
            &repo,
            DirectoryAuthenticator::new(&repo, hasher()),
            hasher(),
            &catalog,
        );
        auth.register(&request("alice", "alice@example.com"))
            .expect("register");

        assert!(matches!(
            auth.change_password("wrong!", "newsecret"),
            Err(AuthError::InvalidCredentials)
        ));
        auth.change_password("secret1", "newsecret")
            .expect("change password");
        auth.logout().expect("logout");

        assert!(auth.login("alice", "secret1").is_err());
        auth.login("alice", "newsecret").expect("login with new password");
    }
}
