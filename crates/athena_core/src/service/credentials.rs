//! Credential hashing and verification.
//!
//! # Responsibility
//! - Hash account secrets into argon2 PHC strings.
//! - Verify `(identifier, secret)` pairs through the `Authenticator` seam.
//!
//! # Invariants
//! - Plain-text secrets are never persisted or logged.
//! - Federated accounts (no stored hash) never authenticate with a secret.

use crate::model::profile::UserIdentity;
use crate::repo::profile_repo::ProfileRepository;
use crate::service::auth_service::AuthError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use log::debug;

/// Credential verification capability.
///
/// A remote identity backend can stand in for the local directory without
/// touching `AuthService` callers.
pub trait Authenticator {
    fn authenticate(&self, identifier: &str, secret: &str) -> Result<UserIdentity, AuthError>;
}

impl<A: Authenticator + ?Sized> Authenticator for &A {
    fn authenticate(&self, identifier: &str, secret: &str) -> Result<UserIdentity, AuthError> {
        (**self).authenticate(identifier, secret)
    }
}

/// Argon2id hasher.
#[derive(Clone, Default)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    /// Hasher with explicit memory (KiB) and iteration cost.
    ///
    /// Stored hashes carry their own parameters, so hashes produced with one
    /// cost still verify under another.
    pub fn with_cost(memory_kib: u32, iterations: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|err| AuthError::PasswordHash(err.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, secret: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::PasswordHash(err.to_string()))
    }

    /// Returns whether `secret` matches `phc`.
    ///
    /// # Errors
    /// `PasswordHash` when `phc` is not a parsable hash string.
    pub fn verify(&self, secret: &str, phc: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(phc).map_err(|err| AuthError::PasswordHash(err.to_string()))?;
        Ok(self
            .argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Authenticates against the registered-users directory.
pub struct DirectoryAuthenticator<R: ProfileRepository> {
    repo: R,
    hasher: CredentialHasher,
}

impl<R: ProfileRepository> DirectoryAuthenticator<R> {
    pub fn new(repo: R, hasher: CredentialHasher) -> Self {
        Self { repo, hasher }
    }
}

impl<R: ProfileRepository> Authenticator for DirectoryAuthenticator<R> {
    fn authenticate(&self, identifier: &str, secret: &str) -> Result<UserIdentity, AuthError> {
        let users = self.repo.registered_users()?;
        let Some(user) = users.iter().find(|user| user.matches_identifier(identifier)) else {
            debug!("event=authenticate module=auth status=rejected reason=unknown_identifier");
            return Err(AuthError::InvalidCredentials);
        };
        let Some(phc) = user.password_hash.as_deref() else {
            debug!("event=authenticate module=auth status=rejected reason=federated_account");
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(secret, phc)? {
            debug!("event=authenticate module=auth status=rejected reason=secret_mismatch");
            return Err(AuthError::InvalidCredentials);
        }
        Ok(user.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::CredentialHasher;
    use crate::service::auth_service::AuthError;

    fn fast() -> CredentialHasher {
        CredentialHasher::with_cost(64, 1).expect("valid params")
    }

    #[test]
    fn hash_verifies_only_the_original_secret() {
        let hasher = fast();
        let phc = hasher.hash("secret1").expect("hash");
        assert!(phc.starts_with("$argon2id$"));
        assert!(!phc.contains("secret1"));
        assert!(hasher.verify("secret1", &phc).expect("verify"));
        assert!(!hasher.verify("secret2", &phc).expect("verify"));
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = fast();
        assert_ne!(
            hasher.hash("secret1").expect("hash"),
            hasher.hash("secret1").expect("hash")
        );
    }

    #[test]
    fn verify_rejects_malformed_hash_strings() {
        assert!(matches!(
            fast().verify("secret1", "plaintext"),
            Err(AuthError::PasswordHash(_))
        ));
    }

    #[test]
    fn invalid_cost_is_reported() {
        assert!(matches!(
            CredentialHasher::with_cost(1, 0),
            Err(AuthError::PasswordHash(_))
        ));
    }
}
