//! Active profile and account directory persistence.
//!
//! # Responsibility
//! - Sole reader/writer of the active-session profile record.
//! - Keep the account directory in step with the active profile.
//!
//! # Invariants
//! - `load()` never fails; anything unusable is the guest profile.
//! - `modify()` is the only read-modify-write path and persists only when the
//!   mutation succeeds.
//! - Concurrent writers are last-write-wins; there is no version check.

use crate::model::profile::{RegisteredUser, UserProfile};
use crate::repo::{RepoError, RepoResult};
use crate::store::{KeyValueStore, KEY_ACTIVE_USER, KEY_REGISTERED_USERS, KEY_SESSION_TOKEN};
use log::{debug, warn};

const SESSION_TOKEN_VALUE: &str = "local_session";

/// Repository interface for the active profile and the account directory.
pub trait ProfileRepository {
    /// Strict read of the active profile.
    ///
    /// Returns `Ok(None)` when no record exists or its identity is incomplete,
    /// and `InvalidData` when the record cannot be parsed.
    fn try_load(&self) -> RepoResult<Option<UserProfile>>;

    /// Overwrites the active profile record.
    fn save(&self, profile: &UserProfile) -> RepoResult<()>;

    /// Removes the active profile record and the session flag.
    fn clear(&self) -> RepoResult<()>;

    fn registered_users(&self) -> RepoResult<Vec<RegisteredUser>>;

    fn save_registered_users(&self, users: &[RegisteredUser]) -> RepoResult<()>;

    /// Sets or removes the logged-in session flag.
    fn set_session_flag(&self, logged_in: bool) -> RepoResult<()>;

    /// Soft read of the active profile.
    fn load(&self) -> UserProfile {
        match self.try_load() {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::guest(),
            Err(err) => {
                warn!(
                    "event=profile_load module=repo status=degraded error_code=profile_unreadable error={err}"
                );
                UserProfile::guest()
            }
        }
    }

    fn is_logged_in(&self) -> bool {
        self.load().is_logged_in()
    }

    /// Loads the logged-in profile, applies `mutate`, and saves the result.
    ///
    /// Nothing is written when there is no logged-in profile or when `mutate`
    /// returns an error.
    fn modify<T, E, F>(&self, mutate: F) -> Result<T, E>
    where
        Self: Sized,
        E: From<RepoError>,
        F: FnOnce(&mut UserProfile) -> Result<T, E>,
    {
        let mut profile = self.try_load()?.ok_or(RepoError::ProfileNotFound)?;
        let output = mutate(&mut profile)?;
        self.save(&profile)?;
        Ok(output)
    }

    /// Copies the active profile's state into its directory record.
    ///
    /// Returns `false` when there is no logged-in profile or no matching
    /// directory record.
    fn sync_registered(&self) -> RepoResult<bool> {
        let Some(profile) = self.try_load()? else {
            return Ok(false);
        };
        let Some(id) = profile.id else {
            return Ok(false);
        };

        let mut users = self.registered_users()?;
        let Some(record) = users.iter_mut().find(|user| user.id == id) else {
            return Ok(false);
        };
        record.absorb(&profile);
        self.save_registered_users(&users)?;
        Ok(true)
    }

    /// Ends the active session.
    ///
    /// Directory sync is best-effort; a failing sync is logged and the
    /// session is still cleared.
    fn logout(&self) -> RepoResult<()> {
        match self.sync_registered() {
            Ok(synced) => debug!("event=logout_sync module=repo status=ok synced={synced}"),
            Err(err) => warn!(
                "event=logout_sync module=repo status=error error_code=directory_sync_failed error={err}"
            ),
        }
        self.clear()
    }
}

impl<R: ProfileRepository + ?Sized> ProfileRepository for &R {
    fn try_load(&self) -> RepoResult<Option<UserProfile>> {
        (**self).try_load()
    }

    fn save(&self, profile: &UserProfile) -> RepoResult<()> {
        (**self).save(profile)
    }

    fn clear(&self) -> RepoResult<()> {
        (**self).clear()
    }

    fn registered_users(&self) -> RepoResult<Vec<RegisteredUser>> {
        (**self).registered_users()
    }

    fn save_registered_users(&self, users: &[RegisteredUser]) -> RepoResult<()> {
        (**self).save_registered_users(users)
    }

    fn set_session_flag(&self, logged_in: bool) -> RepoResult<()> {
        (**self).set_session_flag(logged_in)
    }
}

/// Profile repository stored in a `KeyValueStore`.
pub struct KvProfileRepository<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> KvProfileRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: KeyValueStore> ProfileRepository for KvProfileRepository<S> {
    fn try_load(&self) -> RepoResult<Option<UserProfile>> {
        let Some(raw) = self.store.get(KEY_ACTIVE_USER)? else {
            return Ok(None);
        };
        let profile: UserProfile = serde_json::from_str(&raw).map_err(|err| {
            RepoError::InvalidData(format!("unparsable record in `{KEY_ACTIVE_USER}`: {err}"))
        })?;
        Ok(profile.is_logged_in().then_some(profile))
    }

    fn save(&self, profile: &UserProfile) -> RepoResult<()> {
        let raw = serde_json::to_string(profile).map_err(RepoError::Serialize)?;
        self.store.set(KEY_ACTIVE_USER, &raw)?;
        Ok(())
    }

    fn clear(&self) -> RepoResult<()> {
        self.store.remove(KEY_ACTIVE_USER)?;
        self.store.remove(KEY_SESSION_TOKEN)?;
        Ok(())
    }

    fn registered_users(&self) -> RepoResult<Vec<RegisteredUser>> {
        let Some(raw) = self.store.get(KEY_REGISTERED_USERS)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|err| {
            RepoError::InvalidData(format!(
                "unparsable record in `{KEY_REGISTERED_USERS}`: {err}"
            ))
        })
    }

    fn save_registered_users(&self, users: &[RegisteredUser]) -> RepoResult<()> {
        let raw = serde_json::to_string(users).map_err(RepoError::Serialize)?;
        self.store.set(KEY_REGISTERED_USERS, &raw)?;
        Ok(())
    }

    fn set_session_flag(&self, logged_in: bool) -> RepoResult<()> {
        if logged_in {
            self.store.set(KEY_SESSION_TOKEN, SESSION_TOKEN_VALUE)?;
        } else {
            self.store.remove(KEY_SESSION_TOKEN)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{KvProfileRepository, ProfileRepository};
    use crate::model::profile::{UserIdentity, UserProfile};
    use crate::repo::RepoError;
    use crate::store::{KeyValueStore, MemoryKeyValueStore, KEY_ACTIVE_USER};
    use uuid::Uuid;

    fn profile() -> UserProfile {
        UserProfile::new_account(
            UserIdentity {
                id: Uuid::new_v4(),
                username: "reader".to_string(),
                email: "reader@example.com".to_string(),
            },
            1000,
            [1, 2],
        )
    }

    #[test]
    fn load_falls_back_to_guest_for_missing_or_corrupt_records() {
        let store = MemoryKeyValueStore::new();
        let repo = KvProfileRepository::new(&store);
        assert_eq!(repo.load(), UserProfile::guest());

        store.set(KEY_ACTIVE_USER, "{broken").expect("seed");
        assert_eq!(repo.load(), UserProfile::guest());
        assert!(matches!(repo.try_load(), Err(RepoError::InvalidData(_))));

        store.set(KEY_ACTIVE_USER, r#"{"username":"x","exp":5}"#).expect("seed");
        assert_eq!(repo.try_load().expect("parsable"), None);
        assert!(!repo.is_logged_in());
    }

    #[test]
    fn modify_does_not_write_when_mutation_fails() {
        let store = MemoryKeyValueStore::new();
        let repo = KvProfileRepository::new(&store);
        repo.save(&profile()).expect("save");

        let result: Result<(), RepoError> = repo.modify(|profile| {
            profile.exp = 0;
            Err(RepoError::InvalidData("rejected".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(repo.load().exp, 1000);
    }

    #[test]
    fn modify_requires_logged_in_profile() {
        let store = MemoryKeyValueStore::new();
        let repo = KvProfileRepository::new(&store);
        let result: Result<(), RepoError> = repo.modify(|_| Ok(()));
        assert!(matches!(result, Err(RepoError::ProfileNotFound)));
        assert!(store.is_empty());
    }
}
