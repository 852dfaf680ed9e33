//! In-process store used by tests and ephemeral sessions.

use super::{validate_key, KeyValueStore, StoreError, StoreResult};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// `BTreeMap`-backed store with an optional total byte quota.
///
/// The quota counts key and value bytes of every entry, mirroring how browser
/// storage rejects writes once an origin runs out of space.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RefCell<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes pushing usage above `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RefCell::default(),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Total bytes currently counted against the quota.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = validate_key(key)?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = validate_key(key)?;
        if let Some(limit_bytes) = self.quota_bytes {
            let replaced = self
                .entries
                .borrow()
                .get(key)
                .map_or(0, |old| key.len() + old.len());
            let projected = self.used_bytes() - replaced + key.len() + value.len();
            if projected > limit_bytes {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    limit_bytes,
                });
            }
        }

        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let key = validate_key(key)?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryKeyValueStore;
    use crate::store::{KeyValueStore, StoreError};

    #[test]
    fn set_get_remove_roundtrip() {
        let store = MemoryKeyValueStore::new();
        store.set("athena_theme", "dark").expect("set");
        assert_eq!(
            store.get("athena_theme").expect("get").as_deref(),
            Some("dark")
        );

        store.remove("athena_theme").expect("remove");
        assert_eq!(store.get("athena_theme").expect("get"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn quota_rejects_growth_but_allows_shrinking_overwrite() {
        let store = MemoryKeyValueStore::with_quota(16);
        store.set("k", "0123456789").expect("fits");

        let err = store
            .set("k", "0123456789abcdefgh")
            .expect_err("overwrite beyond quota must fail");
        assert!(matches!(err, StoreError::QuotaExceeded { limit_bytes: 16, .. }));
        assert_eq!(store.get("k").expect("get").as_deref(), Some("0123456789"));

        store.set("k", "short").expect("shrinking overwrite fits");
        assert_eq!(store.used_bytes(), 6);
    }

    #[test]
    fn rejects_blank_keys() {
        let store = MemoryKeyValueStore::new();
        let err = store.set("  ", "value").expect_err("blank key");
        assert!(matches!(err, StoreError::InvalidKey));
    }
}
