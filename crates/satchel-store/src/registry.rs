use crate::error::StoreError;
use crate::store::CacheStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registry of named cache stores.
///
/// `open` is idempotent create-or-get. Version rollover uses
/// `delete_all_except` to drop every stale-named store at activation.
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Arc<CacheStore>>>,
    max_store_bytes: usize,
    disabled: Arc<AtomicBool>,
}

impl StoreRegistry {
    pub fn new(max_store_bytes: usize) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            max_store_bytes,
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.disabled.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("storage disabled".into()));
        }
        Ok(())
    }

    /// Open the named store, creating it if absent.
    pub fn open(&self, name: &str) -> Result<Arc<CacheStore>, StoreError> {
        self.check_available()?;
        if let Some(store) = self.stores.read().get(name) {
            return Ok(Arc::clone(store));
        }
        let mut stores = self.stores.write();
        let store = stores.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CacheStore::new(
                name.to_string(),
                self.max_store_bytes,
                Arc::clone(&self.disabled),
            ))
        });
        Ok(Arc::clone(store))
    }

    /// Drop the named store entirely. Returns whether it existed.
    pub fn delete_store(&self, name: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.stores.write().remove(name).is_some())
    }

    /// All store names, sorted for deterministic enumeration.
    pub fn store_names(&self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Delete every store except `keep`. Returns the deleted names.
    pub fn delete_all_except(&self, keep: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let mut stores = self.stores.write();
        let stale: Vec<String> = stores.keys().filter(|n| *n != keep).cloned().collect();
        for name in &stale {
            stores.remove(name);
        }
        Ok(stale)
    }

    /// Kill switch modelling the host disabling storage (quota pressure,
    /// private browsing). While set, every store operation fails
    /// `Unavailable`, including on handles opened earlier.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }
}
