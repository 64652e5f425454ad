use crate::entry::{CacheEntry, Identity};
use crate::error::StoreError;
use ahash::RandomState;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single named cache store: identity → entry, with stable
/// insertion-order enumeration for the control channel.
///
/// One `RwLock` guards the map, so a `put` racing a `get` for the same
/// identity observes either the old or the new entry, never a torn value.
/// Entries are handed out as `Arc` clones; a concurrent overwrite does not
/// invalidate a reader's copy.
pub struct CacheStore {
    name: String,
    max_bytes: usize,
    disabled: Arc<AtomicBool>,
    inner: RwLock<Inner>,
}

struct Inner {
    map: HashMap<Identity, Arc<CacheEntry>, RandomState>,
    order: Vec<Identity>,
    bytes: usize,
}

impl CacheStore {
    pub(crate) fn new(name: String, max_bytes: usize, disabled: Arc<AtomicBool>) -> Self {
        Self {
            name,
            max_bytes,
            disabled,
            inner: RwLock::new(Inner {
                map: HashMap::with_hasher(RandomState::new()),
                order: Vec::new(),
                bytes: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.disabled.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("storage disabled".into()));
        }
        Ok(())
    }

    pub fn get(&self, identity: &Identity) -> Result<Option<Arc<CacheEntry>>, StoreError> {
        self.check_available()?;
        Ok(self.inner.read().map.get(identity).cloned())
    }

    /// Insert or overwrite the entry for `identity`. Fails with
    /// `Unavailable` when the store's byte quota would be exceeded; the
    /// store is left unchanged in that case.
    pub fn put(&self, identity: Identity, entry: CacheEntry) -> Result<(), StoreError> {
        self.check_available()?;
        let weight = entry.weight();
        let mut inner = self.inner.write();
        let replaced = inner.map.get(&identity).map(|e| e.weight()).unwrap_or(0);
        let projected = inner.bytes - replaced + weight;
        if projected > self.max_bytes {
            return Err(StoreError::Unavailable(format!(
                "quota exceeded in store {} ({projected} > {} bytes)",
                self.name, self.max_bytes
            )));
        }
        if inner.map.insert(identity.clone(), Arc::new(entry)).is_none() {
            inner.order.push(identity);
        }
        inner.bytes = projected;
        Ok(())
    }

    /// Remove the entry for `identity`. Returns whether one existed.
    pub fn delete(&self, identity: &Identity) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.write();
        match inner.map.remove(identity) {
            Some(entry) => {
                inner.bytes = inner.bytes.saturating_sub(entry.weight());
                inner.order.retain(|id| id != identity);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot of all identities in insertion order. Stable within one
    /// enumeration; an overwrite keeps the original position.
    pub fn identities(&self) -> Result<Vec<Identity>, StoreError> {
        self.check_available()?;
        Ok(self.inner.read().order.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
