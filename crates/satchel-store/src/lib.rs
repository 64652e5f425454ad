//! Persistent-store layer for the offline cache worker.
//!
//! A [`StoreRegistry`] owns any number of named [`CacheStore`]s; each store
//! maps a request [`Identity`] (method + absolute URL) to an immutable
//! [`CacheEntry`]. Entries are only ever replaced whole, never patched.
//!
//! Every operation can fail with [`StoreError::Unavailable`] (quota
//! exceeded, storage disabled). Callers in the request path are expected to
//! treat that as a cache miss and move on.

mod entry;
mod error;
mod registry;
mod store;

pub use entry::{CacheEntry, Identity, FETCHED_AT_HEADER};
pub use error::StoreError;
pub use registry::StoreRegistry;
pub use store::CacheStore;
