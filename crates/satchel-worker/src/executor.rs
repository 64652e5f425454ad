use crate::backend::{FetchError, FetchedResponse, NetworkBackend, ResponseOrigin};
use crate::classify::Classification;
use crate::event::FetchEvent;
use crate::fallback::OfflineFallbackProvider;
use crate::strategy::Strategy;
use bytes::Bytes;
use satchel_store::{CacheEntry, CacheStore, Identity, FETCHED_AT_HEADER};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a served response came from. Surfaced by the front end as the
/// `x-satchel-cache` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeSource {
    Network,
    Cache,
    Fallback,
}

/// The response a strategy produced. Strategies are infallible: every path
/// terminates here or in the offline fallback, never in an error.
#[derive(Clone, Debug)]
pub struct ServedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ServeSource,
}

/// Orchestrates cache lookups, network fetches, background revalidation and
/// fallback composition for one active store.
pub struct StrategyExecutor {
    store: Arc<CacheStore>,
    backend: Arc<dyn NetworkBackend>,
    fallback: OfflineFallbackProvider,
    max_body_bytes: usize,
}

impl StrategyExecutor {
    pub fn new(
        store: Arc<CacheStore>,
        backend: Arc<dyn NetworkBackend>,
        fallback: OfflineFallbackProvider,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            store,
            backend,
            fallback,
            max_body_bytes,
        }
    }

    /// Run one strategy to completion. Always returns a response.
    pub async fn execute(
        &self,
        event: &FetchEvent,
        classification: Classification,
        strategy: Strategy,
    ) -> ServedResponse {
        match strategy {
            // Both policies collapse to the same orchestration once the
            // background refresh on a hit is unconditional: serve the cached
            // entry immediately if there is one, otherwise wait for the
            // network.
            Strategy::CacheFirst | Strategy::StaleWhileRevalidate => {
                self.cache_then_revalidate(event, classification).await
            }
            Strategy::NetworkFirst => self.network_first(event, classification).await,
            Strategy::NetworkOnlyWithCacheFallback => {
                self.network_only_with_cache_fallback(event, classification).await
            }
        }
    }

    async fn cache_then_revalidate(
        &self,
        event: &FetchEvent,
        classification: Classification,
    ) -> ServedResponse {
        let identity = event.identity();
        if let Some(entry) = self.lookup(&identity) {
            self.spawn_revalidate(event.clone());
            return served_from_cache(&entry);
        }
        match self.fetch_and_store(event).await {
            Ok(response) if response.is_success() => served_from_network(response),
            Ok(response) => {
                tracing::debug!(key = %identity, status = response.status, "non-success response, falling back");
                self.fallback.fallback(classification, event)
            }
            Err(error) => {
                tracing::debug!(key = %identity, %error, "network failed on cache miss");
                self.fallback.fallback(classification, event)
            }
        }
    }

    async fn network_first(
        &self,
        event: &FetchEvent,
        classification: Classification,
    ) -> ServedResponse {
        let identity = event.identity();
        match self.fetch_and_store(event).await {
            Ok(response) if response.is_success() => served_from_network(response),
            outcome => {
                match &outcome {
                    Ok(response) => tracing::debug!(
                        key = %identity,
                        status = response.status,
                        "non-success response, trying cache"
                    ),
                    Err(error) => {
                        tracing::debug!(key = %identity, %error, "network failed, trying cache")
                    }
                }
                match self.lookup(&identity) {
                    Some(entry) => served_from_cache(&entry),
                    None => self.fallback.fallback(classification, event),
                }
            }
        }
    }

    /// For API-shaped requests: the caller gets whatever the network said,
    /// error statuses included — an application can act on a 404. Only a
    /// strictly successful response is persisted.
    async fn network_only_with_cache_fallback(
        &self,
        event: &FetchEvent,
        classification: Classification,
    ) -> ServedResponse {
        let identity = event.identity();
        match self.fetch_and_store(event).await {
            Ok(response) => served_from_network(response),
            Err(error) => {
                tracing::debug!(key = %identity, %error, "network failed, trying cache");
                match self.lookup(&identity) {
                    Some(entry) => served_from_cache(&entry),
                    None => self.fallback.fallback(classification, event),
                }
            }
        }
    }

    /// Cache read with the unavailability contract applied: storage errors
    /// are logged and reported as a miss.
    fn lookup(&self, identity: &Identity) -> Option<Arc<CacheEntry>> {
        match self.store.get(identity) {
            Ok(hit) => hit,
            Err(error) => {
                tracing::warn!(key = %identity, %error, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Fetch from the network and, when the response qualifies, persist it.
    /// A failed write never affects the returned response.
    async fn fetch_and_store(&self, event: &FetchEvent) -> Result<FetchedResponse, FetchError> {
        let response = self.backend.fetch(event).await?;
        maybe_store(&self.store, event.identity(), &response, self.max_body_bytes);
        Ok(response)
    }

    /// Fire-and-forget refresh. The task is not awaited by the request path
    /// and any failure is discarded.
    fn spawn_revalidate(&self, event: FetchEvent) {
        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);
        let max_body_bytes = self.max_body_bytes;
        tokio::spawn(async move {
            match backend.fetch(&event).await {
                Ok(response) => {
                    maybe_store(&store, event.identity(), &response, max_body_bytes);
                }
                Err(error) => {
                    tracing::debug!(url = %event.url, %error, "background refresh failed");
                }
            }
        });
    }
}

/// Unix milliseconds now.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A response is persisted only when its status is in the success range,
/// its body came from the page's own origin, and it fits the body limit.
fn cacheable(response: &FetchedResponse, max_body_bytes: usize) -> bool {
    response.is_success()
        && response.origin == ResponseOrigin::Basic
        && response.body.len() <= max_body_bytes
}

fn maybe_store(
    store: &CacheStore,
    identity: Identity,
    response: &FetchedResponse,
    max_body_bytes: usize,
) {
    if !cacheable(response, max_body_bytes) {
        return;
    }
    let mut headers = response.headers.clone();
    headers.retain(|(name, _)| !name.eq_ignore_ascii_case(FETCHED_AT_HEADER));
    headers.push((FETCHED_AT_HEADER.to_string(), now_millis().to_string()));
    let entry = CacheEntry {
        status: response.status,
        headers,
        body: response.body.clone(),
    };
    if let Err(error) = store.put(identity.clone(), entry) {
        tracing::warn!(key = %identity, %error, "cache write failed, response served uncached");
    }
}

fn served_from_cache(entry: &CacheEntry) -> ServedResponse {
    ServedResponse {
        status: entry.status,
        headers: entry.headers.clone(),
        body: entry.body.clone(),
        source: ServeSource::Cache,
    }
}

fn served_from_network(response: FetchedResponse) -> ServedResponse {
    ServedResponse {
        status: response.status,
        headers: response.headers,
        body: response.body,
        source: ServeSource::Network,
    }
}
