use crate::backend::NetworkBackend;
use crate::executor::now_millis;
use parking_lot::Mutex;
use satchel_store::StoreRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lifecycle phases. Fetch interception only happens once `Active`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Constructed but not yet installed.
    Parsed,
    /// Installed and ready to activate.
    Installed,
    /// Installed but parked until a `SkipWaiting` control message.
    Waiting,
    /// In control of the page; requests are intercepted.
    Active,
}

/// Store naming convention: `<prefix>-runtime-v<version>`. Names outside
/// the current version are stale and get dropped at activation.
pub fn store_name(prefix: &str, version: u32) -> String {
    format!("{prefix}-runtime-v{version}")
}

/// Whether a store name belongs to this application's naming convention.
/// `ClearCache` only touches owned stores.
pub fn is_owned_store(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('-'))
}

#[derive(Clone, Copy, Debug)]
pub struct LifecycleConfig {
    /// Probe reachability before destructive cleanup. Probe failure fails
    /// open: caches are preserved, never destroyed while offline.
    pub online_gate: bool,
    /// Activate immediately on install instead of parking in `Waiting`.
    pub skip_waiting: bool,
    pub sweep_interval: Duration,
    pub max_entry_age: Duration,
}

/// Drives installation, activation (version rollover cleanup) and the
/// periodic age-based eviction sweep.
pub struct LifecycleManager {
    registry: Arc<StoreRegistry>,
    backend: Arc<dyn NetworkBackend>,
    active_name: String,
    config: LifecycleConfig,
    phase: Mutex<WorkerPhase>,
}

impl LifecycleManager {
    pub fn new(
        registry: Arc<StoreRegistry>,
        backend: Arc<dyn NetworkBackend>,
        active_name: String,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            registry,
            backend,
            active_name,
            config,
            phase: Mutex::new(WorkerPhase::Parsed),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock()
    }

    pub fn active_store_name(&self) -> &str {
        &self.active_name
    }

    /// Install: mark ready. Nothing is precached; entries appear lazily as
    /// the executor caches responses.
    pub fn install(&self) {
        let next = if self.config.skip_waiting {
            WorkerPhase::Installed
        } else {
            WorkerPhase::Waiting
        };
        *self.phase.lock() = next;
        tracing::info!(phase = ?next, store = %self.active_name, "worker installed");
    }

    /// Activate: drop stale-named stores, then take control. With the
    /// online gate on, a failed reachability probe skips cleanup entirely —
    /// destroying the only offline copy of the data is worse than keeping a
    /// stale store around.
    pub async fn activate(&self) {
        if self.config.online_gate && !self.backend.probe().await {
            tracing::info!("reachability probe failed, preserving all cache stores");
        } else {
            match self.registry.delete_all_except(&self.active_name) {
                Ok(deleted) if !deleted.is_empty() => {
                    tracing::info!(stores = ?deleted, "stale cache stores removed")
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(%error, "store cleanup failed, continuing activation")
                }
            }
        }
        *self.phase.lock() = WorkerPhase::Active;
        tracing::info!(store = %self.active_name, "worker active");
    }

    /// Force a waiting worker over. No-op in any other phase.
    pub async fn skip_waiting(&self) {
        if self.phase() == WorkerPhase::Waiting {
            self.activate().await;
        }
    }

    /// One eviction pass over the active store. Entries older than the max
    /// age are deleted; entries without a parseable timestamp are always
    /// retained. A storage error aborts the pass — partial sweeps are fine,
    /// the next tick picks up the rest.
    pub fn sweep(&self, now: u64) -> usize {
        let max_age = self.config.max_entry_age.as_millis() as u64;
        let store = match self.registry.open(&self.active_name) {
            Ok(store) => store,
            Err(error) => {
                tracing::warn!(%error, "eviction sweep skipped, store unavailable");
                return 0;
            }
        };
        let identities = match store.identities() {
            Ok(identities) => identities,
            Err(error) => {
                tracing::warn!(%error, "eviction sweep skipped, enumeration failed");
                return 0;
            }
        };

        let mut evicted = 0;
        for identity in identities {
            let Ok(Some(entry)) = store.get(&identity) else {
                continue;
            };
            let Some(fetched_at) = entry.fetched_at_millis() else {
                continue;
            };
            if now.saturating_sub(fetched_at) > max_age {
                match store.delete(&identity) {
                    Ok(_) => evicted += 1,
                    Err(error) => {
                        tracing::warn!(key = %identity, %error, "eviction aborted mid-sweep");
                        break;
                    }
                }
            }
        }
        if evicted > 0 {
            tracing::info!(evicted, store = %self.active_name, "eviction sweep complete");
        }
        evicted
    }

    /// Timer task for the eviction sweep; runs until cancelled. Sweeps only
    /// when the network is reachable, and never blocks request handling.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        // The first tick of a tokio interval fires immediately; consume it
        // so sweeps start one full period after boot.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("eviction sweeper shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if self.backend.probe().await {
                        self.sweep(now_millis());
                    } else {
                        tracing::debug!("offline, skipping eviction sweep");
                    }
                }
            }
        }
    }
}
