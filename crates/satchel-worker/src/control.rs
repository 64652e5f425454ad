use crate::backend::NetworkBackend;
use crate::executor::now_millis;
use crate::lifecycle::{is_owned_store, LifecycleManager};
use satchel_store::StoreRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Inbound control messages, tagged the way the host page sends them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
    GetCacheStatus,
    ClearCache,
}

#[derive(Debug, Error)]
pub enum ControlError {
    /// Clearing the only copy of the data while offline is disallowed.
    #[error("offline clear rejected: network reachability could not be confirmed")]
    OfflineClearRejected,
    #[error("storage unavailable: {0}")]
    Storage(String),
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub name: String,
    pub entry_count: usize,
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub reachable: bool,
    pub computed_at_ms: u64,
    pub stores: Vec<StoreStatus>,
}

/// Replies delivered on the caller-supplied oneshot channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    Ack,
    CacheStatus(CacheStatus),
    ClearResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// One in-flight control request: the message plus the reply channel the
/// caller listens on.
pub struct ControlRequest {
    pub message: ControlMessage,
    pub reply: oneshot::Sender<ControlReply>,
}

/// Cloneable sender half of the control channel.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn channel() -> (Self, mpsc::Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(16);
        (Self { tx }, rx)
    }

    /// Send a message and wait for the reply. `None` means the control task
    /// is gone, which only happens during shutdown.
    pub async fn send(&self, message: ControlMessage) -> Option<ControlReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlRequest {
                message,
                reply: reply_tx,
            })
            .await
            .ok()?;
        reply_rx.await.ok()
    }
}

/// Services the control channel until cancelled.
pub struct ControlService {
    registry: Arc<StoreRegistry>,
    backend: Arc<dyn NetworkBackend>,
    lifecycle: Arc<LifecycleManager>,
    cache_prefix: String,
}

impl ControlService {
    pub fn new(
        registry: Arc<StoreRegistry>,
        backend: Arc<dyn NetworkBackend>,
        lifecycle: Arc<LifecycleManager>,
        cache_prefix: String,
    ) -> Self {
        Self {
            registry,
            backend,
            lifecycle,
            cache_prefix,
        }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<ControlRequest>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("control channel shutting down");
                    break;
                }
                request = rx.recv() => {
                    let Some(request) = request else { break };
                    let reply = self.handle(request.message).await;
                    // A dropped reply channel just means the caller went away.
                    let _ = request.reply.send(reply);
                }
            }
        }
    }

    pub async fn handle(&self, message: ControlMessage) -> ControlReply {
        match message {
            ControlMessage::SkipWaiting => {
                self.lifecycle.skip_waiting().await;
                ControlReply::Ack
            }
            ControlMessage::GetCacheStatus => ControlReply::CacheStatus(self.status().await),
            ControlMessage::ClearCache => match self.clear().await {
                Ok(deleted) => {
                    tracing::info!(deleted, "cache cleared by control channel");
                    ControlReply::ClearResult {
                        ok: true,
                        error: None,
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "cache clear rejected");
                    ControlReply::ClearResult {
                        ok: false,
                        error: Some(error.to_string()),
                    }
                }
            },
        }
    }

    async fn status(&self) -> CacheStatus {
        let reachable = self.backend.probe().await;
        let names = self.registry.store_names().unwrap_or_else(|error| {
            tracing::warn!(%error, "store enumeration failed for status report");
            Vec::new()
        });
        let mut stores = Vec::with_capacity(names.len());
        for name in names {
            let Ok(store) = self.registry.open(&name) else {
                continue;
            };
            let urls = store
                .identities()
                .map(|ids| ids.iter().map(|id| id.url().to_string()).collect())
                .unwrap_or_default();
            stores.push(StoreStatus {
                name,
                entry_count: store.len(),
                urls,
            });
        }
        CacheStatus {
            reachable,
            computed_at_ms: now_millis(),
            stores,
        }
    }

    /// Delete every owned store, but only with confirmed reachability.
    async fn clear(&self) -> Result<usize, ControlError> {
        if !self.backend.probe().await {
            return Err(ControlError::OfflineClearRejected);
        }
        let names = self
            .registry
            .store_names()
            .map_err(|e| ControlError::Storage(e.to_string()))?;
        let mut deleted = 0;
        for name in names
            .iter()
            .filter(|name| is_owned_store(name, &self.cache_prefix))
        {
            if self
                .registry
                .delete_store(name)
                .map_err(|e| ControlError::Storage(e.to_string()))?
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::ScriptedBackend;
    use crate::lifecycle::LifecycleConfig;
    use bytes::Bytes;
    use satchel_store::{CacheEntry, Identity};
    use std::time::Duration;

    fn service(backend: ScriptedBackend) -> (ControlService, Arc<StoreRegistry>) {
        let registry = Arc::new(StoreRegistry::new(1 << 20));
        let backend: Arc<dyn NetworkBackend> = Arc::new(backend);
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&registry),
            Arc::clone(&backend),
            "whiteboard-runtime-v1".into(),
            LifecycleConfig {
                online_gate: true,
                skip_waiting: false,
                sweep_interval: Duration::from_secs(3600),
                max_entry_age: Duration::from_secs(7 * 24 * 60 * 60),
            },
        ));
        let service = ControlService::new(registry.clone(), backend, lifecycle, "whiteboard".into());
        (service, registry)
    }

    fn put_one(registry: &StoreRegistry, store: &str, url: &str) {
        registry
            .open(store)
            .unwrap()
            .put(
                Identity::new("GET", url),
                CacheEntry {
                    status: 200,
                    headers: vec![],
                    body: Bytes::from_static(b"x"),
                },
            )
            .unwrap();
    }

    #[test]
    fn messages_parse_from_the_tagged_wire_format() {
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(msg, ControlMessage::SkipWaiting);
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"GET_CACHE_STATUS"}"#).unwrap();
        assert_eq!(msg, ControlMessage::GetCacheStatus);
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"CLEAR_CACHE"}"#).unwrap();
        assert_eq!(msg, ControlMessage::ClearCache);
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"NUKE"}"#).is_err());
    }

    #[tokio::test]
    async fn status_reports_counts_and_ordered_urls() {
        let (service, registry) = service(ScriptedBackend::new(vec![]));
        put_one(&registry, "whiteboard-runtime-v1", "http://h/b.js");
        put_one(&registry, "whiteboard-runtime-v1", "http://h/a.js");

        let ControlReply::CacheStatus(status) = service.handle(ControlMessage::GetCacheStatus).await
        else {
            panic!("expected a status reply");
        };
        assert!(status.reachable);
        assert!(status.computed_at_ms > 0);
        assert_eq!(status.stores.len(), 1);
        assert_eq!(status.stores[0].entry_count, 2);
        // Insertion order, not lexical order.
        assert_eq!(status.stores[0].urls, vec!["http://h/b.js", "http://h/a.js"]);
    }

    #[tokio::test]
    async fn clear_while_offline_is_rejected_and_touches_nothing() {
        let (service, registry) = service(ScriptedBackend::unreachable());
        put_one(&registry, "whiteboard-runtime-v1", "http://h/a.js");

        let ControlReply::ClearResult { ok, error } =
            service.handle(ControlMessage::ClearCache).await
        else {
            panic!("expected a clear reply");
        };
        assert!(!ok);
        assert!(error.unwrap().contains("offline clear rejected"));
        assert_eq!(registry.open("whiteboard-runtime-v1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_online_deletes_owned_stores_only() {
        let (service, registry) = service(ScriptedBackend::new(vec![]));
        put_one(&registry, "whiteboard-runtime-v1", "http://h/a.js");
        registry.open("whiteboard-runtime-v0").unwrap();
        registry.open("unrelated-store").unwrap();

        let ControlReply::ClearResult { ok, .. } = service.handle(ControlMessage::ClearCache).await
        else {
            panic!("expected a clear reply");
        };
        assert!(ok);
        assert_eq!(registry.store_names().unwrap(), vec!["unrelated-store"]);
    }

    #[tokio::test]
    async fn skip_waiting_activates_through_the_channel() {
        let (service, _registry) = service(ScriptedBackend::new(vec![]));
        service.lifecycle.install();

        let (handle, rx) = ControlHandle::channel();
        let shutdown = CancellationToken::new();
        let lifecycle = Arc::clone(&service.lifecycle);
        let task = tokio::spawn(service.run(rx, shutdown.clone()));

        let reply = handle.send(ControlMessage::SkipWaiting).await;
        assert!(matches!(reply, Some(ControlReply::Ack)));
        assert_eq!(lifecycle.phase(), crate::lifecycle::WorkerPhase::Active);

        shutdown.cancel();
        task.await.unwrap();
    }
}
