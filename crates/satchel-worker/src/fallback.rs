use crate::classify::Classification;
use crate::event::FetchEvent;
use crate::executor::{ServeSource, ServedResponse};
use bytes::Bytes;
use satchel_store::{CacheStore, Identity};
use serde::Deserialize;
use std::sync::Arc;

const OFFLINE_PAGE: &str = "<h1>Offline</h1><p>You are currently offline.</p>";
const UNAVAILABLE_BODY: &str = "offline: resource unavailable";

/// What to synthesize for an offline navigation with no cached shell. The
/// deployed variants disagree (200 HTML page vs 503 plain text), so this is
/// a knob rather than a constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackFlavor {
    /// 200 `text/html` "you are currently offline" page.
    Page,
    /// 503 `text/plain` service-unavailable body.
    Unavailable,
}

/// Last resort of every strategy chain. Never fails: every call produces a
/// response.
pub struct OfflineFallbackProvider {
    store: Arc<CacheStore>,
    shell_identity: Identity,
    flavor: FallbackFlavor,
}

impl OfflineFallbackProvider {
    pub fn new(store: Arc<CacheStore>, shell_url: &str, flavor: FallbackFlavor) -> Self {
        Self {
            store,
            shell_identity: Identity::new("GET", shell_url),
            flavor,
        }
    }

    pub fn fallback(&self, classification: Classification, event: &FetchEvent) -> ServedResponse {
        tracing::debug!(url = %event.url, ?classification, "serving offline fallback");

        if classification == Classification::Navigation {
            // Prefer the cached application shell; a storage error here just
            // means no shell.
            if let Ok(Some(shell)) = self.store.get(&self.shell_identity) {
                return ServedResponse {
                    status: shell.status,
                    headers: shell.headers.clone(),
                    body: shell.body.clone(),
                    source: ServeSource::Cache,
                };
            }
            return match self.flavor {
                FallbackFlavor::Page => synthesize(
                    200,
                    "text/html; charset=utf-8",
                    Bytes::from_static(OFFLINE_PAGE.as_bytes()),
                ),
                FallbackFlavor::Unavailable => synthesize(
                    503,
                    "text/plain; charset=utf-8",
                    Bytes::from_static(b"offline: page unavailable"),
                ),
            };
        }

        synthesize(
            503,
            "text/plain; charset=utf-8",
            Bytes::from_static(UNAVAILABLE_BODY.as_bytes()),
        )
    }
}

fn synthesize(status: u16, content_type: &str, body: Bytes) -> ServedResponse {
    ServedResponse {
        status,
        headers: vec![("content-type".to_string(), content_type.to_string())],
        body,
        source: ServeSource::Fallback,
    }
}
