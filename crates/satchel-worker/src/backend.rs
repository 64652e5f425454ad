use crate::classify::is_same_origin;
use crate::event::FetchEvent;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use thiserror::Error;

pub type HttpClient = Client<HttpConnector, Body>;

/// Whether a response body came from the page's own origin (fully
/// inspectable) or from elsewhere (opaque). Only basic responses are ever
/// cached; persisting an opaque body risks serving unreadable or mismatched
/// content later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseOrigin {
    Basic,
    Opaque,
}

/// A fully buffered network response.
#[derive(Clone, Debug)]
pub struct FetchedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub origin: ResponseOrigin,
}

impl FetchedResponse {
    /// HTTP success range, 200–299.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Transport(String),
    #[error("network timeout after {0:?}")]
    Timeout(Duration),
}

/// Seam between the strategies and the real network. Strategy and lifecycle
/// tests script this; production uses [`HyperBackend`].
#[async_trait]
pub trait NetworkBackend: Send + Sync {
    async fn fetch(&self, event: &FetchEvent) -> Result<FetchedResponse, FetchError>;

    /// Cheap reachability check backing the lifecycle online gate and the
    /// control channel's status report.
    async fn probe(&self) -> bool;
}

/// Network backend over the hyper legacy client.
///
/// Same-origin requests are rewritten to the upstream server and produce
/// basic responses; absolute cross-origin requests are fetched as-is and
/// marked opaque.
pub struct HyperBackend {
    client: HttpClient,
    upstream_url: String,
    page_origin: String,
    probe_url: String,
    timeout: Duration,
}

impl HyperBackend {
    pub fn new(
        upstream_url: String,
        page_origin: String,
        probe_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            upstream_url,
            page_origin,
            probe_url,
            timeout,
        }
    }

    fn target(&self, event: &FetchEvent) -> (String, ResponseOrigin) {
        let url = event.url.to_string();
        if is_same_origin(&url, &self.page_origin) {
            let path_and_query = event
                .url
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            let rewritten = format!("{}{}", self.upstream_url.trim_end_matches('/'), path_and_query);
            (rewritten, ResponseOrigin::Basic)
        } else {
            (url, ResponseOrigin::Opaque)
        }
    }
}

#[async_trait]
impl NetworkBackend for HyperBackend {
    async fn fetch(&self, event: &FetchEvent) -> Result<FetchedResponse, FetchError> {
        let (uri, origin) = self.target(event);

        let mut builder = Request::builder().method(event.method.clone()).uri(&uri);
        for (name, value) in event.headers.iter() {
            // The client sets its own host header for the rewritten target.
            if name.as_str() == "host" {
                continue;
            }
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Body::empty())
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let response: axum::http::Response<hyper::body::Incoming> =
            tokio::time::timeout(self.timeout, self.client.request(request))
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))?
                .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| {
                let n = name.as_str();
                // Hop-by-hop headers make no sense on a buffered body.
                n != "transfer-encoding" && n != "connection"
            })
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .to_bytes();

        Ok(FetchedResponse {
            status,
            headers,
            body,
            origin,
        })
    }

    async fn probe(&self) -> bool {
        let request = Request::builder()
            .method(Method::GET)
            .uri(&self.probe_url)
            .body(Body::empty());
        match request {
            Ok(request) => matches!(
                tokio::time::timeout(self.timeout, self.client.request(request)).await,
                Ok(Ok(_))
            ),
            Err(_) => false,
        }
    }
}
