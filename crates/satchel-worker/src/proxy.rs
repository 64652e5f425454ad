use crate::backend::HttpClient;
use crate::control::{ControlHandle, ControlMessage};
use crate::event::{absolute_url, FetchEvent};
use crate::executor::{ServeSource, ServedResponse};
use crate::worker::{Verdict, Worker};
use axum::body::Body;
use axum::extract::State;
use axum::http::{request, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Shared state for the interception front end.
pub struct AppState {
    pub worker: Worker,
    pub client: HttpClient,
    pub upstream_url: String,
    pub page_origin: String,
    pub control: ControlHandle,
}

/// Every request enters here. The worker either answers it through a
/// caching strategy or declines, in which case the request is forwarded to
/// the upstream untouched — no cache read, no cache write.
pub async fn intercept_handler(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Response<Body> {
    let (parts, body) = req.into_parts();

    let url = match absolute_url(&state.page_origin, &parts.uri) {
        Ok(url) => url,
        Err(_) => return passthrough(&state, parts, body).await,
    };
    let event = FetchEvent::new(parts.method.clone(), url, parts.headers.clone());

    match state.worker.handle(&event).await {
        Verdict::Respond(served) => into_http_response(served),
        Verdict::PassThrough => passthrough(&state, parts, body).await,
    }
}

/// Forward a declined request to the upstream with method, headers and body
/// intact, and stream the response straight back.
async fn passthrough(
    state: &AppState,
    parts: request::Parts,
    body: Body,
) -> Response<Body> {
    let upstream_uri = format!(
        "{}{}",
        state.upstream_url.trim_end_matches('/'),
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    );

    let mut builder = Request::builder().method(&parts.method).uri(&upstream_uri);
    for (name, value) in parts.headers.iter() {
        if name.as_str() == "host" {
            continue;
        }
        builder = builder.header(name, value);
    }
    let upstream_req = match builder.body(body) {
        Ok(request) => request,
        Err(error) => {
            tracing::error!(%error, "failed to build pass-through request");
            return plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway");
        }
    };

    match state.client.request(upstream_req).await {
        Ok(response) => stream_response(response),
        Err(error) => {
            tracing::error!(%error, upstream = %upstream_uri, "pass-through request failed");
            plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
        }
    }
}

fn stream_response(response: Response<hyper::body::Incoming>) -> Response<Body> {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

fn into_http_response(served: ServedResponse) -> Response<Body> {
    let mut builder = Response::builder().status(served.status);
    for (name, value) in &served.headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            builder = builder.header(name.as_str(), value);
        }
    }
    builder = builder.header(
        "x-satchel-cache",
        match served.source {
            ServeSource::Network => "MISS",
            ServeSource::Cache => "HIT",
            ServeSource::Fallback => "FALLBACK",
        },
    );
    builder
        .body(Body::from(served.body))
        .unwrap_or_else(|_| plain_response(StatusCode::INTERNAL_SERVER_ERROR, "bad cached headers"))
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

/// Admin surface: the host page's control channel over HTTP. The handler
/// forwards the same tagged messages the in-process channel speaks.
pub async fn control_handler(
    State(state): State<Arc<AppState>>,
    Json(message): Json<ControlMessage>,
) -> axum::response::Response {
    match state.control.send(message).await {
        Some(reply) => Json(reply).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "control channel closed").into_response(),
    }
}

/// Convenience status endpoint; identical to posting `GET_CACHE_STATUS`.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> axum::response::Response {
    match state.control.send(ControlMessage::GetCacheStatus).await {
        Some(reply) => Json(reply).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "control channel closed").into_response(),
    }
}
