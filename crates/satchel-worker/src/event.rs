use axum::http::uri::InvalidUri;
use axum::http::{HeaderMap, Method, Uri};
use satchel_store::Identity;

/// One intercepted request, normalized to an absolute URL.
#[derive(Clone, Debug)]
pub struct FetchEvent {
    pub method: Method,
    pub url: Uri,
    pub headers: HeaderMap,
}

impl FetchEvent {
    pub fn new(method: Method, url: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            url,
            headers,
        }
    }

    /// The cache key for this request.
    pub fn identity(&self) -> Identity {
        Identity::new(self.method.as_str(), &self.url.to_string())
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Resolve an origin-form request URI against the page origin. Absolute
/// URIs pass through unchanged.
pub fn absolute_url(page_origin: &str, uri: &Uri) -> Result<Uri, InvalidUri> {
    if uri.scheme().is_some() {
        return Ok(uri.clone());
    }
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{}{}", page_origin.trim_end_matches('/'), path_and_query).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_uses_method_and_absolute_url() {
        let event = FetchEvent::new(
            Method::GET,
            "http://localhost:8080/app/logo.png".parse().unwrap(),
            HeaderMap::new(),
        );
        assert_eq!(
            event.identity().as_str(),
            "GET:http://localhost:8080/app/logo.png"
        );
    }

    #[test]
    fn absolute_url_resolves_origin_form() {
        let uri: Uri = "/app/data?x=1".parse().unwrap();
        let abs = absolute_url("http://localhost:8080", &uri).unwrap();
        assert_eq!(abs.to_string(), "http://localhost:8080/app/data?x=1");
    }

    #[test]
    fn absolute_url_passes_through_absolute_form() {
        let uri: Uri = "https://cdn.example.com/lib.js".parse().unwrap();
        let abs = absolute_url("http://localhost:8080", &uri).unwrap();
        assert_eq!(abs, uri);
    }
}
