use crate::config::ScopeConfig;
use crate::event::FetchEvent;
use axum::http::Method;

/// Where a request falls in the interception policy.
///
/// `OutOfScope` requests are never intercepted: the front end forwards them
/// untouched, with no cache side effects. Incorrectly intercepting
/// cross-origin or non-HTTP traffic breaks the host page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Navigation,
    StaticAsset,
    Dynamic,
    OutOfScope,
}

/// Classify a request from its shape alone. Pure; no side effects.
pub fn classify(event: &FetchEvent, scope: &ScopeConfig) -> Classification {
    if event.method != Method::GET {
        return Classification::OutOfScope;
    }
    if !matches!(event.url.scheme_str(), Some("http") | Some("https")) {
        return Classification::OutOfScope;
    }
    let url = event.url.to_string();
    if !url.starts_with(&scope.prefix) && !is_same_origin(&url, &scope.page_origin) {
        return Classification::OutOfScope;
    }

    // Top-level document loads: reloads, address-bar navigations and deep
    // links that bypass the SPA's own router.
    if event.header("sec-fetch-mode") == Some("navigate") {
        return Classification::Navigation;
    }

    if has_allowed_extension(event.url.path(), &scope.asset_extensions) {
        return Classification::StaticAsset;
    }

    Classification::Dynamic
}

/// Whether `url` shares the page's origin. The origin must end at a path,
/// query or end-of-string boundary so `http://host:80` does not match
/// `http://host:8080/...`.
pub(crate) fn is_same_origin(url: &str, origin: &str) -> bool {
    match url.strip_prefix(origin.trim_end_matches('/')) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

fn has_allowed_extension(path: &str, extensions: &[String]) -> bool {
    let path = path.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| path.ends_with(&ext.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, Uri};

    fn scope() -> ScopeConfig {
        ScopeConfig {
            page_origin: "http://localhost:8080".into(),
            prefix: "http://localhost:8080/app".into(),
            shell_path: "/app/index.html".into(),
            asset_extensions: vec![".js".into(), ".css".into(), ".png".into(), ".html".into()],
        }
    }

    fn event(method: Method, url: &str) -> FetchEvent {
        FetchEvent::new(method, url.parse::<Uri>().unwrap(), HeaderMap::new())
    }

    fn navigation(url: &str) -> FetchEvent {
        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        FetchEvent::new(Method::GET, url.parse::<Uri>().unwrap(), headers)
    }

    #[test]
    fn non_get_is_out_of_scope() {
        let e = event(Method::POST, "http://localhost:8080/app/save");
        assert_eq!(classify(&e, &scope()), Classification::OutOfScope);
    }

    #[test]
    fn non_http_scheme_is_out_of_scope() {
        let e = event(Method::GET, "ftp://localhost:8080/app/file");
        assert_eq!(classify(&e, &scope()), Classification::OutOfScope);
    }

    #[test]
    fn cross_origin_outside_prefix_is_out_of_scope() {
        let e = event(Method::GET, "https://cdn.example.com/lib.js");
        assert_eq!(classify(&e, &scope()), Classification::OutOfScope);
    }

    #[test]
    fn same_origin_outside_prefix_is_still_in_scope() {
        let e = event(Method::GET, "http://localhost:8080/other/data");
        assert_eq!(classify(&e, &scope()), Classification::Dynamic);
    }

    #[test]
    fn port_is_part_of_the_origin() {
        assert!(!is_same_origin(
            "http://localhost:80801/x",
            "http://localhost:8080"
        ));
        assert!(is_same_origin(
            "http://localhost:8080/x",
            "http://localhost:8080"
        ));
        assert!(is_same_origin("http://localhost:8080", "http://localhost:8080"));
    }

    #[test]
    fn navigate_mode_wins_over_extension() {
        let e = navigation("http://localhost:8080/app/index.html");
        assert_eq!(classify(&e, &scope()), Classification::Navigation);
    }

    #[test]
    fn allowlisted_extension_is_static_asset() {
        let e = event(Method::GET, "http://localhost:8080/app/logo.png");
        assert_eq!(classify(&e, &scope()), Classification::StaticAsset);
        let upper = event(Method::GET, "http://localhost:8080/app/LOGO.PNG");
        assert_eq!(classify(&upper, &scope()), Classification::StaticAsset);
    }

    #[test]
    fn everything_else_is_dynamic() {
        let e = event(Method::GET, "http://localhost:8080/app/api/boards");
        assert_eq!(classify(&e, &scope()), Classification::Dynamic);
    }
}
