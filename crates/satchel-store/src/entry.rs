use bytes::Bytes;
use std::fmt;

/// Response-time header stamped onto every entry when it is cached.
///
/// The eviction sweep reads this back as unix milliseconds. An entry whose
/// value is missing or unparseable is retained forever; retention is the
/// safe failure mode for an offline-first cache.
pub const FETCHED_AT_HEADER: &str = "x-satchel-fetched-at";

/// Cache key: request method plus absolute URL, rendered as `GET:<url>`.
///
/// Only GET requests are intercepted, so the method component is constant
/// in practice, but keeping it in the key means identities stay unambiguous
/// if that ever changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn new(method: &str, url: &str) -> Self {
        Identity(format!("{method}:{url}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL half of the key, as exposed on the control channel.
    pub fn url(&self) -> &str {
        self.0.split_once(':').map(|(_, url)| url).unwrap_or(&self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored response. Immutable once stored; `put` replaces entries whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CacheEntry {
    /// Unix-millisecond timestamp recorded when the response was received,
    /// if the entry carries one and it parses.
    pub fn fetched_at_millis(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(FETCHED_AT_HEADER))
            .and_then(|(_, value)| value.trim().parse().ok())
    }

    /// Approximate bytes this entry occupies, used for quota accounting.
    pub fn weight(&self) -> usize {
        self.body.len()
            + self
                .headers
                .iter()
                .map(|(name, value)| name.len() + value.len())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(headers: Vec<(String, String)>) -> CacheEntry {
        CacheEntry {
            status: 200,
            headers,
            body: Bytes::from_static(b"body"),
        }
    }

    #[test]
    fn identity_splits_method_and_url() {
        let id = Identity::new("GET", "http://localhost:8080/app/logo.png");
        assert_eq!(id.as_str(), "GET:http://localhost:8080/app/logo.png");
        assert_eq!(id.url(), "http://localhost:8080/app/logo.png");
    }

    #[test]
    fn fetched_at_parses_and_ignores_case() {
        let e = entry(vec![("X-Satchel-Fetched-At".into(), "1700000000000".into())]);
        assert_eq!(e.fetched_at_millis(), Some(1_700_000_000_000));
    }

    #[test]
    fn fetched_at_absent_or_garbage_is_none() {
        assert_eq!(entry(vec![]).fetched_at_millis(), None);
        let garbage = entry(vec![(FETCHED_AT_HEADER.into(), "not-a-number".into())]);
        assert_eq!(garbage.fetched_at_millis(), None);
    }
}
