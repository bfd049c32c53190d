use std::{collections::BTreeMap, time::Duration};

use reqwest::{header::HeaderMap, Method, StatusCode};

/// Per-call overrides for a single logical request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestOptions {
    /// Allow serving from and writing to the response cache (GET only).
    pub cache: bool,
    /// Cache TTL for this response; falls back to the client default.
    pub cache_ttl_ms: Option<u64>,
    /// Per-attempt timeout; falls back to the client default.
    pub timeout_ms: Option<u64>,
    /// Retry transient failures. `false` means exactly one physical attempt.
    pub retry: bool,
    /// Extra headers, applied over the client's static headers.
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            cache: true,
            cache_ttl_ms: None,
            timeout_ms: None,
            retry: true,
            headers: BTreeMap::new(),
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn cache_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.cache_ttl_ms = Some(ttl_ms);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A physical request as seen by request interceptors.
#[derive(Clone, Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

/// A fully read response as seen by response interceptors, before its status
/// is inspected.
#[derive(Clone, Debug)]
pub struct IncomingResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::RequestOptions;

    #[test]
    fn defaults_allow_cache_and_retry() {
        let options = RequestOptions::default();
        assert!(options.cache);
        assert!(options.retry);
        assert_eq!(options.cache_ttl_ms, None);
        assert_eq!(options.timeout_ms, None);
    }

    #[test]
    fn builders_override_fields() {
        let options = RequestOptions::new()
            .no_cache()
            .no_retry()
            .cache_ttl_ms(5)
            .timeout_ms(50)
            .header("X-Tenant", "demo");
        assert!(!options.cache);
        assert!(!options.retry);
        assert_eq!(options.cache_ttl_ms, Some(5));
        assert_eq!(options.timeout_ms, Some(50));
        assert_eq!(options.headers.get("X-Tenant").map(String::as_str), Some("demo"));
    }
}
