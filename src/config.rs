use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use crate::{ApiError, Interceptors, Result};

const REDACTED_HEADERS: [&str; 4] = ["authorization", "cookie", "x-api-key", "proxy-authorization"];

/// Client-wide settings.
///
/// Each request takes a snapshot when it starts, so changes made through
/// [`ApiClient::update_config`](crate::ApiClient::update_config) only affect
/// later requests.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL endpoints are resolved against.
    pub api_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub retries: u32,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_delay_ms: u64,
    /// Enables the GET response cache.
    pub cache: bool,
    /// Default cache TTL in milliseconds.
    pub cache_ttl_ms: u64,
    /// Upper bound on cached responses. Fixed when the client is built.
    pub cache_max_entries: u64,
    /// Emits per-request debug events.
    pub debug: bool,
    /// Headers sent with every request.
    pub headers: BTreeMap<String, String>,
    pub interceptors: Interceptors,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            timeout_ms: 10_000,
            retries: 3,
            retry_delay_ms: 1_000,
            cache: true,
            cache_ttl_ms: 60_000,
            cache_max_entries: 10_000,
            debug: false,
            headers: BTreeMap::new(),
            interceptors: Interceptors::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let redact = REDACTED_HEADERS
                    .iter()
                    .any(|secret| name.eq_ignore_ascii_case(secret));
                (name.as_str(), if redact { "<redacted>" } else { value.as_str() })
            })
            .collect();

        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("retries", &self.retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("cache", &self.cache)
            .field("cache_ttl_ms", &self.cache_ttl_ms)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("debug", &self.debug)
            .field("headers", &headers)
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a configuration for `api_url` with default settings.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Loads the configuration from environment variables.
    ///
    /// Reads:
    /// - `BOOKING_API_URL`: base URL (required)
    /// - `BOOKING_API_TOKEN`: access token, sent as `Authorization: Bearer …`
    /// - `BOOKING_API_TIMEOUT_MS`, `BOOKING_API_RETRIES`,
    ///   `BOOKING_API_RETRY_DELAY_MS`, `BOOKING_API_CACHE`,
    ///   `BOOKING_API_CACHE_TTL_MS`, `BOOKING_API_CACHE_MAX_ENTRIES`,
    ///   `BOOKING_API_DEBUG`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use booking_api_client::ClientConfig;
    ///
    /// let config = ClientConfig::from_env().expect("missing BOOKING_API_URL");
    /// ```
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("BOOKING_API_URL")
            .ok_or_else(|| ApiError::configuration("missing BOOKING_API_URL environment variable"))?;
        if api_url.trim().is_empty() {
            return Err(ApiError::configuration("BOOKING_API_URL is set but empty"));
        }

        let mut config = Self::new(api_url.trim());
        if let Some(token) = lookup("BOOKING_API_TOKEN").filter(|token| !token.trim().is_empty()) {
            config = config.with_bearer_token(&token);
        }
        if let Some(value) = parse_var(&lookup, "BOOKING_API_TIMEOUT_MS")? {
            config.timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "BOOKING_API_RETRIES")? {
            config.retries = value;
        }
        if let Some(value) = parse_var(&lookup, "BOOKING_API_RETRY_DELAY_MS")? {
            config.retry_delay_ms = value;
        }
        if let Some(value) = parse_flag(&lookup, "BOOKING_API_CACHE")? {
            config.cache = value;
        }
        if let Some(value) = parse_var(&lookup, "BOOKING_API_CACHE_TTL_MS")? {
            config.cache_ttl_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "BOOKING_API_CACHE_MAX_ENTRIES")? {
            config.cache_max_entries = value;
        }
        if let Some(value) = parse_flag(&lookup, "BOOKING_API_DEBUG")? {
            config.debug = value;
        }
        Ok(config)
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets how many retries follow the initial attempt.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the base backoff; attempt `n` waits `retry_delay_ms * 2^n`.
    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Enables or disables the GET response cache.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Sets the default cache TTL.
    pub fn with_cache_ttl_ms(mut self, cache_ttl_ms: u64) -> Self {
        self.cache_ttl_ms = cache_ttl_ms;
        self
    }

    /// Bounds the number of cached responses.
    pub fn with_cache_max_entries(mut self, max_entries: u64) -> Self {
        self.cache_max_entries = max_entries;
        self
    }

    /// Enables per-request debug events.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Adds a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the `Authorization` header from a bearer token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", normalize_bearer_authorization(token))
    }

    /// Replaces the interceptor stages.
    pub fn with_interceptors(mut self, interceptors: Interceptors) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// Shallow-merges `update`: every field it sets replaces the current value.
    pub fn apply(&mut self, update: ConfigUpdate) {
        let ConfigUpdate {
            api_url,
            timeout_ms,
            retries,
            retry_delay_ms,
            cache,
            cache_ttl_ms,
            debug,
            headers,
            interceptors,
        } = update;

        if let Some(api_url) = api_url {
            self.api_url = api_url;
        }
        if let Some(timeout_ms) = timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        if let Some(retries) = retries {
            self.retries = retries;
        }
        if let Some(retry_delay_ms) = retry_delay_ms {
            self.retry_delay_ms = retry_delay_ms;
        }
        if let Some(cache) = cache {
            self.cache = cache;
        }
        if let Some(cache_ttl_ms) = cache_ttl_ms {
            self.cache_ttl_ms = cache_ttl_ms;
        }
        if let Some(debug) = debug {
            self.debug = debug;
        }
        if let Some(headers) = headers {
            self.headers = headers;
        }
        if let Some(interceptors) = interceptors {
            self.interceptors = interceptors;
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub(crate) fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub(crate) fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// Partial configuration for [`ClientConfig::apply`]. `None` keeps the
/// current value.
#[derive(Clone, Debug, Default)]
pub struct ConfigUpdate {
    pub api_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub cache: Option<bool>,
    pub cache_ttl_ms: Option<u64>,
    pub debug: Option<bool>,
    pub headers: Option<BTreeMap<String, String>>,
    pub interceptors: Option<Interceptors>,
}

fn parse_var<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| ApiError::configuration(format!("invalid {name} '{raw}': {err}"))),
        _ => Ok(None),
    }
}

fn parse_flag(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<bool>> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ApiError::configuration(format!(
            "invalid {name} '{raw}': expected true or false"
        ))),
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
