use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use futures_util::FutureExt;
use regex::Regex;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;

use crate::{
    cache::ResponseCache,
    endpoint::{key_prefix, request_key, resolve_url},
    pending::{CancelHandle, PendingRequests, SharedResponse},
    ApiError, ClientConfig, ConfigUpdate, ErrorKind, IncomingResponse, Interceptors, OutgoingRequest,
    QueryParams, RequestOptions, Result,
};

/// HTTP client for the booking platform REST API.
///
/// Clones share the same configuration, response cache and in-flight map.
/// Separately constructed clients share nothing.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    state: Arc<ClientState>,
}

struct ClientState {
    config: RwLock<ClientConfig>,
    cache: ResponseCache,
    pending: Mutex<PendingRequests>,
}

impl ClientState {
    fn pending(&self) -> MutexGuard<'_, PendingRequests> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config())
            .field("pending", &self.pending_count())
            .field("cached", &self.cached_count())
            .finish()
    }
}

/// Everything one logical request needs, captured when it starts.
struct Job {
    method: Method,
    url: String,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    cache_ttl: Option<Duration>,
    interceptors: Interceptors,
    debug: bool,
}

/// How a request that missed the cache gets its outcome.
enum Joined {
    /// Another request finished and cached the value since the first lookup.
    Cached(serde_json::Value),
    InFlight(SharedResponse),
}

/// Removes a pending entry when its request task ends, however it ends.
struct PendingGuard {
    state: Arc<ClientState>,
    key: String,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.state.pending().remove(&self.key, self.id);
    }
}

impl Job {
    fn new(
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
        options: &RequestOptions,
        config: &ClientConfig,
        cacheable: bool,
    ) -> Result<Self> {
        let mut headers = build_headers(&config.headers)?;
        headers.extend(build_headers(&options.headers)?);
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));

        let cache_ttl = cacheable.then(|| {
            options
                .cache_ttl_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.cache_ttl())
        });

        Ok(Self {
            method,
            url,
            body,
            headers,
            timeout: options
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.timeout()),
            max_retries: if options.retry { config.retries } else { 0 },
            retry_delay: config.retry_delay(),
            cache_ttl,
            interceptors: config.interceptors.clone(),
            debug: config.debug,
        })
    }
}

impl ApiClient {
    /// Creates a client with a default `reqwest` client.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_http_client(reqwest::Client::new(), config)
    }

    /// Creates a client on top of a preconfigured `reqwest` client.
    pub fn with_http_client(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            state: Arc::new(ClientState {
                cache: ResponseCache::new(config.cache_max_entries),
                config: RwLock::new(config),
                pending: Mutex::default(),
            }),
        }
    }

    /// Creates a client from environment variables, see
    /// [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        ClientConfig::from_env().map(Self::new)
    }

    /// Returns a snapshot of the current configuration.
    pub fn config(&self) -> ClientConfig {
        self.state
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merges `update` into the configuration. Requests already in flight
    /// keep the settings they started with.
    pub fn update_config(&self, update: ConfigUpdate) {
        self.state
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(update);
    }

    /// Sends a GET, served from the cache while a fresh entry exists.
    pub async fn get(
        &self,
        endpoint: &str,
        params: impl Into<QueryParams>,
    ) -> Result<serde_json::Value> {
        self.get_with(endpoint, params, RequestOptions::default())
            .await
    }

    /// Sends a GET with per-call overrides.
    pub async fn get_with(
        &self,
        endpoint: &str,
        params: impl Into<QueryParams>,
        options: RequestOptions,
    ) -> Result<serde_json::Value> {
        self.request(Method::GET, endpoint, params.into(), None, options)
            .await
    }

    /// Sends a POST. A body serializing to `null` (e.g. `()`) sends no body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<serde_json::Value> {
        let body = encode_body(body)?;
        self.request(
            Method::POST,
            endpoint,
            QueryParams::new(),
            body,
            RequestOptions::default(),
        )
        .await
    }

    /// Sends a PATCH. A body serializing to `null` sends no body.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<serde_json::Value> {
        let body = encode_body(body)?;
        self.request(
            Method::PATCH,
            endpoint,
            QueryParams::new(),
            body,
            RequestOptions::default(),
        )
        .await
    }

    /// Sends a DELETE. An empty response body resolves to `Value::Null`.
    pub async fn delete(&self, endpoint: &str) -> Result<serde_json::Value> {
        self.request(
            Method::DELETE,
            endpoint,
            QueryParams::new(),
            None,
            RequestOptions::default(),
        )
        .await
    }

    /// GETs `endpoint` and decodes the JSON body into `T`.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: impl Into<QueryParams>,
    ) -> Result<T> {
        let value = self.get(endpoint, params).await?;
        decode_value(value)
    }

    /// POSTs `body` to `endpoint` and decodes the JSON response into `T`.
    pub async fn post_as<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let value = self.post(endpoint, body).await?;
        decode_value(value)
    }

    /// Runs one logical request through cache, deduplication and retry.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: QueryParams,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<serde_json::Value> {
        let config = self.config();
        let url = resolve_url(&config.api_url, endpoint, &params)?;
        let key = request_key(&method, &url, body.as_ref());
        let cacheable = method == Method::GET && options.cache && config.cache;

        if cacheable {
            if let Some(value) = self.state.cache.get(&key) {
                #[cfg(feature = "tracing")]
                if config.debug {
                    tracing::debug!(%method, %url, "served from cache");
                }
                return Ok(value);
            }
        }

        let job = Job::new(method, url, body, &options, &config, cacheable)?;
        match self.join_or_start(key, job) {
            Joined::Cached(value) => Ok(value),
            Joined::InFlight(response) => response.await,
        }
    }

    fn join_or_start(&self, key: String, job: Job) -> Joined {
        let mut pending = self.state.pending();
        if let Some(response) = pending.join(&key) {
            #[cfg(feature = "tracing")]
            if job.debug {
                tracing::debug!(method = %job.method, url = %job.url, "joined in-flight request");
            }
            return Joined::InFlight(response);
        }

        // A task writes the cache before it takes this lock to leave the
        // pending map, so a value missed by the first lookup is visible here.
        if job.cache_ttl.is_some() {
            if let Some(value) = self.state.cache.get(&key) {
                return Joined::Cached(value);
            }
        }

        let id = pending.next_id();
        let prefix = key_prefix(&job.method, &job.url);
        let cancel = CancelHandle::default();
        let guard = PendingGuard {
            state: Arc::clone(&self.state),
            key: key.clone(),
            id,
        };
        let task = tokio::spawn(self.clone().run(job, guard, cancel.clone()));
        let response: SharedResponse = async move {
            task.await.unwrap_or_else(|err| {
                Err(ApiError::network(format!("request task failed: {err}")))
            })
        }
        .boxed()
        .shared();

        pending.insert(key, id, prefix, response.clone(), cancel);
        Joined::InFlight(response)
    }

    /// Body of the spawned request task.
    async fn run(
        self,
        job: Job,
        guard: PendingGuard,
        cancel: CancelHandle,
    ) -> Result<serde_json::Value> {
        let result = self.send_with_retry(&job, &cancel).await;
        if let (Ok(value), Some(ttl)) = (&result, job.cache_ttl) {
            self.state.cache.insert(guard.key.clone(), value.clone(), ttl);
        }
        drop(guard);
        result
    }

    async fn send_with_retry(&self, job: &Job, cancel: &CancelHandle) -> Result<serde_json::Value> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(job));
            }

            #[cfg(feature = "tracing")]
            if job.debug {
                tracing::debug!(method = %job.method, url = %job.url, attempt, "sending request");
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ApiError::cancelled()),
                outcome = self.send_once(job) => outcome,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err.with_request(&job.method, &job.url),
            };
            let err = job.interceptors.apply_error(err).await;

            if cancel.is_cancelled() || !err.is_retryable() || attempt >= job.max_retries {
                return Err(err);
            }

            let delay = retry_delay_for(&err, job.retry_delay, attempt);

            #[cfg(feature = "tracing")]
            tracing::warn!(
                method = %job.method,
                url = %job.url,
                attempt = attempt + 1,
                max_retries = job.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after retryable error"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(job)),
                _ = sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// One physical attempt: request stage, network, response stage, status
    /// check and JSON parse.
    async fn send_once(&self, job: &Job) -> Result<serde_json::Value> {
        let request = job
            .interceptors
            .apply_request(OutgoingRequest {
                method: job.method.clone(),
                url: job.url.clone(),
                headers: job.headers.clone(),
                body: job.body.clone(),
                timeout: job.timeout,
            })
            .await?;

        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ApiError::from_transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(ApiError::from_transport)?;

        let response = job
            .interceptors
            .apply_response(IncomingResponse {
                status,
                headers,
                body,
            })
            .await?;

        #[cfg(feature = "tracing")]
        if job.debug {
            tracing::debug!(status = response.status.as_u16(), url = %job.url, "received response");
        }

        if !response.status.is_success() {
            return Err(ApiError::from_status(
                response.status,
                &response.headers,
                &response.body,
            ));
        }

        parse_body(&response.body)
    }

    fn cancelled(&self, job: &Job) -> ApiError {
        #[cfg(feature = "tracing")]
        tracing::debug!(method = %job.method, url = %job.url, "request cancelled");
        ApiError::cancelled().with_request(&job.method, &job.url)
    }

    /// Aborts the in-flight request(s) for `method` and `endpoint`.
    ///
    /// Every caller that joined the request fails with a cancellation error.
    /// Returns the number of requests aborted.
    pub fn cancel_request(&self, endpoint: &str, method: Method) -> usize {
        let config = self.config();
        let Ok(url) = resolve_url(&config.api_url, endpoint, &QueryParams::new()) else {
            return 0;
        };
        self.state
            .pending()
            .cancel_matching(&key_prefix(&method, &url))
    }

    /// Aborts every in-flight request. The pending map is empty on return.
    pub fn cancel_all_requests(&self) -> usize {
        self.state.pending().cancel_all()
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) -> usize {
        self.state.cache.clear()
    }

    /// Drops cached responses whose request key matches `pattern`.
    ///
    /// Keys have the form `METHOD:url:body`.
    pub fn clear_cache_matching(&self, pattern: &str) -> Result<usize> {
        let pattern = Regex::new(pattern).map_err(|err| {
            ApiError::validation(format!("invalid cache key pattern '{pattern}': {err}"))
        })?;
        Ok(self.state.cache.clear_matching(&pattern))
    }

    /// Number of requests currently on the wire.
    pub fn pending_count(&self) -> usize {
        self.state.pending().len()
    }

    /// Number of live cache entries.
    pub fn cached_count(&self) -> usize {
        self.state.cache.len()
    }
}

/// Delay before retrying after `attempt` (0-based) failed.
///
/// A server `Retry-After` hint wins; otherwise `base * 2^attempt`.
fn retry_delay_for(err: &ApiError, base: Duration, attempt: u32) -> Duration {
    err.retry_after().unwrap_or_else(|| {
        let exp = attempt.min(16);
        base.saturating_mul(1u32 << exp)
    })
}

fn build_headers(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ApiError::configuration(format!("invalid header name '{name}': {err}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            ApiError::configuration(format!("invalid value for header '{name}': {err}"))
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn encode_body<B: Serialize + ?Sized>(body: &B) -> Result<Option<serde_json::Value>> {
    let value = serde_json::to_value(body)
        .map_err(|err| ApiError::validation(format!("request body is not valid JSON: {err}")))?;
    Ok((!value.is_null()).then_some(value))
}

fn parse_body(body: &str) -> Result<serde_json::Value> {
    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(body).map_err(|err| {
        ApiError::new(
            ErrorKind::Server,
            format!("invalid JSON response: {err}"),
        )
        .with_retryable(false)
    })
}

fn decode_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|err| {
        ApiError::new(
            ErrorKind::Server,
            format!("unexpected response shape: {err}"),
        )
        .with_retryable(false)
    })
}
