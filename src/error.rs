use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use reqwest::{header::HeaderMap, StatusCode};
use serde::Serialize;

const REQUEST_ID_HEADER: &str = "x-request-id";
const SUGGESTED_RETRY_DELAY: Duration = Duration::from_millis(1_000);

/// Failure category assigned to an [`ApiError`] when it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The server rejected the request payload (400, 422).
    Validation,
    /// The request never produced an HTTP response.
    Network,
    /// The attempt timed out or was cancelled.
    Timeout,
    /// Missing or insufficient credentials (401, 403).
    Authentication,
    /// Too many requests (429).
    RateLimit,
    /// Resource does not exist (404).
    NotFound,
    /// Server-side failure (5xx) or an unexpected status.
    Server,
    /// The client itself is misconfigured. Never produced by the network.
    Configuration,
}

impl ErrorKind {
    /// Maps a non-success HTTP status code to its kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            429 => Self::RateLimit,
            _ => Self::Server,
        }
    }

    /// Stable snake_case name, as used in [`ApiError::to_json`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::NotFound => "not_found",
            Self::Server => "server",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form metadata attached to an [`ApiError`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ErrorDetails {
    /// Explicit retry policy for this error instance; overrides the kind default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Server-provided `Retry-After`, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Response body of a failed request, as JSON when it parsed, else as text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Error type returned by this crate.
///
/// The [`kind`](ApiError::kind) is fixed at construction. Callers can still
/// override retry policy per instance through [`ApiError::with_retryable`].
#[derive(Clone, Debug, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    details: ErrorDetails,
    timestamp_ms: u64,
    request_id: Option<String>,
    #[source]
    source: Option<Arc<reqwest::Error>>,
}

/// Structured snapshot of an [`ApiError`], see [`ApiError::to_json`].
#[derive(Debug, Serialize)]
struct ErrorSnapshot<'a> {
    kind: ErrorKind,
    message: &'a str,
    status: Option<u16>,
    details: &'a ErrorDetails,
    timestamp: u64,
    request_id: Option<&'a str>,
    cause: Option<String>,
}

impl ApiError {
    /// Creates an error of `kind`, stamped with the current time.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: ErrorDetails::default(),
            timestamp_ms: now_millis(),
            request_id: None,
            source: None,
        }
    }

    /// Invalid input, detected locally or rejected by the server.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// The client cannot build a request from its configuration.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// No HTTP response was received.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// The attempt ran past its timeout. Retryable.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message).with_retryable(true)
    }

    /// Error reported to callers whose request was aborted by
    /// `cancel_request` or `cancel_all_requests`.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Timeout, "request was cancelled").with_retryable(false)
    }

    /// Builds an error from a non-success HTTP response.
    pub fn from_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let code = status.as_u16();
        let kind = ErrorKind::from_status(code);
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();

        let message = parsed
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| match status.canonical_reason() {
                Some(reason) => format!("HTTP {code} {reason}"),
                None => format!("HTTP {code}"),
            });

        let body = match parsed {
            Some(value) => Some(value),
            None if body.is_empty() => None,
            None => Some(serde_json::Value::String(body.to_owned())),
        };

        let retry_after_secs = if kind == ErrorKind::RateLimit {
            headers
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
        } else {
            None
        };

        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let mut error = Self::new(kind, message);
        error.status = Some(code);
        error.request_id = request_id;
        error.details.retry_after_secs = retry_after_secs;
        error.details.body = body;
        error
    }

    /// Wraps a transport-level `reqwest` failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let mut error = if err.is_timeout() {
            Self::timeout(format!("request timed out: {err}"))
        } else {
            Self::network(format!("transport error: {err}"))
        };
        error.status = err.status().map(|status| status.as_u16());
        error.source = Some(Arc::new(err));
        error
    }

    /// Overrides the kind's default retry policy for this instance.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.details.retryable = Some(retryable);
        self
    }

    /// Attaches the server-side request id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Records the request the error belongs to, keeping values already set.
    pub fn with_request(mut self, method: &reqwest::Method, url: &str) -> Self {
        self.details.method.get_or_insert_with(|| method.to_string());
        self.details.url.get_or_insert_with(|| url.to_owned());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Creation time, in milliseconds since the Unix epoch.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns whether retrying the request may succeed.
    ///
    /// An explicit `details.retryable` wins; otherwise the kind decides, with
    /// unexpected 4xx statuses treated as permanent.
    pub fn is_retryable(&self) -> bool {
        if let Some(retryable) = self.details.retryable {
            return retryable;
        }
        match self.kind {
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit => true,
            ErrorKind::Server => self.status.map_or(true, |status| status >= 500),
            ErrorKind::Validation
            | ErrorKind::Authentication
            | ErrorKind::NotFound
            | ErrorKind::Configuration => false,
        }
    }

    /// The server's explicit wait hint, if it sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            ErrorKind::RateLimit => self.details.retry_after_secs.map(Duration::from_secs),
            _ => None,
        }
    }

    /// Suggested wait before retrying manually.
    ///
    /// The client's own retry loop applies exponential backoff instead of the
    /// fixed suggestion returned for non-rate-limit errors.
    pub fn retry_delay(&self) -> Duration {
        if !self.is_retryable() {
            return Duration::ZERO;
        }
        self.retry_after().unwrap_or(SUGGESTED_RETRY_DELAY)
    }

    /// Text suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation => {
                "The request contains invalid data. Please check your input and try again."
                    .to_owned()
            }
            ErrorKind::Network => {
                "Unable to reach the server. Please check your internet connection.".to_owned()
            }
            ErrorKind::Timeout => {
                "The request took too long to complete. Please try again.".to_owned()
            }
            ErrorKind::Authentication => {
                "You are not authorized to perform this action. Please sign in again.".to_owned()
            }
            ErrorKind::RateLimit => match self.details.retry_after_secs {
                Some(secs) => {
                    format!("Too many requests. Please wait {secs} seconds before trying again.")
                }
                None => "Too many requests. Please wait a moment before trying again.".to_owned(),
            },
            ErrorKind::NotFound => "The requested resource was not found.".to_owned(),
            ErrorKind::Server => {
                "The server encountered an error. Please try again later.".to_owned()
            }
            ErrorKind::Configuration => {
                "The application is misconfigured. Please contact support.".to_owned()
            }
        }
    }

    /// Structured snapshot for logging.
    pub fn to_json(&self) -> serde_json::Value {
        let snapshot = ErrorSnapshot {
            kind: self.kind,
            message: &self.message,
            status: self.status,
            details: &self.details,
            timestamp: self.timestamp_ms,
            request_id: self.request_id.as_deref(),
            cause: self.source.as_ref().map(|err| source_chain(err.as_ref())),
        };
        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
    }
}

fn extract_message(body: &serde_json::Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|field| body.get(field)?.as_str())
        .filter(|message| !message.trim().is_empty())
        .map(str::to_owned)
}

fn source_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
