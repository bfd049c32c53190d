//! `booking-api-client` is a resilient async HTTP client for the booking
//! platform REST API.
//!
//! [`ApiClient`] wraps every call with:
//! - a TTL cache for GET responses
//! - in-flight deduplication of identical requests (any verb)
//! - retry with exponential backoff, honouring `Retry-After`
//! - request, response and error [`Interceptors`]
//!
//! Every failure is an [`ApiError`] classified by [`ErrorKind`].
//!
//! ```no_run
//! use booking_api_client::{ApiClient, ClientConfig};
//!
//! # async fn run() -> booking_api_client::Result<()> {
//! let client = ApiClient::new(ClientConfig::new("https://api.example.com/v1"));
//! let tenant = client.get("/tenants/demo", ()).await?;
//! println!("{tenant}");
//! # Ok(())
//! # }
//! ```

mod cache;
mod client;
mod config;
mod endpoint;
mod error;
mod interceptor;
mod params;
mod pending;
mod request;

pub use client::ApiClient;
pub use config::{ClientConfig, ConfigUpdate};
pub use error::{ApiError, ErrorDetails, ErrorKind};
pub use interceptor::{ErrorInterceptor, Interceptors, RequestInterceptor, ResponseInterceptor};
pub use params::QueryParams;
pub use request::{IncomingResponse, OutgoingRequest, RequestOptions};

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, ApiError>;
