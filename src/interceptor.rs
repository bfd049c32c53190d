//! Request, response and error interceptor stages.
//!
//! Each stage is an ordered list. For one physical attempt the client runs
//! request stages, sends, runs response stages, checks the status and parses
//! the body. When any of that fails the error stages run once before the
//! retry decision. Cache hits and deduplicated callers run no stage at all.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{ApiError, IncomingResponse, OutgoingRequest, Result};

/// Rewrites a request before it is sent, e.g. to attach a fresh token.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, request: OutgoingRequest) -> Result<OutgoingRequest>;
}

/// Transforms a response before its status code is inspected.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(&self, response: IncomingResponse) -> Result<IncomingResponse>;
}

/// Transforms or replaces a classified error.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    async fn on_error(&self, error: ApiError) -> ApiError;
}

#[async_trait]
impl<F> RequestInterceptor for F
where
    F: Fn(OutgoingRequest) -> Result<OutgoingRequest> + Send + Sync,
{
    async fn on_request(&self, request: OutgoingRequest) -> Result<OutgoingRequest> {
        self(request)
    }
}

#[async_trait]
impl<F> ResponseInterceptor for F
where
    F: Fn(IncomingResponse) -> Result<IncomingResponse> + Send + Sync,
{
    async fn on_response(&self, response: IncomingResponse) -> Result<IncomingResponse> {
        self(response)
    }
}

#[async_trait]
impl<F> ErrorInterceptor for F
where
    F: Fn(ApiError) -> ApiError + Send + Sync,
{
    async fn on_error(&self, error: ApiError) -> ApiError {
        self(error)
    }
}

/// Ordered interceptor stages installed on a client.
#[derive(Clone, Default)]
pub struct Interceptors {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
    error: Vec<Arc<dyn ErrorInterceptor>>,
}

impl fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptors")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .field("error", &self.error.len())
            .finish()
    }
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.request.push(Arc::new(interceptor));
        self
    }

    pub fn on_response(mut self, interceptor: impl ResponseInterceptor + 'static) -> Self {
        self.response.push(Arc::new(interceptor));
        self
    }

    pub fn on_error(mut self, interceptor: impl ErrorInterceptor + 'static) -> Self {
        self.error.push(Arc::new(interceptor));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty() && self.error.is_empty()
    }

    pub(crate) async fn apply_request(
        &self,
        mut request: OutgoingRequest,
    ) -> Result<OutgoingRequest> {
        for interceptor in &self.request {
            request = interceptor.on_request(request).await?;
        }
        Ok(request)
    }

    pub(crate) async fn apply_response(
        &self,
        mut response: IncomingResponse,
    ) -> Result<IncomingResponse> {
        for interceptor in &self.response {
            response = interceptor.on_response(response).await?;
        }
        Ok(response)
    }

    pub(crate) async fn apply_error(&self, mut error: ApiError) -> ApiError {
        for interceptor in &self.error {
            error = interceptor.on_error(error).await;
        }
        error
    }
}
