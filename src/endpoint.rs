use reqwest::{Method, Url};

use crate::{ApiError, QueryParams, Result};

/// Resolves `endpoint` against the base URL and appends query parameters.
///
/// Absolute `http(s)://` endpoints bypass the base URL.
pub(crate) fn resolve_url(api_url: &str, endpoint: &str, params: &QueryParams) -> Result<String> {
    let endpoint = endpoint.trim();
    let raw = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_owned()
    } else {
        let base = api_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ApiError::configuration("api_url is not set"));
        }
        let path = endpoint.trim_start_matches('/');
        if path.is_empty() {
            base.to_owned()
        } else {
            format!("{base}/{path}")
        }
    };

    let mut url = Url::parse(&raw)
        .map_err(|err| ApiError::configuration(format!("invalid request URL '{raw}': {err}")))?;

    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params.iter() {
            pairs.append_pair(key, value);
        }
    }

    Ok(url.into())
}

/// Identity of a logical request, shared by the cache and the dedup map.
pub(crate) fn request_key(method: &Method, url: &str, body: Option<&serde_json::Value>) -> String {
    match body {
        Some(body) => format!("{method}:{url}:{body}"),
        None => format!("{method}:{url}:null"),
    }
}

/// Identifies an endpoint for cancellation: `METHOD:url:` with the query
/// string dropped, so every parameter variant of the endpoint matches.
pub(crate) fn key_prefix(method: &Method, url: &str) -> String {
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    format!("{method}:{path}:")
}
