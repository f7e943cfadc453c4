//! Blocking HTTP client wrapper
//!
//! Builds the underlying `reqwest` clients, applies the retry policy, and
//! reduces responses to status/body pairs. Only transport failures are
//! retried; a response that arrives, whatever its status code, is data for
//! the caller to judge.

use reqwest::blocking::Client;
use std::time::Duration;
use tracing::debug;

use super::{FetchError, FetchResult};
use crate::retry::RetryPolicy;

/// Connect timeout for all clients
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall per-request timeout. Timeseries responses spanning decades can run
/// to tens of megabytes on a slow link.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// A response reduced to what callers need
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Body decoded as text
    pub body: String,
}

/// Blocking HTTP client with retry
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client without a cookie store.
    pub fn new(retry: RetryPolicy) -> FetchResult<Self> {
        Self::build(retry, false)
    }

    /// Create a client with its own cookie store, for endpoints that hand out
    /// session cookies. Session lifetime equals the client's lifetime.
    pub fn with_cookies(retry: RetryPolicy) -> FetchResult<Self> {
        Self::build(retry, true)
    }

    fn build(retry: RetryPolicy, cookies: bool) -> FetchResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(cookies)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, retry })
    }

    /// GET `url`, retrying transport failures per the policy.
    pub fn get(&self, url: &str) -> FetchResult<HttpResponse> {
        debug!(url, "GET");
        self.retry.run(url, || {
            let response = self
                .client
                .get(url)
                .send()
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .map_err(|e| FetchError::Network(e.to_string()))?;
            Ok(HttpResponse { status, body })
        })
    }

    /// HEAD `url`. Used to pick up session cookies before a form POST.
    pub fn head(&self, url: &str) -> FetchResult<u16> {
        debug!(url, "HEAD");
        self.retry.run(url, || {
            let response = self
                .client
                .head(url)
                .send()
                .map_err(|e| FetchError::Network(e.to_string()))?;
            Ok(response.status().as_u16())
        })
    }

    /// POST a form to `url` with a `Referer` header, retrying transport
    /// failures per the policy.
    pub fn post_form(
        &self,
        url: &str,
        referer: &str,
        form: &[(&str, &str)],
    ) -> FetchResult<HttpResponse> {
        debug!(url, "POST form");
        self.retry.run(url, || {
            let response = self
                .client
                .post(url)
                .header(reqwest::header::REFERER, referer)
                .form(form)
                .send()
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .map_err(|e| FetchError::Network(e.to_string()))?;
            Ok(HttpResponse { status, body })
        })
    }
}
