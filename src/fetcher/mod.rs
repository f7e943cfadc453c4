//! Network fetchers and endpoint clients
//!
//! [`http::HttpClient`] is the one place requests are sent and transport
//! failures retried. On top of it sit the batch-oriented [`pages::PageFetcher`]
//! and the two endpoint clients: [`mesonet::MesonetClient`] for station
//! metadata and timeseries, [`avalanche::AvalancheClient`] for event logs,
//! field observations, and forecast pages.

pub mod avalanche;
pub mod http;
pub mod mesonet;
pub mod pages;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, mid-body read)
    #[error("network error: {0}")]
    Network(String),

    /// A response arrived but is not what the endpoint is supposed to return
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The API reported an explicit error envelope
    #[error("API error: {0}")]
    Api(String),

    /// Store failure while persisting fetched data
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Configuration is missing something a client needs
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type for fetcher operations
pub type FetchResult<T> = Result<T, FetchError>;
