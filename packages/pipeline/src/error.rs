//! Typed errors for the pipeline library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Storage adapters and the
//! coordinator use `anyhow` at the application boundary.

use thiserror::Error;

use crate::ai::Provider;
use crate::types::SelectorConfig;

/// Errors from the HTTP fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure after exhausting retries.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx response (5xx/429 after retries, 4xx immediately).
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Per-attempt timeout elapsed on every attempt.
    #[error("timeout fetching {url}")]
    Timeout { url: String },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Errors from parsing fetched bodies into items.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Selector string rejected by the HTML engine.
    #[error("invalid selector `{selector}`")]
    InvalidSelector { selector: String },

    /// A list selector is required for this source kind but missing.
    #[error("source config has no list selector")]
    MissingListSelector,
}

/// Errors from a crawl run.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Configured selectors matched nothing. Carries the replacement
    /// config when the recovery analysis produced one; the caller
    /// persists it for the next run.
    #[error("configured selectors matched no items")]
    SelectorsFailed {
        healed_config: Option<Box<SelectorConfig>>,
    },

    /// Explicit structure analysis could not produce a usable config.
    #[error("structure analysis failed: {reason}")]
    HealingFailed { reason: String },

    /// The crawl was cancelled (graceful stop or hard wall-clock cap).
    #[error("crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    /// Transport-class failures are worth a coordinator-level retry;
    /// parse/selector failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, CrawlError::Fetch(e) if e.is_transient())
    }
}

/// Errors from provider clients and the orchestrator.
#[derive(Debug, Error)]
pub enum AiError {
    /// No configured provider can serve the requested task.
    #[error("no AI providers available for this task; check API keys")]
    NoProviderAvailable,

    /// Every candidate provider failed; carries the last failure.
    #[error("all AI providers failed; last error: {last}")]
    AllProvidersFailed { last: String },

    /// A single provider call failed.
    #[error("{provider} request failed: {message}")]
    Provider { provider: Provider, message: String },

    /// A single provider call timed out.
    #[error("{provider} request timed out")]
    Timeout { provider: Provider },

    /// The model responded but not with the JSON we asked for.
    #[error("unparseable model response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Result alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result alias for AI operations.
pub type AiResult<T> = std::result::Result<T, AiError>;
