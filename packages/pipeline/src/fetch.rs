//! HTTP fetching with bounded retries.
//!
//! One pooled client per fetcher instance; the crawler that owns the
//! fetcher releases the pool when it is dropped. Transport failures and
//! 5xx/429 responses are retried with jittered exponential backoff;
//! other 4xx responses fail immediately.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::retry::full_jitter_delay;

/// Browser-mimicking User-Agent; many index pages refuse obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// A fetched response body plus the bits of the response we care about.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
    pub status: u16,
    pub content_type: Option<String>,
}

/// Trait for page fetching (to allow mocking).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> FetchResult<FetchedPage>;
}

/// Pooled reqwest-backed fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_policy(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_MAX_RETRIES)
    }

    pub fn with_policy(timeout: Duration, max_retries: u32) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .expect("static header value"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "en-US,en;q=0.5".parse().expect("static header value"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            max_retries: max_retries.max(1),
        })
    }

    async fn fetch_once(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> FetchResult<FetchedPage> {
        let mut request = self.client.get(url);
        if let Some(extra) = headers {
            for (name, value) in extra {
                let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                    warn!(header = %name, "skipping invalid header name");
                    continue;
                };
                let Ok(value) = HeaderValue::from_str(value) else {
                    warn!(header = %name, "skipping invalid header value");
                    continue;
                };
                request = request.header(name, value);
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })?;

        Ok(FetchedPage {
            url: final_url,
            body,
            status: status.as_u16(),
            content_type,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> FetchResult<FetchedPage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(url = %url, attempt, "fetch starting");

            match self.fetch_once(url, headers).await {
                Ok(page) => {
                    debug!(url = %url, status = page.status, bytes = page.body.len(), "fetch succeeded");
                    return Ok(page);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = full_jitter_delay(attempt);
                    warn!(url = %url, attempt, error = %e, delay_ms = delay.as_millis() as u64, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "fetch failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let retryable = FetchError::Status { status: 503, url: "u".into() };
        let throttled = FetchError::Status { status: 429, url: "u".into() };
        let not_found = FetchError::Status { status: 404, url: "u".into() };
        let timeout = FetchError::Timeout { url: "u".into() };

        assert!(retryable.is_transient());
        assert!(throttled.is_transient());
        assert!(!not_found.is_transient());
        assert!(timeout.is_transient());
    }
}
