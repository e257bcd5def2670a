//! Fetch-and-extract for one source, with model-assisted selector recovery.
//!
//! The crawler composes the shared fetcher with the parser for the
//! source's kind. When a selector-based source stops matching, it asks
//! the orchestrator (extract task) to derive fresh selectors from a page
//! sample; the caller persists the suggestion and it takes effect on the
//! next run. At most one recovery attempt per crawl.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ai::{CompletionOpts, Orchestrator, TaskKind};
use crate::error::{CrawlError, CrawlResult, ParseError};
use crate::fetch::PageFetcher;
use crate::parsers::{
    parse_bid_board, parse_channel_feed, parse_feed, parse_html_list, parse_date_permissive,
    CrawledItem,
};
use crate::text::{extract_json_object, truncate_chars};
use crate::types::{SelectorConfig, Source, SourceKind};

/// How much of the page the structure-analysis prompt gets to see.
const HEAL_SAMPLE_CHARS: usize = 10_000;

/// Selector set proposed by structure analysis.
#[derive(Debug, Deserialize)]
struct SelectorSuggestion {
    list_selector: Option<String>,
    title_selector: Option<String>,
    link_selector: Option<String>,
    date_selector: Option<String>,
    content_selector: Option<String>,
}

impl SelectorSuggestion {
    fn into_config(self) -> Option<SelectorConfig> {
        if self.list_selector.is_none() && self.title_selector.is_none() {
            return None;
        }
        Some(SelectorConfig {
            list_selector: self.list_selector,
            title_selector: self.title_selector,
            link_selector: self.link_selector,
            date_selector: self.date_selector,
            content_selector: self.content_selector,
            ..Default::default()
        })
    }
}

/// Item shape accepted from API-kind sources (JSON array bodies).
#[derive(Debug, Deserialize)]
struct ApiItem {
    url: String,
    title: String,
    #[serde(alias = "body", alias = "description")]
    content: Option<String>,
    published_at: Option<String>,
}

/// One crawl instance over a single source.
///
/// The fetcher is injected so tests can substitute canned pages; in
/// production the coordinator hands each crawl its own pooled HTTP
/// client, released when the crawler is dropped.
pub struct Crawler {
    source: Source,
    fetcher: Arc<dyn PageFetcher>,
    ai: Arc<Orchestrator>,
}

impl Crawler {
    pub fn new(source: Source, fetcher: Arc<dyn PageFetcher>, ai: Arc<Orchestrator>) -> Self {
        Self { source, fetcher, ai }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Fetch the source and extract items.
    ///
    /// A selector-based source that matches nothing triggers one recovery
    /// attempt; the error carries the suggested config so the caller can
    /// persist it. The current crawl is not retried with the new
    /// selectors.
    pub async fn crawl(&self) -> CrawlResult<Vec<CrawledItem>> {
        self.crawl_cancellable(&CancellationToken::new()).await
    }

    /// Like [`Crawler::crawl`], aborting at the crawl's suspension points
    /// when the caller's token fires.
    pub async fn crawl_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> CrawlResult<Vec<CrawledItem>> {
        let config = self.source.effective_config();
        let headers = (!config.headers.is_empty()).then_some(&config.headers);

        let page = tokio::select! {
            _ = cancel.cancelled() => return Err(CrawlError::Cancelled),
            page = self.fetcher.fetch(&self.source.url, headers) => page?,
        };
        let items = self.parse(&page.body)?;

        if items.is_empty() && self.source.kind.is_selector_based() {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }
            warn!(
                source_id = %self.source.id,
                kind = self.source.kind.as_str(),
                "selectors matched nothing, attempting structure analysis"
            );
            let healed = self.attempt_self_heal(&page.body).await;
            return Err(CrawlError::SelectorsFailed {
                healed_config: healed.map(Box::new),
            });
        }

        info!(
            source_id = %self.source.id,
            kind = self.source.kind.as_str(),
            items = items.len(),
            "crawl extracted items"
        );
        Ok(items)
    }

    fn parse(&self, body: &str) -> Result<Vec<CrawledItem>, ParseError> {
        let config = self.source.effective_config();
        match self.source.kind {
            SourceKind::Feed => Ok(parse_feed(body)),
            SourceKind::ChannelFeed => Ok(parse_channel_feed(body)),
            SourceKind::Html => parse_html_list(body, &self.source.url, config),
            SourceKind::SearchIndex => {
                if config.list_selector.is_some() {
                    parse_html_list(body, &self.source.url, config)
                } else {
                    let base = config.base_url.as_deref().unwrap_or(&self.source.url);
                    Ok(parse_bid_board(body, base))
                }
            }
            SourceKind::Api => Ok(Self::parse_api_body(body)),
        }
    }

    fn parse_api_body(body: &str) -> Vec<CrawledItem> {
        let parsed: Vec<ApiItem> = match serde_json::from_str(body) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "api body is not a JSON item array");
                return Vec::new();
            }
        };
        parsed
            .into_iter()
            .filter(|i| !i.url.is_empty() && !i.title.is_empty())
            .map(|i| {
                let published = i
                    .published_at
                    .as_deref()
                    .and_then(|raw| parse_date_permissive(raw, None));
                CrawledItem::new(i.url, i.title)
                    .with_body(i.content)
                    .with_published_at(published)
            })
            .collect()
    }

    /// Ask the model for replacement selectors. Failures abandon the
    /// recovery and leave the original crawl failure to surface.
    async fn attempt_self_heal(&self, html: &str) -> Option<SelectorConfig> {
        let sample = truncate_chars(html, HEAL_SAMPLE_CHARS);

        let prompt = format!(
            r#"Analyze this HTML and provide CSS selectors to extract news/article list items.

HTML:
{sample}

Return a JSON object with these fields:
- list_selector: CSS selector for the list container or repeated items
- title_selector: CSS selector for article title (relative to list item)
- link_selector: CSS selector for article link (relative to list item)
- date_selector: CSS selector for publish date (relative to list item, if available)
- content_selector: CSS selector for article content/summary (relative to list item, if available)

Only return valid JSON, no explanation."#
        );

        let response = match self
            .ai
            .request(&prompt, TaskKind::Extract, None, None, &CompletionOpts::default())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(source_id = %self.source.id, error = %e, "structure analysis request failed");
                return None;
            }
        };

        let suggestion: SelectorSuggestion = match serde_json::from_str(&response.content)
            .or_else(|e| {
                extract_json_object(&response.content)
                    .map(serde_json::from_str)
                    .unwrap_or(Err(e))
            }) {
            Ok(suggestion) => suggestion,
            Err(e) => {
                warn!(source_id = %self.source.id, error = %e, "structure analysis returned unusable JSON");
                return None;
            }
        };

        let config = suggestion.into_config();
        if let Some(config) = &config {
            info!(
                source_id = %self.source.id,
                list_selector = ?config.list_selector,
                "structure analysis proposed new selectors"
            );
        }
        config
    }

    /// Explicitly analyze the page and return a fresh config, e.g. when a
    /// new source is being set up.
    pub async fn analyze_and_configure(&self) -> CrawlResult<SelectorConfig> {
        let page = self.fetcher.fetch(&self.source.url, None).await?;
        self.attempt_self_heal(&page.body)
            .await
            .ok_or(CrawlError::HealingFailed {
                reason: "analysis produced no usable selectors".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCompletionClient, MockFetcher};
    use crate::ai::Provider;

    const FEED_URL: &str = "https://example.com/feed.xml";
    const PAGE_URL: &str = "https://example.com/news";

    const FEED_BODY: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title><link>https://example.com</link><description>d</description>
  <item><title>First story</title><link>https://example.com/1</link><description>a</description></item>
  <item><title>Second story</title><link>https://example.com/2</link><description>b</description></item>
</channel></rss>"#;

    const HTML_BODY: &str = r#"<html><body>
<article class="item"><h2><a href="/a">A real headline</a></h2><time>2024-06-01</time><p>text</p></article>
<article class="item"><h2><a href="/b">Another headline</a></h2><time>2024-06-02</time><p>text</p></article>
</body></html>"#;

    const HEALED_JSON: &str = r#"{"list_selector":"article.item","title_selector":"h2","link_selector":"a","date_selector":"time","content_selector":"p"}"#;

    fn no_ai() -> Arc<Orchestrator> {
        Arc::new(Orchestrator::with_clients(vec![]))
    }

    #[tokio::test]
    async fn feed_crawl_extracts_entries() {
        let fetcher = Arc::new(MockFetcher::new().with_page(FEED_URL, FEED_BODY));
        let source = Source::new("feed", FEED_URL, SourceKind::Feed);
        let crawler = Crawler::new(source, fetcher, no_ai());

        let items = crawler.crawl().await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn empty_feed_is_not_an_error() {
        let fetcher = Arc::new(MockFetcher::new().with_page(FEED_URL, "not xml"));
        let source = Source::new("feed", FEED_URL, SourceKind::Feed);
        let crawler = Crawler::new(source, fetcher, no_ai());

        assert!(crawler.crawl().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_error_propagates() {
        let fetcher = Arc::new(MockFetcher::new().with_status(FEED_URL, 500));
        let source = Source::new("feed", FEED_URL, SourceKind::Feed);
        let crawler = Crawler::new(source, fetcher, no_ai());

        let err = crawler.crawl().await.unwrap_err();
        assert!(matches!(err, CrawlError::Fetch(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn broken_selectors_trigger_recovery_and_surface_new_config() {
        let fetcher = Arc::new(MockFetcher::new().with_page(PAGE_URL, HTML_BODY));
        let ai = Arc::new(Orchestrator::with_clients(vec![Arc::new(
            MockCompletionClient::new(Provider::Anthropic).responding(HEALED_JSON),
        )]));

        let mut source = Source::new("site", PAGE_URL, SourceKind::Html).with_config(
            SelectorConfig {
                list_selector: Some("div.broken".into()),
                title_selector: Some("h2".into()),
                ..Default::default()
            },
        );

        let crawler = Crawler::new(source.clone(), Arc::clone(&fetcher) as _, ai);
        let err = crawler.crawl().await.unwrap_err();
        let healed = match err {
            CrawlError::SelectorsFailed { healed_config: Some(config) } => *config,
            other => panic!("expected selector failure with config, got {other:?}"),
        };
        assert_eq!(healed.list_selector.as_deref(), Some("article.item"));

        // The caller persists the config; the next run picks it up.
        source.apply_healed_config(healed, chrono::Utc::now());
        assert_eq!(source.config_version, 2);

        let crawler = Crawler::new(source, fetcher, no_ai());
        let items = crawler.crawl().await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn recovery_failure_leaves_original_failure() {
        let fetcher = Arc::new(MockFetcher::new().with_page(PAGE_URL, HTML_BODY));
        let source = Source::new("site", PAGE_URL, SourceKind::Html).with_config(SelectorConfig {
            list_selector: Some("div.broken".into()),
            title_selector: Some("h2".into()),
            ..Default::default()
        });

        // No providers registered: the analysis request cannot succeed.
        let crawler = Crawler::new(source, fetcher, no_ai());
        let err = crawler.crawl().await.unwrap_err();
        assert!(matches!(
            err,
            CrawlError::SelectorsFailed { healed_config: None }
        ));
    }

    #[tokio::test]
    async fn api_body_maps_json_items() {
        let body = r#"[{"url":"https://api.example.com/1","title":"API item","content":"body","published_at":"2024-06-01"}]"#;
        let fetcher = Arc::new(MockFetcher::new().with_page("https://api.example.com/items", body));
        let source = Source::new("api", "https://api.example.com/items", SourceKind::Api);
        let crawler = Crawler::new(source, fetcher, no_ai());

        let items = crawler.crawl().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].body.as_deref(), Some("body"));
        assert!(items[0].published_at.is_some());
    }

    #[tokio::test]
    async fn analyze_and_configure_reports_failure() {
        let fetcher = Arc::new(MockFetcher::new().with_page(PAGE_URL, HTML_BODY));
        let source = Source::new("site", PAGE_URL, SourceKind::Html);
        let crawler = Crawler::new(source, fetcher, no_ai());

        let err = crawler.analyze_and_configure().await.unwrap_err();
        assert!(matches!(err, CrawlError::HealingFailed { .. }));
    }
}
