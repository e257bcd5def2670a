use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consecutive failures after which a source is paused.
pub const MAX_SOURCE_ERRORS: i32 = 3;

/// Unique identifier for a crawl source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What kind of endpoint a source points at, which decides the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// RSS 2.0 or Atom feed.
    Feed,
    /// Arbitrary HTML index page, extracted with CSS selectors.
    Html,
    /// Video-platform channel feed (media-namespace Atom).
    ChannelFeed,
    /// Tabular search results (e.g. government bid boards).
    SearchIndex,
    /// JSON API endpoint; body is passed through untouched.
    Api,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Html => "html",
            SourceKind::ChannelFeed => "channel_feed",
            SourceKind::SearchIndex => "search_index",
            SourceKind::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "feed" => Some(SourceKind::Feed),
            "html" => Some(SourceKind::Html),
            "channel_feed" => Some(SourceKind::ChannelFeed),
            "search_index" => Some(SourceKind::SearchIndex),
            "api" => Some(SourceKind::Api),
            _ => None,
        }
    }

    /// Kinds that extract via configured CSS selectors, and are therefore
    /// candidates for selector recovery when nothing matches.
    pub fn is_selector_based(&self) -> bool {
        matches!(self, SourceKind::Html | SourceKind::SearchIndex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Inactive,
    Error,
    Pending,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Active => "active",
            SourceStatus::Inactive => "inactive",
            SourceStatus::Error => "error",
            SourceStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SourceStatus::Active),
            "inactive" => Some(SourceStatus::Inactive),
            "error" => Some(SourceStatus::Error),
            "pending" => Some(SourceStatus::Pending),
            _ => None,
        }
    }
}

/// Per-source extraction configuration.
///
/// Selector fields are relative to each list item except `list_selector`
/// itself. Opaque to everything outside the parsers and the crawler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default)]
    pub title_selector: Option<String>,
    #[serde(default)]
    pub content_selector: Option<String>,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub date_selector: Option<String>,
    #[serde(default)]
    pub list_selector: Option<String>,

    /// Extra request headers for this source.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-attempt fetch timeout override, seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Whether a browser renderer is required (not handled in-process).
    #[serde(default)]
    pub use_browser: bool,

    /// Explicit date format (chrono syntax) tried before the permissive set.
    #[serde(default)]
    pub date_format: Option<String>,
    /// Base for resolving relative links; defaults to the source URL origin.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl SelectorConfig {
    pub fn has_selectors(&self) -> bool {
        self.list_selector.is_some()
            || self.title_selector.is_some()
            || self.link_selector.is_some()
    }
}

/// A configured crawl target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub status: SourceStatus,

    pub config: SelectorConfig,
    pub crawl_interval_minutes: i64,

    pub last_crawled_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub error_count: i32,
    pub last_error: Option<String>,

    /// Replacement selectors produced by structure analysis.
    pub ai_generated_config: Option<SelectorConfig>,
    pub config_version: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: SourceKind) -> Self {
        let now = Utc::now();
        Self {
            id: SourceId::new(),
            name: name.into(),
            url: url.into(),
            kind,
            status: SourceStatus::Active,
            config: SelectorConfig::default(),
            crawl_interval_minutes: 60,
            last_crawled_at: None,
            last_success_at: None,
            error_count: 0,
            last_error: None,
            ai_generated_config: None,
            config_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_interval_minutes(mut self, minutes: i64) -> Self {
        self.crawl_interval_minutes = minutes;
        self
    }

    /// The selectors a crawl should actually use: analysis-generated config
    /// supersedes the manual one once present.
    pub fn effective_config(&self) -> &SelectorConfig {
        self.ai_generated_config.as_ref().unwrap_or(&self.config)
    }

    /// Whether the rate-limit window has elapsed and the source is eligible.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status != SourceStatus::Active {
            return false;
        }
        match self.last_crawled_at {
            None => true,
            Some(last) => now - last >= Duration::minutes(self.crawl_interval_minutes),
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_crawled_at = Some(now);
        self.last_success_at = Some(now);
        self.error_count = 0;
        self.last_error = None;
        self.status = SourceStatus::Active;
        self.updated_at = now;
    }

    /// Record a failed crawl. Three consecutive failures pause the source
    /// until it is manually reset.
    pub fn record_failure(&mut self, error: &str, now: DateTime<Utc>) {
        self.last_crawled_at = Some(now);
        self.error_count += 1;
        self.last_error = Some(error.to_string());
        if self.error_count >= MAX_SOURCE_ERRORS {
            self.status = SourceStatus::Error;
        }
        self.updated_at = now;
    }

    /// Adopt a recovered selector config. The version counter is monotonic.
    pub fn apply_healed_config(&mut self, config: SelectorConfig, now: DateTime<Utc>) {
        self.ai_generated_config = Some(config);
        self.config_version += 1;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_count_escalates_to_error_status() {
        let mut source = Source::new("news", "https://example.com/feed", SourceKind::Feed);
        let now = Utc::now();

        source.record_failure("HTTP 500", now);
        source.record_failure("HTTP 500", now);
        assert_eq!(source.status, SourceStatus::Active);

        source.record_failure("HTTP 500", now);
        assert_eq!(source.error_count, 3);
        assert_eq!(source.status, SourceStatus::Error);
        assert!(!source.is_due(now + Duration::hours(2)));
    }

    #[test]
    fn success_resets_error_count() {
        let mut source = Source::new("news", "https://example.com/feed", SourceKind::Feed);
        let now = Utc::now();
        source.record_failure("timeout", now);
        source.record_success(now);
        assert_eq!(source.error_count, 0);
        assert_eq!(source.status, SourceStatus::Active);
        assert!(source.last_success_at.is_some());
    }

    #[test]
    fn due_respects_crawl_interval() {
        let mut source = Source::new("news", "https://example.com/feed", SourceKind::Feed)
            .with_interval_minutes(30);
        let now = Utc::now();
        assert!(source.is_due(now));

        source.last_crawled_at = Some(now);
        assert!(!source.is_due(now + Duration::minutes(10)));
        assert!(source.is_due(now + Duration::minutes(30)));
    }

    #[test]
    fn healed_config_bumps_version_and_takes_effect() {
        let mut source = Source::new("site", "https://example.com/news", SourceKind::Html)
            .with_config(SelectorConfig {
                list_selector: Some("div.broken".into()),
                ..Default::default()
            });
        let healed = SelectorConfig {
            list_selector: Some("article.item".into()),
            title_selector: Some("h2".into()),
            ..Default::default()
        };

        source.apply_healed_config(healed.clone(), Utc::now());
        assert_eq!(source.config_version, 2);
        assert_eq!(source.effective_config(), &healed);
    }
}
