use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::SourceId;

/// Unique identifier for a collected content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(pub Uuid);

impl ContentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ContentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Dedup key: SHA-256 over `url ‖ title ‖ body-or-empty`, hex lowercase.
pub fn content_hash(url: &str, title: &str, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(title.as_bytes());
    hasher.update(body.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Lifecycle of a content item. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    New,
    Processed,
    Notified,
    Archived,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::New => "new",
            ContentStatus::Processed => "processed",
            ContentStatus::Notified => "notified",
            ContentStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ContentStatus::New),
            "processed" => Some(ContentStatus::Processed),
            "notified" => Some(ContentStatus::Notified),
            "archived" => Some(ContentStatus::Archived),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ContentStatus::New => 0,
            ContentStatus::Processed => 1,
            ContentStatus::Notified => 2,
            ContentStatus::Archived => 3,
        }
    }

    /// Whether moving to `next` respects the forward-only lifecycle.
    pub fn can_advance_to(&self, next: ContentStatus) -> bool {
        next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Default for Sentiment {
    fn default() -> Self {
        Sentiment::Neutral
    }
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

/// Named entities pulled out of a content item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty() && self.people.is_empty() && self.technologies.is_empty()
    }
}

/// Model-generated analysis of one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: Option<String>,
    pub categories: Vec<String>,
    pub entities: Entities,
    pub sentiment: Sentiment,
    pub relevance_score: f64,
    pub importance_score: f64,
    pub key_topics: Vec<String>,
}

impl Enrichment {
    /// The substitute returned when analysis fails: nothing claimed,
    /// middle-of-the-road scores.
    pub fn neutral() -> Self {
        Self {
            summary: None,
            categories: Vec::new(),
            entities: Entities::default(),
            sentiment: Sentiment::Neutral,
            relevance_score: 0.5,
            importance_score: 0.5,
            key_topics: Vec::new(),
        }
    }

    /// Force both scores into [0, 1].
    pub fn clamped(mut self) -> Self {
        self.relevance_score = self.relevance_score.clamp(0.0, 1.0);
        self.importance_score = self.importance_score.clamp(0.0, 1.0);
        self
    }
}

/// One collected item, keyed by its content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: ContentId,
    pub source_id: SourceId,

    pub url: String,
    pub title: String,
    pub body: Option<String>,
    pub content_hash: String,

    pub enrichment: Option<Enrichment>,
    pub matched_keywords: Vec<String>,
    pub matched_keyword_groups: Vec<String>,

    pub status: ContentStatus,

    pub published_at: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl Content {
    pub fn new(
        source_id: SourceId,
        url: impl Into<String>,
        title: impl Into<String>,
        body: Option<String>,
        published_at: Option<DateTime<Utc>>,
    ) -> Self {
        let url = url.into();
        let title = title.into();
        let hash = content_hash(&url, &title, body.as_deref());
        Self {
            id: ContentId::new(),
            source_id,
            url,
            title,
            body,
            content_hash: hash,
            enrichment: None,
            matched_keywords: Vec::new(),
            matched_keyword_groups: Vec::new(),
            status: ContentStatus::New,
            published_at,
            collected_at: Utc::now(),
            processed_at: None,
            notified_at: None,
        }
    }

    /// Title and body joined, the text the analyzers and matcher look at.
    pub fn text(&self) -> String {
        match &self.body {
            Some(body) => format!("{}\n\n{}", self.title, body),
            None => self.title.clone(),
        }
    }

    /// The importance score if enriched, for notification filtering.
    pub fn importance(&self) -> Option<f64> {
        self.enrichment.as_ref().map(|e| e.importance_score)
    }
}
