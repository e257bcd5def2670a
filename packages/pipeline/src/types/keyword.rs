use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a keyword group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordGroupId(pub Uuid);

impl KeywordGroupId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for KeywordGroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordId(pub Uuid);

impl KeywordId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for KeywordId {
    fn default() -> Self {
        Self::new()
    }
}

/// A single matchable keyword: canonical form plus alternative spellings.
///
/// The canonical form is unique within its group; matching is
/// case-insensitive and whole-word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    pub id: KeywordId,
    pub canonical: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub weight: f64,
    pub is_active: bool,
}

impl Keyword {
    pub fn new(canonical: impl Into<String>) -> Self {
        Self {
            id: KeywordId::new(),
            canonical: canonical.into(),
            synonyms: Vec::new(),
            weight: 1.0,
            is_active: true,
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A named taxonomy bucket owning its keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub id: KeywordGroupId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub keywords: Vec<Keyword>,
    pub created_at: DateTime<Utc>,
}

impl KeywordGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: KeywordGroupId::new(),
            name: name.into(),
            description: None,
            is_active: true,
            keywords: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_keyword(mut self, keyword: Keyword) -> Self {
        self.keywords.push(keyword);
        self
    }
}
