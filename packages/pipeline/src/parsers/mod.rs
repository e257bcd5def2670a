//! Per-source-kind extractors.
//!
//! Every parser takes a fetched body plus the source's selector config and
//! returns a list of [`CrawledItem`]s. Items carry the dedup hash so the
//! store can gate inserts without recomputing it.

mod bid_board;
mod channel;
mod feed;
mod html_list;

pub use bid_board::parse_bid_board;
pub use channel::parse_channel_feed;
pub use feed::parse_feed;
pub use html_list::parse_html_list;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::content_hash;

/// One extracted item, before it becomes a stored content row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledItem {
    pub url: String,
    pub title: String,
    pub body: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CrawledItem {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            body: None,
            published_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Dedup key for this item.
    pub fn content_hash(&self) -> String {
        content_hash(&self.url, &self.title, self.body.as_deref())
    }
}

/// Formats tried, in order, when a date string has no better hint.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DAY_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d %b %Y", "%b %d, %Y"];

/// Parse a date string permissively: explicit format first (when the
/// source config supplies one), then RFC 3339/2822, then the common
/// formats sites actually emit.
pub(crate) fn parse_date_permissive(raw: &str, explicit_format: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(format) = explicit_format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    for format in DAY_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_hash_matches_content_hash_contract() {
        let item = CrawledItem::new("https://x/1", "Title").with_body(Some("Body".into()));
        assert_eq!(
            item.content_hash(),
            content_hash("https://x/1", "Title", Some("Body"))
        );
    }

    #[test]
    fn permissive_date_parsing_handles_common_shapes() {
        assert!(parse_date_permissive("2024-06-01T10:30:00Z", None).is_some());
        assert!(parse_date_permissive("Sat, 01 Jun 2024 10:30:00 GMT", None).is_some());
        assert!(parse_date_permissive("2024-06-01 10:30", None).is_some());
        assert!(parse_date_permissive("2024.06.01", None).is_some());
        assert!(parse_date_permissive("Jun 1, 2024", None).is_some());
        assert!(parse_date_permissive("yesterday-ish", None).is_none());
    }

    #[test]
    fn explicit_format_wins() {
        let parsed = parse_date_permissive("01|06|2024", Some("%d|%m|%Y")).unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }
}
