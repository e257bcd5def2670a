//! RSS 2.0 / Atom feed parsing.

use serde_json::json;
use tracing::warn;

use super::CrawledItem;

/// Parse a feed body into items.
///
/// Malformed-but-recoverable feeds still yield whatever entries the parser
/// salvages; a completely unparseable body yields an empty list with a
/// warning rather than an error.
pub fn parse_feed(body: &str) -> Vec<CrawledItem> {
    let feed = match feed_rs::parser::parse(body.as_bytes()) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(error = %e, "unparseable feed body");
            return Vec::new();
        }
    };

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let Some(url) = entry.links.first().map(|l| l.href.clone()) else {
            continue;
        };
        let Some(title) = entry.title.as_ref().map(|t| t.content.clone()) else {
            continue;
        };
        if title.is_empty() {
            continue;
        }

        // Prefer full content, fall back to the summary/description.
        let body = entry
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

        let published_at = entry.published.or(entry.updated);

        let mut item = CrawledItem::new(url, title)
            .with_body(body)
            .with_published_at(published_at);

        if let Some(author) = entry.authors.first() {
            item = item.with_metadata("author", json!(author.name));
        }
        if !entry.categories.is_empty() {
            let tags: Vec<&str> = entry.categories.iter().map(|c| c.term.as_str()).collect();
            item = item.with_metadata("tags", json!(tags));
        }
        if !entry.id.is_empty() {
            item = item.with_metadata("entry_id", json!(entry.id));
        }

        items.push(item);
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example AI News</title>
  <id>urn:example:feed</id>
  <updated>2024-06-01T00:00:00Z</updated>
  <entry>
    <id>urn:example:1</id>
    <title>Model release</title>
    <link href="https://example.com/posts/1"/>
    <published>2024-06-01T09:00:00Z</published>
    <updated>2024-06-01T10:00:00Z</updated>
    <author><name>Jordan</name></author>
    <category term="ai"/>
    <summary>Short summary</summary>
    <content type="text">Full body text</content>
  </entry>
  <entry>
    <id>urn:example:2</id>
    <title>Untitled follow-up</title>
    <link href="https://example.com/posts/2"/>
    <summary>Only a summary</summary>
  </entry>
</feed>"#;

    const RSS_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example RSS</title>
    <link>https://example.com</link>
    <description>News</description>
    <item>
      <title>RSS item</title>
      <link>https://example.com/rss/1</link>
      <description>Described here</description>
      <pubDate>Sat, 01 Jun 2024 09:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn atom_entries_extract_fields() {
        let items = parse_feed(ATOM_FEED);
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.url, "https://example.com/posts/1");
        assert_eq!(first.title, "Model release");
        assert_eq!(first.body.as_deref(), Some("Full body text"));
        assert!(first.published_at.is_some());
        assert_eq!(first.metadata.get("author").unwrap(), "Jordan");
        assert_eq!(first.metadata.get("entry_id").unwrap(), "urn:example:1");

        // No <content> falls back to the summary.
        assert_eq!(items[1].body.as_deref(), Some("Only a summary"));
    }

    #[test]
    fn rss_description_becomes_body() {
        let items = parse_feed(RSS_FEED);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].body.as_deref(), Some("Described here"));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn garbage_yields_empty_not_error() {
        assert!(parse_feed("this is not xml at all").is_empty());
    }

    #[test]
    fn entries_without_link_or_title_are_skipped() {
        let feed = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title><link>https://x</link><description>d</description>
  <item><title>No link</title></item>
  <item><link>https://example.com/only-link</link></item>
</channel></rss>"#;
        assert!(parse_feed(feed).is_empty());
    }
}
