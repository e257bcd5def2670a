//! Video-platform channel feeds (media-namespace Atom).

use regex::Regex;
use serde_json::json;
use tracing::warn;

use super::CrawledItem;

const VIDEO_ID_PREFIX: &str = "yt:video:";
const CHANNEL_ID_PREFIX: &str = "yt:channel:";

/// Parse a channel feed into items, one per video.
///
/// URLs are canonicalized to the `watch?v=<id>` form so the same video
/// hashes identically regardless of which link variant the feed carried.
pub fn parse_channel_feed(body: &str) -> Vec<CrawledItem> {
    let feed = match feed_rs::parser::parse(body.as_bytes()) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(error = %e, "unparseable channel feed");
            return Vec::new();
        }
    };

    let link_video_id = Regex::new(r"v=([A-Za-z0-9_-]+)").expect("static regex");
    let feed_channel_id = feed.id.strip_prefix(CHANNEL_ID_PREFIX).map(str::to_string);

    let mut items = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let video_id = entry
            .id
            .strip_prefix(VIDEO_ID_PREFIX)
            .map(str::to_string)
            .or_else(|| {
                entry.links.first().and_then(|l| {
                    link_video_id
                        .captures(&l.href)
                        .map(|c| c[1].to_string())
                })
            });
        let Some(video_id) = video_id else {
            continue;
        };

        let Some(title) = entry.title.as_ref().map(|t| t.content.clone()) else {
            continue;
        };

        let url = format!("https://www.youtube.com/watch?v={video_id}");

        let media = entry.media.first();
        let body = media
            .and_then(|m| m.description.as_ref().map(|d| d.content.clone()))
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()));

        let mut item = CrawledItem::new(url, title)
            .with_body(body)
            .with_published_at(entry.published.or(entry.updated))
            .with_metadata("video_id", json!(video_id));

        if let Some(author) = entry.authors.first() {
            item = item.with_metadata("channel_name", json!(author.name));
        }
        if let Some(channel_id) = &feed_channel_id {
            item = item.with_metadata("channel_id", json!(channel_id));
        }
        if let Some(thumbnail) = media.and_then(|m| m.thumbnails.first()) {
            item = item.with_metadata("thumbnail", json!(thumbnail.image.uri));
        }
        if let Some(views) = media.and_then(|m| m.community.as_ref()).and_then(|c| c.stats_views) {
            item = item.with_metadata("views", json!(views));
        }

        items.push(item);
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANNEL_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015"
      xmlns:media="http://search.yahoo.com/mrss/"
      xmlns="http://www.w3.org/2005/Atom">
  <id>yt:channel:UCabc123</id>
  <title>Example Channel</title>
  <entry>
    <id>yt:video:dQw4w9WgXcQ</id>
    <title>Robotics demo</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=dQw4w9WgXcQ&amp;feature=share"/>
    <author><name>Example Channel</name></author>
    <published>2024-06-01T12:00:00+00:00</published>
    <media:group>
      <media:title>Robotics demo</media:title>
      <media:description>A long-form description of the demo.</media:description>
      <media:thumbnail url="https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg" width="480" height="360"/>
      <media:community>
        <media:statistics views="123456"/>
      </media:community>
    </media:group>
  </entry>
</feed>"#;

    #[test]
    fn video_entries_are_canonicalized() {
        let items = parse_channel_feed(CHANNEL_FEED);
        assert_eq!(items.len(), 1);

        let item = &items[0];
        assert_eq!(item.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(item.title, "Robotics demo");
        assert_eq!(item.metadata.get("video_id").unwrap(), "dQw4w9WgXcQ");
        assert_eq!(item.metadata.get("channel_id").unwrap(), "UCabc123");
        assert_eq!(item.metadata.get("channel_name").unwrap(), "Example Channel");
        assert!(item
            .body
            .as_deref()
            .unwrap()
            .contains("long-form description"));
    }

    #[test]
    fn video_id_recovered_from_link_when_id_is_plain() {
        let feed = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:whatever</id>
  <title>c</title>
  <entry>
    <id>urn:entry:1</id>
    <title>Clip</title>
    <link href="https://www.youtube.com/watch?v=abc_DEF-123"/>
  </entry>
</feed>"#;
        let items = parse_channel_feed(feed);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://www.youtube.com/watch?v=abc_DEF-123");
    }
}
