//! Selector-driven extraction of article lists from HTML index pages.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::error::ParseError;
use crate::types::SelectorConfig;

use super::{parse_date_permissive, CrawledItem};

fn compile(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|_| ParseError::InvalidSelector {
        selector: selector.to_string(),
    })
}

fn select_text(item: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    item.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract list items from an HTML page using the source's selectors.
///
/// Relative links are resolved against the configured base URL, falling
/// back to the page URL itself.
pub fn parse_html_list(
    html: &str,
    page_url: &str,
    config: &SelectorConfig,
) -> Result<Vec<CrawledItem>, ParseError> {
    let list_selector = config
        .list_selector
        .as_deref()
        .ok_or(ParseError::MissingListSelector)?;
    let list = compile(list_selector)?;

    let title = config.title_selector.as_deref().map(compile).transpose()?;
    let link = config.link_selector.as_deref().map(compile).transpose()?;
    let date = config.date_selector.as_deref().map(compile).transpose()?;
    let content = config.content_selector.as_deref().map(compile).transpose()?;
    let any_anchor = compile("a[href]")?;

    let base = config
        .base_url
        .as_deref()
        .unwrap_or(page_url);
    let base = Url::parse(base).ok();

    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for element in document.select(&list) {
        let Some(title_text) = title.as_ref().and_then(|s| select_text(&element, s)) else {
            continue;
        };

        // Configured link selector first, then any anchor in the item.
        let href = link
            .as_ref()
            .and_then(|s| element.select(s).next())
            .or_else(|| element.select(&any_anchor).next())
            .and_then(|el| el.value().attr("href"));
        let Some(href) = href else {
            continue;
        };
        let url = match &base {
            Some(base) => match base.join(href) {
                Ok(resolved) => resolved.to_string(),
                Err(_) => {
                    debug!(href = %href, "skipping unresolvable link");
                    continue;
                }
            },
            None => href.to_string(),
        };

        let body = content.as_ref().and_then(|s| select_text(&element, s));

        let published_at = date.as_ref().and_then(|s| {
            let el = element.select(s).next()?;
            // A machine-readable datetime attribute beats the display text.
            let raw = el
                .value()
                .attr("datetime")
                .map(str::to_string)
                .unwrap_or_else(|| el.text().collect::<String>().trim().to_string());
            parse_date_permissive(&raw, config.date_format.as_deref())
        });

        items.push(
            CrawledItem::new(url, title_text)
                .with_body(body)
                .with_published_at(published_at),
        );
    }

    if items.is_empty() {
        warn!(selector = %list_selector, url = %page_url, "list selector matched no usable items");
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<section id="news">
  <article class="item">
    <h2><a href="/posts/alpha">Alpha launches</a></h2>
    <time datetime="2024-06-01T08:00:00Z">June 1</time>
    <p>Alpha shipped a new model today.</p>
  </article>
  <article class="item">
    <h2><a href="https://other.example.org/beta">Beta raises</a></h2>
    <time>2024-06-02</time>
    <p>Beta closed a round.</p>
  </article>
  <article class="item">
    <h2>No link here</h2>
  </article>
</section>
</body></html>"#;

    fn config() -> SelectorConfig {
        SelectorConfig {
            list_selector: Some("article.item".into()),
            title_selector: Some("h2".into()),
            link_selector: Some("a".into()),
            date_selector: Some("time".into()),
            content_selector: Some("p".into()),
            base_url: Some("https://example.com".into()),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_items_and_resolves_relative_links() {
        let items = parse_html_list(PAGE, "https://example.com/news", &config()).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].url, "https://example.com/posts/alpha");
        assert_eq!(items[0].title, "Alpha launches");
        assert_eq!(items[0].body.as_deref(), Some("Alpha shipped a new model today."));
        assert!(items[0].published_at.is_some());

        // Absolute links pass through; date parsed from element text.
        assert_eq!(items[1].url, "https://other.example.org/beta");
        assert!(items[1].published_at.is_some());
    }

    #[test]
    fn broken_list_selector_matches_nothing() {
        let cfg = SelectorConfig {
            list_selector: Some("div.broken".into()),
            ..config()
        };
        let items = parse_html_list(PAGE, "https://example.com/news", &cfg).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn missing_list_selector_is_an_error() {
        let err = parse_html_list(PAGE, "https://example.com", &SelectorConfig::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingListSelector));
    }

    #[test]
    fn invalid_selector_is_rejected() {
        let cfg = SelectorConfig {
            list_selector: Some("!!!nope".into()),
            ..Default::default()
        };
        assert!(matches!(
            parse_html_list(PAGE, "https://example.com", &cfg),
            Err(ParseError::InvalidSelector { .. })
        ));
    }
}
