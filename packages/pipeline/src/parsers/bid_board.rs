//! Table scraper for government bid boards and similar search-result pages.
//!
//! These pages are rendered server-side as big `<table>`s with
//! `javascript:` anchors, so extraction leans on row/anchor heuristics
//! instead of configured selectors.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use tracing::debug;
use url::Url;

use super::CrawledItem;

/// Anchors whose text is shorter than this are assumed to be row chrome
/// (paging arrows, icons) rather than the notice title.
const MIN_TITLE_LEN: usize = 10;

/// Parse tabular search results into items.
///
/// When an anchor is a client-side action (`javascript:...`) the notice
/// URL is derived from the first numeric group embedded in it.
pub fn parse_bid_board(html: &str, base_url: &str) -> Vec<CrawledItem> {
    let document = Html::parse_document(html);

    let primary_rows =
        Selector::parse("table.list_table tbody tr, table.tb_list tbody tr").expect("static selector");
    let fallback_rows =
        Selector::parse("tr[onclick], tr.bg_color1, tr.bg_color2").expect("static selector");
    let cell = Selector::parse("td").expect("static selector");
    let anchor = Selector::parse("td a").expect("static selector");

    let mut rows: Vec<ElementRef<'_>> = document.select(&primary_rows).collect();
    if rows.is_empty() {
        rows = document.select(&fallback_rows).collect();
    }

    let numeric_id = Regex::new(r"(\d+)").expect("static regex");
    let date_pattern = Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").expect("static regex");
    let price_pattern = Regex::new(r"[\d,]+원").expect("static regex");

    let mut items = Vec::new();

    for row in rows {
        let cells: Vec<ElementRef<'_>> = row.select(&cell).collect();
        if cells.len() < 4 {
            continue;
        }

        let Some(title_anchor) = row
            .select(&anchor)
            .find(|a| a.text().collect::<String>().trim().len() >= MIN_TITLE_LEN)
        else {
            continue;
        };
        let title = title_anchor.text().collect::<String>().trim().to_string();
        let href = title_anchor.value().attr("href").unwrap_or("");

        let url = if href.starts_with("javascript:") {
            match numeric_id.captures(href) {
                Some(caps) => format!("{}?bidNo={}", base_url.trim_end_matches('/'), &caps[1]),
                None => {
                    debug!(href = %href, "client-side anchor without an embedded id");
                    base_url.to_string()
                }
            }
        } else if href.starts_with('/') {
            Url::parse(base_url)
                .and_then(|base| base.join(href))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| base_url.to_string())
        } else if href.is_empty() {
            base_url.to_string()
        } else {
            href.to_string()
        };

        let mut item = CrawledItem::new(url, title);

        if let Some(first_cell) = cells.first() {
            let bid_number = first_cell.text().collect::<String>().trim().to_string();
            if !bid_number.is_empty() {
                item = item.with_metadata("bid_number", json!(bid_number));
            }
        }
        if let Some(org_cell) = cells.get(2) {
            let organization = org_cell.text().collect::<String>().trim().to_string();
            if !organization.is_empty() {
                item = item.with_metadata("organization", json!(organization));
            }
        }

        for c in &cells {
            let text = c.text().collect::<String>();
            let text = text.trim();
            if let Some(caps) = date_pattern.captures(text) {
                let (y, m, d) = (
                    caps[1].parse::<i32>().ok(),
                    caps[2].parse::<u32>().ok(),
                    caps[3].parse::<u32>().ok(),
                );
                if let (Some(y), Some(m), Some(d)) = (y, m, d) {
                    if let Some(date) = chrono::NaiveDate::from_ymd_opt(y, m, d) {
                        item.published_at = date
                            .and_hms_opt(0, 0, 0)
                            .map(|dt| chrono::TimeZone::from_utc_datetime(&chrono::Utc, &dt));
                        item = item.with_metadata("deadline", json!(text));
                        break;
                    }
                }
            }
        }

        for c in &cells {
            let text = c.text().collect::<String>();
            let text = text.trim();
            if price_pattern.is_match(text) {
                item = item.with_metadata("estimated_price", json!(text));
                break;
            }
        }

        items.push(item);
    }

    items
}
