//! Windowed intelligence reports over processed content.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai::{CompletionOpts, Orchestrator, TaskKind};
use crate::error::AiResult;
use crate::storage::Storage;
use crate::types::Content;

/// At most this many contents feed one report.
const REPORT_CONTENT_LIMIT: usize = 100;
/// At most this many items are rendered into the prompt.
const PROMPT_ITEM_LIMIT: usize = 50;
/// How many source links the envelope carries.
const SOURCE_LINK_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Daily,
    Weekly,
    Custom,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Daily => "daily",
            ReportKind::Weekly => "weekly",
            ReportKind::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSource {
    pub title: String,
    pub url: String,
}

/// Stable report envelope handed to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub topic: Option<String>,
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub content_count: usize,
    /// Structured analysis, or `{"raw_analysis": ...}` when the model
    /// answered outside the JSON contract.
    pub report: serde_json::Value,
    pub sources: Vec<ReportSource>,
}

/// Generates reports from the content store via the orchestrator.
pub struct ReportGenerator {
    storage: Arc<dyn Storage>,
    ai: Arc<Orchestrator>,
}

impl ReportGenerator {
    pub fn new(storage: Arc<dyn Storage>, ai: Arc<Orchestrator>) -> Self {
        Self { storage, ai }
    }

    pub async fn generate_daily(&self) -> anyhow::Result<Report> {
        let end = Utc::now();
        self.generate(end - Duration::days(1), end, ReportKind::Daily, None)
            .await
    }

    pub async fn generate_weekly(&self) -> anyhow::Result<Report> {
        let end = Utc::now();
        self.generate(end - Duration::days(7), end, ReportKind::Weekly, None)
            .await
    }

    pub async fn generate_custom(&self, topic: &str, days: i64) -> anyhow::Result<Report> {
        let end = Utc::now();
        self.generate(
            end - Duration::days(days),
            end,
            ReportKind::Custom,
            Some(topic.to_string()),
        )
        .await
    }

    /// Generate one report over an explicit window.
    pub async fn generate(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: ReportKind,
        topic: Option<String>,
    ) -> anyhow::Result<Report> {
        let contents = self
            .storage
            .list_contents_in_window(start, end, REPORT_CONTENT_LIMIT)
            .await?;

        if contents.is_empty() {
            info!(kind = kind.as_str(), "no content in window, emitting empty report");
            return Ok(empty_report(kind, start, end, topic));
        }

        let body = self.analyze(&contents, kind, start, end, topic.as_deref()).await?;

        info!(
            kind = kind.as_str(),
            content_count = contents.len(),
            "report generated"
        );

        Ok(Report {
            id: report_id(kind, end),
            kind,
            topic,
            period: ReportPeriod { start, end },
            generated_at: Utc::now(),
            content_count: contents.len(),
            report: body,
            sources: contents
                .iter()
                .take(SOURCE_LINK_LIMIT)
                .map(|c| ReportSource {
                    title: c.title.clone(),
                    url: c.url.clone(),
                })
                .collect(),
        })
    }

    async fn analyze(
        &self,
        contents: &[Content],
        kind: ReportKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        topic: Option<&str>,
    ) -> AiResult<serde_json::Value> {
        let content_text = format_contents(&contents[..contents.len().min(PROMPT_ITEM_LIMIT)]);

        let prompt = match kind {
            ReportKind::Daily => daily_prompt(&content_text, end),
            ReportKind::Weekly => weekly_prompt(&content_text, start, end),
            ReportKind::Custom => custom_prompt(&content_text, topic.unwrap_or(""), start, end),
        };

        let response = self
            .ai
            .request(&prompt, TaskKind::Analyze, None, None, &CompletionOpts::default())
            .await?;

        Ok(match serde_json::from_str(&response.content) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "report analysis was not JSON, embedding raw text");
                serde_json::json!({ "raw_analysis": response.content })
            }
        })
    }
}

fn report_id(kind: ReportKind, end: DateTime<Utc>) -> String {
    format!("{}_{}", kind.as_str(), end.format("%Y%m%d"))
}

fn empty_report(
    kind: ReportKind,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    topic: Option<String>,
) -> Report {
    Report {
        id: report_id(kind, end),
        kind,
        topic,
        period: ReportPeriod { start, end },
        generated_at: Utc::now(),
        content_count: 0,
        report: serde_json::json!({
            "message": "No content available for the specified period."
        }),
        sources: Vec::new(),
    }
}

fn format_contents(contents: &[Content]) -> String {
    let mut lines = Vec::new();
    for (i, content) in contents.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, content.title));
        if let Some(enrichment) = &content.enrichment {
            if let Some(summary) = &enrichment.summary {
                lines.push(format!("   Summary: {summary}"));
            }
            if !enrichment.categories.is_empty() {
                lines.push(format!("   Categories: {}", enrichment.categories.join(", ")));
            }
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

fn daily_prompt(content_text: &str, date: DateTime<Utc>) -> String {
    format!(
        r#"Generate a daily AI industry intelligence brief for {}.

Based on these news items:
{content_text}

Create a JSON report with:
1. "headline": One-sentence overview of the day's most important development
2. "top_stories": Array of 3-5 most important stories with:
   - "title": Story title
   - "summary": 2-3 sentence summary
   - "impact": Why this matters (1 sentence)
   - "importance": "high", "medium", or "low"
3. "trends": Array of 2-3 emerging trends observed
4. "keyword_stats": Object with keyword categories and their mention counts
5. "notable_companies": Array of companies that were prominently mentioned
6. "outlook": Brief outlook for tomorrow based on today's developments

Return ONLY valid JSON."#,
        date.format("%Y-%m-%d")
    )
}

fn weekly_prompt(content_text: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        r#"Generate a weekly AI industry intelligence report for {} to {}.

Based on these news items:
{content_text}

Create a comprehensive JSON report with:
1. "executive_summary": 3-4 sentence overview of the week
2. "key_developments": Array of 5-7 major developments with:
   - "title": Development title
   - "description": Detailed description (3-4 sentences)
   - "implications": Business/industry implications
   - "category": Category (e.g., "Product Launch", "Funding", "Partnership")
3. "trend_analysis": Array of 3-5 trends with:
   - "trend": Trend name
   - "evidence": Supporting evidence from the week's news
   - "trajectory": "rising", "stable", or "declining"
4. "company_spotlight": Analysis of 3-5 most active companies
5. "technology_focus": Deep dive on 2-3 key technologies mentioned
6. "market_signals": Any market-relevant signals observed
7. "next_week_watchlist": 3-5 things to watch next week

Return ONLY valid JSON."#,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

fn custom_prompt(
    content_text: &str,
    topic: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    format!(
        r#"Generate a focused intelligence report on "{topic}" covering {} to {}.

Based on these relevant news items:
{content_text}

Create a focused JSON report with:
1. "overview": Executive summary of {topic} developments
2. "timeline": Chronological array of key events
3. "key_players": Companies and people involved
4. "technical_details": Any technical information mentioned
5. "market_impact": Market and business implications
6. "competitive_landscape": How different players are positioned
7. "future_outlook": Predictions and expected developments
8. "recommendations": Actionable insights

Return ONLY valid JSON."#,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}
