//! One-shot structured analysis of a content item.
//!
//! Failures never propagate to the coordinator: a content item that the
//! model cannot analyze still advances through the pipeline carrying the
//! default-neutral result.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info};

use crate::ai::{CompletionOpts, Orchestrator, TaskKind};
use crate::error::{AiError, AiResult};
use crate::text::{extract_json_object, truncate_chars};
use crate::types::{Content, Enrichment, Entities, Sentiment};

/// How much of the content the analysis prompt gets to see.
const ANALYSIS_SAMPLE_CHARS: usize = 4_000;

/// Wire shape of the analysis response; everything is optional so a
/// partially well-formed answer still lands.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    summary: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    entities: Entities,
    sentiment: Option<String>,
    relevance_score: Option<f64>,
    importance_score: Option<f64>,
    #[serde(default)]
    key_topics: Vec<String>,
}

impl RawAnalysis {
    fn into_enrichment(self) -> Enrichment {
        let sentiment = match self.sentiment.as_deref() {
            Some("positive") => Sentiment::Positive,
            Some("negative") => Sentiment::Negative,
            _ => Sentiment::Neutral,
        };
        Enrichment {
            summary: self.summary.filter(|s| !s.is_empty()),
            categories: self.categories,
            entities: self.entities,
            sentiment,
            relevance_score: self.relevance_score.unwrap_or(0.5),
            importance_score: self.importance_score.unwrap_or(0.5),
            key_topics: self.key_topics,
        }
        .clamped()
    }
}

/// Runs content items through model analysis.
pub struct ContentAnalyzer {
    ai: Arc<Orchestrator>,
}

impl ContentAnalyzer {
    pub fn new(ai: Arc<Orchestrator>) -> Self {
        Self { ai }
    }

    /// Analyze one content item. Never fails; on any error the
    /// default-neutral enrichment is returned and the error logged.
    pub async fn process(&self, content: &Content) -> Enrichment {
        match self.analyze(&content.text()).await {
            Ok(enrichment) => {
                info!(
                    content_id = %content.id,
                    categories = ?enrichment.categories,
                    importance = enrichment.importance_score,
                    "content analysis succeeded"
                );
                enrichment
            }
            Err(e) => {
                error!(content_id = %content.id, error = %e, "content analysis failed");
                Enrichment::neutral()
            }
        }
    }

    async fn analyze(&self, text: &str) -> AiResult<Enrichment> {
        let sample = truncate_chars(text, ANALYSIS_SAMPLE_CHARS);
        let prompt = format!(
            r#"Analyze the following content and provide a structured analysis.

Content:
{sample}

Provide your analysis as a JSON object with these fields:
1. "summary": A 2-3 sentence summary of the key points
2. "categories": Array of relevant categories from: ["AI Research", "Product Launch", "Funding/Investment", "Partnership", "Regulation/Policy", "Technical", "Business", "Opinion"]
3. "entities": Object with:
   - "companies": Array of company names mentioned
   - "people": Array of people mentioned
   - "technologies": Array of technologies/products mentioned
4. "sentiment": One of "positive", "negative", "neutral"
5. "relevance_score": Float 0-1, how relevant this is to AI/tech industry
6. "importance_score": Float 0-1, how significant/impactful this news is
7. "key_topics": Array of main topics (e.g., "LLM", "Robotics", "Autonomous Vehicles")

Return ONLY valid JSON, no explanation or markdown."#
        );

        let response = self
            .ai
            .request(&prompt, TaskKind::Analyze, None, None, &CompletionOpts::default())
            .await?;

        let raw: RawAnalysis = serde_json::from_str(&response.content).or_else(|e| {
            // Chatty models wrap the object in prose; salvage the braces.
            extract_json_object(&response.content)
                .map(serde_json::from_str)
                .unwrap_or(Err(e))
                .map_err(AiError::InvalidResponse)
        })?;

        Ok(raw.into_enrichment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Provider;
    use crate::testing::MockCompletionClient;
    use crate::types::SourceId;

    fn content() -> Content {
        Content::new(
            SourceId::new(),
            "https://example.com/1",
            "Model launch",
            Some("A large model shipped.".into()),
            None,
        )
    }

    fn analyzer_with(client: MockCompletionClient) -> ContentAnalyzer {
        ContentAnalyzer::new(Arc::new(Orchestrator::with_clients(vec![Arc::new(client)])))
    }

    #[tokio::test]
    async fn well_formed_response_is_adopted() {
        let analyzer = analyzer_with(MockCompletionClient::new(Provider::Anthropic).responding(
            r#"{"summary":"A model shipped.","categories":["Product Launch"],
                "entities":{"companies":["ExampleCorp"],"people":[],"technologies":["LLM"]},
                "sentiment":"positive","relevance_score":0.9,"importance_score":0.8,
                "key_topics":["LLM"]}"#,
        ));

        let enrichment = analyzer.process(&content()).await;
        assert_eq!(enrichment.summary.as_deref(), Some("A model shipped."));
        assert_eq!(enrichment.sentiment, Sentiment::Positive);
        assert_eq!(enrichment.entities.companies, vec!["ExampleCorp"]);
        assert_eq!(enrichment.importance_score, 0.8);
    }

    #[tokio::test]
    async fn scores_out_of_range_are_clamped() {
        let analyzer = analyzer_with(MockCompletionClient::new(Provider::Anthropic).responding(
            r#"{"summary":"s","relevance_score":-0.3,"importance_score":1.7}"#,
        ));

        let enrichment = analyzer.process(&content()).await;
        assert_eq!(enrichment.relevance_score, 0.0);
        assert_eq!(enrichment.importance_score, 1.0);
    }

    #[tokio::test]
    async fn json_is_salvaged_from_prose() {
        let analyzer = analyzer_with(MockCompletionClient::new(Provider::Anthropic).responding(
            "Here is my analysis:\n{\"summary\":\"salvaged\",\"importance_score\":0.6}\nDone!",
        ));

        let enrichment = analyzer.process(&content()).await;
        assert_eq!(enrichment.summary.as_deref(), Some("salvaged"));
        assert_eq!(enrichment.importance_score, 0.6);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_neutral() {
        let analyzer = analyzer_with(MockCompletionClient::new(Provider::Anthropic).failing("down"));

        let enrichment = analyzer.process(&content()).await;
        assert_eq!(enrichment, Enrichment::neutral());
    }

    #[tokio::test]
    async fn unusable_text_degrades_to_neutral() {
        let analyzer =
            analyzer_with(MockCompletionClient::new(Provider::Anthropic).responding("I refuse."));

        let enrichment = analyzer.process(&content()).await;
        assert_eq!(enrichment, Enrichment::neutral());
        assert_eq!(enrichment.sentiment, Sentiment::Neutral);
        assert!(enrichment.categories.is_empty());
    }
}
