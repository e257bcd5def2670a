//! Three-tier keyword matching: exact, synonym, semantic.
//!
//! Exact and synonym passes are cheap whole-word regex scans over
//! precompiled tables; the semantic pass costs a model call and only runs
//! when the cheap passes found nothing. Lookup tables are rebuilt under a
//! write lock on taxonomy mutation; matching reads a cloned snapshot.

use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::{CompletionOpts, Orchestrator, TaskKind};
use crate::text::{extract_json_array, truncate_chars};
use crate::types::{Keyword, KeywordGroup};

pub const EXACT_SCORE: f64 = 1.0;
pub const SYNONYM_SCORE: f64 = 0.9;

/// How much text the semantic prompt gets to see.
const SEMANTIC_SAMPLE_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Synonym,
    Semantic,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Synonym => "synonym",
            MatchKind::Semantic => "semantic",
        }
    }
}

/// One ranked match against the taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub keyword: String,
    pub keyword_group: String,
    pub kind: MatchKind,
    pub score: f64,
    pub matched_text: Option<String>,
}

struct CompiledEntry {
    pattern: Regex,
    group: String,
    canonical: String,
    /// What to report as the matched span.
    surface: String,
}

#[derive(Default)]
struct Lookups {
    exact: Vec<CompiledEntry>,
    synonyms: Vec<CompiledEntry>,
    /// `group:canonical` pairs for the semantic prompt.
    pairs: Vec<String>,
}

fn whole_word(term_lower: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(term_lower))).ok()
}

fn build_lookups(groups: &[KeywordGroup]) -> Lookups {
    let mut lookups = Lookups::default();

    for group in groups.iter().filter(|g| g.is_active) {
        for keyword in group.keywords.iter().filter(|k| k.is_active) {
            let canonical_lower = keyword.canonical.to_lowercase();
            if let Some(pattern) = whole_word(&canonical_lower) {
                lookups.exact.push(CompiledEntry {
                    pattern,
                    group: group.name.clone(),
                    canonical: keyword.canonical.clone(),
                    surface: keyword.canonical.clone(),
                });
            }
            for synonym in &keyword.synonyms {
                let synonym_lower = synonym.to_lowercase();
                if let Some(pattern) = whole_word(&synonym_lower) {
                    lookups.synonyms.push(CompiledEntry {
                        pattern,
                        group: group.name.clone(),
                        canonical: keyword.canonical.clone(),
                        surface: synonym_lower,
                    });
                }
            }
            lookups
                .pairs
                .push(format!("{}:{}", group.name, keyword.canonical));
        }
    }

    lookups
}

/// Matches text against a keyword taxonomy.
pub struct KeywordMatcher {
    ai: Option<Arc<Orchestrator>>,
    enable_semantic: bool,
    lookups: RwLock<Arc<Lookups>>,
}

impl KeywordMatcher {
    pub fn new(groups: &[KeywordGroup], ai: Option<Arc<Orchestrator>>, enable_semantic: bool) -> Self {
        Self {
            ai,
            enable_semantic,
            lookups: RwLock::new(Arc::new(build_lookups(groups))),
        }
    }

    /// Rebuild the lookup tables after a taxonomy mutation.
    pub fn set_groups(&self, groups: &[KeywordGroup]) {
        let rebuilt = Arc::new(build_lookups(groups));
        *self.lookups.write().expect("matcher lock poisoned") = rebuilt;
    }

    /// Match text against all keywords.
    ///
    /// Returns deduplicated results (max score per `group:canonical`)
    /// sorted by score descending. Semantic failures degrade to the cheap
    /// results; they never error.
    pub async fn match_text(
        &self,
        text: &str,
        min_score: f64,
        use_semantic: Option<bool>,
    ) -> Vec<MatchResult> {
        let lookups = self.lookups.read().expect("matcher lock poisoned").clone();
        let text_lower = text.to_lowercase();

        let mut results: Vec<MatchResult> = Vec::new();

        for entry in &lookups.exact {
            if entry.pattern.is_match(&text_lower) {
                results.push(MatchResult {
                    keyword: entry.canonical.clone(),
                    keyword_group: entry.group.clone(),
                    kind: MatchKind::Exact,
                    score: EXACT_SCORE,
                    matched_text: Some(entry.surface.clone()),
                });
            }
        }

        for entry in &lookups.synonyms {
            if entry.pattern.is_match(&text_lower) {
                results.push(MatchResult {
                    keyword: entry.canonical.clone(),
                    keyword_group: entry.group.clone(),
                    kind: MatchKind::Synonym,
                    score: SYNONYM_SCORE,
                    matched_text: Some(entry.surface.clone()),
                });
            }
        }

        let semantic_wanted = use_semantic.unwrap_or(self.enable_semantic);
        if semantic_wanted && results.is_empty() {
            let semantic = self.match_semantic(text, &lookups.pairs).await;
            results.extend(semantic.into_iter().filter(|r| r.score >= min_score));
        }

        // Keep the best score per group:canonical.
        let mut best: std::collections::HashMap<String, MatchResult> = Default::default();
        for result in results {
            let key = format!("{}:{}", result.keyword_group, result.keyword);
            match best.get(&key) {
                Some(existing) if existing.score >= result.score => {}
                _ => {
                    best.insert(key, result);
                }
            }
        }

        let mut final_results: Vec<MatchResult> = best.into_values().collect();
        final_results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.keyword.cmp(&b.keyword))
        });

        debug!(
            text_len = text.len(),
            matches = final_results.len(),
            "keyword match complete"
        );

        final_results
    }

    async fn match_semantic(&self, text: &str, pairs: &[String]) -> Vec<MatchResult> {
        let Some(ai) = &self.ai else {
            return Vec::new();
        };
        if pairs.is_empty() {
            return Vec::new();
        }

        let sample = truncate_chars(text, SEMANTIC_SAMPLE_CHARS);
        let keyword_list = pairs.join(", ");
        let prompt = format!(
            r#"Given the following text and keyword list, identify which keywords are semantically relevant to the text.
Even if the exact keyword doesn't appear, check if the content is about that topic.

Text:
{sample}

Keywords:
{keyword_list}

Return a JSON array of objects with:
- "keyword": the matched keyword (format: "group:keyword")
- "score": relevance score from 0.0 to 1.0
- "reason": brief explanation

Only include keywords with score >= 0.5. Return empty array if no matches.
Return ONLY valid JSON."#
        );

        let response = match ai
            .request(&prompt, TaskKind::Classify, None, None, &CompletionOpts::default())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "semantic match failed");
                return Vec::new();
            }
        };

        #[derive(Deserialize)]
        struct SemanticHit {
            keyword: String,
            score: Option<f64>,
            reason: Option<String>,
        }

        let hits: Vec<SemanticHit> = match serde_json::from_str(&response.content).or_else(|e| {
            extract_json_array(&response.content)
                .map(serde_json::from_str)
                .unwrap_or(Err(e))
        }) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "semantic match returned unusable JSON");
                return Vec::new();
            }
        };

        hits.into_iter()
            .filter_map(|hit| {
                let (group, keyword) = hit.keyword.split_once(':')?;
                Some(MatchResult {
                    keyword: keyword.to_string(),
                    keyword_group: group.to_string(),
                    kind: MatchKind::Semantic,
                    score: hit.score.unwrap_or(0.5),
                    matched_text: hit.reason,
                })
            })
            .collect()
    }
}

/// The default AI-news taxonomy this deployment ships with.
pub fn default_taxonomy() -> Vec<KeywordGroup> {
    vec![
        KeywordGroup::new("AI Core")
            .with_keyword(Keyword::new("AI").with_synonyms(["인공지능", "Artificial Intelligence", "A.I."]))
            .with_keyword(Keyword::new("LLM").with_synonyms(["Large Language Model", "대규모 언어 모델", "거대 언어 모델"]))
            .with_keyword(Keyword::new("GPT").with_synonyms(["GPT-4", "GPT-5", "ChatGPT"]))
            .with_keyword(Keyword::new("Claude").with_synonyms(["Anthropic Claude", "Claude AI"]))
            .with_keyword(Keyword::new("Gemini").with_synonyms(["Google Gemini", "Gemini Pro", "Gemini Ultra"])),
        KeywordGroup::new("Physical AI")
            .with_keyword(Keyword::new("Physical AI").with_synonyms(["Embodied AI", "실체화된 AI"]))
            .with_keyword(Keyword::new("Humanoid").with_synonyms(["휴머노이드", "인간형 로봇", "Humanoid Robot"]))
            .with_keyword(Keyword::new("Auto Pilot").with_synonyms(["자율주행", "Autonomous Driving", "FSD", "Full Self-Driving"]))
            .with_keyword(Keyword::new("Robotics").with_synonyms(["로봇공학", "로보틱스"])),
        KeywordGroup::new("AI Business")
            .with_keyword(Keyword::new("AI Agent").with_synonyms(["AI 에이전트", "Autonomous Agent", "자율 에이전트"]))
            .with_keyword(Keyword::new("Vertical AI").with_synonyms(["버티컬 AI", "Industry AI", "산업 특화 AI"]))
            .with_keyword(Keyword::new("AI Automation").with_synonyms(["AI 자동화", "Intelligent Automation", "지능형 자동화"])),
        KeywordGroup::new("Big Tech")
            .with_keyword(Keyword::new("OpenAI").with_synonyms(["오픈AI", "Open AI"]))
            .with_keyword(Keyword::new("Google").with_synonyms(["구글", "Google AI", "DeepMind"]))
            .with_keyword(Keyword::new("Meta").with_synonyms(["메타", "Meta AI", "Facebook AI"]))
            .with_keyword(Keyword::new("NVIDIA").with_synonyms(["엔비디아", "NVIDIA AI"]))
            .with_keyword(Keyword::new("Tesla").with_synonyms(["테슬라", "Tesla AI", "Tesla Bot"]))
            .with_keyword(Keyword::new("Microsoft").with_synonyms(["마이크로소프트", "MS", "Microsoft AI"]))
            .with_keyword(Keyword::new("Amazon").with_synonyms(["아마존", "Amazon AI", "AWS AI"]))
            .with_keyword(Keyword::new("Apple").with_synonyms(["애플", "Apple AI", "Apple Intelligence"])),
    ]
}
