//! Model-inference layer: uniform provider clients and the task-routing
//! orchestrator that falls back across them.

mod orchestrator;
mod providers;

pub use orchestrator::Orchestrator;
pub use providers::{AnthropicClient, GeminiClient, OpenAiClient, PerplexityClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AiResult;

/// The model-inference vendors this pipeline can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Perplexity,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Perplexity => "perplexity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "google" => Some(Provider::Google),
            "perplexity" => Some(Provider::Perplexity),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstract label for a model call, mapped to a preferred provider order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Search,
    Summarize,
    Analyze,
    Classify,
    Extract,
    GenerateCode,
    Multimodal,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Search => "search",
            TaskKind::Summarize => "summarize",
            TaskKind::Analyze => "analyze",
            TaskKind::Classify => "classify",
            TaskKind::Extract => "extract",
            TaskKind::GenerateCode => "generate_code",
            TaskKind::Multimodal => "multimodal",
        }
    }
}

/// Ordered provider preference per task. This is routing data; the
/// orchestrator filters it down to providers that are actually configured.
pub fn task_provider_order(task: TaskKind) -> &'static [Provider] {
    use Provider::*;
    match task {
        TaskKind::Search => &[Perplexity, OpenAi],
        TaskKind::Summarize => &[OpenAi, Anthropic, Google],
        TaskKind::Analyze => &[Anthropic, OpenAi, Google],
        TaskKind::Classify => &[OpenAi, Anthropic, Google],
        TaskKind::Extract => &[Anthropic, OpenAi, Google],
        TaskKind::GenerateCode => &[Anthropic, OpenAi],
        TaskKind::Multimodal => &[Google, OpenAi],
    }
}

/// Per-call options passed through to the provider client.
#[derive(Debug, Clone, Default)]
pub struct CompletionOpts {
    /// Override the provider's configured model.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

/// Token accounting, when the vendor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Response from a completion call.
#[derive(Debug, Clone)]
pub struct AiResponse {
    pub content: String,
    pub provider: Provider,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Uniform surface over one model-inference vendor.
///
/// Implementations construct their vendor client lazily per call; nothing
/// touches the network at registration time. Transient vendor errors are
/// retried inside the client with the shared backoff policy.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// True iff credentials are configured.
    fn is_available(&self) -> bool;

    async fn complete(&self, prompt: &str, opts: &CompletionOpts) -> AiResult<AiResponse>;
}
