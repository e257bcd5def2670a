//! Provider client implementations over the rig.rs vendor SDKs.
//!
//! Each client holds only its credentials and default model; the vendor
//! client and agent are built per call. All four apply the same jittered
//! retry policy on failed completions.

use std::future::Future;

use async_trait::async_trait;
use rig::completion::Prompt;
use rig::providers::{anthropic, gemini, openai, perplexity};
use tracing::warn;

use crate::error::{AiError, AiResult};
use crate::retry::full_jitter_delay;

use super::{AiResponse, CompletionClient, CompletionOpts, Provider};

const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Run a completion closure with bounded retries.
async fn complete_with_retry<F, Fut, E>(
    provider: Provider,
    max_attempts: u32,
    mut call: F,
) -> AiResult<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(content) => return Ok(content),
            Err(e) if attempt < max_attempts => {
                let delay = full_jitter_delay(attempt);
                warn!(
                    provider = %provider,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "completion failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(AiError::Provider {
                    provider,
                    message: e.to_string(),
                })
            }
        }
    }
}

fn require_key(key: &Option<String>, provider: Provider) -> AiResult<&str> {
    key.as_deref().ok_or(AiError::Provider {
        provider,
        message: "no API key configured".to_string(),
    })
}

/// OpenAI chat-completion client.
pub struct OpenAiClient {
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            api_key,
            model: model.into(),
            max_retries,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str, opts: &CompletionOpts) -> AiResult<AiResponse> {
        let key = require_key(&self.api_key, Provider::OpenAi)?;
        let model = opts.model.as_deref().unwrap_or(&self.model);
        let max_tokens = opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let content = complete_with_retry(Provider::OpenAi, self.max_retries, || async move {
            let client = openai::Client::new(key);
            let mut builder = client.agent(model).max_tokens(max_tokens);
            if let Some(temperature) = opts.temperature {
                builder = builder.temperature(temperature);
            }
            builder.build().prompt(prompt).await
        })
        .await?;

        Ok(AiResponse {
            content,
            provider: Provider::OpenAi,
            model: model.to_string(),
            usage: None,
        })
    }
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            api_key,
            model: model.into(),
            max_retries,
        }
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str, opts: &CompletionOpts) -> AiResult<AiResponse> {
        let key = require_key(&self.api_key, Provider::Anthropic)?;
        let model = opts.model.as_deref().unwrap_or(&self.model);
        // The Anthropic API requires max_tokens on every request.
        let max_tokens = opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let content = complete_with_retry(Provider::Anthropic, self.max_retries, || async move {
            let client = anthropic::ClientBuilder::new(key).build();
            let mut builder = client.agent(model).max_tokens(max_tokens);
            if let Some(temperature) = opts.temperature {
                builder = builder.temperature(temperature);
            }
            builder.build().prompt(prompt).await
        })
        .await?;

        Ok(AiResponse {
            content,
            provider: Provider::Anthropic,
            model: model.to_string(),
            usage: None,
        })
    }
}

/// Google Gemini client.
pub struct GeminiClient {
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            api_key,
            model: model.into(),
            max_retries,
        }
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str, opts: &CompletionOpts) -> AiResult<AiResponse> {
        let key = require_key(&self.api_key, Provider::Google)?;
        let model = opts.model.as_deref().unwrap_or(&self.model);
        let max_tokens = opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let content = complete_with_retry(Provider::Google, self.max_retries, || async move {
            let client = gemini::Client::new(key);
            let mut builder = client.agent(model).max_tokens(max_tokens);
            if let Some(temperature) = opts.temperature {
                builder = builder.temperature(temperature);
            }
            builder.build().prompt(prompt).await
        })
        .await?;

        Ok(AiResponse {
            content,
            provider: Provider::Google,
            model: model.to_string(),
            usage: None,
        })
    }
}

/// Perplexity client (online search models).
pub struct PerplexityClient {
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl PerplexityClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            api_key,
            model: model.into(),
            max_retries,
        }
    }
}

#[async_trait]
impl CompletionClient for PerplexityClient {
    fn provider(&self) -> Provider {
        Provider::Perplexity
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, prompt: &str, opts: &CompletionOpts) -> AiResult<AiResponse> {
        let key = require_key(&self.api_key, Provider::Perplexity)?;
        let model = opts.model.as_deref().unwrap_or(&self.model);
        let max_tokens = opts.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let content = complete_with_retry(Provider::Perplexity, self.max_retries, || async move {
            let client = perplexity::Client::new(key);
            let mut builder = client.agent(model).max_tokens(max_tokens);
            if let Some(temperature) = opts.temperature {
                builder = builder.temperature(temperature);
            }
            builder.build().prompt(prompt).await
        })
        .await?;

        Ok(AiResponse {
            content,
            provider: Provider::Perplexity,
            model: model.to_string(),
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_is_unavailable_and_fails_fast() {
        let client = OpenAiClient::new(None, "gpt-4o", 3);
        assert!(!client.is_available());

        let err = client
            .complete("hello", &CompletionOpts::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }

    #[tokio::test]
    async fn retry_helper_returns_last_error() {
        let mut calls = 0u32;
        let result: AiResult<String> = complete_with_retry(Provider::OpenAi, 1, || {
            calls += 1;
            async { Err::<String, _>("boom") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
