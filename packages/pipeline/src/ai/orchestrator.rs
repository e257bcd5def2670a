//! Task-routed model calls with graceful degradation.
//!
//! Provider clients handle transient vendor issues with their own retries;
//! the orchestrator handles hard failures and capability gaps by falling
//! back across providers in task order. The two policies compose without
//! coordination.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{AiError, AiResult};

use super::{
    task_provider_order, AiResponse, AnthropicClient, CompletionClient, CompletionOpts,
    GeminiClient, OpenAiClient, PerplexityClient, Provider, TaskKind,
};

/// Placeholder substituted with the previous step's content in a
/// collaboration pipeline template.
pub const PREVIOUS_RESPONSE: &str = "{previous_response}";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Routes completion requests to providers by task kind, with fallback.
pub struct Orchestrator {
    clients: Vec<Arc<dyn CompletionClient>>,
    default_timeout: Duration,
    preferred_provider: Option<Provider>,
}

impl Orchestrator {
    /// Build the standard four-vendor setup from settings. Clients are
    /// registered regardless of credentials; unconfigured ones just
    /// report unavailable.
    pub fn from_settings(settings: &Settings) -> Self {
        let retries = settings.ai_max_retries;
        let clients: Vec<Arc<dyn CompletionClient>> = vec![
            Arc::new(OpenAiClient::new(
                settings.openai_api_key.clone(),
                settings.openai_model.clone(),
                retries,
            )),
            Arc::new(AnthropicClient::new(
                settings.anthropic_api_key.clone(),
                settings.anthropic_model.clone(),
                retries,
            )),
            Arc::new(GeminiClient::new(
                settings.google_api_key.clone(),
                settings.google_model.clone(),
                retries,
            )),
            Arc::new(PerplexityClient::new(
                settings.perplexity_api_key.clone(),
                settings.perplexity_model.clone(),
                retries,
            )),
        ];
        Self {
            clients,
            default_timeout: Duration::from_secs(settings.ai_request_timeout_secs),
            preferred_provider: settings.preferred_provider,
        }
    }

    /// Build from explicit clients (tests, custom setups).
    pub fn with_clients(clients: Vec<Arc<dyn CompletionClient>>) -> Self {
        Self {
            clients,
            default_timeout: DEFAULT_TIMEOUT,
            preferred_provider: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_preferred_provider(mut self, provider: Option<Provider>) -> Self {
        self.preferred_provider = provider;
        self
    }

    fn client_for(&self, provider: Provider) -> Option<&Arc<dyn CompletionClient>> {
        self.clients.iter().find(|c| c.provider() == provider)
    }

    /// Providers with credentials configured, in registration order.
    pub fn available_providers(&self) -> Vec<Provider> {
        self.clients
            .iter()
            .filter(|c| c.is_available())
            .map(|c| c.provider())
            .collect()
    }

    /// The task's preference order filtered down to available providers.
    pub fn providers_for_task(&self, task: TaskKind) -> Vec<Provider> {
        task_provider_order(task)
            .iter()
            .copied()
            .filter(|p| self.client_for(*p).is_some_and(|c| c.is_available()))
            .collect()
    }

    /// Send a request with automatic fallback across the task's providers.
    pub async fn request(
        &self,
        prompt: &str,
        task: TaskKind,
        preferred: Option<Provider>,
        timeout: Option<Duration>,
        opts: &CompletionOpts,
    ) -> AiResult<AiResponse> {
        let timeout = timeout.unwrap_or(self.default_timeout);

        let preferred = preferred.or(self.preferred_provider);
        let providers = match preferred {
            Some(p) if self.client_for(p).is_some_and(|c| c.is_available()) => vec![p],
            _ => self.providers_for_task(task),
        };

        if providers.is_empty() {
            return Err(AiError::NoProviderAvailable);
        }

        let mut last_error: Option<AiError> = None;

        for provider in providers {
            let client = self
                .client_for(provider)
                .expect("provider filtered from registered clients");

            info!(provider = %provider, task = task.as_str(), "ai request starting");

            match tokio::time::timeout(timeout, client.complete(prompt, opts)).await {
                Ok(Ok(response)) => {
                    info!(provider = %provider, model = %response.model, "ai request succeeded");
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    warn!(provider = %provider, error = %e, "ai request failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(provider = %provider, timeout_secs = timeout.as_secs(), "ai request timed out");
                    last_error = Some(AiError::Timeout { provider });
                }
            }
        }

        Err(AiError::AllProvidersFailed {
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Send the same prompt to several providers at once. Failures are
    /// logged and dropped, not surfaced.
    pub async fn request_parallel(
        &self,
        prompt: &str,
        providers: Option<&[Provider]>,
        timeout: Option<Duration>,
        opts: &CompletionOpts,
    ) -> Vec<AiResponse> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let chosen: Vec<Provider> = match providers {
            Some(list) => list.to_vec(),
            None => self.available_providers(),
        };

        let futures = chosen.into_iter().filter_map(|provider| {
            let client = self.client_for(provider)?;
            if !client.is_available() {
                return None;
            }
            let client = Arc::clone(client);
            Some(async move {
                (
                    provider,
                    tokio::time::timeout(timeout, client.complete(prompt, opts)).await,
                )
            })
        });

        let mut responses = Vec::new();
        for (provider, outcome) in join_all(futures).await {
            match outcome {
                Ok(Ok(response)) => responses.push(response),
                Ok(Err(e)) => warn!(provider = %provider, error = %e, "parallel request failed"),
                Err(_) => warn!(provider = %provider, "parallel request timed out"),
            }
        }
        responses
    }

    /// Run a multi-step pipeline where each step's template is formatted
    /// with the previous step's content and routed by its own task kind.
    pub async fn collaborate(
        &self,
        initial_prompt: &str,
        steps: &[(TaskKind, String)],
        opts: &CompletionOpts,
    ) -> AiResult<Vec<AiResponse>> {
        let mut responses = Vec::with_capacity(steps.len());
        let mut current_input = initial_prompt.to_string();

        for (task, template) in steps {
            let prompt = template.replace(PREVIOUS_RESPONSE, &current_input);
            let response = self.request(&prompt, *task, None, None, opts).await?;
            current_input = response.content.clone();
            responses.push(response);
        }

        Ok(responses)
    }
}
