//! Process-wide settings, loaded once at startup from the environment.
//!
//! Absent provider keys are not an error; those providers are simply
//! unavailable. The settings bag is treated as immutable after load.

use std::env;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::ai::Provider;

/// Application settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    // Storage / broker
    pub database_url: String,
    pub broker_url: Option<String>,

    // Provider credentials (any subset may be absent)
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,

    // Per-provider default models
    pub openai_model: String,
    pub anthropic_model: String,
    pub google_model: String,
    pub perplexity_model: String,

    /// Overrides task routing when set and the provider is available.
    pub preferred_provider: Option<Provider>,

    // Model-call policy
    pub ai_request_timeout_secs: u64,
    pub ai_max_retries: u32,

    // Crawler policy
    pub crawler_default_timeout_secs: u64,
    pub crawler_max_retries: u32,

    // Scheduling
    pub scheduler_timezone: String,
    pub worker_count: usize,
    pub rate_limit_requests_per_minute: u32,
}

impl Settings {
    /// Load configuration from environment variables (and `.env` when present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            broker_url: env::var("BROKER_URL").ok(),

            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            google_api_key: env::var("GOOGLE_API_KEY").ok(),
            perplexity_api_key: env::var("PERPLEXITY_API_KEY").ok(),

            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            anthropic_model: env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            google_model: env::var("GOOGLE_MODEL").unwrap_or_else(|_| "gemini-1.5-pro".to_string()),
            perplexity_model: env::var("PERPLEXITY_MODEL")
                .unwrap_or_else(|_| "llama-3.1-sonar-large-128k-online".to_string()),

            preferred_provider: env::var("PREFERRED_AI_PROVIDER")
                .ok()
                .as_deref()
                .and_then(Provider::parse),

            ai_request_timeout_secs: env_u64("AI_REQUEST_TIMEOUT", 60)?,
            ai_max_retries: env_u32("AI_MAX_RETRIES", 3)?,

            crawler_default_timeout_secs: env_u64("CRAWLER_DEFAULT_TIMEOUT", 30)?,
            crawler_max_retries: env_u32("CRAWLER_MAX_RETRIES", 3)?,

            scheduler_timezone: env::var("SCHEDULER_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            worker_count: env_u64("WORKER_COUNT", 4)? as usize,
            rate_limit_requests_per_minute: env_u32("RATE_LIMIT_REQUESTS_PER_MINUTE", 60)?,
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{} must be a number", key)),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{} must be a number", key)),
        Err(_) => Ok(default),
    }
}
