//! Notification contract.
//!
//! Concrete transports (chat, email, webhooks) live outside this crate;
//! the coordinator only needs per-channel outcomes to decide the status
//! transition.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::types::Content;

/// Outcome of one delivery attempt on one channel.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub channel: String,
    pub delivered: bool,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            delivered: true,
            error: None,
        }
    }

    pub fn failed(channel: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            delivered: false,
            error: Some(error.into()),
        }
    }
}

/// Fan-out of one content item to whatever channels apply.
///
/// Zero applicable channels is a success: the item is considered handled.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, content: &Content) -> Result<Vec<DeliveryOutcome>>;
}

/// Default notifier that only logs. Useful for development and for
/// deployments that consume the store directly.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, content: &Content) -> Result<Vec<DeliveryOutcome>> {
        info!(
            content_id = %content.id,
            title = %content.title,
            importance = ?content.importance(),
            "notification (log only)"
        );
        Ok(vec![DeliveryOutcome::delivered("log")])
    }
}
