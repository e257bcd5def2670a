//! Testing utilities including mock implementations.
//!
//! Useful for exercising pipeline logic without real network or model
//! calls. Mocks record their calls for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::ai::{AiResponse, CompletionClient, CompletionOpts, Provider};
use crate::error::{AiError, AiResult, FetchError, FetchResult};
use crate::fetch::{FetchedPage, PageFetcher};
use crate::notify::{DeliveryOutcome, Notifier};
use crate::types::{Content, ContentId};

/// A mock completion client with scripted responses.
pub struct MockCompletionClient {
    provider: Provider,
    available: bool,
    queue: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<Result<String, String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockCompletionClient {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            available: true,
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer with the same content.
    pub fn responding(mut self, content: impl Into<String>) -> Self {
        self.fallback = Some(Ok(content.into()));
        self
    }

    /// Answer with each content in turn; the last one repeats.
    pub fn responding_in_sequence(self, contents: Vec<String>) -> Self {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.extend(contents.into_iter().map(Ok));
        }
        self
    }

    /// Always fail with the given message.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fallback = Some(Err(message.into()));
        self
    }

    /// Report no credentials configured.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Handle to the recorded prompts.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, prompt: &str, opts: &CompletionOpts) -> AiResult<AiResponse> {
        self.calls.lock().unwrap().push(prompt.to_string());

        let scripted = {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        let outcome = scripted
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err("no scripted response".to_string()));

        match outcome {
            Ok(content) => Ok(AiResponse {
                content,
                provider: self.provider,
                model: opts.model.clone().unwrap_or_else(|| "mock".to_string()),
                usage: None,
            }),
            Err(message) => Err(AiError::Provider {
                provider: self.provider,
                message,
            }),
        }
    }
}

/// Scripted response for one URL in a [`MockFetcher`].
#[derive(Clone)]
enum MockPage {
    Body(String),
    Status(u16),
    /// Never resolves; for exercising timeouts and cancellation.
    Hang,
}

/// A mock page fetcher serving canned bodies by URL.
#[derive(Default)]
pub struct MockFetcher {
    pages: Mutex<HashMap<String, MockPage>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.into(), MockPage::Body(body.into()));
        self
    }

    /// Serve an HTTP error status for this URL.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.into(), MockPage::Status(status));
        self
    }

    /// Never complete fetches of this URL.
    pub fn with_hang(self, url: impl Into<String>) -> Self {
        self.pages.lock().unwrap().insert(url.into(), MockPage::Hang);
        self
    }

    /// Replace whatever is scripted for a URL.
    pub fn set_page(&self, url: impl Into<String>, body: impl Into<String>) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.into(), MockPage::Body(body.into()));
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(
        &self,
        url: &str,
        _headers: Option<&HashMap<String, String>>,
    ) -> FetchResult<FetchedPage> {
        self.calls.lock().unwrap().push(url.to_string());

        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some(MockPage::Body(body)) => Ok(FetchedPage {
                url: url.to_string(),
                body,
                status: 200,
                content_type: None,
            }),
            Some(MockPage::Status(status)) => Err(FetchError::Status {
                status,
                url: url.to_string(),
            }),
            Some(MockPage::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy)]
enum NotifyMode {
    Deliver,
    Error,
    /// One channel delivers, one reports failure.
    Partial,
}

/// A mock notifier recording which contents it was handed.
pub struct MockNotifier {
    mode: NotifyMode,
    calls: Arc<Mutex<Vec<ContentId>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            mode: NotifyMode::Deliver,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            mode: NotifyMode::Error,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn partially_failing() -> Self {
        Self {
            mode: NotifyMode::Partial,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<ContentId>>> {
        Arc::clone(&self.calls)
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, content: &Content) -> anyhow::Result<Vec<DeliveryOutcome>> {
        self.calls.lock().unwrap().push(content.id);
        match self.mode {
            NotifyMode::Deliver => Ok(vec![DeliveryOutcome::delivered("mock")]),
            NotifyMode::Error => anyhow::bail!("notification channel unavailable"),
            NotifyMode::Partial => Ok(vec![
                DeliveryOutcome::delivered("mock-a"),
                DeliveryOutcome::failed("mock-b", "rejected"),
            ]),
        }
    }
}
