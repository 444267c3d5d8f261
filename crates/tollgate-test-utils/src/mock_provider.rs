// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with queued replies, optional
//! latency, and call counting, so broker tests run without external APIs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use tollgate_core::traits::adapter::PluginAdapter;
use tollgate_core::traits::provider::ProviderAdapter;
use tollgate_core::types::{
    AdapterType, GenerateRequest, GenerateResponse, HealthStatus, TokenUsage,
};
use tollgate_core::TollgateError;

/// Usage reported by replies that do not set their own: 10 in, 20 out.
pub const DEFAULT_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 20,
};

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text { text: String, usage: TokenUsage },
    /// Retryable provider failure.
    Error(String),
    /// HTTP 429 equivalent.
    RateLimited,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            usage: DEFAULT_USAGE,
        }
    }

    pub fn with_usage(text: impl Into<String>, input_tokens: u32, output_tokens: u32) -> Self {
        Self::Text {
            text: text.into(),
            usage: TokenUsage {
                input_tokens,
                output_tokens,
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// A mock provider that replays scripted replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty, a default
/// "mock response" with [`DEFAULT_USAGE`] is returned.
pub struct MockProvider {
    name: String,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<GenerateRequest>>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Pre-load the reply queue.
    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        self
    }

    /// Sleep this long before every reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn push_reply(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of `generate` calls so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order.
    pub async fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::text("mock response"))
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, TollgateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TollgateError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, TollgateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.next_reply().await {
            MockReply::Text { text, usage } => Ok(GenerateResponse {
                text,
                model: request.model,
                usage,
            }),
            MockReply::Error(message) => Err(TollgateError::Provider {
                message,
                source: None,
            }),
            MockReply::RateLimited => Err(TollgateError::RateLimited {
                provider: self.name.clone(),
            }),
        }
    }
}
