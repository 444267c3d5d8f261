// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! One HTTP round trip per call. Retries, backoff, and rate limiting are the
//! broker's job, so every failure is returned to the caller as-is.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tollgate_core::TollgateError;
use tracing::debug;

use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

/// Default endpoint for the Anthropic Messages API.
pub const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
pub const API_VERSION: &str = "2023-06-01";

/// HTTP client for Anthropic API communication.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    provider_name: String,
    timeout: Duration,
}

impl AnthropicClient {
    /// Creates a client that authenticates with `api_key`.
    ///
    /// `timeout` bounds the whole HTTP exchange.
    pub fn new(
        api_key: &SecretString,
        base_url: Option<String>,
        timeout: Duration,
        provider_name: impl Into<String>,
    ) -> Result<Self, TollgateError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| TollgateError::Config(format!("invalid API key header value: {e}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TollgateError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| API_BASE_URL.to_string()),
            provider_name: provider_name.into(),
            timeout,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Sends a non-streaming request and returns the full response.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, TollgateError> {
        let response = self
            .client
            .post(&self.base_url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(provider = %self.provider_name, status = %status, "completion response received");

        if status.is_success() {
            let body = response.text().await.map_err(|e| TollgateError::Provider {
                message: format!("failed to read response body: {e}"),
                source: Some(Box::new(e)),
            })?;
            return serde_json::from_str(&body).map_err(|e| TollgateError::Provider {
                message: format!("failed to parse API response: {e}"),
                source: Some(Box::new(e)),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TollgateError::RateLimited {
                provider: self.provider_name.clone(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => format!(
                "Anthropic API error ({}): {}",
                api_err.error.type_, api_err.error.message
            ),
            Err(_) => format!("API returned {status}: {body}"),
        };
        Err(TollgateError::Provider {
            message,
            source: None,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> TollgateError {
        if e.is_timeout() {
            return TollgateError::Timeout {
                duration: self.timeout,
            };
        }
        TollgateError::Provider {
            message: format!("HTTP request failed: {e}"),
            source: Some(Box::new(e)),
        }
    }
}
