// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI Chat Completions API and compatible servers.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tollgate_core::TollgateError;
use tracing::debug;

use crate::types::{ApiErrorResponse, ChatRequest, ChatResponse};

/// Default API root. `/chat/completions` is appended.
pub const API_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    provider_name: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        api_key: &SecretString,
        base_url: Option<String>,
        timeout: Duration,
        provider_name: impl Into<String>,
    ) -> Result<Self, TollgateError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|e| TollgateError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TollgateError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        let root = base_url.unwrap_or_else(|| API_BASE_URL.to_string());
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", root.trim_end_matches('/')),
            provider_name: provider_name.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One chat completion round trip.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, TollgateError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TollgateError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    TollgateError::Provider {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        debug!(provider = %self.provider_name, status = %status, "chat completion response received");

        if status.is_success() {
            return response
                .json::<ChatResponse>()
                .await
                .map_err(|e| TollgateError::Provider {
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
            Ok(api_err) => match api_err.error.type_ {
                Some(kind) => format!("OpenAI API error ({kind}): {}", api_err.error.message),
                None => format!("OpenAI API error: {}", api_err.error.message),
            },
            Err(_) => format!("API returned {status}: {body}"),
        };
        Err(TollgateError::Provider {
            message,
            source: None,
        })
    }
}
