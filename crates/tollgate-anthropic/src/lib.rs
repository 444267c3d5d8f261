// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic provider adapter for the Tollgate broker.
//!
//! This crate implements [`ProviderAdapter`] for the Anthropic Messages API
//! as a single-shot, non-streaming completion.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tollgate_config::ProviderConfig;
use tollgate_core::{
    AdapterType, GenerateRequest, GenerateResponse, HealthStatus, PluginAdapter, ProviderAdapter,
    TokenUsage, TollgateError,
};
use tracing::{debug, info};

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

/// Environment variable consulted when the provider entry has no `api_key`.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Anthropic provider implementing [`ProviderAdapter`].
///
/// API key resolution order: provider config -> `ANTHROPIC_API_KEY` -> error.
pub struct AnthropicProvider {
    name: String,
    client: AnthropicClient,
}

impl AnthropicProvider {
    /// Creates a provider from its `[[providers]]` entry.
    pub fn new(config: &ProviderConfig) -> Result<Self, TollgateError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = AnthropicClient::new(
            &api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.name.clone(),
        )?;

        info!(
            provider = %config.name,
            model = %config.default_model,
            "Anthropic provider initialized"
        );

        Ok(Self {
            name: config.name.clone(),
            client,
        })
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
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
        // Probing the API would spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TollgateError> {
        debug!(provider = %self.name, "Anthropic provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, TollgateError> {
        let api_request = MessageRequest {
            model: request.model,
            messages: vec![ApiMessage::user(request.prompt)],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let response = self.client.complete_message(&api_request).await?;

        debug!(
            provider = %self.name,
            id = %response.id,
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Anthropic completion finished"
        );

        Ok(GenerateResponse {
            text: response.text(),
            model: response.model,
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }
}

/// Resolves the API key: non-empty config value, else the environment.
fn resolve_api_key(config_key: Option<&str>) -> Result<SecretString, TollgateError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(SecretString::from(key.to_string()));
    }

    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.is_empty())
        .map(SecretString::from)
        .ok_or_else(|| {
            TollgateError::Config(format!(
                "Anthropic API key not found. Set api_key on the provider or the {API_KEY_ENV} environment variable."
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_config(base_url: &str) -> ProviderConfig {
        let mut config: ProviderConfig = toml::from_str(
            r#"
name = "claude"
kind = "anthropic"
default_model = "claude-haiku-4-5"
api_key = "sk-ant-test"
timeout_secs = 5
"#,
        )
        .unwrap();
        config.base_url = Some(base_url.to_string());
        config
    }

    #[test]
    fn api_key_from_config_wins() {
        let key = resolve_api_key(Some("sk-test-123")).unwrap();
        assert_eq!(key.expose_secret(), "sk-test-123");
    }

    #[test]
    fn empty_config_key_falls_back_to_env() {
        // Succeeds only if the environment provides a key, never with "".
        if let Ok(key) = resolve_api_key(Some("")) {
            assert!(!key.expose_secret().is_empty());
        }
    }

    #[test]
    fn missing_key_error_names_env_var() {
        if let Err(err) = resolve_api_key(None) {
            assert!(err.to_string().contains(API_KEY_ENV), "got: {err}");
        }
    }

    #[test]
    fn adapter_metadata() {
        let provider = AnthropicProvider::new(&provider_config("http://localhost:1")).unwrap();
        assert_eq!(provider.name(), "claude");
        assert_eq!(provider.adapter_type(), AdapterType::Provider);
    }

    #[tokio::test]
    async fn generate_maps_request_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "model": "claude-haiku-4-5",
                "max_tokens": 300,
                "messages": [{"role": "user", "content": "Summarize: hello world"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "A greeting."}],
                "model": "claude-haiku-4-5-20251001",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 120, "output_tokens": 80}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(&provider_config(&server.uri())).unwrap();
        let response = provider
            .generate(GenerateRequest {
                model: "claude-haiku-4-5".into(),
                prompt: "Summarize: hello world".into(),
                max_tokens: 300,
                temperature: 0.0,
            })
            .await
            .unwrap();

        assert_eq!(response.text, "A greeting.");
        assert_eq!(response.model, "claude-haiku-4-5-20251001");
        assert_eq!(
            response.usage,
            TokenUsage {
                input_tokens: 120,
                output_tokens: 80
            }
        );
    }

    #[tokio::test]
    async fn generate_propagates_provider_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new(&provider_config(&server.uri())).unwrap();
        let err = provider
            .generate(GenerateRequest {
                model: "claude-haiku-4-5".into(),
                prompt: "hi".into(),
                max_tokens: 10,
                temperature: 0.7,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::Provider { ref message, .. } if message.contains("500")));
    }
}
