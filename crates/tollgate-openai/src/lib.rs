// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI provider adapter for the Tollgate broker.
//!
//! Speaks the Chat Completions API, so any OpenAI-compatible server can be
//! configured through `base_url`.

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

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// OpenAI provider implementing [`ProviderAdapter`].
pub struct OpenAiProvider {
    name: String,
    client: OpenAiClient,
}

impl OpenAiProvider {
    /// Creates a provider from its `[[providers]]` entry.
    ///
    /// API key resolution order: provider config -> `OPENAI_API_KEY` -> error.
    pub fn new(config: &ProviderConfig) -> Result<Self, TollgateError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = OpenAiClient::new(
            &api_key,
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.name.clone(),
        )?;
        info!(
            provider = %config.name,
            model = %config.default_model,
            endpoint = client.endpoint(),
            "OpenAI provider initialized"
        );
        Ok(Self {
            name: config.name.clone(),
            client,
        })
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
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
        debug!(provider = %self.name, "OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, TollgateError> {
        let chat_request = ChatRequest {
            model: request.model,
            messages: vec![ChatMessage::user(request.prompt)],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };
        let response = self.client.chat(&chat_request).await?;

        let usage = response.usage.ok_or_else(|| TollgateError::Provider {
            message: "response did not report token usage".to_string(),
            source: None,
        })?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TollgateError::Provider {
                message: "response contained no choices".to_string(),
                source: None,
            })?;

        debug!(
            provider = %self.name,
            id = %response.id,
            finish_reason = ?choice.finish_reason,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "OpenAI completion finished"
        );

        Ok(GenerateResponse {
            text: choice.message.content.unwrap_or_default(),
            model: response.model,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

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
                "OpenAI API key not found. Set api_key on the provider or the {API_KEY_ENV} environment variable."
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_for(server: &MockServer) -> OpenAiProvider {
        let mut config: ProviderConfig = toml::from_str(
            r#"
name = "openai"
kind = "openai"
default_model = "gpt-4o-mini"
api_key = "sk-test"
"#,
        )
        .unwrap();
        config.base_url = Some(server.uri());
        OpenAiProvider::new(&config).unwrap()
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gpt-4o-mini".into(),
            prompt: "Translate 'hello' into Spanish".into(),
            max_tokens: 50,
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn generate_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 50,
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-42",
                "model": "gpt-4o-mini",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hola"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 120, "completion_tokens": 80, "total_tokens": 200}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider_for(&server).await.generate(request()).await.unwrap();
        assert_eq!(response.text, "Hola");
        assert_eq!(response.usage.input_tokens, 120);
        assert_eq!(response.usage.output_tokens, 80);
    }

    #[tokio::test]
    async fn missing_usage_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "choices": [{"message": {"role": "assistant", "content": "Hola"}}]
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).await.generate(request()).await.unwrap_err();
        assert!(err.to_string().contains("token usage"), "got: {err}");
    }

    #[tokio::test]
    async fn empty_choices_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "choices": [],
                "usage": {"prompt_tokens": 1, "completion_tokens": 0}
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).await.generate(request()).await.unwrap_err();
        assert!(matches!(err, TollgateError::Provider { .. }));
    }

    #[test]
    fn config_key_wins_over_env() {
        use secrecy::ExposeSecret;
        let key = resolve_api_key(Some("sk-config")).unwrap();
        assert_eq!(key.expose_secret(), "sk-config");
    }
}
