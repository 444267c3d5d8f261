// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter registry.

use std::collections::HashMap;
use std::sync::Arc;

use tollgate_anthropic::AnthropicProvider;
use tollgate_config::{ProviderConfig, ProviderKind};
use tollgate_core::{ProviderAdapter, TollgateError};
use tollgate_openai::OpenAiProvider;
use tracing::info;

/// Adapters keyed by configured provider name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP adapters for every `anthropic` and `openai` entry.
    ///
    /// `mock` entries have no built-in adapter; register one with
    /// [`ProviderRegistry::register`] before constructing the broker.
    pub fn from_config(providers: &[ProviderConfig]) -> Result<Self, TollgateError> {
        let mut registry = Self::new();
        for provider in providers {
            let adapter: Arc<dyn ProviderAdapter> = match provider.kind {
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(provider)?),
                ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(provider)?),
                ProviderKind::Mock => continue,
            };
            registry.register(&provider.name, adapter);
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        let name = name.into();
        info!(provider = %name, adapter = adapter.name(), "provider adapter registered");
        self.adapters.insert(name, adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Fails naming the first configured provider without an adapter.
    pub fn ensure_complete(&self, providers: &[ProviderConfig]) -> Result<(), TollgateError> {
        match providers.iter().find(|p| !self.adapters.contains_key(&p.name)) {
            Some(missing) => Err(TollgateError::Config(format!(
                "no adapter registered for provider `{}` ({:?})",
                missing.name, missing.kind
            ))),
            None => Ok(()),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_entries_need_registration() {
        let config: Vec<ProviderConfig> = serde_json::from_value(serde_json::json!([
            {"name": "fake", "kind": "mock", "default_model": "mock-1"}
        ]))
        .unwrap();
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(registry.get("fake").is_none());
        let err = registry.ensure_complete(&config).unwrap_err();
        assert!(err.to_string().contains("fake"));
    }

    #[test]
    fn http_entries_get_adapters() {
        let config: Vec<ProviderConfig> = serde_json::from_value(serde_json::json!([
            {"name": "claude", "kind": "anthropic", "default_model": "claude-haiku-4-5", "api_key": "k1"},
            {"name": "gpt", "kind": "openai", "default_model": "gpt-4o-mini", "api_key": "k2"}
        ]))
        .unwrap();
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.get("claude").unwrap().name(), "claude");
        assert_eq!(registry.get("gpt").unwrap().name(), "gpt");
        registry.ensure_complete(&config).unwrap();
    }
}
