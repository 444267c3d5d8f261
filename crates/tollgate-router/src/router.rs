// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider and model selection.
//!
//! Priority order: explicit model > routing table entry for the usage type >
//! default provider's default model.

use std::collections::BTreeMap;

use tollgate_config::model::RouteConfig;
use tollgate_config::{ProviderConfig, TollgateConfig};
use tollgate_core::{TollgateError, UsageType};
use tracing::debug;

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Provider name, as configured under `[[providers]]`.
    pub provider: String,
    pub model: String,
    /// Human-readable reason for the routing decision.
    pub reason: &'static str,
}

/// Resolves requests to a configured provider and model.
#[derive(Debug, Clone)]
pub struct ProviderRouter {
    providers: Vec<ProviderConfig>,
    routes: BTreeMap<UsageType, RouteConfig>,
    default_provider: String,
}

impl ProviderRouter {
    /// Build a router from a validated configuration.
    ///
    /// Fails if no providers are configured or the default provider is unknown.
    pub fn new(config: &TollgateConfig) -> Result<Self, TollgateError> {
        let first = config
            .providers
            .first()
            .ok_or_else(|| TollgateError::Config("no providers configured".to_string()))?;

        let default_provider = match &config.broker.default_provider {
            Some(name) if config.provider(name).is_none() => {
                return Err(TollgateError::Config(format!(
                    "default provider `{name}` is not configured"
                )));
            }
            Some(name) => name.clone(),
            None => first.name.clone(),
        };

        Ok(Self {
            providers: config.providers.clone(),
            routes: config.routing.routes.clone(),
            default_provider,
        })
    }

    /// Provider configuration by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Resolve the provider and model for a request.
    pub fn resolve(
        &self,
        usage_type: UsageType,
        explicit_model: Option<&str>,
    ) -> Result<RouteTarget, TollgateError> {
        let target = match explicit_model.map(str::trim) {
            Some(model) if !model.is_empty() => {
                let provider = self
                    .providers
                    .iter()
                    .find(|p| p.serves(model))
                    .ok_or_else(|| {
                        TollgateError::Validation(format!("unknown model `{model}`"))
                    })?;
                RouteTarget {
                    provider: provider.name.clone(),
                    model: model.to_string(),
                    reason: "explicit model",
                }
            }
            _ => match self.routes.get(&usage_type) {
                Some(route) => {
                    let provider = self.provider(&route.provider).ok_or_else(|| {
                        TollgateError::Config(format!(
                            "route for {usage_type} targets unknown provider `{}`",
                            route.provider
                        ))
                    })?;
                    RouteTarget {
                        provider: provider.name.clone(),
                        model: route
                            .model
                            .clone()
                            .unwrap_or_else(|| provider.default_model.clone()),
                        reason: "usage type route",
                    }
                }
                None => {
                    let provider = self.provider(&self.default_provider).ok_or_else(|| {
                        TollgateError::Config(format!(
                            "default provider `{}` is not configured",
                            self.default_provider
                        ))
                    })?;
                    RouteTarget {
                        provider: provider.name.clone(),
                        model: provider.default_model.clone(),
                        reason: "default provider",
                    }
                }
            },
        };

        debug!(
            usage_type = %usage_type,
            provider = %target.provider,
            model = %target.model,
            reason = target.reason,
            "routing decision"
        );
        Ok(target)
    }
}
