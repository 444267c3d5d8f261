// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks cross-references and ranges that serde attributes cannot express:
//! route targets, provider name uniqueness, currency codes, and non-negative prices.

use std::collections::HashSet;

use rust_decimal::Decimal;

use crate::diagnostic::ConfigError;
use crate::model::TollgateConfig;

/// Highest scale `rust_decimal` can represent.
const MAX_PRECISION: u32 = 28;

/// Longest cache TTL accepted: one year.
const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Validate a deserialized configuration.
///
/// Collects every problem instead of failing fast.
pub fn validate_config(config: &TollgateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.broker.max_prompt_chars == 0 {
        fail("broker.max_prompt_chars must be at least 1".to_string());
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        fail("cache.ttl_secs must be greater than 0 when the cache is enabled".to_string());
    }
    if config.cache.ttl_secs > MAX_CACHE_TTL_SECS {
        fail(format!(
            "cache.ttl_secs must be at most {MAX_CACHE_TTL_SECS}, got {}",
            config.cache.ttl_secs
        ));
    }

    if !is_currency_code(&config.wallet.default_currency) {
        fail(format!(
            "wallet.default_currency `{}` is not a 3-letter uppercase currency code",
            config.wallet.default_currency
        ));
    }

    if config.wallet.default_low_balance_threshold < Decimal::ZERO {
        fail(format!(
            "wallet.default_low_balance_threshold must be non-negative, got {}",
            config.wallet.default_low_balance_threshold
        ));
    }

    if config.cost.default_precision > MAX_PRECISION {
        fail(format!(
            "cost.default_precision must be at most {MAX_PRECISION}, got {}",
            config.cost.default_precision
        ));
    }
    for (currency, precision) in &config.cost.currency_precision {
        if *precision > MAX_PRECISION {
            fail(format!(
                "cost.currency_precision.{currency} must be at most {MAX_PRECISION}, got {precision}"
            ));
        }
    }

    let mut seen_names = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        if provider.name.trim().is_empty() {
            fail(format!("providers[{i}].name must not be empty"));
        } else if !seen_names.insert(provider.name.as_str()) {
            fail(format!(
                "duplicate provider name `{}` in [[providers]] array",
                provider.name
            ));
        }

        if provider.default_model.trim().is_empty() {
            fail(format!("providers[{i}].default_model must not be empty"));
        }

        if !is_currency_code(&provider.currency) {
            fail(format!(
                "providers[{i}].currency `{}` is not a 3-letter uppercase currency code",
                provider.currency
            ));
        }

        if provider.max_tokens_per_request == 0 {
            fail(format!("providers[{i}].max_tokens_per_request must be at least 1"));
        }

        if !(0.0..=provider.max_temperature).contains(&provider.default_temperature) {
            fail(format!(
                "providers[{i}].default_temperature {} is outside 0..={}",
                provider.default_temperature, provider.max_temperature
            ));
        }

        if provider.timeout_secs == 0 {
            fail(format!("providers[{i}].timeout_secs must be at least 1"));
        }

        for model in &provider.models {
            let prices = [
                ("input_price_per_token", model.input_price_per_token),
                ("output_price_per_token", model.output_price_per_token),
            ];
            for (field, price) in prices {
                if let Some(price) = price
                    && price < Decimal::ZERO
                {
                    fail(format!(
                        "providers[{i}] model `{}` {field} must be non-negative, got {price}",
                        model.name
                    ));
                }
            }
        }
    }

    if let Some(default) = &config.broker.default_provider
        && config.provider(default).is_none()
    {
        fail(format!(
            "broker.default_provider `{default}` does not match any [[providers]] entry"
        ));
    }

    for (usage_type, route) in &config.routing.routes {
        match config.provider(&route.provider) {
            None => fail(format!(
                "routing.routes.{usage_type} targets unknown provider `{}`",
                route.provider
            )),
            Some(provider) => {
                if let Some(model) = &route.model
                    && !provider.serves(model)
                {
                    fail(format!(
                        "routing.routes.{usage_type} model `{model}` is not served by provider `{}`",
                        provider.name
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}
