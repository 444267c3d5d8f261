// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model pricing lookup and cost calculation.
//!
//! Prices come from the `[[providers.models]]` tables and are exact decimals
//! per token. Costs are rounded half away from zero to the currency's
//! configured precision.

use rust_decimal::{Decimal, RoundingStrategy};
use tollgate_config::model::{CostConfig, ProviderConfig};
use tollgate_core::{TokenUsage, TollgateError};

/// Rough characters-per-token ratio used for preflight estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Resolved per-token prices for one provider model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPricing {
    pub provider: String,
    pub model: String,
    pub input_per_token: Decimal,
    pub output_per_token: Decimal,
    pub currency: String,
}

/// Look up pricing for `model` on `provider`.
///
/// A model missing from the table, or listed without one of its prices, takes
/// that price from the provider's default model. If the default model has no
/// price either the provider is misconfigured.
pub fn get_pricing(provider: &ProviderConfig, model: &str) -> Result<ModelPricing, TollgateError> {
    let entry = provider.model(model);
    let fallback = provider.model(&provider.default_model);

    let resolve = |field: &str,
                   pick: fn(&tollgate_config::ModelPricingConfig) -> Option<Decimal>|
     -> Result<Decimal, TollgateError> {
        entry
            .and_then(pick)
            .or_else(|| fallback.and_then(pick))
            .ok_or_else(|| {
                TollgateError::Config(format!(
                    "no {field} price for model `{model}` or default model `{}` on provider `{}`",
                    provider.default_model, provider.name
                ))
            })
    };

    Ok(ModelPricing {
        provider: provider.name.clone(),
        model: model.to_string(),
        input_per_token: resolve("input", |m| m.input_price_per_token)?,
        output_per_token: resolve("output", |m| m.output_price_per_token)?,
        currency: provider.currency.clone(),
    })
}

/// Cost of `usage` at `pricing`, rounded to `precision` decimal places.
///
/// Formula: `input_tokens * input_price + output_tokens * output_price`.
pub fn calculate_cost(usage: &TokenUsage, pricing: &ModelPricing, precision: u32) -> Decimal {
    let input = Decimal::from(usage.input_tokens) * pricing.input_per_token;
    let output = Decimal::from(usage.output_tokens) * pricing.output_per_token;
    round_amount(input + output, precision)
}

/// Estimated input tokens for a prompt: `ceil(chars / 4)`.
pub fn estimate_input_tokens(prompt: &str) -> u32 {
    let chars = prompt.chars().count();
    u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}

/// Worst-case cost of a request before it is sent: the estimated input plus
/// every output token the request is allowed to produce.
pub fn estimate_cost(
    prompt: &str,
    max_tokens: u32,
    pricing: &ModelPricing,
    precision: u32,
) -> Decimal {
    let usage = TokenUsage {
        input_tokens: estimate_input_tokens(prompt),
        output_tokens: max_tokens,
    };
    calculate_cost(&usage, pricing, precision)
}

/// Round half away from zero to `precision` places.
pub fn round_amount(amount: Decimal, precision: u32) -> Decimal {
    amount.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
}

/// Cost calculator bound to the `[cost]` rounding settings.
#[derive(Debug, Clone, Default)]
pub struct CostCalculator {
    config: CostConfig,
}

impl CostCalculator {
    pub fn new(config: CostConfig) -> Self {
        Self { config }
    }

    pub fn precision_for(&self, currency: &str) -> u32 {
        self.config.precision_for(currency)
    }

    /// Billed cost of a completed call.
    pub fn calculate(
        &self,
        provider: &ProviderConfig,
        model: &str,
        usage: &TokenUsage,
    ) -> Result<(Decimal, ModelPricing), TollgateError> {
        let pricing = get_pricing(provider, model)?;
        let cost = calculate_cost(usage, &pricing, self.precision_for(&pricing.currency));
        Ok((cost, pricing))
    }

    /// Worst-case preflight cost of a call that has not been made yet.
    pub fn estimate(
        &self,
        provider: &ProviderConfig,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Decimal, TollgateError> {
        let pricing = get_pricing(provider, model)?;
        Ok(estimate_cost(
            prompt,
            max_tokens,
            &pricing,
            self.precision_for(&pricing.currency),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn provider() -> ProviderConfig {
        toml::from_str(
            r#"
name = "openai"
kind = "openai"
default_model = "gpt-4o-mini"
currency = "USD"

[[models]]
name = "gpt-4o-mini"
input_price_per_token = "0.00001"
output_price_per_token = "0.00003"

[[models]]
name = "gpt-4o"
input_price_per_token = "0.0000025"

[[models]]
name = "unpriced"
"#,
        )
        .unwrap()
    }

    #[test]
    fn scenario_cost_is_exact() {
        // 120 input tokens at 0.00001 plus 80 output at 0.00003.
        let pricing = get_pricing(&provider(), "gpt-4o-mini").unwrap();
        let usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 80,
        };
        assert_eq!(calculate_cost(&usage, &pricing, 6), dec!(0.003600));
    }

    #[test]
    fn missing_field_falls_back_to_default_model() {
        let pricing = get_pricing(&provider(), "gpt-4o").unwrap();
        assert_eq!(pricing.input_per_token, dec!(0.0000025));
        assert_eq!(pricing.output_per_token, dec!(0.00003));
    }

    #[test]
    fn unlisted_model_uses_default_model_prices() {
        let pricing = get_pricing(&provider(), "something-new").unwrap();
        assert_eq!(pricing.input_per_token, dec!(0.00001));
        assert_eq!(pricing.model, "something-new");
    }

    #[test]
    fn no_price_anywhere_is_config_error() {
        let mut p = provider();
        p.models.clear();
        let err = get_pricing(&p, "unpriced").unwrap_err();
        assert!(matches!(err, TollgateError::Config(_)));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_amount(dec!(0.0000005), 6), dec!(0.000001));
        assert_eq!(round_amount(dec!(0.0000004), 6), dec!(0.000000));
        assert_eq!(round_amount(dec!(1.005), 2), dec!(1.01));
        assert_eq!(round_amount(dec!(12.5), 0), dec!(13));
    }

    #[test]
    fn zero_tokens_cost_nothing() {
        let pricing = get_pricing(&provider(), "gpt-4o-mini").unwrap();
        assert_eq!(
            calculate_cost(&TokenUsage::default(), &pricing, 6),
            Decimal::ZERO
        );
    }

    #[test]
    fn input_estimate_rounds_up() {
        assert_eq!(estimate_input_tokens(""), 0);
        assert_eq!(estimate_input_tokens("abcd"), 1);
        assert_eq!(estimate_input_tokens("abcde"), 2);
        // Counted in characters, not bytes.
        assert_eq!(estimate_input_tokens("ééééé"), 2);
    }

    #[test]
    fn estimate_is_worst_case() {
        let calc = CostCalculator::default();
        let prompt = "x".repeat(400);
        // 100 estimated input tokens plus 1000 output tokens.
        let estimate = calc
            .estimate(&provider(), "gpt-4o-mini", &prompt, 1000)
            .unwrap();
        assert_eq!(estimate, dec!(0.031));
    }

    #[test]
    fn calculator_uses_currency_precision() {
        let mut config = CostConfig::default();
        config.currency_precision.insert("USD".to_string(), 2);
        let calc = CostCalculator::new(config);
        let usage = TokenUsage {
            input_tokens: 120,
            output_tokens: 80,
        };
        let (cost, pricing) = calc.calculate(&provider(), "gpt-4o-mini", &usage).unwrap();
        assert_eq!(cost, dec!(0.00));
        assert_eq!(pricing.currency, "USD");
    }
}
