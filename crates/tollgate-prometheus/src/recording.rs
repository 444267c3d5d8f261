// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so these are no-ops until a recorder is
//! installed.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tollgate_core::{TokenUsage, UsageType};

pub const REQUESTS_TOTAL: &str = "tollgate_requests_total";
pub const CACHE_LOOKUPS_TOTAL: &str = "tollgate_cache_lookups_total";
pub const TOKENS_TOTAL: &str = "tollgate_tokens_total";
pub const BILLED_AMOUNT_TOTAL: &str = "tollgate_billed_amount_total";
pub const PROVIDER_LATENCY_SECONDS: &str = "tollgate_provider_latency_seconds";
pub const WALLET_BALANCE: &str = "tollgate_wallet_balance";

/// Register all Tollgate metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Broker requests by outcome and usage type");
    describe_counter!(CACHE_LOOKUPS_TOTAL, "Response cache lookups by result");
    describe_counter!(TOKENS_TOTAL, "Billed provider tokens");
    describe_counter!(
        BILLED_AMOUNT_TOTAL,
        "Amount debited from wallets, in minor units of 1e-6"
    );
    describe_histogram!(
        PROVIDER_LATENCY_SECONDS,
        "Provider call latency in seconds, per attempt"
    );
    describe_gauge!(WALLET_BALANCE, "Last observed wallet balance");
}

/// Record a finished broker request. `outcome` is a stable label such as
/// `success`, `cached`, or an error kind.
pub fn record_request(outcome: &str, usage_type: Option<UsageType>) {
    let usage_type = usage_type.map_or_else(|| "UNKNOWN".to_string(), |t| t.to_string());
    metrics::counter!(REQUESTS_TOTAL, "outcome" => outcome.to_string(), "usage_type" => usage_type)
        .increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!(CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

/// Record billed token consumption.
pub fn record_tokens(provider: &str, model: &str, usage: &TokenUsage) {
    metrics::counter!(
        TOKENS_TOTAL,
        "provider" => provider.to_string(),
        "model" => model.to_string(),
        "type" => "input"
    )
    .increment(u64::from(usage.input_tokens));
    metrics::counter!(
        TOKENS_TOTAL,
        "provider" => provider.to_string(),
        "model" => model.to_string(),
        "type" => "output"
    )
    .increment(u64::from(usage.output_tokens));
}

/// Record a debit. Counters are integral, so the amount is counted in
/// millionths of the currency unit.
pub fn record_billed(currency: &str, amount: Decimal) {
    let micros = (amount * Decimal::from(1_000_000))
        .trunc()
        .to_u64()
        .unwrap_or(0);
    metrics::counter!(BILLED_AMOUNT_TOTAL, "currency" => currency.to_string()).increment(micros);
}

pub fn record_provider_latency(provider: &str, seconds: f64) {
    metrics::histogram!(PROVIDER_LATENCY_SECONDS, "provider" => provider.to_string())
        .record(seconds);
}

/// Set the last observed balance for a wallet.
pub fn set_wallet_balance(organization_id: &str, currency: &str, balance: Decimal) {
    metrics::gauge!(
        WALLET_BALANCE,
        "organization_id" => organization_id.to_string(),
        "currency" => currency.to_string()
    )
    .set(balance.to_f64().unwrap_or(0.0));
}
