// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric hooks. Compiled to no-ops without the `prometheus` feature.

#![cfg_attr(not(feature = "prometheus"), allow(unused_variables))]

use rust_decimal::Decimal;
use tollgate_core::{TokenUsage, UsageType};

pub(crate) fn request(outcome: &str, usage_type: Option<UsageType>) {
    #[cfg(feature = "prometheus")]
    tollgate_prometheus::record_request(outcome, usage_type);
}

pub(crate) fn cache_lookup(hit: bool) {
    #[cfg(feature = "prometheus")]
    tollgate_prometheus::record_cache_lookup(hit);
}

pub(crate) fn provider_latency(provider: &str, seconds: f64) {
    #[cfg(feature = "prometheus")]
    tollgate_prometheus::record_provider_latency(provider, seconds);
}

pub(crate) fn billed(
    provider: &str,
    model: &str,
    usage: &TokenUsage,
    currency: &str,
    amount: Decimal,
) {
    #[cfg(feature = "prometheus")]
    {
        tollgate_prometheus::record_tokens(provider, model, usage);
        tollgate_prometheus::record_billed(currency, amount);
    }
}

pub(crate) fn balance(organization_id: &str, currency: &str, balance: Decimal) {
    #[cfg(feature = "prometheus")]
    tollgate_prometheus::set_wallet_balance(organization_id, currency, balance);
}
