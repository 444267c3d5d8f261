// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Tollgate broker.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text format via [`PrometheusAdapter::render`].

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tollgate_core::{AdapterType, HealthStatus, PluginAdapter, TollgateError};

pub use recording::{
    record_billed, record_cache_lookup, record_provider_latency, record_request, record_tokens,
    register_metrics, set_wallet_balance,
};

/// Prometheus metrics adapter.
///
/// Holds the handle of the globally installed recorder.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn new() -> Result<Self, TollgateError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            TollgateError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, TollgateError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TollgateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tollgate_core::{TokenUsage, UsageType};

    // A local recorder keeps these tests independent of the global one.
    fn render_with(f: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            f();
        });
        handle.render()
    }

    #[test]
    fn request_outcomes_are_labelled() {
        let out = render_with(|| {
            record_request("success", Some(UsageType::Translation));
            record_request("success", Some(UsageType::Translation));
            record_request("validation", None);
        });
        assert!(
            out.contains(r#"tollgate_requests_total{outcome="success",usage_type="TRANSLATION"} 2"#),
            "got:\n{out}"
        );
        assert!(out.contains(r#"usage_type="UNKNOWN""#), "got:\n{out}");
    }

    #[test]
    fn tokens_and_billing_are_counted() {
        let out = render_with(|| {
            record_tokens(
                "openai",
                "gpt-4o-mini",
                &TokenUsage {
                    input_tokens: 120,
                    output_tokens: 80,
                },
            );
            record_billed("USD", dec!(0.003600));
        });
        assert!(out.contains(r#"type="input"} 120"#), "got:\n{out}");
        assert!(out.contains(r#"type="output"} 80"#), "got:\n{out}");
        assert!(
            out.contains(r#"tollgate_billed_amount_total{currency="USD"} 3600"#),
            "got:\n{out}"
        );
    }

    #[test]
    fn cache_latency_and_balance() {
        let out = render_with(|| {
            record_cache_lookup(true);
            record_cache_lookup(false);
            record_provider_latency("openai", 0.25);
            set_wallet_balance("org-1", "USD", dec!(9.5));
        });
        assert!(out.contains(r#"tollgate_cache_lookups_total{result="hit"} 1"#));
        assert!(out.contains("tollgate_provider_latency_seconds"));
        assert!(out.contains(r#"organization_id="org-1""#));
    }
}
