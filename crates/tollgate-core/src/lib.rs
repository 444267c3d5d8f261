// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tollgate metered AI broker.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the workspace. Provider adapters and cache
//! stores implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TollgateError;
pub use types::{
    AdapterType, CacheEntry, CacheStats, GenerateRequest, GenerateResponse, HealthStatus,
    OrganizationId, TokenUsage, UsageType,
};

pub use traits::{PluginAdapter, ProviderAdapter, ResponseCache};

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn usage_type_parses_screaming_snake_case() {
        assert_eq!(
            UsageType::from_str("CHAT_RESPONSE").unwrap(),
            UsageType::ChatResponse
        );
        assert_eq!(
            UsageType::from_str("SENTIMENT_ANALYSIS").unwrap(),
            UsageType::SentimentAnalysis
        );
        assert_eq!(UsageType::Summary.to_string(), "SUMMARY");
        assert!(UsageType::from_str("chat").is_err());
        assert!(UsageType::from_str("IMAGE_GENERATION").is_err());
    }

    #[test]
    fn usage_type_has_six_variants_with_matching_serde_names() {
        let all: Vec<UsageType> = UsageType::iter().collect();
        assert_eq!(all.len(), 6);
        for variant in all {
            let json = serde_json::to_string(&variant).unwrap();
            assert_eq!(json, format!("\"{variant}\""));
        }
    }

    #[test]
    fn retryable_errors() {
        assert!(TollgateError::Provider {
            message: "503".into(),
            source: None
        }
        .is_retryable());
        assert!(TollgateError::Timeout {
            duration: std::time::Duration::from_secs(5)
        }
        .is_retryable());
        assert!(TollgateError::RateLimited {
            provider: "openai".into()
        }
        .is_retryable());
        assert!(!TollgateError::Validation("bad".into()).is_retryable());
        assert!(!TollgateError::Cancelled.is_retryable());
    }

    #[test]
    fn insufficient_balance_message_names_both_amounts() {
        let err = TollgateError::InsufficientBalance {
            required: dec!(0.010000),
            available: dec!(0.000500),
            currency: "USD".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.010000 USD"), "got: {msg}");
        assert!(msg.contains("0.000500 USD"), "got: {msg}");
    }

    #[test]
    fn cache_stats_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        let stats = CacheStats {
            entries: 1,
            size_bytes: 10,
            hits: 3,
            misses: 1,
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn organization_id_displays_inner_value() {
        let org = OrganizationId::from("org-1");
        assert_eq!(org.to_string(), "org-1");
        assert_eq!(org.as_str(), "org-1");
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_provider_adapter<T: ProviderAdapter>() {}
        fn _assert_response_cache<T: ResponseCache>() {}
    }
}
