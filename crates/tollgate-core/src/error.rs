// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tollgate broker.

use rust_decimal::Decimal;
use thiserror::Error;

/// The primary error type used across all Tollgate traits and core operations.
#[derive(Debug, Error)]
pub enum TollgateError {
    /// Configuration errors (invalid TOML, missing pricing, unknown provider).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// AI provider errors (API failure, malformed response, upstream rejection).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Caller input failed validation. No side effects have occurred.
    #[error("validation error: {0}")]
    Validation(String),

    /// The wallet cannot cover the requested amount. No side effects have occurred.
    #[error("insufficient balance: need {required} {currency}, have {available} {currency}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
        currency: String,
    },

    /// No wallet exists for the organization.
    #[error("wallet not found for organization {organization_id}")]
    WalletNotFound { organization_id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A provider's request-rate limit was reached.
    #[error("rate limit reached for provider {provider}")]
    RateLimited { provider: String },

    /// Cache store failure. Never fatal to a request.
    #[error("cache error: {0}")]
    Cache(String),

    /// The caller abandoned the request before it was billed.
    #[error("request cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TollgateError {
    /// Whether a failed provider attempt may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TollgateError::Provider { .. }
                | TollgateError::Timeout { .. }
                | TollgateError::RateLimited { .. }
        )
    }
}
