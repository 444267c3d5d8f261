// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker request, result, and state types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;
use tollgate_core::{OrganizationId, TokenUsage, TollgateError, UsageType};

/// Who triggered a request, recorded on the ledger transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl Actor {
    /// Label stored on the transaction: name, else id.
    pub fn label(&self) -> Option<String> {
        self.user_name.clone().or_else(|| self.user_id.clone())
    }
}

/// One AI feature call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub organization_id: OrganizationId,
    pub prompt: String,
    /// Explicit usage type, e.g. `"TRANSLATION"`. Inferred when absent.
    #[serde(default)]
    pub usage_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub actor: Option<Actor>,
    /// Free-form JSON object. `feature` is read as a classification hint.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl AiRequest {
    pub fn new(organization_id: impl Into<OrganizationId>, prompt: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            prompt: prompt.into(),
            usage_type: None,
            model: None,
            max_tokens: None,
            temperature: None,
            actor: None,
            metadata: None,
        }
    }

    pub fn with_usage_type(mut self, usage_type: impl Into<String>) -> Self {
        self.usage_type = Some(usage_type.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Caller-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum BrokerErrorKind {
    Validation,
    InsufficientBalance,
    Provider,
    Internal,
    Cancelled,
}

/// Failure reported to the caller.
///
/// Only validation and balance failures carry details; everything else reads
/// "request failed" and the full error goes to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerError {
    pub kind: BrokerErrorKind,
    pub message: String,
}

const GENERIC_FAILURE: &str = "request failed";

impl From<&TollgateError> for BrokerError {
    fn from(error: &TollgateError) -> Self {
        let (kind, message) = match error {
            TollgateError::Validation(msg) => (BrokerErrorKind::Validation, msg.clone()),
            TollgateError::WalletNotFound { organization_id } => (
                BrokerErrorKind::Validation,
                format!("no wallet for organization {organization_id}"),
            ),
            TollgateError::InsufficientBalance { .. } => {
                (BrokerErrorKind::InsufficientBalance, error.to_string())
            }
            TollgateError::Cancelled => (BrokerErrorKind::Cancelled, error.to_string()),
            TollgateError::Provider { .. }
            | TollgateError::Timeout { .. }
            | TollgateError::RateLimited { .. } => {
                (BrokerErrorKind::Provider, GENERIC_FAILURE.to_string())
            }
            TollgateError::Config(_)
            | TollgateError::Storage { .. }
            | TollgateError::Cache(_)
            | TollgateError::Internal(_) => {
                (BrokerErrorKind::Internal, GENERIC_FAILURE.to_string())
            }
        };
        Self { kind, message }
    }
}

/// Unified outcome of [`crate::Broker::process`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerResult {
    pub success: bool,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Ledger transaction that paid for the response. On a cache hit this is
    /// the original transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<UsageType>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BrokerError>,
}

impl BrokerResult {
    pub(crate) fn failure(
        request_id: String,
        usage_type: Option<UsageType>,
        error: &TollgateError,
    ) -> Self {
        Self {
            success: false,
            request_id,
            response: None,
            transaction_id: None,
            cost: None,
            currency: None,
            usage: None,
            provider: None,
            model: None,
            usage_type,
            cached: false,
            error: Some(BrokerError::from(error)),
        }
    }

    /// Error kind, if the request failed.
    pub fn error_kind(&self) -> Option<BrokerErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Pipeline states. Every transition is logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerState {
    Received,
    Classified,
    CacheCheck,
    CacheHit,
    CacheMiss,
    BalanceCheck,
    Insufficient,
    Sufficient,
    ProviderCall,
    ProviderFailure,
    ProviderSuccess,
    CostCompute,
    Debit,
    CacheWrite,
    Respond,
    Reject,
}
