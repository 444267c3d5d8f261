// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Tollgate broker.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Tenant identity. Every wallet, transaction, and cache entry belongs to one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrganizationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OrganizationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The kind of AI task a request performs.
///
/// Participates in the cache fingerprint, default model selection, and
/// per-type spend reporting. `Other` is the explicit fallback.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageType {
    ChatResponse,
    SentimentAnalysis,
    ContentGeneration,
    Translation,
    Summary,
    Other,
}

/// Input/output token counts reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// The narrow request the broker sends to a provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Generated text and the token usage it was billed at upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    /// Model that actually served the request, as reported by the provider.
    pub model: String,
    pub usage: TokenUsage,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
    Cache,
    Observability,
}

/// A previously billed response, stored so an identical request can be
/// answered without calling the provider or charging the wallet again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub organization_id: OrganizationId,
    pub usage_type: UsageType,
    pub response: String,
    pub usage: TokenUsage,
    /// Cost billed when the entry was first produced.
    pub cost: Decimal,
    pub currency: String,
    pub provider: String,
    pub model: String,
    /// Ledger transaction that paid for this response. `None` when the
    /// response cost nothing and no debit was recorded.
    pub transaction_id: Option<String>,
}

impl CacheEntry {
    /// Approximate heap footprint used for cache size accounting.
    pub fn approximate_size(&self) -> usize {
        self.organization_id.0.len()
            + self.response.len()
            + self.currency.len()
            + self.provider.len()
            + self.model.len()
            + self.transaction_id.as_ref().map_or(0, String::len)
            + std::mem::size_of::<Self>()
    }
}

/// Aggregate cache statistics since the last counter reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
