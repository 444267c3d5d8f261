// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tollgate broker.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tollgate_core::UsageType;

/// Top-level Tollgate configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TollgateConfig {
    /// Request pipeline settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Defaults applied to newly provisioned wallets.
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Cost rounding settings.
    #[serde(default)]
    pub cost: CostConfig,

    /// External AI providers and their pricing tables.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Usage type to provider/model routing table.
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl TollgateConfig {
    /// Looks up a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Broker pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Longest accepted prompt, in characters.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Extra provider attempts after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential retry backoff, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Provider used when neither an explicit model nor a route applies.
    /// Falls back to the first configured provider when unset.
    #[serde(default)]
    pub default_provider: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_prompt_chars: default_max_prompt_chars(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            default_provider: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_prompt_chars() -> usize {
    32_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Disable to always call the provider.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lifetime of a cached response, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Upper bound on live entries before the oldest is evicted.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Responses larger than this are not cached.
    #[serde(default = "default_cache_max_value_bytes")]
    pub max_value_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
            max_value_bytes: default_cache_max_value_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_cache_max_value_bytes() -> usize {
    1024 * 1024
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tollgate").join("tollgate.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tollgate.db"))
        .display()
        .to_string()
}

/// Defaults for newly provisioned wallets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    /// ISO 4217 currency code for new wallets.
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Balance at or below which the low-balance signal fires.
    #[serde(default = "default_low_balance_threshold")]
    pub default_low_balance_threshold: Decimal,

    /// Whether new wallets emit low-balance signals.
    #[serde(default = "default_true")]
    pub alerts_enabled: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_currency: default_currency(),
            default_low_balance_threshold: default_low_balance_threshold(),
            alerts_enabled: true,
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_low_balance_threshold() -> Decimal {
    Decimal::ONE
}

/// Cost rounding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Decimal places used for currencies without an explicit entry.
    #[serde(default = "default_precision")]
    pub default_precision: u32,

    /// Per-currency minor-unit precision, e.g. `USD = 6`.
    #[serde(default)]
    pub currency_precision: BTreeMap<String, u32>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            default_precision: default_precision(),
            currency_precision: BTreeMap::new(),
        }
    }
}

impl CostConfig {
    /// Decimal places to round amounts in `currency` to.
    pub fn precision_for(&self, currency: &str) -> u32 {
        self.currency_precision
            .get(currency)
            .copied()
            .unwrap_or(self.default_precision)
    }
}

fn default_precision() -> u32 {
    6
}

/// Which adapter implementation serves a provider entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Mock,
}

/// One external AI provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique provider name used by routes and reports.
    pub name: String,

    /// Adapter implementation.
    pub kind: ProviderKind,

    /// Model used when a request names none and no route applies.
    pub default_model: String,

    /// Models this provider serves, with per-token pricing.
    #[serde(default)]
    pub models: Vec<ModelPricingConfig>,

    /// Currency the prices are quoted in.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Hard cap on output tokens per request. Larger requests are clamped.
    #[serde(default = "default_max_tokens_per_request")]
    pub max_tokens_per_request: u32,

    /// Output tokens requested when the caller gives no limit.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Highest accepted sampling temperature.
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f32,

    /// Temperature used when the caller gives none.
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Requests allowed per minute. `None` means unlimited.
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,

    /// Per-attempt timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key. `None` falls back to the provider's environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ProviderConfig {
    /// Pricing entry for `model`, if listed.
    pub fn model(&self, model: &str) -> Option<&ModelPricingConfig> {
        self.models.iter().find(|m| m.name == model)
    }

    /// Whether this provider serves `model`.
    pub fn serves(&self, model: &str) -> bool {
        self.default_model == model || self.model(model).is_some()
    }
}

fn default_max_tokens_per_request() -> u32 {
    4096
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_max_temperature() -> f32 {
    2.0
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

/// Per-token prices for one model. Prices are decimal strings, e.g. `"0.000003"`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelPricingConfig {
    pub name: String,

    #[serde(default)]
    pub input_price_per_token: Option<Decimal>,

    #[serde(default)]
    pub output_price_per_token: Option<Decimal>,
}

/// Usage type routing table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Route per usage type, e.g. `[routing.routes.TRANSLATION]`.
    #[serde(default)]
    pub routes: BTreeMap<UsageType, RouteConfig>,
}

/// Where requests of one usage type go.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub provider: String,

    /// Model override. `None` uses the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
}
