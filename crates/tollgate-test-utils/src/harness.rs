// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end broker testing.
//!
//! `TestHarness` assembles a complete broker over a temp SQLite database, an
//! in-memory cache, and a single [`MockProvider`] named `mock`.
//!
//! Mock pricing: `mock-model` costs 0.0001 per input token and 0.00005 per
//! output token, so a default reply (10 in, 20 out) costs 0.002000 USD.
//! `mock-large` costs ten times as much.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tollgate_broker::{AdminService, AiRequest, Broker, BrokerResult, ProviderRegistry};
use tollgate_cache::MemoryCache;
use tollgate_config::{
    BrokerConfig, CacheConfig, ModelPricingConfig, ProviderConfig, ProviderKind, StorageConfig,
    TollgateConfig,
};
use tollgate_core::{OrganizationId, ProviderAdapter, ResponseCache, TollgateError};
use tollgate_cost::{Transaction, TransactionMetadata, WalletLedger};
use tollgate_storage::Database;

use crate::mock_provider::{MockProvider, MockReply};

pub const MOCK_PROVIDER: &str = "mock";
pub const MOCK_MODEL: &str = "mock-model";
pub const MOCK_LARGE_MODEL: &str = "mock-large";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    wallets: Vec<(OrganizationId, Decimal)>,
    replies: Vec<MockReply>,
    latency: Option<Duration>,
    max_retries: u32,
    cache_enabled: bool,
    cache_max_value_bytes: Option<usize>,
    timeout_secs: u64,
    rate_limit_per_minute: Option<u32>,
    low_balance_threshold: Decimal,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            wallets: Vec::new(),
            replies: Vec::new(),
            latency: None,
            max_retries: 2,
            cache_enabled: true,
            cache_max_value_bytes: None,
            timeout_secs: 30,
            rate_limit_per_minute: None,
            low_balance_threshold: dec!(1),
        }
    }

    /// Open a USD wallet for `organization_id` funded with `balance`.
    pub fn with_wallet(mut self, organization_id: &str, balance: Decimal) -> Self {
        self.wallets.push((organization_id.into(), balance));
        self
    }

    /// Scripted provider replies, consumed in order.
    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = replies;
        self
    }

    pub fn with_provider_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Cap the size of a cached response; larger writes are refused.
    pub fn with_cache_max_value_bytes(mut self, max_value_bytes: usize) -> Self {
        self.cache_max_value_bytes = Some(max_value_bytes);
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        self.rate_limit_per_minute = Some(per_minute);
        self
    }

    pub fn with_low_balance_threshold(mut self, threshold: Decimal) -> Self {
        self.low_balance_threshold = threshold;
        self
    }

    /// Build the harness: database, ledger, cache, mock provider, broker,
    /// and funded wallets.
    pub async fn build(self) -> Result<TestHarness, TollgateError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| TollgateError::Storage {
            source: Box::new(e),
        })?;
        let db_path = temp_dir.path().join("test.db");

        let mut cache_config = CacheConfig {
            enabled: self.cache_enabled,
            ..CacheConfig::default()
        };
        if let Some(max_value_bytes) = self.cache_max_value_bytes {
            cache_config.max_value_bytes = max_value_bytes;
        }

        let config = TollgateConfig {
            broker: BrokerConfig {
                max_retries: self.max_retries,
                retry_base_delay_ms: 1,
                ..BrokerConfig::default()
            },
            cache: cache_config,
            storage: StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            },
            providers: vec![mock_provider_config(
                self.timeout_secs,
                self.rate_limit_per_minute,
            )],
            ..TollgateConfig::default()
        };

        let db = Database::from_config(&config.storage).await?;
        let ledger = Arc::new(WalletLedger::new(db.clone()));
        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryCache::from_config(&config.cache));

        let mut mock = MockProvider::new(MOCK_PROVIDER).with_replies(self.replies);
        if let Some(latency) = self.latency {
            mock = mock.with_latency(latency);
        }
        let mock_provider = Arc::new(mock);

        let mut providers = ProviderRegistry::new();
        providers.register(
            MOCK_PROVIDER,
            mock_provider.clone() as Arc<dyn ProviderAdapter>,
        );

        for (organization_id, balance) in &self.wallets {
            ledger
                .open_wallet(organization_id, "USD", self.low_balance_threshold, true)
                .await?;
            if *balance > Decimal::ZERO {
                ledger
                    .credit(
                        organization_id,
                        *balance,
                        &format!("seed-{organization_id}"),
                        TransactionMetadata::default(),
                    )
                    .await?;
            }
        }

        let broker = Broker::new(config.clone(), ledger.clone(), cache.clone(), providers)?;
        let admin = broker.admin();

        Ok(TestHarness {
            broker,
            admin,
            ledger,
            db,
            cache,
            mock_provider,
            config,
            _temp_dir: temp_dir,
        })
    }
}

fn mock_provider_config(timeout_secs: u64, rate_limit_per_minute: Option<u32>) -> ProviderConfig {
    ProviderConfig {
        name: MOCK_PROVIDER.to_string(),
        kind: ProviderKind::Mock,
        default_model: MOCK_MODEL.to_string(),
        models: vec![
            ModelPricingConfig {
                name: MOCK_MODEL.to_string(),
                input_price_per_token: Some(dec!(0.0001)),
                output_price_per_token: Some(dec!(0.00005)),
            },
            ModelPricingConfig {
                name: MOCK_LARGE_MODEL.to_string(),
                input_price_per_token: Some(dec!(0.001)),
                output_price_per_token: Some(dec!(0.0005)),
            },
        ],
        currency: "USD".to_string(),
        max_tokens_per_request: 1000,
        default_max_tokens: 100,
        max_temperature: 1.0,
        default_temperature: 0.2,
        rate_limit_per_minute,
        timeout_secs,
        base_url: None,
        api_key: None,
    }
}

/// A complete broker over temp storage and a mock provider.
pub struct TestHarness {
    pub broker: Broker,
    pub admin: AdminService,
    pub ledger: Arc<WalletLedger>,
    /// Handle on the ledger's database, for simulating storage faults.
    pub db: Database,
    pub cache: Arc<dyn ResponseCache>,
    pub mock_provider: Arc<MockProvider>,
    pub config: TollgateConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Send `prompt` for `organization_id` with no other options.
    pub async fn ask(&self, organization_id: &str, prompt: &str) -> BrokerResult {
        self.broker
            .process(AiRequest::new(organization_id, prompt))
            .await
    }

    pub async fn balance(&self, organization_id: &str) -> Result<Decimal, TollgateError> {
        let (balance, _) = self.ledger.get_balance(&organization_id.into()).await?;
        Ok(balance)
    }

    /// Full history, oldest first.
    pub async fn transactions(
        &self,
        organization_id: &str,
    ) -> Result<Vec<Transaction>, TollgateError> {
        self.ledger.transactions(&organization_id.into()).await
    }
}
