// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration.
//!
//! Drives one AI feature call through classify, cache check, balance check,
//! provider call, cost, debit, and cache write. The broker is the only
//! writer to the debit path and to the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tollgate_cache::{MemoryCache, fingerprint};
use tollgate_config::{ProviderConfig, TollgateConfig};
use tollgate_core::{
    CacheEntry, GenerateRequest, GenerateResponse, ProviderAdapter, ResponseCache, TollgateError,
    UsageType,
};
use tollgate_cost::{CostCalculator, TransactionMetadata, WalletLedger};
use tollgate_router::{ProviderRouter, RateLimiter, UsageClassifier};
use tollgate_storage::Database;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::admin::AdminService;
use crate::metrics;
use crate::providers::ProviderRegistry;
use crate::retry::Backoff;
use crate::types::{Actor, AiRequest, BrokerErrorKind, BrokerResult, BrokerState};

/// Per-request bookkeeping: id, current state, and the usage type once known.
struct Pipeline {
    request_id: String,
    state: BrokerState,
    usage_type: Option<UsageType>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            state: BrokerState::Received,
            usage_type: None,
        }
    }

    fn advance(&mut self, next: BrokerState) {
        debug!(
            request_id = %self.request_id,
            from = %self.state,
            to = %next,
            "broker state transition"
        );
        self.state = next;
    }
}

/// The metered request broker.
pub struct Broker {
    config: Arc<TollgateConfig>,
    classifier: UsageClassifier,
    router: ProviderRouter,
    rate_limiter: RateLimiter,
    calculator: CostCalculator,
    backoff: Backoff,
    ledger: Arc<WalletLedger>,
    cache: Arc<dyn ResponseCache>,
    providers: ProviderRegistry,
}

impl Broker {
    /// Assemble a broker from prepared components.
    ///
    /// Fails if no providers are configured or a configured provider has no
    /// registered adapter.
    pub fn new(
        config: TollgateConfig,
        ledger: Arc<WalletLedger>,
        cache: Arc<dyn ResponseCache>,
        providers: ProviderRegistry,
    ) -> Result<Self, TollgateError> {
        let router = ProviderRouter::new(&config)?;
        providers.ensure_complete(&config.providers)?;

        Ok(Self {
            classifier: UsageClassifier::new(),
            router,
            rate_limiter: RateLimiter::new(),
            calculator: CostCalculator::new(config.cost.clone()),
            backoff: Backoff::new(Duration::from_millis(config.broker.retry_base_delay_ms)),
            ledger,
            cache,
            providers,
            config: Arc::new(config),
        })
    }

    /// Open the configured database and build HTTP adapters for every
    /// configured provider.
    pub async fn from_config(config: TollgateConfig) -> Result<Self, TollgateError> {
        let db = Database::from_config(&config.storage).await?;
        let ledger = Arc::new(WalletLedger::new(db));
        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryCache::from_config(&config.cache));
        let providers = ProviderRegistry::from_config(&config.providers)?;
        Self::new(config, ledger, cache, providers)
    }

    pub fn config(&self) -> &TollgateConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    /// Operator surface over the same ledger and cache.
    pub fn admin(&self) -> AdminService {
        AdminService::new(
            self.ledger.clone(),
            self.cache.clone(),
            self.config.wallet.clone(),
        )
    }

    /// Process one request. Never panics and never returns `Err`: every
    /// failure is reported inside the [`BrokerResult`].
    pub async fn process(&self, request: AiRequest) -> BrokerResult {
        self.process_cancellable(request, CancellationToken::new())
            .await
    }

    /// Like [`Broker::process`], but aborts with a `Cancelled` error if
    /// `cancel` fires before the provider call completes. A cancelled
    /// request is never billed.
    pub async fn process_cancellable(
        &self,
        request: AiRequest,
        cancel: CancellationToken,
    ) -> BrokerResult {
        let mut pipeline = Pipeline::new();
        let span = info_span!(
            "broker_request",
            request_id = %pipeline.request_id,
            organization_id = %request.organization_id,
        );
        let outcome = self
            .run(&request, &mut pipeline, &cancel)
            .instrument(span)
            .await;

        match outcome {
            Ok(result) => {
                metrics::request(
                    if result.cached { "cached" } else { "success" },
                    result.usage_type,
                );
                result
            }
            Err(err) => {
                pipeline.advance(BrokerState::Reject);
                let result =
                    BrokerResult::failure(pipeline.request_id, pipeline.usage_type, &err);
                let kind = result.error_kind().unwrap_or(BrokerErrorKind::Internal);
                match kind {
                    BrokerErrorKind::Internal => error!(
                        request_id = %result.request_id,
                        organization_id = %request.organization_id,
                        error = %err,
                        "request failed"
                    ),
                    BrokerErrorKind::Provider => warn!(
                        request_id = %result.request_id,
                        organization_id = %request.organization_id,
                        error = %err,
                        "provider call failed, nothing billed"
                    ),
                    _ => info!(
                        request_id = %result.request_id,
                        organization_id = %request.organization_id,
                        kind = %kind,
                        error = %err,
                        "request rejected"
                    ),
                }
                metrics::request(&kind.to_string(), result.usage_type);
                result
            }
        }
    }

    async fn run(
        &self,
        request: &AiRequest,
        pipeline: &mut Pipeline,
        cancel: &CancellationToken,
    ) -> Result<BrokerResult, TollgateError> {
        let organization_id = &request.organization_id;
        let prompt = request.prompt.as_str();
        validate_prompt(prompt, self.config.broker.max_prompt_chars)?;

        let classification = self.classifier.classify(
            request.usage_type.as_deref(),
            prompt,
            request.metadata.as_ref(),
        )?;
        let usage_type = classification.usage_type;
        pipeline.usage_type = Some(usage_type);
        pipeline.advance(BrokerState::Classified);
        debug!(
            usage_type = %usage_type,
            confidence = classification.confidence,
            reason = classification.reason,
            "request classified"
        );

        let target = self.router.resolve(usage_type, request.model.as_deref())?;
        let provider = self.router.provider(&target.provider).ok_or_else(|| {
            TollgateError::Config(format!("provider `{}` is not configured", target.provider))
        })?;
        let adapter = self.providers.get(&target.provider).ok_or_else(|| {
            TollgateError::Config(format!("no adapter for provider `{}`", target.provider))
        })?;
        let max_tokens = effective_max_tokens(request.max_tokens, provider)?;
        let temperature = effective_temperature(request.temperature, provider)?;

        let wallet = self
            .ledger
            .get_wallet(organization_id)
            .await?
            .ok_or_else(|| TollgateError::WalletNotFound {
                organization_id: organization_id.to_string(),
            })?;

        pipeline.advance(BrokerState::CacheCheck);
        let cache_key = self.config.cache.enabled.then(|| {
            fingerprint(organization_id, usage_type, prompt, &target.model, temperature)
        });
        if let Some(key) = &cache_key {
            let hit = self.cache.get(key).await;
            metrics::cache_lookup(hit.is_some());
            if let Some(entry) = hit {
                pipeline.advance(BrokerState::CacheHit);
                info!(
                    usage_type = %usage_type,
                    provider = %entry.provider,
                    model = %entry.model,
                    cost = %entry.cost,
                    "served from cache, wallet untouched"
                );
                pipeline.advance(BrokerState::Respond);
                return Ok(BrokerResult {
                    success: true,
                    request_id: pipeline.request_id.clone(),
                    response: Some(entry.response),
                    transaction_id: entry.transaction_id,
                    cost: Some(entry.cost),
                    currency: Some(entry.currency),
                    usage: Some(entry.usage),
                    provider: Some(entry.provider),
                    model: Some(entry.model),
                    usage_type: Some(usage_type),
                    cached: true,
                    error: None,
                });
            }
        }
        pipeline.advance(BrokerState::CacheMiss);

        pipeline.advance(BrokerState::BalanceCheck);
        if provider.currency != wallet.currency {
            return Err(TollgateError::Config(format!(
                "provider `{}` prices in {} but the wallet holds {}",
                provider.name, provider.currency, wallet.currency
            )));
        }
        let estimate = self
            .calculator
            .estimate(provider, &target.model, prompt, max_tokens)?;
        if estimate > wallet.balance {
            pipeline.advance(BrokerState::Insufficient);
            return Err(TollgateError::InsufficientBalance {
                required: estimate,
                available: wallet.balance,
                currency: wallet.currency,
            });
        }
        pipeline.advance(BrokerState::Sufficient);

        pipeline.advance(BrokerState::ProviderCall);
        let generate = GenerateRequest {
            model: target.model.clone(),
            prompt: prompt.to_string(),
            max_tokens,
            temperature,
        };
        let response = match self
            .call_provider(adapter.as_ref(), provider, generate, cancel)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                pipeline.advance(BrokerState::ProviderFailure);
                return Err(err);
            }
        };
        pipeline.advance(BrokerState::ProviderSuccess);

        pipeline.advance(BrokerState::CostCompute);
        let (cost, _pricing) = self
            .calculator
            .calculate(provider, &target.model, &response.usage)?;

        pipeline.advance(BrokerState::Debit);
        let transaction = if cost.is_zero() {
            debug!("zero cost, nothing to debit");
            None
        } else {
            let metadata = TransactionMetadata {
                usage_type: Some(usage_type),
                provider: Some(target.provider.clone()),
                model: Some(target.model.clone()),
                input_tokens: Some(response.usage.input_tokens),
                output_tokens: Some(response.usage.output_tokens),
                actor: request.actor.as_ref().and_then(Actor::label),
                extra: request.metadata.clone(),
            };
            match self
                .ledger
                .try_debit(organization_id, cost, &pipeline.request_id, metadata)
                .await
            {
                Ok(transaction) => Some(transaction),
                Err(err @ TollgateError::InsufficientBalance { .. }) => {
                    warn!(
                        cost = %cost,
                        "balance spent by a concurrent request, response discarded"
                    );
                    return Err(err);
                }
                Err(err) => {
                    error!(error = %err, cost = %cost, "ledger debit failed, response discarded");
                    return Err(TollgateError::Internal(format!("ledger debit failed: {err}")));
                }
            }
        };

        metrics::billed(
            &target.provider,
            &target.model,
            &response.usage,
            &wallet.currency,
            cost,
        );
        if let Some(t) = &transaction {
            metrics::balance(organization_id.as_str(), &t.currency, t.balance_after);
        }
        let transaction_id = transaction.map(|t| t.id);

        if let Some(key) = cache_key {
            pipeline.advance(BrokerState::CacheWrite);
            let entry = CacheEntry {
                organization_id: organization_id.clone(),
                usage_type,
                response: response.text.clone(),
                usage: response.usage,
                cost,
                currency: wallet.currency.clone(),
                provider: target.provider.clone(),
                model: target.model.clone(),
                transaction_id: transaction_id.clone(),
            };
            let ttl = Duration::from_secs(self.config.cache.ttl_secs);
            if let Err(err) = self.cache.put(&key, entry, ttl).await {
                warn!(error = %err, "cache write failed");
            }
        }

        pipeline.advance(BrokerState::Respond);
        info!(
            usage_type = %usage_type,
            provider = %target.provider,
            model = %target.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            cost = %cost,
            transaction_id = transaction_id.as_deref().unwrap_or("-"),
            "request billed"
        );

        Ok(BrokerResult {
            success: true,
            request_id: pipeline.request_id.clone(),
            response: Some(response.text),
            transaction_id,
            cost: Some(cost),
            currency: Some(wallet.currency),
            usage: Some(response.usage),
            provider: Some(target.provider),
            model: Some(target.model),
            usage_type: Some(usage_type),
            cached: false,
            error: None,
        })
    }

    /// Call the provider with bounded retries.
    ///
    /// Each attempt passes the rate limiter and runs under the provider
    /// timeout. Only retryable failures are retried.
    async fn call_provider(
        &self,
        adapter: &dyn ProviderAdapter,
        provider: &ProviderConfig,
        request: GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateResponse, TollgateError> {
        let max_attempts = self.config.broker.max_retries.saturating_add(1);
        let timeout = Duration::from_secs(provider.timeout_secs);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(TollgateError::Cancelled);
            }

            let result = if self
                .rate_limiter
                .try_acquire(&provider.name, provider.rate_limit_per_minute)
            {
                let started = Instant::now();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TollgateError::Cancelled),
                    outcome = tokio::time::timeout(timeout, adapter.generate(request.clone())) => outcome,
                };
                metrics::provider_latency(&provider.name, started.elapsed().as_secs_f64());
                outcome.unwrap_or_else(|_| Err(TollgateError::Timeout { duration: timeout }))
            } else {
                Err(TollgateError::RateLimited {
                    provider: provider.name.clone(),
                })
            };

            match result {
                Ok(response) => {
                    debug!(provider = %provider.name, attempt, "provider call succeeded");
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        provider = %provider.name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "provider attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TollgateError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn validate_prompt(prompt: &str, max_chars: usize) -> Result<(), TollgateError> {
    if prompt.trim().is_empty() {
        return Err(TollgateError::Validation(
            "prompt must not be empty".to_string(),
        ));
    }
    let chars = prompt.chars().count();
    if chars > max_chars {
        return Err(TollgateError::Validation(format!(
            "prompt is {chars} characters, the limit is {max_chars}"
        )));
    }
    Ok(())
}

/// Requested output tokens: provider default when unset, clamped to the
/// provider maximum, zero rejected.
fn effective_max_tokens(
    requested: Option<u32>,
    provider: &ProviderConfig,
) -> Result<u32, TollgateError> {
    let requested = requested.unwrap_or(provider.default_max_tokens);
    if requested == 0 {
        return Err(TollgateError::Validation(
            "max_tokens must be at least 1".to_string(),
        ));
    }
    if requested > provider.max_tokens_per_request {
        debug!(
            requested,
            limit = provider.max_tokens_per_request,
            "max_tokens clamped to provider limit"
        );
    }
    Ok(requested.min(provider.max_tokens_per_request))
}

fn effective_temperature(
    requested: Option<f32>,
    provider: &ProviderConfig,
) -> Result<f32, TollgateError> {
    let temperature = requested.unwrap_or(provider.default_temperature);
    if !(0.0..=provider.max_temperature).contains(&temperature) {
        return Err(TollgateError::Validation(format!(
            "temperature {temperature} is outside [0, {}]",
            provider.max_temperature
        )));
    }
    Ok(temperature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        serde_json::from_value(serde_json::json!({
            "name": "p",
            "kind": "mock",
            "default_model": "m",
            "max_tokens_per_request": 500,
            "default_max_tokens": 200,
            "max_temperature": 1.0,
            "default_temperature": 0.5
        }))
        .unwrap()
    }

    #[test]
    fn prompt_limits() {
        assert!(validate_prompt("hello", 10).is_ok());
        assert!(matches!(
            validate_prompt("   \n", 10),
            Err(TollgateError::Validation(_))
        ));
        assert!(validate_prompt("ééééé", 5).is_ok());
        assert!(validate_prompt("ééééé", 4).is_err());
    }

    #[test]
    fn max_tokens_defaults_clamps_and_rejects_zero() {
        let p = provider();
        assert_eq!(effective_max_tokens(None, &p).unwrap(), 200);
        assert_eq!(effective_max_tokens(Some(9000), &p).unwrap(), 500);
        assert_eq!(effective_max_tokens(Some(50), &p).unwrap(), 50);
        assert!(effective_max_tokens(Some(0), &p).is_err());
    }

    #[test]
    fn temperature_range() {
        let p = provider();
        assert_eq!(effective_temperature(None, &p).unwrap(), 0.5);
        assert_eq!(effective_temperature(Some(0.0), &p).unwrap(), 0.0);
        assert_eq!(effective_temperature(Some(1.0), &p).unwrap(), 1.0);
        assert!(effective_temperature(Some(1.5), &p).is_err());
        assert!(effective_temperature(Some(-0.1), &p).is_err());
        assert!(effective_temperature(Some(f32::NAN), &p).is_err());
    }
}
