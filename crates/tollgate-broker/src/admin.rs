// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator surface: wallet provisioning, top-ups, corrections, statistics,
//! and cache maintenance.

use std::sync::Arc;

use rust_decimal::Decimal;
use tollgate_config::WalletConfig;
use tollgate_core::{CacheStats, OrganizationId, ResponseCache, TollgateError};
use tollgate_cost::{Transaction, TransactionMetadata, Wallet, WalletLedger, WalletSummary};
use tracing::info;

use crate::types::Actor;

#[derive(Clone)]
pub struct AdminService {
    ledger: Arc<WalletLedger>,
    cache: Arc<dyn ResponseCache>,
    defaults: WalletConfig,
}

impl AdminService {
    pub fn new(
        ledger: Arc<WalletLedger>,
        cache: Arc<dyn ResponseCache>,
        defaults: WalletConfig,
    ) -> Self {
        Self {
            ledger,
            cache,
            defaults,
        }
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn reset_cache_stats(&self) {
        self.cache.reset_stats().await;
        info!("cache statistics reset");
    }

    /// Drop cached responses for one organization, or all of them.
    pub async fn purge_cache(&self, organization_id: Option<&OrganizationId>) -> usize {
        let removed = self.cache.purge(organization_id).await;
        info!(
            organization_id = organization_id.map(OrganizationId::as_str).unwrap_or("*"),
            removed,
            "cache purged"
        );
        removed
    }

    /// Provision a wallet, filling unset options from the configured defaults.
    pub async fn open_wallet(
        &self,
        organization_id: &OrganizationId,
        currency: Option<&str>,
        low_balance_threshold: Option<Decimal>,
        alerts_enabled: Option<bool>,
    ) -> Result<Wallet, TollgateError> {
        self.ledger
            .open_wallet(
                organization_id,
                currency.unwrap_or(&self.defaults.default_currency),
                low_balance_threshold.unwrap_or(self.defaults.default_low_balance_threshold),
                alerts_enabled.unwrap_or(self.defaults.alerts_enabled),
            )
            .await
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, TollgateError> {
        self.ledger.list_wallets().await
    }

    /// Balance, totals, spend per usage type, and the `recent` newest entries.
    pub async fn wallet_stats(
        &self,
        organization_id: &OrganizationId,
        recent: usize,
    ) -> Result<WalletSummary, TollgateError> {
        self.ledger.summary(organization_id, recent).await
    }

    pub async fn list_transactions(
        &self,
        organization_id: &OrganizationId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Transaction>, TollgateError> {
        self.ledger.history(organization_id, page, page_size).await
    }

    pub async fn update_low_balance_settings(
        &self,
        organization_id: &OrganizationId,
        threshold: Decimal,
        alerts_enabled: bool,
    ) -> Result<Wallet, TollgateError> {
        self.ledger
            .update_low_balance_settings(organization_id, threshold, alerts_enabled)
            .await
    }

    /// Top up a wallet. Passing the same `reference` twice credits once.
    pub async fn credit(
        &self,
        organization_id: &OrganizationId,
        amount: Decimal,
        reference: Option<&str>,
        actor: Option<&Actor>,
    ) -> Result<Transaction, TollgateError> {
        let reference = reference
            .map(str::to_string)
            .unwrap_or_else(|| format!("credit-{}", uuid::Uuid::new_v4()));
        let metadata = TransactionMetadata {
            actor: actor.and_then(Actor::label),
            ..TransactionMetadata::default()
        };
        self.ledger
            .credit(organization_id, amount, &reference, metadata)
            .await
    }

    /// Signed operator correction. The reason is kept on the transaction.
    pub async fn adjust(
        &self,
        organization_id: &OrganizationId,
        delta: Decimal,
        reason: &str,
        actor: Option<&Actor>,
    ) -> Result<Transaction, TollgateError> {
        if reason.trim().is_empty() {
            return Err(TollgateError::Validation(
                "an adjustment needs a reason".to_string(),
            ));
        }
        let reference = format!("adjust-{}", uuid::Uuid::new_v4());
        let metadata = TransactionMetadata {
            actor: actor.and_then(Actor::label),
            extra: Some(serde_json::json!({ "reason": reason })),
            ..TransactionMetadata::default()
        };
        self.ledger
            .adjust(organization_id, delta, &reference, metadata)
            .await
    }

    /// Replay the wallet history and compare with the stored balance.
    pub async fn verify(&self, organization_id: &OrganizationId) -> Result<bool, TollgateError> {
        self.ledger.verify(organization_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tollgate_cache::MemoryCache;
    use tollgate_cost::TransactionType;
    use tollgate_storage::Database;

    async fn admin() -> AdminService {
        let db = Database::open_in_memory().await.unwrap();
        AdminService::new(
            Arc::new(WalletLedger::new(db)),
            Arc::new(MemoryCache::new(100, 64 * 1024)),
            WalletConfig::default(),
        )
    }

    #[tokio::test]
    async fn open_wallet_uses_configured_defaults() {
        let admin = admin().await;
        let org = OrganizationId::from("org-1");
        let wallet = admin.open_wallet(&org, None, None, None).await.unwrap();
        assert_eq!(wallet.currency, "USD");
        assert_eq!(wallet.balance, Decimal::ZERO);
        assert_eq!(wallet.low_balance_threshold, dec!(1));
        assert!(wallet.alerts_enabled);

        let eur = admin
            .open_wallet(&"org-2".into(), Some("EUR"), Some(dec!(5)), Some(false))
            .await
            .unwrap();
        assert_eq!(eur.currency, "EUR");
        assert!(!eur.alerts_enabled);
        assert_eq!(admin.list_wallets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn credit_with_reference_is_idempotent() {
        let admin = admin().await;
        let org = OrganizationId::from("org-1");
        admin.open_wallet(&org, None, None, None).await.unwrap();

        let actor = Actor {
            user_id: Some("u-7".into()),
            user_name: None,
        };
        let first = admin
            .credit(&org, dec!(10), Some("invoice-42"), Some(&actor))
            .await
            .unwrap();
        let again = admin
            .credit(&org, dec!(10), Some("invoice-42"), None)
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.metadata.actor.as_deref(), Some("u-7"));

        let stats = admin.wallet_stats(&org, 5).await.unwrap();
        assert_eq!(stats.wallet.balance, dec!(10));
        assert_eq!(stats.transaction_count, 1);
    }

    #[tokio::test]
    async fn adjust_records_reason_and_requires_one() {
        let admin = admin().await;
        let org = OrganizationId::from("org-1");
        admin.open_wallet(&org, None, None, None).await.unwrap();
        admin.credit(&org, dec!(3), None, None).await.unwrap();

        let t = admin
            .adjust(&org, dec!(-1.5), "refund reversal", None)
            .await
            .unwrap();
        assert_eq!(t.transaction_type, TransactionType::Adjustment);
        assert_eq!(t.balance_after, dec!(1.5));
        assert_eq!(
            t.metadata.extra.as_ref().unwrap()["reason"],
            "refund reversal"
        );

        let err = admin.adjust(&org, dec!(1), "  ", None).await.unwrap_err();
        assert!(matches!(err, TollgateError::Validation(_)));

        let page = admin.list_transactions(&org, 1, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, t.id);
        assert!(admin.verify(&org).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_wallet_is_reported() {
        let admin = admin().await;
        let err = admin
            .wallet_stats(&"nobody".into(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::WalletNotFound { .. }));
    }

    #[tokio::test]
    async fn purge_on_empty_cache_removes_nothing() {
        let admin = admin().await;
        assert_eq!(admin.purge_cache(None).await, 0);
        assert_eq!(admin.cache_stats().await.entries, 0);
    }
}
