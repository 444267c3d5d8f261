// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prepaid wallet ledger backed by SQLite.
//!
//! Every balance change is a DEBIT, CREDIT, or ADJUSTMENT row appended to the
//! `transactions` table in the same SQLite transaction that updates the
//! wallet. Movements on one wallet are additionally serialized by a
//! per-organization async mutex, so a balance check and the write it guards
//! can never interleave with another movement on that wallet.
//!
//! Replaying a wallet's transactions in `sequence` order from zero reproduces
//! its balance exactly.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use rusqlite::{Row, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{Mutex, broadcast};
use tollgate_core::{OrganizationId, TollgateError, UsageType};
use tollgate_storage::{Database, map_tr_err};
use tracing::{debug, info};

use crate::threshold::{BalanceAlert, ThresholdState, ThresholdTransition, alert_for};

/// Largest page `history` will return.
pub const MAX_PAGE_SIZE: u32 = 500;

const ALERT_CHANNEL_CAPACITY: usize = 64;

const WALLET_COLUMNS: &str = "id, organization_id, balance, currency, low_balance_threshold, \
     alerts_enabled, low_balance_active, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "t.sequence, t.id, t.wallet_id, t.type, t.amount, t.currency, \
     t.balance_before, t.balance_after, t.reference, t.usage_type, t.provider, t.model, \
     t.input_tokens, t.output_tokens, t.actor, t.metadata, t.created_at";

/// Direction of a ledger entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Debit,
    Credit,
    Adjustment,
}

/// Context recorded alongside a monetary movement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub usage_type: Option<UsageType>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    /// Who initiated the movement (user id/name or operator).
    pub actor: Option<String>,
    /// Free-form caller metadata.
    pub extra: Option<serde_json::Value>,
}

impl TransactionMetadata {
    /// Metadata for an operator action.
    pub fn actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            ..Self::default()
        }
    }
}

/// An organization's prepaid balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub organization_id: OrganizationId,
    pub balance: Decimal,
    pub currency: String,
    pub low_balance_threshold: Decimal,
    pub alerts_enabled: bool,
    /// Whether the low-balance signal is currently raised.
    pub low_balance_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Creation order within the ledger.
    pub sequence: i64,
    pub id: String,
    pub wallet_id: String,
    pub transaction_type: TransactionType,
    /// Positive magnitude of the movement.
    pub amount: Decimal,
    pub currency: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub reference: String,
    pub metadata: TransactionMetadata,
    pub created_at: String,
}

impl Transaction {
    /// The movement's effect on the balance.
    pub fn signed_amount(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Debit => -self.amount,
            TransactionType::Credit => self.amount,
            TransactionType::Adjustment => self.balance_after - self.balance_before,
        }
    }
}

/// Aggregate reporting view over one wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub wallet: Wallet,
    pub total_debited: Decimal,
    pub total_credited: Decimal,
    /// Signed sum of all adjustments.
    pub net_adjustments: Decimal,
    pub transaction_count: usize,
    pub last_activity: Option<String>,
    /// Debited amount per usage type. Debits without a usage type count as OTHER.
    pub spend_by_usage_type: BTreeMap<UsageType, Decimal>,
    /// Newest transactions first.
    pub recent: Vec<Transaction>,
}

/// Balance obtained by applying `transactions` in order, starting from zero.
pub fn replay(transactions: &[Transaction]) -> Decimal {
    transactions
        .iter()
        .fold(Decimal::ZERO, |balance, t| balance + t.signed_amount())
}

struct Movement {
    organization_id: OrganizationId,
    transaction_type: TransactionType,
    /// Signed change to apply.
    delta: Decimal,
    reference: String,
    metadata: TransactionMetadata,
}

enum MovementOutcome {
    Applied {
        transaction: Transaction,
        transition: ThresholdTransition,
        threshold: Decimal,
    },
    Duplicate(Transaction),
    Insufficient {
        available: Decimal,
        currency: String,
    },
    NoWallet,
}

fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Parse a TEXT column, reporting failures as conversion errors on that column.
fn parse_column<T>(idx: usize, text: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    parse_column(idx, &text)
}

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row.get(0)?,
        organization_id: OrganizationId(row.get(1)?),
        balance: decimal_at(row, 2)?,
        currency: row.get(3)?,
        low_balance_threshold: decimal_at(row, 4)?,
        alerts_enabled: row.get(5)?,
        low_balance_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let kind: String = row.get(3)?;
    let usage_type: Option<String> = row.get(9)?;
    let extra: Option<String> = row.get(15)?;
    Ok(Transaction {
        sequence: row.get(0)?,
        id: row.get(1)?,
        wallet_id: row.get(2)?,
        transaction_type: parse_column(3, &kind)?,
        amount: decimal_at(row, 4)?,
        currency: row.get(5)?,
        balance_before: decimal_at(row, 6)?,
        balance_after: decimal_at(row, 7)?,
        reference: row.get(8)?,
        metadata: TransactionMetadata {
            usage_type: usage_type.map(|s| parse_column(9, &s)).transpose()?,
            provider: row.get(10)?,
            model: row.get(11)?,
            input_tokens: row.get(12)?,
            output_tokens: row.get(13)?,
            actor: row.get(14)?,
            extra: extra
                .map(|s| {
                    serde_json::from_str(&s).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            15,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })
                })
                .transpose()?,
        },
        created_at: row.get(16)?,
    })
}

fn load_wallet(conn: &rusqlite::Connection, organization_id: &str) -> rusqlite::Result<Option<Wallet>> {
    let result = conn.query_row(
        &format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE organization_id = ?1"),
        params![organization_id],
        wallet_from_row,
    );
    match result {
        Ok(wallet) => Ok(Some(wallet)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn find_by_reference(
    conn: &rusqlite::Connection,
    wallet_id: &str,
    transaction_type: TransactionType,
    reference: &str,
) -> rusqlite::Result<Option<Transaction>> {
    let result = conn.query_row(
        &format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions t \
             WHERE t.wallet_id = ?1 AND t.type = ?2 AND t.reference = ?3"
        ),
        params![wallet_id, transaction_type.to_string(), reference],
        transaction_from_row,
    );
    match result {
        Ok(t) => Ok(Some(t)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn load_transactions(
    conn: &rusqlite::Connection,
    wallet_id: &str,
) -> rusqlite::Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions t \
         WHERE t.wallet_id = ?1 ORDER BY t.sequence ASC"
    ))?;
    let rows = stmt.query_map(params![wallet_id], transaction_from_row)?;
    rows.collect()
}

/// Read, check, update, and append inside one SQLite transaction.
fn apply_movement(
    conn: &mut rusqlite::Connection,
    movement: Movement,
) -> rusqlite::Result<MovementOutcome> {
    let tx = conn.transaction()?;

    let Some(wallet) = load_wallet(&tx, movement.organization_id.as_str())? else {
        return Ok(MovementOutcome::NoWallet);
    };

    if let Some(existing) = find_by_reference(
        &tx,
        &wallet.id,
        movement.transaction_type,
        &movement.reference,
    )? {
        return Ok(MovementOutcome::Duplicate(existing));
    }

    let before = wallet.balance;
    let after = before + movement.delta;
    if after < Decimal::ZERO {
        return Ok(MovementOutcome::Insufficient {
            available: before,
            currency: wallet.currency,
        });
    }

    let state = ThresholdState {
        threshold: wallet.low_balance_threshold,
        alerts_enabled: wallet.alerts_enabled,
        active: wallet.low_balance_active,
    };
    let transition = state.evaluate(before, after);
    let now = now_timestamp();

    tx.execute(
        "UPDATE wallets SET balance = ?1, low_balance_active = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            after.to_string(),
            state.active_after(transition),
            now,
            wallet.id
        ],
    )?;

    let id = uuid::Uuid::new_v4().to_string();
    let amount = movement.delta.abs();
    let metadata = movement.metadata;
    let extra = metadata.extra.as_ref().map(|v| v.to_string());
    tx.execute(
        "INSERT INTO transactions (id, wallet_id, type, amount, currency, balance_before, \
         balance_after, reference, usage_type, provider, model, input_tokens, output_tokens, \
         actor, metadata, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            id,
            wallet.id,
            movement.transaction_type.to_string(),
            amount.to_string(),
            wallet.currency,
            before.to_string(),
            after.to_string(),
            movement.reference,
            metadata.usage_type.map(|u| u.to_string()),
            metadata.provider,
            metadata.model,
            metadata.input_tokens,
            metadata.output_tokens,
            metadata.actor,
            extra,
            now,
        ],
    )?;
    let sequence = tx.last_insert_rowid();
    tx.commit()?;

    Ok(MovementOutcome::Applied {
        transaction: Transaction {
            sequence,
            id,
            wallet_id: wallet.id,
            transaction_type: movement.transaction_type,
            amount,
            currency: wallet.currency,
            balance_before: before,
            balance_after: after,
            reference: movement.reference,
            metadata,
            created_at: now,
        },
        transition,
        threshold: wallet.low_balance_threshold,
    })
}

fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

fn require_positive(amount: Decimal) -> Result<(), TollgateError> {
    if amount <= Decimal::ZERO {
        return Err(TollgateError::Validation(format!(
            "amount must be greater than zero, got {amount}"
        )));
    }
    Ok(())
}

fn require_reference(reference: &str) -> Result<(), TollgateError> {
    if reference.trim().is_empty() {
        return Err(TollgateError::Validation(
            "transaction reference must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Owner of every organization's balance.
pub struct WalletLedger {
    db: Database,
    locks: DashMap<OrganizationId, Arc<Mutex<()>>>,
    alerts: broadcast::Sender<BalanceAlert>,
}

impl WalletLedger {
    /// Create a ledger over an opened (migrated) database.
    pub fn new(db: Database) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            db,
            locks: DashMap::new(),
            alerts,
        }
    }

    /// Receive low-balance signals raised and cleared from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceAlert> {
        self.alerts.subscribe()
    }

    /// Per-wallet write lock. Entries exist only for organizations that have
    /// a wallet, and wallets are never removed.
    async fn wallet_lock(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Arc<Mutex<()>>, TollgateError> {
        if let Some(lock) = self.locks.get(organization_id) {
            return Ok(lock.clone());
        }
        self.require_wallet(organization_id).await?;
        Ok(self
            .locks
            .entry(organization_id.clone())
            .or_default()
            .clone())
    }

    fn publish(&self, alert: Option<BalanceAlert>) {
        if let Some(alert) = alert {
            // No subscribers is not an error.
            let _ = self.alerts.send(alert);
        }
    }

    /// Provision a wallet with a zero balance. Returns the existing wallet if
    /// the organization already has one.
    pub async fn open_wallet(
        &self,
        organization_id: &OrganizationId,
        currency: &str,
        low_balance_threshold: Decimal,
        alerts_enabled: bool,
    ) -> Result<Wallet, TollgateError> {
        if !is_currency_code(currency) {
            return Err(TollgateError::Validation(format!(
                "`{currency}` is not a 3-letter uppercase currency code"
            )));
        }
        if low_balance_threshold < Decimal::ZERO {
            return Err(TollgateError::Validation(format!(
                "low-balance threshold must be non-negative, got {low_balance_threshold}"
            )));
        }

        let org = organization_id.clone();
        let currency = currency.to_string();
        let (wallet, created) = self
            .db
            .connection()
            .call(move |conn| {
                let now = now_timestamp();
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO wallets (id, organization_id, balance, currency, \
                     low_balance_threshold, alerts_enabled, low_balance_active, created_at, updated_at) \
                     VALUES (?1, ?2, '0', ?3, ?4, ?5, 0, ?6, ?6)",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        org.as_str(),
                        currency,
                        low_balance_threshold.to_string(),
                        alerts_enabled,
                        now,
                    ],
                )?;
                let wallet = load_wallet(conn, org.as_str())?
                    .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                Ok((wallet, inserted > 0))
            })
            .await
            .map_err(map_tr_err)?;

        if created {
            info!(
                organization_id = %organization_id,
                wallet_id = %wallet.id,
                currency = %wallet.currency,
                "wallet opened"
            );
        }
        Ok(wallet)
    }

    pub async fn get_wallet(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<Wallet>, TollgateError> {
        let org = organization_id.clone();
        self.db
            .connection()
            .call(move |conn| load_wallet(conn, org.as_str()))
            .await
            .map_err(map_tr_err)
    }

    async fn require_wallet(&self, organization_id: &OrganizationId) -> Result<Wallet, TollgateError> {
        self.get_wallet(organization_id)
            .await?
            .ok_or_else(|| TollgateError::WalletNotFound {
                organization_id: organization_id.to_string(),
            })
    }

    /// Current balance and currency.
    pub async fn get_balance(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<(Decimal, String), TollgateError> {
        let wallet = self.require_wallet(organization_id).await?;
        Ok((wallet.balance, wallet.currency))
    }

    /// All wallets, ordered by organization.
    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, TollgateError> {
        self.db
            .connection()
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {WALLET_COLUMNS} FROM wallets ORDER BY organization_id"
                ))?;
                let rows = stmt.query_map([], wallet_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Charge `amount` if the balance covers it.
    ///
    /// A repeated `reference` returns the transaction already recorded for it
    /// without charging again. On insufficient funds nothing is written.
    pub async fn try_debit(
        &self,
        organization_id: &OrganizationId,
        amount: Decimal,
        reference: &str,
        metadata: TransactionMetadata,
    ) -> Result<Transaction, TollgateError> {
        require_positive(amount)?;
        self.apply(Movement {
            organization_id: organization_id.clone(),
            transaction_type: TransactionType::Debit,
            delta: -amount,
            reference: reference.to_string(),
            metadata,
        })
        .await
    }

    /// Add funds. A repeated `reference` does not credit twice.
    pub async fn credit(
        &self,
        organization_id: &OrganizationId,
        amount: Decimal,
        reference: &str,
        metadata: TransactionMetadata,
    ) -> Result<Transaction, TollgateError> {
        require_positive(amount)?;
        self.apply(Movement {
            organization_id: organization_id.clone(),
            transaction_type: TransactionType::Credit,
            delta: amount,
            reference: reference.to_string(),
            metadata,
        })
        .await
    }

    /// Operator correction by a signed `delta`. Cannot make the balance negative.
    pub async fn adjust(
        &self,
        organization_id: &OrganizationId,
        delta: Decimal,
        reference: &str,
        metadata: TransactionMetadata,
    ) -> Result<Transaction, TollgateError> {
        if delta.is_zero() {
            return Err(TollgateError::Validation(
                "adjustment must not be zero".to_string(),
            ));
        }
        self.apply(Movement {
            organization_id: organization_id.clone(),
            transaction_type: TransactionType::Adjustment,
            delta,
            reference: reference.to_string(),
            metadata,
        })
        .await
    }

    async fn apply(&self, movement: Movement) -> Result<Transaction, TollgateError> {
        require_reference(&movement.reference)?;
        let organization_id = movement.organization_id.clone();
        let requested = movement.delta.abs();

        let lock = self.wallet_lock(&organization_id).await?;
        let _guard = lock.lock().await;

        let outcome = self
            .db
            .connection()
            .call(move |conn| apply_movement(conn, movement))
            .await
            .map_err(map_tr_err)?;

        match outcome {
            MovementOutcome::Applied {
                transaction,
                transition,
                threshold,
            } => {
                info!(
                    organization_id = %organization_id,
                    transaction_id = %transaction.id,
                    kind = %transaction.transaction_type,
                    amount = %transaction.amount,
                    balance = %transaction.balance_after,
                    reference = %transaction.reference,
                    "ledger movement recorded"
                );
                self.publish(alert_for(
                    transition,
                    &organization_id,
                    transaction.balance_after,
                    threshold,
                    &transaction.currency,
                ));
                Ok(transaction)
            }
            MovementOutcome::Duplicate(existing) => {
                debug!(
                    organization_id = %organization_id,
                    transaction_id = %existing.id,
                    reference = %existing.reference,
                    "reference already recorded, returning existing transaction"
                );
                Ok(existing)
            }
            MovementOutcome::Insufficient {
                available,
                currency,
            } => Err(TollgateError::InsufficientBalance {
                required: requested,
                available,
                currency,
            }),
            MovementOutcome::NoWallet => Err(TollgateError::WalletNotFound {
                organization_id: organization_id.to_string(),
            }),
        }
    }

    /// One page of transactions, newest first. `page` is 1-based; `page_size`
    /// is clamped to `1..=500`.
    pub async fn history(
        &self,
        organization_id: &OrganizationId,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Transaction>, TollgateError> {
        let wallet = self.require_wallet(organization_id).await?;
        let limit = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page.max(1) - 1) * i64::from(limit);

        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TRANSACTION_COLUMNS} FROM transactions t \
                     WHERE t.wallet_id = ?1 ORDER BY t.sequence DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows =
                    stmt.query_map(params![wallet.id, limit, offset], transaction_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Every transaction for the wallet, oldest first.
    pub async fn transactions(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Vec<Transaction>, TollgateError> {
        let wallet = self.require_wallet(organization_id).await?;
        self.db
            .connection()
            .call(move |conn| load_transactions(conn, &wallet.id))
            .await
            .map_err(map_tr_err)
    }

    /// Change the low-balance threshold and alert switch.
    ///
    /// A raised signal is cleared when the balance is now above the new threshold.
    pub async fn update_low_balance_settings(
        &self,
        organization_id: &OrganizationId,
        threshold: Decimal,
        alerts_enabled: bool,
    ) -> Result<Wallet, TollgateError> {
        if threshold < Decimal::ZERO {
            return Err(TollgateError::Validation(format!(
                "low-balance threshold must be non-negative, got {threshold}"
            )));
        }

        let lock = self.wallet_lock(organization_id).await?;
        let _guard = lock.lock().await;

        let org = organization_id.clone();
        let updated = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(mut wallet) = load_wallet(&tx, org.as_str())? else {
                    return Ok(None);
                };
                let cleared = wallet.low_balance_active && wallet.balance > threshold;
                wallet.low_balance_threshold = threshold;
                wallet.alerts_enabled = alerts_enabled;
                wallet.low_balance_active = wallet.low_balance_active && !cleared;
                wallet.updated_at = now_timestamp();
                tx.execute(
                    "UPDATE wallets SET low_balance_threshold = ?1, alerts_enabled = ?2, \
                     low_balance_active = ?3, updated_at = ?4 WHERE id = ?5",
                    params![
                        threshold.to_string(),
                        alerts_enabled,
                        wallet.low_balance_active,
                        wallet.updated_at,
                        wallet.id
                    ],
                )?;
                tx.commit()?;
                Ok(Some((wallet, cleared)))
            })
            .await
            .map_err(map_tr_err)?;

        let Some((wallet, cleared)) = updated else {
            return Err(TollgateError::WalletNotFound {
                organization_id: organization_id.to_string(),
            });
        };

        info!(
            organization_id = %organization_id,
            threshold = %threshold,
            alerts_enabled,
            "low-balance settings updated"
        );
        if cleared {
            self.publish(alert_for(
                ThresholdTransition::Clear,
                organization_id,
                wallet.balance,
                threshold,
                &wallet.currency,
            ));
        }
        Ok(wallet)
    }

    /// Totals, per-usage-type spend, and the `recent` newest transactions.
    pub async fn summary(
        &self,
        organization_id: &OrganizationId,
        recent: usize,
    ) -> Result<WalletSummary, TollgateError> {
        let wallet = self.require_wallet(organization_id).await?;
        let transactions = self.transactions(organization_id).await?;

        let mut total_debited = Decimal::ZERO;
        let mut total_credited = Decimal::ZERO;
        let mut net_adjustments = Decimal::ZERO;
        let mut spend_by_usage_type = BTreeMap::new();

        for t in &transactions {
            match t.transaction_type {
                TransactionType::Debit => {
                    total_debited += t.amount;
                    *spend_by_usage_type
                        .entry(t.metadata.usage_type.unwrap_or(UsageType::Other))
                        .or_insert(Decimal::ZERO) += t.amount;
                }
                TransactionType::Credit => total_credited += t.amount,
                TransactionType::Adjustment => net_adjustments += t.signed_amount(),
            }
        }

        Ok(WalletSummary {
            wallet,
            total_debited,
            total_credited,
            net_adjustments,
            transaction_count: transactions.len(),
            last_activity: transactions.last().map(|t| t.created_at.clone()),
            spend_by_usage_type,
            recent: transactions.iter().rev().take(recent).cloned().collect(),
        })
    }

    /// Whether replaying the wallet's history reproduces its stored balance.
    pub async fn verify(&self, organization_id: &OrganizationId) -> Result<bool, TollgateError> {
        let wallet = self.require_wallet(organization_id).await?;
        let transactions = self.transactions(organization_id).await?;
        let replayed = replay(&transactions);
        if replayed != wallet.balance {
            tracing::error!(
                organization_id = %organization_id,
                stored = %wallet.balance,
                replayed = %replayed,
                "ledger replay does not match wallet balance"
            );
        }
        Ok(replayed == wallet.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    async fn test_ledger() -> WalletLedger {
        WalletLedger::new(Database::open_in_memory().await.unwrap())
    }

    async fn funded(ledger: &WalletLedger, org: &str, amount: Decimal) -> OrganizationId {
        let org = OrganizationId::from(org);
        ledger
            .open_wallet(&org, "USD", dec!(1.00), true)
            .await
            .unwrap();
        if amount > Decimal::ZERO {
            ledger
                .credit(&org, amount, "initial-funding", TransactionMetadata::default())
                .await
                .unwrap();
        }
        org
    }

    fn chat_usage() -> TransactionMetadata {
        TransactionMetadata {
            usage_type: Some(UsageType::ChatResponse),
            provider: Some("openai".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            input_tokens: Some(120),
            output_tokens: Some(80),
            ..TransactionMetadata::default()
        }
    }

    #[tokio::test]
    async fn open_wallet_is_idempotent_and_starts_at_zero() {
        let ledger = test_ledger().await;
        let org = OrganizationId::from("org-1");
        let first = ledger.open_wallet(&org, "USD", dec!(1), true).await.unwrap();
        let second = ledger.open_wallet(&org, "USD", dec!(5), false).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.balance, Decimal::ZERO);
        assert_eq!(second.low_balance_threshold, dec!(1));
    }

    #[tokio::test]
    async fn open_wallet_rejects_bad_currency() {
        let ledger = test_ledger().await;
        let err = ledger
            .open_wallet(&OrganizationId::from("org-1"), "usd", dec!(1), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::Validation(_)));
    }

    #[tokio::test]
    async fn debit_records_balances_and_metadata() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-a", dec!(10.00)).await;

        let t = ledger
            .try_debit(&org, dec!(0.003600), "req-1", chat_usage())
            .await
            .unwrap();
        assert_eq!(t.transaction_type, TransactionType::Debit);
        assert_eq!(t.amount, dec!(0.003600));
        assert_eq!(t.balance_before, dec!(10.00));
        assert_eq!(t.balance_after, dec!(9.996400));
        assert_eq!(t.metadata.usage_type, Some(UsageType::ChatResponse));

        let (balance, currency) = ledger.get_balance(&org).await.unwrap();
        assert_eq!(balance, dec!(9.9964));
        assert_eq!(currency, "USD");

        let stored = ledger.history(&org, 1, 10).await.unwrap();
        assert_eq!(stored[0], t);
    }

    #[tokio::test]
    async fn insufficient_debit_writes_nothing() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-b", dec!(0.0005)).await;

        let err = ledger
            .try_debit(&org, dec!(0.01), "req-1", TransactionMetadata::default())
            .await
            .unwrap_err();
        match err {
            TollgateError::InsufficientBalance {
                required,
                available,
                ..
            } => {
                assert_eq!(required, dec!(0.01));
                assert_eq!(available, dec!(0.0005));
            }
            other => panic!("expected InsufficientBalance, got {other:?}"),
        }
        assert_eq!(ledger.get_balance(&org).await.unwrap().0, dec!(0.0005));
        assert_eq!(ledger.transactions(&org).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn debit_can_drain_to_exactly_zero() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-c", dec!(2.5)).await;
        let t = ledger
            .try_debit(&org, dec!(2.5), "req-1", TransactionMetadata::default())
            .await
            .unwrap();
        assert_eq!(t.balance_after, Decimal::ZERO);
    }

    #[tokio::test]
    async fn repeated_reference_charges_once() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-d", dec!(5)).await;

        let first = ledger
            .try_debit(&org, dec!(1), "req-1", TransactionMetadata::default())
            .await
            .unwrap();
        let second = ledger
            .try_debit(&org, dec!(1), "req-1", TransactionMetadata::default())
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(ledger.get_balance(&org).await.unwrap().0, dec!(4));

        // Recharge retries do not double-credit either.
        ledger
            .credit(&org, dec!(3), "recharge-9", TransactionMetadata::default())
            .await
            .unwrap();
        ledger
            .credit(&org, dec!(3), "recharge-9", TransactionMetadata::default())
            .await
            .unwrap();
        assert_eq!(ledger.get_balance(&org).await.unwrap().0, dec!(7));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-e", dec!(5)).await;
        for amount in [Decimal::ZERO, dec!(-1)] {
            assert!(matches!(
                ledger
                    .try_debit(&org, amount, "r", TransactionMetadata::default())
                    .await,
                Err(TollgateError::Validation(_))
            ));
            assert!(matches!(
                ledger
                    .credit(&org, amount, "r", TransactionMetadata::default())
                    .await,
                Err(TollgateError::Validation(_))
            ));
        }
        assert!(matches!(
            ledger
                .adjust(&org, Decimal::ZERO, "r", TransactionMetadata::default())
                .await,
            Err(TollgateError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn adjustments_carry_direction_in_balances() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-f", dec!(5)).await;

        let down = ledger
            .adjust(&org, dec!(-2), "fix-1", TransactionMetadata::actor("ops"))
            .await
            .unwrap();
        assert_eq!(down.amount, dec!(2));
        assert_eq!(down.balance_after - down.balance_before, dec!(-2));
        assert_eq!(down.metadata.actor.as_deref(), Some("ops"));

        let up = ledger
            .adjust(&org, dec!(0.5), "fix-2", TransactionMetadata::actor("ops"))
            .await
            .unwrap();
        assert_eq!(up.signed_amount(), dec!(0.5));

        let err = ledger
            .adjust(&org, dec!(-100), "fix-3", TransactionMetadata::actor("ops"))
            .await
            .unwrap_err();
        assert!(matches!(err, TollgateError::InsufficientBalance { .. }));
        assert_eq!(ledger.get_balance(&org).await.unwrap().0, dec!(3.5));
    }

    #[tokio::test]
    async fn unknown_wallet_is_reported() {
        let ledger = test_ledger().await;
        let org = OrganizationId::from("ghost");
        assert!(matches!(
            ledger
                .try_debit(&org, dec!(1), "r", TransactionMetadata::default())
                .await,
            Err(TollgateError::WalletNotFound { .. })
        ));
        assert!(matches!(
            ledger.history(&org, 1, 10).await,
            Err(TollgateError::WalletNotFound { .. })
        ));
        assert!(ledger.get_wallet(&org).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_organizations_leave_no_lock_behind() {
        let ledger = test_ledger().await;
        for i in 0..5 {
            let ghost = OrganizationId::from(format!("ghost-{i}").as_str());
            assert!(
                ledger
                    .credit(&ghost, dec!(1), "r", TransactionMetadata::default())
                    .await
                    .is_err()
            );
            assert!(
                ledger
                    .update_low_balance_settings(&ghost, dec!(1), true)
                    .await
                    .is_err()
            );
        }
        assert_eq!(ledger.locks.len(), 0);

        let org = funded(&ledger, "org-l", dec!(5)).await;
        ledger
            .try_debit(&org, dec!(1), "req-1", TransactionMetadata::default())
            .await
            .unwrap();
        assert_eq!(ledger.locks.len(), 1);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_paginated() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-g", dec!(100)).await;
        for i in 0..5 {
            ledger
                .try_debit(&org, dec!(1), &format!("req-{i}"), TransactionMetadata::default())
                .await
                .unwrap();
        }

        let page1 = ledger.history(&org, 1, 2).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].reference, "req-4");
        assert_eq!(page1[1].reference, "req-3");
        assert!(page1[0].sequence > page1[1].sequence);

        let page3 = ledger.history(&org, 3, 2).await.unwrap();
        assert_eq!(page3.len(), 2);
        assert_eq!(page3[1].reference, "initial-funding");

        // Page 0 is treated as page 1; a zero page size is clamped up to 1.
        assert_eq!(ledger.history(&org, 0, 0).await.unwrap().len(), 1);
        assert_eq!(ledger.history(&org, 1, 10_000).await.unwrap().len(), 6);
        assert!(ledger.history(&org, 9, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn low_balance_signal_fires_once_and_clears() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-h", dec!(1.50)).await;
        let mut alerts = ledger.subscribe();

        ledger
            .try_debit(&org, dec!(0.60), "req-1", TransactionMetadata::default())
            .await
            .unwrap();
        let alert = alerts.try_recv().unwrap();
        assert!(matches!(alert, BalanceAlert::Low { balance, .. } if balance == dec!(0.90)));
        assert!(ledger.get_wallet(&org).await.unwrap().unwrap().low_balance_active);

        ledger
            .try_debit(&org, dec!(0.10), "req-2", TransactionMetadata::default())
            .await
            .unwrap();
        assert!(alerts.try_recv().is_err(), "no second alert while below");

        ledger
            .credit(&org, dec!(5), "recharge-1", TransactionMetadata::default())
            .await
            .unwrap();
        assert!(matches!(
            alerts.try_recv().unwrap(),
            BalanceAlert::Cleared { .. }
        ));
        assert!(!ledger.get_wallet(&org).await.unwrap().unwrap().low_balance_active);
    }

    #[tokio::test]
    async fn disabled_alerts_stay_silent() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-i", dec!(2)).await;
        ledger
            .update_low_balance_settings(&org, dec!(1), false)
            .await
            .unwrap();
        let mut alerts = ledger.subscribe();
        ledger
            .try_debit(&org, dec!(1.5), "req-1", TransactionMetadata::default())
            .await
            .unwrap();
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn lowering_threshold_clears_raised_signal() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-j", dec!(1.50)).await;
        ledger
            .try_debit(&org, dec!(1), "req-1", TransactionMetadata::default())
            .await
            .unwrap();
        let mut alerts = ledger.subscribe();

        let wallet = ledger
            .update_low_balance_settings(&org, dec!(0.10), true)
            .await
            .unwrap();
        assert!(!wallet.low_balance_active);
        assert_eq!(wallet.low_balance_threshold, dec!(0.10));
        assert!(matches!(
            alerts.try_recv().unwrap(),
            BalanceAlert::Cleared { .. }
        ));

        assert!(matches!(
            ledger
                .update_low_balance_settings(&org, dec!(-1), true)
                .await,
            Err(TollgateError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn summary_totals_by_type_and_usage() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-k", dec!(10)).await;
        ledger
            .try_debit(&org, dec!(1), "req-1", chat_usage())
            .await
            .unwrap();
        ledger
            .try_debit(
                &org,
                dec!(2),
                "req-2",
                TransactionMetadata {
                    usage_type: Some(UsageType::Translation),
                    ..TransactionMetadata::default()
                },
            )
            .await
            .unwrap();
        ledger
            .try_debit(&org, dec!(0.5), "req-3", TransactionMetadata::default())
            .await
            .unwrap();
        ledger
            .adjust(&org, dec!(-0.25), "fix-1", TransactionMetadata::actor("ops"))
            .await
            .unwrap();

        let summary = ledger.summary(&org, 2).await.unwrap();
        assert_eq!(summary.total_credited, dec!(10));
        assert_eq!(summary.total_debited, dec!(3.5));
        assert_eq!(summary.net_adjustments, dec!(-0.25));
        assert_eq!(summary.transaction_count, 5);
        assert_eq!(summary.spend_by_usage_type[&UsageType::ChatResponse], dec!(1));
        assert_eq!(summary.spend_by_usage_type[&UsageType::Translation], dec!(2));
        assert_eq!(summary.spend_by_usage_type[&UsageType::Other], dec!(0.5));
        assert_eq!(summary.recent.len(), 2);
        assert_eq!(summary.recent[0].reference, "fix-1");
        assert_eq!(summary.wallet.balance, dec!(6.25));
        assert!(summary.last_activity.is_some());
    }

    #[tokio::test]
    async fn extra_metadata_round_trips_through_storage() {
        let ledger = test_ledger().await;
        let org = funded(&ledger, "org-l", dec!(1)).await;
        let metadata = TransactionMetadata {
            extra: Some(serde_json::json!({"campaign": "spring", "retries": 2})),
            ..TransactionMetadata::actor("alice")
        };
        ledger
            .try_debit(&org, dec!(0.1), "req-1", metadata.clone())
            .await
            .unwrap();
        let stored = &ledger.history(&org, 1, 1).await.unwrap()[0];
        assert_eq!(stored.metadata, metadata);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_debits_never_overdraw() {
        let ledger = Arc::new(test_ledger().await);
        let org = funded(&ledger, "org-m", dec!(10)).await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let ledger = ledger.clone();
            let org = org.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .try_debit(&org, dec!(1), &format!("req-{i}"), TransactionMetadata::default())
                    .await
            }));
        }

        let mut succeeded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(TollgateError::InsufficientBalance { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(succeeded, 10);
        assert_eq!(rejected, 40);
        assert_eq!(ledger.get_balance(&org).await.unwrap().0, Decimal::ZERO);
        assert!(ledger.verify(&org).await.unwrap());
    }

    #[test]
    fn replay_of_empty_history_is_zero() {
        assert_eq!(replay(&[]), Decimal::ZERO);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Credit(i64),
        Debit(i64),
        Adjust(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        // Amounts in millionths of a currency unit.
        prop_oneof![
            (1i64..5_000_000).prop_map(Op::Credit),
            (1i64..5_000_000).prop_map(Op::Debit),
            (-2_000_000i64..2_000_000)
                .prop_filter("non-zero", |v| *v != 0)
                .prop_map(Op::Adjust),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        /// Property: whatever mix of movements is accepted or rejected,
        /// replaying the stored history reproduces the stored balance and
        /// every entry chains from the previous one.
        #[test]
        fn replay_reproduces_balance(ops in prop::collection::vec(op_strategy(), 1..25)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let ledger = test_ledger().await;
                let org = funded(&ledger, "org-prop", Decimal::ZERO).await;

                for (i, op) in ops.iter().enumerate() {
                    let reference = format!("op-{i}");
                    let meta = TransactionMetadata::default();
                    let result = match op {
                        Op::Credit(v) => ledger.credit(&org, Decimal::new(*v, 6), &reference, meta).await,
                        Op::Debit(v) => ledger.try_debit(&org, Decimal::new(*v, 6), &reference, meta).await,
                        Op::Adjust(v) => ledger.adjust(&org, Decimal::new(*v, 6), &reference, meta).await,
                    };
                    match result {
                        Ok(_) | Err(TollgateError::InsufficientBalance { .. }) => {}
                        Err(other) => panic!("unexpected error: {other:?}"),
                    }
                }

                let transactions = ledger.transactions(&org).await.unwrap();
                let (balance, _) = ledger.get_balance(&org).await.unwrap();
                prop_assert!(balance >= Decimal::ZERO);
                prop_assert_eq!(replay(&transactions), balance);

                let mut running = Decimal::ZERO;
                for t in &transactions {
                    prop_assert_eq!(t.balance_before, running);
                    prop_assert_eq!(t.balance_after, running + t.signed_amount());
                    prop_assert!(t.amount > Decimal::ZERO);
                    running = t.balance_after;
                }
                Ok(())
            })?;
        }
    }
}
