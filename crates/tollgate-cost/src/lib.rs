// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pricing, cost calculation, and the prepaid wallet ledger.
//!
//! - **Pricing**: exact per-token prices from the provider tables, rounded to
//!   the wallet currency's precision
//! - **Ledger**: atomic, idempotent debits and credits with an append-only
//!   transaction history
//! - **Threshold**: low-balance signal raised and cleared as balances move

pub mod ledger;
pub mod pricing;
pub mod threshold;

pub use ledger::{
    Transaction, TransactionMetadata, TransactionType, Wallet, WalletLedger, WalletSummary,
    replay,
};
pub use pricing::{CostCalculator, ModelPricing};
pub use threshold::BalanceAlert;
