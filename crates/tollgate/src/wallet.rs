// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tollgate wallet` and `tollgate transactions` command implementations.

use std::sync::Arc;

use colored::Colorize;
use tollgate_broker::{Actor, AdminService};
use tollgate_cache::MemoryCache;
use tollgate_config::TollgateConfig;
use tollgate_core::{OrganizationId, TollgateError};
use tollgate_cost::{Transaction, TransactionType, Wallet, WalletLedger, WalletSummary};
use tollgate_storage::Database;

use crate::WalletCommands;

async fn admin(config: &TollgateConfig) -> Result<AdminService, TollgateError> {
    let db = Database::from_config(&config.storage).await?;
    Ok(AdminService::new(
        Arc::new(WalletLedger::new(db)),
        Arc::new(MemoryCache::from_config(&config.cache)),
        config.wallet.clone(),
    ))
}

fn operator(by: Option<String>) -> Option<Actor> {
    by.map(|name| Actor {
        user_id: None,
        user_name: Some(name),
    })
}

pub async fn run(
    config: &TollgateConfig,
    action: WalletCommands,
    color: bool,
) -> Result<(), TollgateError> {
    let admin = admin(config).await?;

    match action {
        WalletCommands::Open {
            organization,
            currency,
            threshold,
            no_alerts,
        } => {
            let org = OrganizationId::from(organization.as_str());
            let wallet = admin
                .open_wallet(&org, currency.as_deref(), threshold, no_alerts.then_some(false))
                .await?;
            print_wallet(&wallet, color);
        }
        WalletCommands::Show {
            organization,
            recent,
            json,
        } => {
            let summary = admin
                .wallet_stats(&organization.as_str().into(), recent)
                .await?;
            if json {
                print_json(&summary)?;
            } else {
                print_summary(&summary, color);
            }
        }
        WalletCommands::List => {
            let wallets = admin.list_wallets().await?;
            if wallets.is_empty() {
                println!("no wallets");
            }
            for wallet in &wallets {
                print_wallet(wallet, color);
            }
        }
        WalletCommands::Credit {
            organization,
            amount,
            reference,
            by,
        } => {
            let actor = operator(by);
            let t = admin
                .credit(
                    &organization.as_str().into(),
                    amount,
                    reference.as_deref(),
                    actor.as_ref(),
                )
                .await?;
            print_movement(&t, color);
        }
        WalletCommands::Adjust {
            organization,
            delta,
            reason,
            by,
        } => {
            let actor = operator(by);
            let t = admin
                .adjust(&organization.as_str().into(), delta, &reason, actor.as_ref())
                .await?;
            print_movement(&t, color);
        }
        WalletCommands::Threshold {
            organization,
            threshold,
            no_alerts,
        } => {
            let wallet = admin
                .update_low_balance_settings(&organization.as_str().into(), threshold, !no_alerts)
                .await?;
            print_wallet(&wallet, color);
        }
        WalletCommands::Verify { organization } => {
            let consistent = admin.verify(&organization.as_str().into()).await?;
            match (consistent, color) {
                (true, true) => println!("{} history replays to the stored balance", "✓".green()),
                (true, false) => println!("[OK] history replays to the stored balance"),
                (false, true) => println!("{} history does not match the stored balance", "✗".red()),
                (false, false) => println!("[FAIL] history does not match the stored balance"),
            }
            if !consistent {
                return Err(TollgateError::Internal(format!(
                    "ledger mismatch for organization {organization}"
                )));
            }
        }
    }
    Ok(())
}

pub async fn transactions(
    config: &TollgateConfig,
    organization: &str,
    page: u32,
    page_size: u32,
    json: bool,
    color: bool,
) -> Result<(), TollgateError> {
    let admin = admin(config).await?;
    let page_items = admin
        .list_transactions(&organization.into(), page, page_size)
        .await?;

    if json {
        return print_json(&page_items);
    }
    if page_items.is_empty() {
        println!("no transactions on page {page}");
    }
    for t in &page_items {
        print_movement(t, color);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), TollgateError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| TollgateError::Internal(format!("failed to serialize output: {e}")))?;
    println!("{out}");
    Ok(())
}

fn print_wallet(wallet: &Wallet, color: bool) {
    let balance = format!("{} {}", wallet.balance, wallet.currency);
    let low = wallet.low_balance_active;
    if color {
        let balance = if low { balance.yellow() } else { balance.green() };
        println!("{}  {}", wallet.organization_id.as_str().bold(), balance);
    } else {
        println!("{}  {}", wallet.organization_id, balance);
    }
    println!(
        "    threshold {} (alerts {}){}",
        wallet.low_balance_threshold,
        if wallet.alerts_enabled { "on" } else { "off" },
        if low { ", LOW BALANCE" } else { "" }
    );
}

fn print_summary(summary: &WalletSummary, color: bool) {
    let currency = &summary.wallet.currency;
    println!();
    print_wallet(&summary.wallet, color);
    println!("  {}", "-".repeat(40));
    println!("    credited:    {} {currency}", summary.total_credited);
    println!("    debited:     {} {currency}", summary.total_debited);
    println!("    adjustments: {} {currency}", summary.net_adjustments);
    println!("    entries:     {}", summary.transaction_count);
    if !summary.spend_by_usage_type.is_empty() {
        println!("    spend by usage type:");
        for (usage_type, amount) in &summary.spend_by_usage_type {
            println!("      {usage_type:<20} {amount} {currency}");
        }
    }
    if !summary.recent.is_empty() {
        println!("    recent:");
        for t in &summary.recent {
            print!("  ");
            print_movement(t, color);
        }
    }
}

fn print_movement(t: &Transaction, color: bool) {
    let amount = format!("{:+}", t.signed_amount());
    let kind = t.transaction_type.to_string();
    let kind = if color {
        match t.transaction_type {
            TransactionType::Credit => kind.green().to_string(),
            TransactionType::Debit => kind.red().to_string(),
            TransactionType::Adjustment => kind.yellow().to_string(),
        }
    } else {
        kind
    };
    println!(
        "  {}  {kind:<10} {amount:>14} {}  -> {}  {}",
        t.created_at, t.currency, t.balance_after, t.reference
    );
}
