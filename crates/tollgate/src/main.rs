// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tollgate - metered AI request broker with a prepaid wallet ledger.
//!
//! This is the operator CLI: wallet provisioning and top-ups, transaction
//! history, one-shot requests through the configured providers, and config
//! validation.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod ask;
mod wallet;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tollgate_config::TollgateConfig;

/// Tollgate - metered AI request broker.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision, inspect, and fund organization wallets.
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },
    /// List an organization's transactions, newest first.
    Transactions {
        organization: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        #[arg(long)]
        json: bool,
    },
    /// Send one request through the broker and print the billed result.
    Ask(ask::AskArgs),
    /// Manage Tollgate configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum WalletCommands {
    /// Open a wallet with a zero balance.
    Open {
        organization: String,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        threshold: Option<Decimal>,
        /// Do not emit low-balance signals for this wallet.
        #[arg(long)]
        no_alerts: bool,
    },
    /// Show balance, totals, and recent activity.
    Show {
        organization: String,
        #[arg(long, default_value_t = 10)]
        recent: usize,
        #[arg(long)]
        json: bool,
    },
    /// List every wallet.
    List,
    /// Add funds.
    Credit {
        organization: String,
        amount: Decimal,
        /// Idempotency reference, e.g. an invoice number.
        #[arg(long)]
        reference: Option<String>,
        /// Operator recorded on the transaction.
        #[arg(long)]
        by: Option<String>,
    },
    /// Apply a signed correction.
    Adjust {
        organization: String,
        #[arg(allow_hyphen_values = true)]
        delta: Decimal,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Change the low-balance threshold and alert switch.
    Threshold {
        organization: String,
        threshold: Decimal,
        #[arg(long)]
        no_alerts: bool,
    },
    /// Replay the history and compare it with the stored balance.
    Verify { organization: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate the configuration and print a summary.
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tollgate_config::load_and_validate_path(path),
        None => tollgate_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tollgate_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.broker.log_level);
    let color = !cli.plain && std::io::stdout().is_terminal();

    let outcome = match cli.command {
        Some(Commands::Wallet { action }) => wallet::run(&config, action, color).await,
        Some(Commands::Transactions {
            organization,
            page,
            page_size,
            json,
        }) => wallet::transactions(&config, &organization, page, page_size, json, color).await,
        Some(Commands::Ask(args)) => ask::run(config, args, color).await,
        Some(Commands::Config {
            action: ConfigCommands::Check,
        }) => {
            print_config_summary(&config, color);
            Ok(())
        }
        None => {
            println!("tollgate: use --help for available commands");
            Ok(())
        }
    };

    if let Err(err) = outcome {
        if color {
            use colored::Colorize;
            eprintln!("{} {err}", "error:".red().bold());
        } else {
            eprintln!("error: {err}");
        }
        std::process::exit(1);
    }
}

fn print_config_summary(config: &TollgateConfig, color: bool) {
    if color {
        use colored::Colorize;
        println!("{} configuration is valid", "✓".green());
    } else {
        println!("[OK] configuration is valid");
    }
    println!("  database:  {}", config.storage.database_path);
    println!(
        "  cache:     {} (ttl {}s, max {} entries)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.ttl_secs,
        config.cache.max_entries
    );
    println!("  retries:   {}", config.broker.max_retries);
    for provider in &config.providers {
        println!(
            "  provider:  {} ({:?}, default model {}, {} priced models)",
            provider.name,
            provider.kind,
            provider.default_model,
            provider.models.len()
        );
    }
    for (usage_type, route) in &config.routing.routes {
        println!(
            "  route:     {usage_type} -> {}/{}",
            route.provider,
            route.model.as_deref().unwrap_or("(default)")
        );
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tollgate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_negative_adjustment() {
        let cli = Cli::parse_from([
            "tollgate", "wallet", "adjust", "org-1", "-2.50", "--reason", "refund",
        ]);
        match cli.command {
            Some(Commands::Wallet {
                action: WalletCommands::Adjust { delta, reason, .. },
            }) => {
                assert_eq!(delta, rust_decimal_macros::dec!(-2.50));
                assert_eq!(reason, "refund");
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_ask_options() {
        let cli = Cli::parse_from([
            "tollgate",
            "ask",
            "org-1",
            "Translate hello",
            "--usage-type",
            "translation",
            "--max-tokens",
            "64",
        ]);
        match cli.command {
            Some(Commands::Ask(args)) => {
                assert_eq!(args.organization, "org-1");
                assert_eq!(args.usage_type.as_deref(), Some("translation"));
                assert_eq!(args.max_tokens, Some(64));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }
}
