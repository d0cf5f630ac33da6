//! Ledger Inspection Tool
//!
//! One-off queries against the event ledger and the exchange, printed as the
//! same text the chat receives (or JSON).
//!
//! Usage:
//!   cargo run --bin ledger_inspect -- --db-path ./fundbot_ledger.db recent --limit 10
//!   cargo run --bin ledger_inspect -- report 2024-05-01 2024-05-07 --balances 1000 1100
//!   cargo run --bin ledger_inspect -- fills --symbol BTC-USDT --limit 100
//!   cargo run --bin ledger_inspect -- classify --subject "Deposit" --body "You have received a deposit of 5 USDT"

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use fundbot_backend::{
    config::Config,
    events::{classify, extract_amount, LedgerStore},
    exchange::{fetch_fills_with_retry, RetryPolicy, TradeHistoryClient},
    notify::format::{format_event_report, format_fill_report, format_recent},
    reports::{aggregate_events, aggregate_fills, utc_offset, ReportWindow},
};

/// Inspect the fundbot event ledger and exchange trade history
#[derive(Parser, Debug)]
#[command(name = "ledger_inspect")]
#[command(about = "Query the fundbot event ledger and exchange fills")]
struct Cli {
    /// Path to the SQLite ledger
    #[arg(short, long, env = "DATABASE_PATH", default_value = "./fundbot_ledger.db")]
    db_path: String,

    /// Print JSON instead of chat text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Most recent events, newest first
    Recent {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Aggregated report for a date range (default: today)
    Report {
        /// Start date, YYYY-MM-DD
        from: Option<String>,
        /// Inclusive end date, YYYY-MM-DD
        to: Option<String>,
        /// Start-of-period and current balance for PnL
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        balances: Option<Vec<Decimal>>,
    },

    /// Fetch fills from the exchange and summarise them
    Fills {
        #[arg(short, long)]
        symbol: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: u32,
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        balances: Option<Vec<Decimal>>,
    },

    /// Run the classifier on a subject/body pair without touching the ledger
    Classify {
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long)]
        body: String,
    },
}

fn balance_pair(balances: Option<Vec<Decimal>>) -> Result<Option<(Decimal, Decimal)>> {
    match balances.as_deref() {
        None => Ok(None),
        Some([start, end]) => Ok(Some((*start, *end))),
        Some(other) => bail!("expected two balances, got {}", other.len()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();
    let offset = utc_offset(config.report_utc_offset_hours)?;

    match cli.command {
        Commands::Recent { limit } => {
            let store = LedgerStore::new(&cli.db_path)
                .with_context(|| format!("Failed to open ledger at {}", cli.db_path))?;
            let events = store.query_recent(limit)?;
            if cli.json {
                print_json(&events)?;
            } else {
                println!("{}", format_recent(&events, offset));
            }
        }

        Commands::Report { from, to, balances } => {
            let store = LedgerStore::new(&cli.db_path)
                .with_context(|| format!("Failed to open ledger at {}", cli.db_path))?;
            let window = ReportWindow::from_bounds(from.as_deref(), to.as_deref(), offset, Utc::now())?;
            let events = store.query_range(window.start, window.end)?;
            let report = aggregate_events(
                &events,
                window.start,
                window.end,
                &config.reporting_currency,
                balance_pair(balances)?,
            )?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{}", format_event_report(&report, offset));
            }
        }

        Commands::Fills {
            symbol,
            limit,
            balances,
        } => {
            let Some(exchange) = &config.exchange else {
                bail!("KUCOIN_API_KEY, KUCOIN_API_SECRET and KUCOIN_API_PASSPHRASE are required");
            };
            let client = TradeHistoryClient::new(exchange)?;
            let policy = RetryPolicy::with_attempts(exchange.retry_attempts.max(1));
            let fills = fetch_fills_with_retry(&client, symbol.as_deref(), limit, policy)
                .await
                .context("Failed to fetch fills")?;
            let report = aggregate_fills(&fills, balance_pair(balances)?)?;
            if cli.json {
                print_json(&report)?;
            } else {
                println!("{}", format_fill_report(&report, symbol.as_deref()));
            }
        }

        Commands::Classify { subject, body } => {
            let classified = classify(&subject, &body);
            let detected = extract_amount(&format!("{subject}\n{body}"));
            if cli.json {
                print_json(&serde_json::json!({
                    "classified": classified,
                    "detected_amount": detected,
                }))?;
            } else {
                println!("kind:     {}", classified.kind);
                println!("amount:   {:?}", classified.amount);
                println!("asset:    {:?}", classified.asset);
                println!("order_id: {:?}", classified.order_id);
                println!("detected: {:?}", detected);
            }
        }
    }

    Ok(())
}
