//! fundbot - exchange mail notifier and reporting service
//!
//! Polls the mailbox for exchange notifications, records them in the ledger,
//! pushes a chat message per new event and serves reports over HTTP.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fundbot_backend::{
    api::{create_router, AppState},
    config::Config,
    events::LedgerStore,
    exchange::{RetryPolicy, TradeHistoryClient},
    mailbox::{GmailClient, MailboxPoller, PollerSettings},
    notify::{LogNotifier, Notifier, TelegramNotifier},
    reports::utc_offset,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    info!("🚀 fundbot starting");

    let config = Config::from_env();
    let report_offset =
        utc_offset(config.report_utc_offset_hours).context("Invalid REPORT_UTC_OFFSET_HOURS")?;

    let store = Arc::new(
        LedgerStore::new(&config.database_path)
            .with_context(|| format!("Failed to open ledger at {}", config.database_path))?,
    );
    info!("📊 Ledger initialized at: {}", config.database_path);
    info!("💾 Existing events in ledger: {}", store.len()?);

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => {
            Arc::new(TelegramNotifier::new(telegram).context("Failed to initialize Telegram")?)
        }
        None => {
            warn!("⚠️  Telegram not configured - notifications go to the log only");
            Arc::new(LogNotifier)
        }
    };

    let exchange = match &config.exchange {
        Some(exchange) => match TradeHistoryClient::new(exchange) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Failed to initialize exchange client: {e}");
                None
            }
        },
        None => None,
    };
    let retry = config
        .exchange
        .as_ref()
        .map(|e| RetryPolicy::with_attempts(e.retry_attempts.max(1)))
        .unwrap_or_default();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_handle = match &config.mailbox {
        Some(mailbox) => {
            let transport = Arc::new(GmailClient::new(mailbox).context("Failed to build Gmail client")?);
            let poller = MailboxPoller::new(
                transport,
                store.clone(),
                notifier.clone(),
                PollerSettings::from_config(mailbox, report_offset),
            )
            .context("Failed to start mailbox poller")?;
            Some(tokio::spawn(poller.run(shutdown_rx)))
        }
        None => {
            warn!("⚠️  Mailbox not configured - ingestion disabled, serving reports only");
            None
        }
    };

    let app = create_router(AppState {
        store,
        exchange,
        retry,
        reporting_currency: config.reporting_currency.clone(),
        report_offset,
    });

    let listener = TcpListener::bind(&config.http_bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_bind))?;
    info!("🎯 API server listening on {}", config.http_bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = poller_handle {
        if let Err(e) = handle.await {
            warn!("Mailbox poller task ended abnormally: {e}");
        }
    }

    info!("👋 fundbot stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate directory (common when running with --manifest-path from elsewhere)
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fundbot_backend=debug,fundbot=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
