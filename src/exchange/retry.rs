//! Caller-side retry for exchange reads.
//!
//! Only transport failures are retried. HTTP-status and vendor errors carry a
//! definite answer from the exchange and are returned on first sight.

use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

use crate::errors::{PipelineError, Result};
use crate::exchange::kucoin::TradeHistoryClient;
use crate::models::Fill;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: usize) -> Self {
        Self {
            attempts,
            ..Self::default()
        }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = self.base_delay.as_millis().max(1) as u64;
        ExponentialBackoff::from_millis(2)
            .factor(factor / 2)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.attempts.saturating_sub(1))
    }
}

/// Run `op`, retrying transient failures per `policy`.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    RetryIf::spawn(policy.delays(), || op(), |e: &PipelineError| {
        let retry = e.is_transient();
        if retry {
            warn!(error = %e, "transient exchange failure, retrying");
        }
        retry
    })
    .await
}

pub async fn fetch_fills_with_retry(
    client: &TradeHistoryClient,
    symbol: Option<&str>,
    limit: u32,
    policy: RetryPolicy,
) -> Result<Vec<Fill>> {
    with_retry(policy, || client.fetch_fills(symbol, limit)).await
}
