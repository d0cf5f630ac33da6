//! Application configuration.
//!
//! Built once at startup from the environment (after `.env` is loaded) and
//! passed explicitly to each component. A component whose credentials are
//! absent is disabled; one whose credentials are only partially present is a
//! configuration error for that component alone.

use std::time::Duration;

use tracing::{error, warn};

use crate::errors::{PipelineError, Result};
use crate::exchange::signing::ApiCredentials;

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_KUCOIN_BASE_URL: &str = "https://api.kucoin.com";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub access_token: String,
    pub query: String,
    pub max_results: usize,
    pub poll_interval: Duration,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub credentials: ApiCredentials,
    pub base_url: String,
    /// Optional forward proxy for every exchange call.
    pub proxy_url: Option<String>,
    pub timeout: Duration,
    pub retry_attempts: usize,
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub http_bind: String,
    pub reporting_currency: String,
    /// Fixed offset used to interpret report dates ("today").
    pub report_utc_offset_hours: i32,
    pub mailbox: Option<MailboxConfig>,
    pub exchange: Option<ExchangeConfig>,
    pub telegram: Option<TelegramConfig>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Component errors are logged and the
    /// component is left disabled.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_path = get("DATABASE_PATH").unwrap_or_else(|| "./fundbot_ledger.db".to_string());
        let http_bind = get("HTTP_BIND").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let reporting_currency = get("REPORTING_CURRENCY")
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or_else(|| "USDT".to_string());
        let report_utc_offset_hours = parse_or(&get, "REPORT_UTC_OFFSET_HOURS", 3i32);

        let mailbox = component("mailbox", mailbox_config(&get));
        let exchange = component("exchange", exchange_config(&get));
        let telegram = component("telegram", telegram_config(&get));

        Self {
            database_path,
            http_bind,
            reporting_currency,
            report_utc_offset_hours,
            mailbox,
            exchange,
            telegram,
        }
    }
}

fn component<T>(name: &str, parsed: Result<Option<T>>) -> Option<T> {
    match parsed {
        Ok(Some(cfg)) => Some(cfg),
        Ok(None) => {
            warn!(component = name, "credentials not configured - component disabled");
            None
        }
        Err(e) => {
            error!(component = name, error = %e, "invalid configuration - component disabled");
            None
        }
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> T
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "unparseable setting, using default");
            default
        }),
        None => default,
    }
}

fn mailbox_config<G>(get: &G) -> Result<Option<MailboxConfig>>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(access_token) = get("GMAIL_ACCESS_TOKEN") else {
        return Ok(None);
    };

    let poll_secs: u64 = parse_or(get, "POLL_INTERVAL_SECS", 15);
    if poll_secs == 0 {
        return Err(PipelineError::Configuration(
            "POLL_INTERVAL_SECS must be positive".to_string(),
        ));
    }

    Ok(Some(MailboxConfig {
        access_token,
        query: get("GMAIL_QUERY").unwrap_or_else(|| "from:kucoin newer_than:2d".to_string()),
        max_results: parse_or(get, "GMAIL_MAX_RESULTS", 10usize).max(1),
        poll_interval: Duration::from_secs(poll_secs),
        api_base: get("GMAIL_API_BASE").unwrap_or_else(|| DEFAULT_GMAIL_API_BASE.to_string()),
    }))
}

fn exchange_config<G>(get: &G) -> Result<Option<ExchangeConfig>>
where
    G: Fn(&str) -> Option<String>,
{
    let api_key = get("KUCOIN_API_KEY");
    let secret = get("KUCOIN_API_SECRET");
    let passphrase = get("KUCOIN_API_PASSPHRASE");

    let (api_key, secret, passphrase) = match (api_key, secret, passphrase) {
        (None, None, None) => return Ok(None),
        (Some(k), Some(s), Some(p)) => (k, s, p),
        _ => {
            return Err(PipelineError::Configuration(
                "KUCOIN_API_KEY, KUCOIN_API_SECRET and KUCOIN_API_PASSPHRASE must all be set"
                    .to_string(),
            ))
        }
    };

    Ok(Some(ExchangeConfig {
        credentials: ApiCredentials {
            api_key,
            secret,
            passphrase,
        },
        base_url: get("KUCOIN_BASE_URL").unwrap_or_else(|| DEFAULT_KUCOIN_BASE_URL.to_string()),
        proxy_url: get("KUCOIN_PROXY_URL"),
        timeout: Duration::from_secs(parse_or(get, "KUCOIN_TIMEOUT_SECS", 15u64)),
        retry_attempts: parse_or(get, "KUCOIN_RETRY_ATTEMPTS", 3usize),
    }))
}

fn telegram_config<G>(get: &G) -> Result<Option<TelegramConfig>>
where
    G: Fn(&str) -> Option<String>,
{
    match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
        (None, None) => Ok(None),
        (Some(bot_token), Some(chat_id)) => {
            if chat_id.parse::<i64>().is_err() && !chat_id.starts_with('@') {
                return Err(PipelineError::Configuration(format!(
                    "invalid TELEGRAM_CHAT_ID '{chat_id}'"
                )));
            }
            Ok(Some(TelegramConfig {
                bot_token,
                chat_id,
                api_base: get("TELEGRAM_API_BASE")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
            }))
        }
        _ => Err(PipelineError::Configuration(
            "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must both be set".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_credentials() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg.database_path, "./fundbot_ledger.db");
        assert_eq!(cfg.reporting_currency, "USDT");
        assert_eq!(cfg.report_utc_offset_hours, 3);
        assert!(cfg.mailbox.is_none());
        assert!(cfg.exchange.is_none());
        assert!(cfg.telegram.is_none());
    }

    #[test]
    fn partial_exchange_credentials_disable_only_the_exchange() {
        let cfg = Config::from_lookup(lookup(&[
            ("KUCOIN_API_KEY", "k"),
            ("KUCOIN_API_SECRET", "s"),
            ("GMAIL_ACCESS_TOKEN", "tok"),
        ]));
        assert!(cfg.exchange.is_none());
        let mailbox = cfg.mailbox.expect("mailbox stays enabled");
        assert_eq!(mailbox.poll_interval, Duration::from_secs(15));
        assert_eq!(mailbox.max_results, 10);
    }

    #[test]
    fn full_exchange_section() {
        let cfg = Config::from_lookup(lookup(&[
            ("KUCOIN_API_KEY", "k"),
            ("KUCOIN_API_SECRET", "s"),
            ("KUCOIN_API_PASSPHRASE", "p"),
            ("KUCOIN_PROXY_URL", "http://proxy.local:8080"),
            ("KUCOIN_TIMEOUT_SECS", "10"),
        ]));
        let exchange = cfg.exchange.unwrap();
        assert_eq!(exchange.base_url, DEFAULT_KUCOIN_BASE_URL);
        assert_eq!(exchange.proxy_url.as_deref(), Some("http://proxy.local:8080"));
        assert_eq!(exchange.timeout, Duration::from_secs(10));
        assert_eq!(exchange.retry_attempts, 3);
    }

    #[test]
    fn telegram_requires_numeric_or_channel_chat_id() {
        let bad = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "not-a-chat"),
        ]));
        assert!(bad.telegram.is_none());

        let ok = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "-100123"),
        ]));
        assert_eq!(ok.telegram.unwrap().chat_id, "-100123");
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let cfg = Config::from_lookup(lookup(&[
            ("GMAIL_ACCESS_TOKEN", "tok"),
            ("POLL_INTERVAL_SECS", "0"),
        ]));
        assert!(cfg.mailbox.is_none());
    }
}
