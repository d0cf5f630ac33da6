//! Trade-history client for the exchange's private fills endpoint.
//!
//! Read-only. Retries are the caller's decision, see [`super::retry`].

use std::str::FromStr;

use chrono::Utc;
use reqwest::{Client, Method, Proxy};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::errors::{PipelineError, Result};
use crate::exchange::signing::{self, ApiCredentials};
use crate::models::{Fill, Side};

pub const FILLS_PATH: &str = "/api/v1/fills";
const SUCCESS_CODE: &str = "200000";
const MAX_PAGE_SIZE: u32 = 500;
/// Vendor code attached to a success envelope whose fills cannot be decoded.
pub const MALFORMED_FILL_CODE: &str = "malformed_fill";

#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    data: Option<FillsPage>,
}

#[derive(Debug, Deserialize)]
struct FillsPage {
    #[serde(default)]
    items: Vec<RawFill>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFill {
    symbol: String,
    side: String,
    size: String,
    price: String,
    funds: String,
    created_at: i64,
}

impl RawFill {
    /// The error names the offending field.
    fn into_fill(self) -> std::result::Result<Fill, String> {
        let side = match self.side.to_ascii_lowercase().as_str() {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            other => return Err(format!("unknown fill side '{other}'")),
        };
        let dec = |field: &str, raw: &str| {
            Decimal::from_str(raw).map_err(|e| format!("fill {field} '{raw}': {e}"))
        };
        Ok(Fill {
            size: dec("size", &self.size)?,
            price: dec("price", &self.price)?,
            quote_funds: dec("funds", &self.funds)?,
            symbol: self.symbol,
            side,
            created_at_ms: self.created_at,
        })
    }
}

/// Validate transport status and the embedded vendor code, then decode fills.
pub fn parse_fills_response(status: u16, body: &str) -> Result<Vec<Fill>> {
    if !(200..300).contains(&status) {
        return Err(PipelineError::HttpStatus {
            status,
            body: body.to_string(),
        });
    }

    let envelope: Envelope = serde_json::from_str(body).map_err(|_| PipelineError::Vendor {
        code: "unparseable".to_string(),
        body: body.to_string(),
    })?;

    if envelope.code != SUCCESS_CODE {
        return Err(PipelineError::Vendor {
            code: envelope.code,
            body: body.to_string(),
        });
    }

    envelope
        .data
        .map(|page| page.items)
        .unwrap_or_default()
        .into_iter()
        .map(RawFill::into_fill)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|reason| {
            warn!(%reason, "exchange returned a malformed fill");
            PipelineError::Vendor {
                code: MALFORMED_FILL_CODE.to_string(),
                body: body.to_string(),
            }
        })
}

/// Signed client for `GET /api/v1/fills`
#[derive(Clone)]
pub struct TradeHistoryClient {
    client: Client,
    creds: ApiCredentials,
    base_url: String,
}

impl std::fmt::Debug for TradeHistoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeHistoryClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl TradeHistoryClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        if config.credentials.secret.is_empty() {
            return Err(PipelineError::Configuration(
                "exchange API secret is empty".to_string(),
            ));
        }

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(90));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                PipelineError::Configuration(format!("invalid proxy url '{proxy_url}': {e}"))
            })?;
            info!(proxy = %proxy_url, "exchange calls routed through forward proxy");
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            creds: config.credentials.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Most recent fills, optionally restricted to one `BASE-QUOTE` symbol.
    pub async fn fetch_fills(&self, symbol: Option<&str>, limit: u32) -> Result<Vec<Fill>> {
        let page_size = limit.clamp(1, MAX_PAGE_SIZE);
        let mut query: Vec<(&str, String)> = vec![("pageSize", page_size.to_string())];
        if let Some(symbol) = symbol {
            query.push(("symbol", symbol.to_ascii_uppercase()));
        }

        let path = signing::canonical_path(FILLS_PATH, &query);
        let headers = signing::sign(
            &self.creds,
            Method::GET.as_str(),
            &path,
            Utc::now().timestamp_millis(),
            "",
        )?;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        for (name, value) in headers.header_pairs() {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, body_len = body.len(), "fills response received");

        let fills = parse_fills_response(status.as_u16(), &body).map_err(|e| {
            warn!(status = %status, error = %e, "fills request failed");
            e
        })?;

        info!(count = fills.len(), symbol = ?symbol, "fetched fills");
        Ok(fills)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_BODY: &str = r#"{
        "code": "200000",
        "data": {
            "currentPage": 1,
            "pageSize": 50,
            "items": [
                {"symbol":"BTC-USDT","tradeId":"1","orderId":"a","side":"buy","liquidity":"taker",
                 "price":"43000.5","size":"0.01","funds":"430.005","fee":"0.43","createdAt":1700000000000},
                {"symbol":"ETH-USDT","tradeId":"2","orderId":"b","side":"sell","liquidity":"maker",
                 "price":"2200","size":"1.5","funds":"3300","fee":"3.3","createdAt":1700000001000}
            ]
        }
    }"#;

    #[test]
    fn decodes_items() {
        let fills = parse_fills_response(200, OK_BODY).unwrap();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].symbol, "BTC-USDT");
        assert_eq!(fills[0].side, Side::Buy);
        assert_eq!(fills[0].quote_funds, Decimal::from_str("430.005").unwrap());
        assert_eq!(fills[1].side, Side::Sell);
        assert_eq!(fills[1].created_at_ms, 1_700_000_001_000);
    }

    #[test]
    fn vendor_code_is_an_error_with_raw_body() {
        let body = r#"{"code":"400005","msg":"Invalid KC-API-SIGN"}"#;
        match parse_fills_response(200, body).unwrap_err() {
            PipelineError::Vendor { code, body: raw } => {
                assert_eq!(code, "400005");
                assert!(raw.contains("Invalid KC-API-SIGN"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn http_status_is_checked_before_body() {
        let err = parse_fills_response(429, OK_BODY).unwrap_err();
        assert!(matches!(err, PipelineError::HttpStatus { status: 429, .. }));
    }

    #[test]
    fn empty_data_yields_no_fills() {
        assert!(parse_fills_response(200, r#"{"code":"200000","data":{"items":[]}}"#)
            .unwrap()
            .is_empty());
        assert!(parse_fills_response(200, r#"{"code":"200000"}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn malformed_fill_is_a_vendor_error() {
        let bad_side = r#"{"code":"200000","data":{"items":[
            {"symbol":"BTC-USDT","side":"hold","price":"1","size":"1","funds":"1","createdAt":1}
        ]}}"#;
        let err = parse_fills_response(200, bad_side).unwrap_err();
        assert!(matches!(err, PipelineError::Vendor { ref code, .. } if code == MALFORMED_FILL_CODE));
        assert!(err.raw_response().unwrap().contains("hold"));

        let bad_funds = r#"{"code":"200000","data":{"items":[
            {"symbol":"BTC-USDT","side":"buy","price":"1","size":"1","funds":"lots","createdAt":1}
        ]}}"#;
        assert!(matches!(
            parse_fills_response(200, bad_funds),
            Err(PipelineError::Vendor { .. })
        ));
    }

    #[test]
    fn non_json_body_is_a_vendor_error() {
        let err = parse_fills_response(200, "<html>blocked</html>").unwrap_err();
        assert!(matches!(err, PipelineError::Vendor { .. }));
    }
}
