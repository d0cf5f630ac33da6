//! Private REST request signing (HMAC-SHA256, base64, key version 2).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use url::form_urlencoded;

use crate::errors::{PipelineError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_API_KEY: &str = "KC-API-KEY";
pub const HEADER_SIGNATURE: &str = "KC-API-SIGN";
pub const HEADER_TIMESTAMP: &str = "KC-API-TIMESTAMP";
pub const HEADER_PASSPHRASE: &str = "KC-API-PASSPHRASE";
pub const HEADER_KEY_VERSION: &str = "KC-API-KEY-VERSION";
const KEY_VERSION: &str = "2";

/// Exchange API credentials
#[derive(Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

/// Authentication headers for one request. Single-use: the timestamp is checked
/// for skew by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub signature: String,
    pub timestamp: String,
    pub passphrase: String,
}

impl SignedHeaders {
    pub fn header_pairs(&self) -> [(&'static str, &str); 5] {
        [
            (HEADER_API_KEY, self.api_key.as_str()),
            (HEADER_SIGNATURE, self.signature.as_str()),
            (HEADER_TIMESTAMP, self.timestamp.as_str()),
            (HEADER_PASSPHRASE, self.passphrase.as_str()),
            (HEADER_KEY_VERSION, KEY_VERSION),
        ]
    }
}

fn hmac_base64(secret: &str, message: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PipelineError::Configuration(format!("HMAC key error: {e}")))?;
    mac.update(message);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Sign `timestamp_ms ++ METHOD ++ canonical_path ++ body`.
///
/// `canonical_path` must be byte-identical to the path and query actually sent,
/// including parameter order.
pub fn sign(
    creds: &ApiCredentials,
    method: &str,
    canonical_path: &str,
    timestamp_ms: i64,
    body: &str,
) -> Result<SignedHeaders> {
    if creds.secret.is_empty() {
        return Err(PipelineError::Configuration(
            "exchange API secret is empty".to_string(),
        ));
    }

    let timestamp = timestamp_ms.to_string();
    let method = method.to_ascii_uppercase();
    let message = format!("{timestamp}{method}{canonical_path}{body}");
    debug!(method = %method, path = %canonical_path, timestamp = %timestamp, "signing request");

    Ok(SignedHeaders {
        api_key: creds.api_key.clone(),
        signature: hmac_base64(&creds.secret, message.as_bytes())?,
        timestamp,
        passphrase: hmac_base64(&creds.secret, creds.passphrase.as_bytes())?,
    })
}

/// Path plus url-encoded query, keeping the caller's parameter order.
pub fn canonical_path(path: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in query {
        serializer.append_pair(key, value);
    }
    format!("{}?{}", path, serializer.finish())
}
