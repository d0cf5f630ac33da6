//! Gmail REST transport.
//!
//! Authenticates with a pre-issued OAuth access token; obtaining and refreshing
//! that token happens outside this process.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::MailboxConfig;
use crate::errors::{PipelineError, Result};
use crate::mailbox::MailboxTransport;
use crate::models::MailMessage;

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    internal_date: String,
    #[serde(default)]
    snippet: String,
    payload: Option<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

/// Decode Gmail's base64url payloads, padded or not.
fn decode_body(data: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| PipelineError::Parse(format!("invalid base64url body: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Depth-first search for the first `text/plain` part carrying data.
fn first_plain_text(part: &Part) -> Option<&str> {
    if part.mime_type.eq_ignore_ascii_case("text/plain") {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
            return Some(data);
        }
    }
    part.parts.iter().find_map(first_plain_text)
}

/// Decode a `format=full` message resource.
pub fn parse_message(json: &str) -> Result<MailMessage> {
    let raw: RawMessage = serde_json::from_str(json)
        .map_err(|e| PipelineError::Parse(format!("malformed Gmail message: {e}")))?;

    let internal_ms = raw.internal_date.parse::<i64>().map_err(|e| {
        PipelineError::Parse(format!("invalid internalDate '{}': {e}", raw.internal_date))
    })?;
    let observed_at = DateTime::<Utc>::from_timestamp_millis(internal_ms).ok_or_else(|| {
        PipelineError::Parse(format!("internalDate {internal_ms} out of range"))
    })?;

    let payload = raw.payload.unwrap_or_default();
    let subject = payload
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("subject"))
        .map(|h| h.value.clone())
        .unwrap_or_default();

    let body = match first_plain_text(&payload) {
        Some(data) => decode_body(data)?,
        None => raw.snippet,
    };

    Ok(MailMessage {
        id: raw.id,
        subject,
        observed_at,
        body,
    })
}

pub fn parse_list(json: &str) -> Result<Vec<String>> {
    let list: ListResponse = serde_json::from_str(json)
        .map_err(|e| PipelineError::Parse(format!("malformed Gmail listing: {e}")))?;
    Ok(list.messages.into_iter().map(|m| m.id).collect())
}

pub struct GmailClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GmailClient {
    pub fn new(config: &MailboxConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            base_url: format!(
                "{}/gmail/v1/users/me/messages",
                config.api_base.trim_end_matches('/')
            ),
        })
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status != StatusCode::OK {
            return Err(PipelineError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl MailboxTransport for GmailClient {
    async fn list_candidate_ids(&self, query: &str, max: usize) -> Result<Vec<String>> {
        let body = self
            .get(
                &self.base_url,
                &[("q", query.to_string()), ("maxResults", max.to_string())],
            )
            .await?;
        let ids = parse_list(&body)?;
        debug!(count = ids.len(), "listed candidate messages");
        Ok(ids)
    }

    async fn fetch_message(&self, id: &str) -> Result<MailMessage> {
        let url = format!("{}/{}", self.base_url, id);
        let body = self.get(&url, &[("format", "full".to_string())]).await?;
        parse_message(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;

    #[test]
    fn plain_text_part_is_preferred() {
        let plain = URL_SAFE.encode("You have received a deposit of 10 USDT.");
        let html = URL_SAFE.encode("<p>html</p>");
        let json = format!(
            r#"{{
                "id": "18c1",
                "internalDate": "1700000000000",
                "snippet": "snippet text",
                "payload": {{
                    "mimeType": "multipart/alternative",
                    "headers": [{{"name": "From", "value": "KuCoin"}}, {{"name": "Subject", "value": "Deposit Successful"}}],
                    "parts": [
                        {{"mimeType": "text/html", "body": {{"data": "{html}"}}}},
                        {{"mimeType": "text/plain", "body": {{"data": "{plain}"}}}}
                    ]
                }}
            }}"#
        );
        let msg = parse_message(&json).unwrap();
        assert_eq!(msg.id, "18c1");
        assert_eq!(msg.subject, "Deposit Successful");
        assert_eq!(msg.observed_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(msg.body, "You have received a deposit of 10 USDT.");
    }

    #[test]
    fn nested_parts_and_unpadded_data() {
        let plain = URL_SAFE_NO_PAD.encode("nested body!");
        let json = format!(
            r#"{{"id":"a","internalDate":"5","payload":{{"mimeType":"multipart/mixed","parts":[
                {{"mimeType":"multipart/alternative","parts":[{{"mimeType":"text/plain","body":{{"data":"{plain}"}}}}]}}
            ]}}}}"#
        );
        assert_eq!(parse_message(&json).unwrap().body, "nested body!");
    }

    #[test]
    fn falls_back_to_snippet() {
        let json = r#"{"id":"b","internalDate":"7","snippet":"only snippet","payload":{"mimeType":"text/html","body":{"data":"PGI-"}}}"#;
        let msg = parse_message(json).unwrap();
        assert_eq!(msg.body, "only snippet");
        assert_eq!(msg.subject, "");
    }

    #[test]
    fn bad_internal_date_is_parse_error() {
        let json = r#"{"id":"c","internalDate":"yesterday"}"#;
        assert!(matches!(parse_message(json), Err(PipelineError::Parse(_))));

        // numeric but beyond chrono's range, must not fall back to the epoch
        let json = r#"{"id":"d","internalDate":"9223372036854775807"}"#;
        assert!(matches!(parse_message(json), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn listing_with_and_without_messages() {
        let ids = parse_list(r#"{"messages":[{"id":"2","threadId":"t"},{"id":"1","threadId":"t"}],"resultSizeEstimate":2}"#).unwrap();
        assert_eq!(ids, vec!["2", "1"]);
        assert!(parse_list(r#"{"resultSizeEstimate":0}"#).unwrap().is_empty());
    }
}
