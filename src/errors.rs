//! Error taxonomy shared by the ingestion pipeline and the command path.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or malformed credentials/settings for one component.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Remote endpoint unreachable, timed out, or returned an unreadable body.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote endpoint answered with a non-2xx status.
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Well-formed response carrying an embedded failure code.
    #[error("vendor error (code {code}): {body}")]
    Vendor { code: String, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    /// A decimal sum or difference left the representable range.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// Persistence unavailable or a stored row could not be decoded.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Transient failures a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Transport(_))
    }

    /// Raw exchange response attached to the error, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            PipelineError::HttpStatus { body, .. } | PipelineError::Vendor { body, .. } => {
                Some(body)
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(PipelineError::Transport("timeout".into()).is_transient());
        assert!(!PipelineError::HttpStatus {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(!PipelineError::Vendor {
            code: "400100".into(),
            body: String::new()
        }
        .is_transient());
    }

    #[test]
    fn exchange_errors_keep_raw_body() {
        let err = PipelineError::Vendor {
            code: "400003".into(),
            body: r#"{"code":"400003","msg":"KC-API-KEY not exists"}"#.into(),
        };
        assert!(err.raw_response().unwrap().contains("KC-API-KEY"));
        assert!(PipelineError::Parse("x".into()).raw_response().is_none());
    }
}
