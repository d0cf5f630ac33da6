//! fundbot backend library
//!
//! Mail-driven financial event ledger: ingestion, classification, dedup,
//! aggregation, plus the exchange trade-history client. Exposed for the
//! binaries and integration tests.

pub mod api;
pub mod config;
pub mod errors;
pub mod events;
pub mod exchange;
pub mod mailbox;
pub mod models;
pub mod notify;
pub mod reports;

pub use errors::{PipelineError, Result};
