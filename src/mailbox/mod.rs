//! Mailbox seam: listing and fetching exchange notification mail.

pub mod gmail;
pub mod poller;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::MailMessage;

pub use gmail::GmailClient;
pub use poller::{CycleOutcome, MailboxPoller, PollerSettings};

#[async_trait]
pub trait MailboxTransport: Send + Sync {
    /// Candidate message ids matching `query`, most recent first.
    async fn list_candidate_ids(&self, query: &str, max: usize) -> Result<Vec<String>>;

    async fn fetch_message(&self, id: &str) -> Result<MailMessage>;
}
