//! Mailbox Poller
//!
//! One cycle: list candidates, drop ids already seen, fetch the rest, classify
//! them oldest-first, persist idempotently and notify for every new row.
//!
//! Delivery is at-least-once. An id is marked seen only once the store holds
//! it, so anything that fails mid-cycle is picked up again on the next listing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::MailboxConfig;
use crate::errors::Result;
use crate::events::{classify, extract_amount, LedgerStore, SeenIds};
use crate::mailbox::MailboxTransport;
use crate::models::{Event, EventKind, EventNotification, MailMessage};
use crate::notify::format::format_event_notification;
use crate::notify::Notifier;

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub query: String,
    pub max_results: usize,
    pub interval: Duration,
    /// Offset used for timestamps in notifications.
    pub display_offset: FixedOffset,
}

impl PollerSettings {
    pub fn from_config(config: &MailboxConfig, display_offset: FixedOffset) -> Self {
        Self {
            query: config.query.clone(),
            max_results: config.max_results,
            interval: config.poll_interval,
            display_offset,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub listed: usize,
    pub fetched: usize,
    pub inserted: usize,
    /// Fetched but already in the store.
    pub duplicates: usize,
    pub notify_failures: usize,
}

pub struct MailboxPoller {
    transport: Arc<dyn MailboxTransport>,
    store: Arc<LedgerStore>,
    seen: SeenIds,
    notifier: Arc<dyn Notifier>,
    settings: PollerSettings,
}

impl MailboxPoller {
    /// Seeds the dedup cache from the store.
    pub fn new(
        transport: Arc<dyn MailboxTransport>,
        store: Arc<LedgerStore>,
        notifier: Arc<dyn Notifier>,
        settings: PollerSettings,
    ) -> Result<Self> {
        let seen = SeenIds::from_store(&store)?;
        info!(known_ids = seen.len(), "dedup cache seeded from ledger");
        Ok(Self {
            transport,
            store,
            seen,
            notifier,
            settings,
        })
    }

    pub fn seen(&self) -> &SeenIds {
        &self.seen
    }

    pub async fn poll_once(&self) -> Result<CycleOutcome> {
        let listed = self
            .transport
            .list_candidate_ids(&self.settings.query, self.settings.max_results)
            .await?;

        let mut outcome = CycleOutcome {
            listed: listed.len(),
            ..CycleOutcome::default()
        };

        // Listing is newest-first; walk it backwards so fetches go oldest-first.
        let mut queued = HashSet::new();
        let unseen: Vec<String> = listed
            .into_iter()
            .rev()
            .filter(|id| !self.seen.contains(id) && queued.insert(id.clone()))
            .collect();

        if unseen.is_empty() {
            debug!(listed = outcome.listed, "no unseen messages");
            return Ok(outcome);
        }

        let mut messages: Vec<MailMessage> = Vec::with_capacity(unseen.len());
        for id in &unseen {
            messages.push(self.transport.fetch_message(id).await?);
            outcome.fetched += 1;
        }
        // Stable, so equal timestamps keep listing order.
        messages.sort_by_key(|m| m.observed_at);

        for message in messages {
            let classified = classify(&message.subject, &message.body);
            let detected_amount = if classified.kind == EventKind::Unknown {
                extract_amount(&format!("{}\n{}", message.subject, message.body))
            } else {
                None
            };
            let event = Event::from_classified(message.id.clone(), message.observed_at, classified);

            let inserted = self.store.insert_if_absent(&event)?;
            self.seen.mark(&event.id);

            if !inserted {
                outcome.duplicates += 1;
                continue;
            }
            outcome.inserted += 1;
            info!(
                id = %event.id,
                kind = %event.kind,
                amount = ?event.amount,
                asset = ?event.asset,
                "📬 new event recorded"
            );

            let text = format_event_notification(
                &EventNotification {
                    event,
                    detected_amount,
                },
                self.settings.display_offset,
            );
            if let Err(e) = self.notifier.send_text(&text).await {
                error!(error = %e, "failed to deliver event notification");
                outcome.notify_failures += 1;
            }
        }

        Ok(outcome)
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            query = %self.settings.query,
            "📮 mailbox poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once().await {
                Ok(outcome) if outcome.inserted > 0 => {
                    info!(?outcome, "poll cycle complete");
                }
                Ok(outcome) => debug!(?outcome, "poll cycle complete"),
                Err(e) => {
                    warn!(error = %e, "poll cycle failed");
                    let note = format!("⚠️ Mail polling failed: {e}");
                    if let Err(notify_err) = self.notifier.send_text(&note).await {
                        error!(error = %notify_err, "failed to report poll failure");
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("mailbox poller stopped");
    }
}
