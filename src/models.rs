use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event kinds recognised in exchange notification mail
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Deposit,
    Withdrawal,
    P2pSellCompleted,
    P2pBuySubmitted,
    P2pPaymentCompleted,
    P2pReceivedFunding,
    Unknown,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Deposit,
        EventKind::Withdrawal,
        EventKind::P2pSellCompleted,
        EventKind::P2pBuySubmitted,
        EventKind::P2pPaymentCompleted,
        EventKind::P2pReceivedFunding,
        EventKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::Withdrawal => "withdrawal",
            EventKind::P2pSellCompleted => "p2p_sell_completed",
            EventKind::P2pBuySubmitted => "p2p_buy_submitted",
            EventKind::P2pPaymentCompleted => "p2p_payment_completed",
            EventKind::P2pReceivedFunding => "p2p_received_funding",
            EventKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Human label used in chat messages.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Deposit => "Deposit",
            EventKind::Withdrawal => "Withdrawal",
            EventKind::P2pSellCompleted => "P2P sell completed",
            EventKind::P2pBuySubmitted => "P2P buy order submitted",
            EventKind::P2pPaymentCompleted => "P2P payment completed",
            EventKind::P2pReceivedFunding => "P2P funds received",
            EventKind::Unknown => "Unrecognized message",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output: everything an [`Event`] holds except its identity and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub kind: EventKind,
    pub amount: Option<Decimal>,
    pub asset: Option<String>,
    pub order_id: Option<String>,
    pub subject: String,
}

/// Ledger record, keyed by the source message id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub observed_at: DateTime<Utc>,
    pub kind: EventKind,
    pub amount: Option<Decimal>,
    pub asset: Option<String>,
    pub order_id: Option<String>,
    pub subject: String,
}

impl Event {
    pub fn from_classified(id: String, observed_at: DateTime<Utc>, c: ClassifiedEvent) -> Self {
        Self {
            id,
            observed_at,
            kind: c.kind,
            amount: c.amount,
            asset: c.asset,
            order_id: c.order_id,
            subject: c.subject,
        }
    }

    /// Amount, only when it is denominated in `currency`.
    pub fn amount_in(&self, currency: &str) -> Option<Decimal> {
        match (&self.amount, &self.asset) {
            (Some(amount), Some(asset)) if asset.eq_ignore_ascii_case(currency) => Some(*amount),
            _ => None,
        }
    }
}

/// Message as handed over by the mailbox transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    /// Mailbox receive time, the event's observation time.
    pub observed_at: DateTime<Utc>,
    pub body: String,
}

/// A newly persisted event on its way to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventNotification {
    pub event: Event,
    /// Amount spotted in the raw text of an unrecognized message. Not persisted.
    pub detected_amount: Option<(Decimal, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One historical trade execution reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub quote_funds: Decimal,
    pub created_at_ms: i64,
}
