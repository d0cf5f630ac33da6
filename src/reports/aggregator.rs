//! Windowed Financial Aggregation
//!
//! Pure projections over stored events or a freshly fetched fill list. Nothing
//! here is persisted.
//!
//! # Event report
//!
//! ```text
//! deposit_sum          = sum(Deposit amounts in reporting currency)
//! received_funding_sum = sum(P2pReceivedFunding amounts in reporting currency)
//! withdraw_sum         = sum(Withdrawal amounts in reporting currency)   (gross, positive)
//! net_balance          = deposit_sum + received_funding_sum - withdraw_sum
//! sell_volume          = sum(P2pSellCompleted amounts in reporting currency)
//! buy_volume           = sum(P2pBuySubmitted amounts in reporting currency)
//! ```
//!
//! Entries in any other asset are counted (per kind and per asset) but never
//! added to a currency sum. Every sum is checked; leaving the `Decimal` range
//! yields [`PipelineError::Overflow`] instead of a partial report.
//!
//! # Fill report
//!
//! Volume per symbol is `abs(quote_funds)` regardless of side. The top symbols
//! are ranked by volume, ties keep first-seen order.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};
use crate::models::{Event, EventKind, Fill, Side};

pub const TOP_SYMBOLS: usize = 10;

/// Balance-delta PnL supplied by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pnl {
    pub start_balance: Decimal,
    pub end_balance: Decimal,
    pub pnl: Decimal,
    /// `pnl / start_balance * 100`, zero when the start balance is zero.
    pub pct: Decimal,
}

fn accumulate(total: &mut Decimal, amount: Decimal, what: &str) -> Result<()> {
    *total = total
        .checked_add(amount)
        .ok_or_else(|| PipelineError::Overflow(format!("{what} exceeds {}", Decimal::MAX)))?;
    Ok(())
}

pub fn compute_pnl(start_balance: Decimal, end_balance: Decimal) -> Result<Pnl> {
    let pnl = end_balance.checked_sub(start_balance).ok_or_else(|| {
        PipelineError::Overflow(format!(
            "balance delta {end_balance} - {start_balance} out of range"
        ))
    })?;
    let pct = if start_balance.is_zero() {
        Decimal::ZERO
    } else {
        pnl.checked_div(start_balance)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO)
    };
    Ok(Pnl {
        start_balance,
        end_balance,
        pnl,
        pct,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTotals {
    pub count: usize,
    pub sum: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub currency: String,
    pub total_events: usize,
    pub by_kind: BTreeMap<EventKind, usize>,
    /// Only events carrying both an amount and an asset.
    pub by_asset: BTreeMap<String, AssetTotals>,
    pub deposit_sum: Decimal,
    pub received_funding_sum: Decimal,
    pub withdraw_sum: Decimal,
    pub net_balance: Decimal,
    pub sell_volume: Decimal,
    pub buy_volume: Decimal,
    pub payment_completed_count: usize,
    /// Quantified events left out of the currency sums (other asset or no amount).
    pub unsummed_count: usize,
    pub pnl: Option<Pnl>,
}

impl EventReport {
    pub fn count(&self, kind: EventKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

fn carries_quantity(kind: EventKind) -> bool {
    !matches!(kind, EventKind::P2pPaymentCompleted | EventKind::Unknown)
}

/// Aggregate events already restricted to `[start, end)`.
pub fn aggregate_events(
    events: &[Event],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    currency: &str,
    balances: Option<(Decimal, Decimal)>,
) -> Result<EventReport> {
    let mut report = EventReport {
        start,
        end,
        currency: currency.to_ascii_uppercase(),
        total_events: events.len(),
        by_kind: BTreeMap::new(),
        by_asset: BTreeMap::new(),
        deposit_sum: Decimal::ZERO,
        received_funding_sum: Decimal::ZERO,
        withdraw_sum: Decimal::ZERO,
        net_balance: Decimal::ZERO,
        sell_volume: Decimal::ZERO,
        buy_volume: Decimal::ZERO,
        payment_completed_count: 0,
        unsummed_count: 0,
        pnl: balances.map(|(s, e)| compute_pnl(s, e)).transpose()?,
    };

    for event in events {
        *report.by_kind.entry(event.kind).or_insert(0) += 1;

        if let (Some(amount), Some(asset)) = (event.amount, event.asset.as_deref()) {
            let totals = report
                .by_asset
                .entry(asset.to_ascii_uppercase())
                .or_default();
            totals.count += 1;
            accumulate(&mut totals.sum, amount, asset)?;
        }

        if event.kind == EventKind::P2pPaymentCompleted {
            report.payment_completed_count += 1;
            continue;
        }
        if !carries_quantity(event.kind) {
            continue;
        }

        let Some(amount) = event.amount_in(&report.currency) else {
            report.unsummed_count += 1;
            continue;
        };

        let total = match event.kind {
            EventKind::Deposit => &mut report.deposit_sum,
            EventKind::P2pReceivedFunding => &mut report.received_funding_sum,
            EventKind::Withdrawal => &mut report.withdraw_sum,
            EventKind::P2pSellCompleted => &mut report.sell_volume,
            EventKind::P2pBuySubmitted => &mut report.buy_volume,
            EventKind::P2pPaymentCompleted | EventKind::Unknown => continue,
        };
        accumulate(total, amount, event.kind.as_str())?;
    }

    report.net_balance = report
        .deposit_sum
        .checked_add(report.received_funding_sum)
        .and_then(|inflow| inflow.checked_sub(report.withdraw_sum))
        .ok_or_else(|| PipelineError::Overflow("net balance out of range".to_string()))?;
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolVolume {
    pub symbol: String,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReport {
    pub total_fills: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    pub total_volume: Decimal,
    pub top_symbols: Vec<SymbolVolume>,
    pub pnl: Option<Pnl>,
}

pub fn aggregate_fills(fills: &[Fill], balances: Option<(Decimal, Decimal)>) -> Result<FillReport> {
    let mut buy_count = 0;
    let mut sell_count = 0;
    let mut total_volume = Decimal::ZERO;

    // Vec keeps first-seen order, the map only points into it.
    let mut volumes: Vec<SymbolVolume> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for fill in fills {
        match fill.side {
            Side::Buy => buy_count += 1,
            Side::Sell => sell_count += 1,
        }

        let volume = fill.quote_funds.abs();
        accumulate(&mut total_volume, volume, "total volume")?;

        match index.get(fill.symbol.as_str()) {
            Some(&i) => accumulate(&mut volumes[i].volume, volume, &fill.symbol)?,
            None => {
                index.insert(fill.symbol.as_str(), volumes.len());
                volumes.push(SymbolVolume {
                    symbol: fill.symbol.clone(),
                    volume,
                });
            }
        }
    }

    // sort_by is stable, so equal volumes stay in first-seen order
    volumes.sort_by(|a, b| b.volume.cmp(&a.volume));
    volumes.truncate(TOP_SYMBOLS);

    Ok(FillReport {
        total_fills: fills.len(),
        buy_count,
        sell_count,
        total_volume,
        top_symbols: volumes,
        pnl: balances.map(|(s, e)| compute_pnl(s, e)).transpose()?,
    })
}
