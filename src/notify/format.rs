//! Plain-text rendering for chat messages.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;

use crate::models::{Event, EventKind, EventNotification};
use crate::reports::{EventReport, FillReport, Pnl};

fn kind_emoji(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Deposit => "💰",
        EventKind::Withdrawal => "📤",
        EventKind::P2pSellCompleted => "✅",
        EventKind::P2pBuySubmitted => "🛒",
        EventKind::P2pPaymentCompleted => "💳",
        EventKind::P2pReceivedFunding => "📥",
        EventKind::Unknown => "✉️",
    }
}

fn local(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string()
}

fn money(value: Decimal) -> String {
    value.normalize().to_string()
}

fn push_pnl(out: &mut String, pnl: &Pnl) {
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Balance: {} -> {}",
        money(pnl.start_balance),
        money(pnl.end_balance)
    );
    let _ = writeln!(
        out,
        "PnL: {} ({}%)",
        money(pnl.pnl),
        pnl.pct.round_dp(2).normalize()
    );
}

pub fn format_event_notification(notification: &EventNotification, offset: FixedOffset) -> String {
    let event = &notification.event;
    let mut out = format!("{} {}\n", kind_emoji(event.kind), event.kind.label());

    if let (Some(amount), Some(asset)) = (event.amount, event.asset.as_deref()) {
        let _ = writeln!(out, "Amount: {} {}", money(amount), asset);
    } else if let Some((amount, asset)) = &notification.detected_amount {
        let _ = writeln!(out, "Detected amount: {} {}", money(*amount), asset);
    }
    if let Some(order_id) = &event.order_id {
        let _ = writeln!(out, "Order ID: {}", order_id);
    }
    if !event.subject.is_empty() {
        let _ = writeln!(out, "Subject: {}", event.subject);
    }
    let _ = write!(out, "Time: {}", local(event.observed_at, offset));
    out
}

pub fn format_event_report(report: &EventReport, offset: FixedOffset) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "📊 Report {} .. {}",
        local(report.start, offset),
        local(report.end, offset)
    );
    let _ = writeln!(out, "Events: {}", report.total_events);

    if report.total_events == 0 {
        let _ = writeln!(out, "No events in this period.");
    } else {
        let c = &report.currency;
        let _ = writeln!(
            out,
            "Deposits: {} ({} {})",
            report.count(EventKind::Deposit),
            money(report.deposit_sum),
            c
        );
        let _ = writeln!(
            out,
            "P2P funding received: {} ({} {})",
            report.count(EventKind::P2pReceivedFunding),
            money(report.received_funding_sum),
            c
        );
        let _ = writeln!(
            out,
            "Withdrawals: {} ({} {})",
            report.count(EventKind::Withdrawal),
            money(report.withdraw_sum),
            c
        );
        let _ = writeln!(
            out,
            "P2P sells: {} ({} {})",
            report.count(EventKind::P2pSellCompleted),
            money(report.sell_volume),
            c
        );
        let _ = writeln!(
            out,
            "P2P buys: {} ({} {})",
            report.count(EventKind::P2pBuySubmitted),
            money(report.buy_volume),
            c
        );
        let _ = writeln!(out, "P2P payments completed: {}", report.payment_completed_count);
        let _ = writeln!(out, "Unrecognized: {}", report.count(EventKind::Unknown));
        let _ = writeln!(out, "Net balance: {} {}", money(report.net_balance), c);

        let others: Vec<String> = report
            .by_asset
            .iter()
            .filter(|(asset, _)| asset.as_str() != c.as_str())
            .map(|(asset, t)| format!("{} {} ({}x)", money(t.sum), asset, t.count))
            .collect();
        if !others.is_empty() {
            let _ = writeln!(out, "Other assets (not summed): {}", others.join(", "));
        }
    }

    if let Some(pnl) = &report.pnl {
        push_pnl(&mut out, pnl);
    }
    out.trim_end().to_string()
}

pub fn format_fill_report(report: &FillReport, symbol: Option<&str>) -> String {
    let mut out = match symbol {
        Some(s) => format!("📈 Trade history {}\n", s.to_ascii_uppercase()),
        None => "📈 Trade history\n".to_string(),
    };
    let _ = writeln!(
        out,
        "Fills: {} (buy {}, sell {})",
        report.total_fills, report.buy_count, report.sell_count
    );
    let _ = writeln!(out, "Volume: {}", money(report.total_volume));

    if !report.top_symbols.is_empty() {
        let _ = writeln!(out, "Top symbols:");
        for (rank, sv) in report.top_symbols.iter().enumerate() {
            let _ = writeln!(out, "{}. {} {}", rank + 1, sv.symbol, money(sv.volume));
        }
    }
    if let Some(pnl) = &report.pnl {
        push_pnl(&mut out, pnl);
    }
    out.trim_end().to_string()
}

pub fn format_recent(events: &[Event], offset: FixedOffset) -> String {
    if events.is_empty() {
        return "No events recorded yet.".to_string();
    }
    let mut out = String::new();
    for event in events {
        let amount = match (event.amount, event.asset.as_deref()) {
            (Some(a), Some(asset)) => format!(" {} {}", money(a), asset),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "{} {} {}{}",
            local(event.observed_at, offset),
            kind_emoji(event.kind),
            event.kind.label(),
            amount
        );
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::{aggregate_events, aggregate_fills};
    use crate::models::{Fill, Side};
    use chrono::TimeZone;
    use std::str::FromStr;

    fn utc3() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn event(kind: EventKind, amount: Option<&str>, asset: Option<&str>) -> Event {
        Event {
            id: "m1".into(),
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            kind,
            amount: amount.map(|a| Decimal::from_str(a).unwrap()),
            asset: asset.map(str::to_string),
            order_id: None,
            subject: "Deposit Successful".into(),
        }
    }

    #[test]
    fn notification_shows_amount_and_local_time() {
        let text = format_event_notification(
            &EventNotification {
                event: event(EventKind::Deposit, Some("2572.00"), Some("USDT")),
                detected_amount: None,
            },
            utc3(),
        );
        assert!(text.starts_with("💰 Deposit"));
        assert!(text.contains("Amount: 2572 USDT"));
        assert!(text.contains("Time: 2024-05-01 12:00"));
    }

    #[test]
    fn unknown_notification_shows_detected_amount() {
        let text = format_event_notification(
            &EventNotification {
                event: event(EventKind::Unknown, None, None),
                detected_amount: Some((Decimal::from(150000), "RUB".into())),
            },
            utc3(),
        );
        assert!(text.contains("Detected amount: 150000 RUB"));
    }

    #[test]
    fn report_lists_sums_and_other_assets() {
        let events = vec![
            event(EventKind::Deposit, Some("100"), Some("USDT")),
            event(EventKind::Deposit, Some("5"), Some("BTC")),
        ];
        let start = Utc.with_ymd_and_hms(2024, 4, 30, 21, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap();
        let report = aggregate_events(
            &events,
            start,
            end,
            "USDT",
            Some((Decimal::from(1000), Decimal::from(1100))),
        )
        .unwrap();
        let text = format_event_report(&report, utc3());
        assert!(text.contains("Report 2024-05-01 00:00 .. 2024-05-02 00:00"));
        assert!(text.contains("Deposits: 2 (100 USDT)"));
        assert!(text.contains("Other assets (not summed): 5 BTC (1x)"));
        assert!(text.contains("PnL: 100 (10%)"));
    }

    #[test]
    fn fill_report_ranks_symbols() {
        let fills = vec![Fill {
            symbol: "BTC-USDT".into(),
            side: Side::Buy,
            size: Decimal::ONE,
            price: Decimal::from(10),
            quote_funds: Decimal::from(10),
            created_at_ms: 0,
        }];
        let text = format_fill_report(&aggregate_fills(&fills, None).unwrap(), Some("btc-usdt"));
        assert!(text.contains("Trade history BTC-USDT"));
        assert!(text.contains("1. BTC-USDT 10"));
    }

    #[test]
    fn empty_recent() {
        assert_eq!(format_recent(&[], utc3()), "No events recorded yet.");
    }
}
