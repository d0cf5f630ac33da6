//! Event Classifier
//!
//! Maps the subject and plaintext body of an exchange notification mail to a
//! typed [`ClassifiedEvent`]. Patterns are tried in a fixed priority order and
//! the first match decides the kind. The order id is extracted independently.
//!
//! Pure: no I/O, never fails. A malformed amount degrades to an absent
//! amount/asset pair instead of an error, so one odd mail cannot stall ingestion.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::warn;

use crate::models::{ClassifiedEvent, EventKind};

const AMOUNT: &str = r"(\d[\d,]*(?:\.\d+)?)";
const ASSET: &str = r"([A-Z0-9]{2,12})";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid classifier pattern {pattern}: {e}"))
}

static ORDER_ID: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)Order\s*ID:\s*([0-9a-f]+)\b"));

static SELL_COMPLETED: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)completed your sell order of\s+{AMOUNT}\s+{ASSET}"
    ))
});

static RECEIVED: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?i)You have received\s+{AMOUNT}\s+{ASSET}")));

static DEPOSIT: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)You have received a deposit of\s+{AMOUNT}\s+{ASSET}"
    ))
});

static WITHDRAWAL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?is)Coin:\s*{ASSET}.*?Amount:\s*{AMOUNT}")));

static BUY_SUBMITTED: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)has submitted a\s+{AMOUNT}\s+{ASSET}\s+P2P buy order to you"
    ))
});

static USDT_AMOUNT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)(\d[\d,.]*)\s*USDT"));

static RUB_AMOUNT: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)(\d[\d,. ]*)\s*(?:RUB|₽)"));

/// Parse an amount string: drops embedded spaces and thousands commas.
pub fn normalize_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let cleaned = cleaned.trim_end_matches('.');
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Decimal::from_str(cleaned).ok()
}

/// Shared amount extractor for free-form text.
///
/// Recognises `<amount> USDT` and `<amount> RUB` / `<amount> ₽`. When both
/// appear, the earliest one in the text wins; if it does not parse, the other
/// one is used.
pub fn extract_amount(text: &str) -> Option<(Decimal, String)> {
    let grammars: [(&Regex, &str); 2] = [(&*USDT_AMOUNT, "USDT"), (&*RUB_AMOUNT, "RUB")];
    let mut candidates: Vec<(usize, &str, &str)> = grammars
        .into_iter()
        .filter_map(|(re, asset)| {
            let m = re.captures(text)?.get(1)?;
            Some((m.start(), m.as_str(), asset))
        })
        .collect();
    candidates.sort_by_key(|&(start, _, _)| start);

    candidates
        .into_iter()
        .find_map(|(_, raw, asset)| normalize_amount(raw).map(|value| (value, asset.to_string())))
}

fn quantity(kind: EventKind, raw_amount: &str, raw_asset: &str) -> (Option<Decimal>, Option<String>) {
    match normalize_amount(raw_amount) {
        Some(amount) => (Some(amount), Some(raw_asset.to_ascii_uppercase())),
        None => {
            warn!(kind = %kind, raw_amount, "unparseable amount, keeping kind without amount");
            (None, None)
        }
    }
}

fn captured(re: &Regex, text: &str, amount_group: usize, asset_group: usize) -> Option<(String, String)> {
    let caps = re.captures(text)?;
    Some((
        caps.get(amount_group)?.as_str().to_string(),
        caps.get(asset_group)?.as_str().to_string(),
    ))
}

/// Classify one mail. The returned subject is the input subject verbatim.
pub fn classify(subject: &str, body: &str) -> ClassifiedEvent {
    let text = format!("{subject}\n{body}");
    let lower = text.to_lowercase();

    let order_id = ORDER_ID
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let (kind, pair) = if lower.contains("has marked the p2p order")
        && lower.contains("payment completed")
    {
        (EventKind::P2pPaymentCompleted, None)
    } else if let Some(pair) = captured(&SELL_COMPLETED, &text, 1, 2) {
        (EventKind::P2pSellCompleted, Some(pair))
    } else if let Some(pair) = captured(&RECEIVED, &text, 1, 2).filter(|_| lower.contains("funding account")) {
        (EventKind::P2pReceivedFunding, Some(pair))
    } else if let Some(pair) = captured(&DEPOSIT, &text, 1, 2) {
        (EventKind::Deposit, Some(pair))
    } else if lower.contains("your withdrawal on") && lower.contains("was successful") {
        // Coin precedes Amount in the block, so the groups are swapped.
        (EventKind::Withdrawal, captured(&WITHDRAWAL_BLOCK, &text, 2, 1))
    } else if let Some(pair) = captured(&BUY_SUBMITTED, &text, 1, 2) {
        (EventKind::P2pBuySubmitted, Some(pair))
    } else {
        (EventKind::Unknown, None)
    };

    let (amount, asset) = match pair {
        Some((raw_amount, raw_asset)) => quantity(kind, &raw_amount, &raw_asset),
        None => (None, None),
    };

    ClassifiedEvent {
        kind,
        amount,
        asset,
        order_id,
        subject: subject.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn deposit() {
        let c = classify("", "You have received a deposit of 2572.00 USDT.");
        assert_eq!(c.kind, EventKind::Deposit);
        assert_eq!(c.amount, Some(dec("2572.00")));
        assert_eq!(c.asset.as_deref(), Some("USDT"));
    }

    #[test]
    fn withdrawal_block_spans_lines() {
        let body = "Your withdrawal on 2024-05-01 12:00:00 (UTC)\nCoin: BTC\nAmount: 0.015\nNetwork: BTC\nwas successful.";
        let c = classify("", body);
        assert_eq!(c.kind, EventKind::Withdrawal);
        assert_eq!(c.amount, Some(dec("0.015")));
        assert_eq!(c.asset.as_deref(), Some("BTC"));
    }

    #[test]
    fn withdrawal_without_block_has_no_amount() {
        let c = classify("Withdrawal", "Your withdrawal on KuCoin was successful.");
        assert_eq!(c.kind, EventKind::Withdrawal);
        assert_eq!(c.amount, None);
        assert_eq!(c.asset, None);
    }

    #[test]
    fn unrecognized_text() {
        let c = classify("Weekly newsletter", "Check out our new listings!");
        assert_eq!(c.kind, EventKind::Unknown);
        assert_eq!(c.amount, None);
        assert_eq!(c.asset, None);
        assert_eq!(c.subject, "Weekly newsletter");
    }

    #[test]
    fn payment_completed_beats_everything_and_carries_order_id() {
        let body = "The buyer has marked the P2P order as Payment Completed.\nOrder ID: 65a1f0c2e4b0\nYou have received a deposit of 10 USDT";
        let c = classify("P2P", body);
        assert_eq!(c.kind, EventKind::P2pPaymentCompleted);
        assert_eq!(c.amount, None);
        assert_eq!(c.order_id.as_deref(), Some("65a1f0c2e4b0"));
    }

    #[test]
    fn sell_completed() {
        let c = classify(
            "P2P Order Completed",
            "You have successfully completed your sell order of 150.5 USDT. Order ID: abc123",
        );
        assert_eq!(c.kind, EventKind::P2pSellCompleted);
        assert_eq!(c.amount, Some(dec("150.5")));
        assert_eq!(c.asset.as_deref(), Some("USDT"));
        assert_eq!(c.order_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn received_requires_funding_account() {
        let funded = classify("", "You have received 75 USDT in your Funding Account.");
        assert_eq!(funded.kind, EventKind::P2pReceivedFunding);
        assert_eq!(funded.amount, Some(dec("75")));

        let plain = classify("", "You have received 75 USDT.");
        assert_eq!(plain.kind, EventKind::Unknown);
    }

    #[test]
    fn buy_submitted() {
        let c = classify(
            "",
            "User alice has submitted a 200 usdt P2P buy order to you.",
        );
        assert_eq!(c.kind, EventKind::P2pBuySubmitted);
        assert_eq!(c.amount, Some(dec("200")));
        assert_eq!(c.asset.as_deref(), Some("USDT"));
    }

    #[test]
    fn matching_is_case_insensitive_and_uses_subject() {
        let c = classify("YOU HAVE RECEIVED A DEPOSIT OF 1.5 ETH", "");
        assert_eq!(c.kind, EventKind::Deposit);
        assert_eq!(c.asset.as_deref(), Some("ETH"));
    }

    #[test]
    fn oversized_amount_degrades_to_absent() {
        let c = classify(
            "",
            "You have received a deposit of 99999999999999999999999999999999 USDT",
        );
        assert_eq!(c.kind, EventKind::Deposit);
        assert_eq!(c.amount, None);
        assert_eq!(c.asset, None);
    }

    #[test]
    fn extract_rub_with_thousands() {
        assert_eq!(
            extract_amount("150,000.50 RUB"),
            Some((dec("150000.50"), "RUB".to_string()))
        );
        assert_eq!(
            extract_amount("Paid 150 000 ₽ to seller"),
            Some((dec("150000"), "RUB".to_string()))
        );
    }

    #[test]
    fn extract_usdt() {
        assert_eq!(
            extract_amount("12.34 USDT"),
            Some((dec("12.34"), "USDT".to_string()))
        );
        assert_eq!(
            extract_amount("total 1,000USDT"),
            Some((dec("1000"), "USDT".to_string()))
        );
    }

    #[test]
    fn extract_nothing() {
        assert_eq!(extract_amount("no numbers here"), None);
        assert_eq!(extract_amount("USDT only"), None);
    }

    #[test]
    fn extract_prefers_earliest_match() {
        assert_eq!(
            extract_amount("Sold 100 USDT for 9,500 RUB"),
            Some((dec("100"), "USDT".to_string()))
        );
        assert_eq!(
            extract_amount("Received 9,500 RUB for 100 USDT"),
            Some((dec("9500"), "RUB".to_string()))
        );
    }

    #[test]
    fn extract_falls_back_when_earliest_is_malformed() {
        assert_eq!(
            extract_amount("Version 1.2.3 USDT pairs, paid 500 RUB"),
            Some((dec("500"), "RUB".to_string()))
        );
        assert_eq!(extract_amount("1.2.3 USDT"), None);
    }
}
