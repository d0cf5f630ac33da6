//! Database-backed Ledger Store
//!
//! Append-only record of every ingested mail event, keyed by source message id.
//!
//! - WAL mode so report queries can read while the poller appends
//! - `INSERT OR IGNORE` makes check-and-insert a single atomic statement
//! - Covering index on `(observed_at_ms, id)` for range and recent queries
//! - Amounts stored as canonical decimal text, `NULL` when absent

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, Result};
use crate::models::{Event, EventKind};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    observed_at_ms INTEGER NOT NULL,
    kind TEXT NOT NULL,
    amount TEXT,
    asset TEXT,
    order_id TEXT,
    subject TEXT NOT NULL,
    inserted_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_events_observed
    ON events(observed_at_ms, id, kind, amount, asset);
"#;

const SELECT_COLUMNS: &str = "id, observed_at_ms, kind, amount, asset, order_id, subject";

/// Append-only event ledger
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl LedgerStore {
    /// Open (or create) the ledger at `db_path`. `:memory:` gives a private
    /// in-memory ledger.
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .map_err(|e| PipelineError::Storage(format!("failed to open ledger at {db_path}: {e}")))?;

        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| PipelineError::Storage(format!("failed to initialize ledger schema: {e}")))?;

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if db_path != ":memory:" && !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        info!(path = %db_path, existing_events = count, "ledger opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert unless an event with the same id exists. Returns `true` when a
    /// row was written. Duplicates are not an error.
    pub fn insert_if_absent(&self, event: &Event) -> Result<bool> {
        let amount = event.amount.map(|a| a.to_string());
        let conn = self.conn.lock();

        let changes = conn.execute(
            "INSERT OR IGNORE INTO events
             (id, observed_at_ms, kind, amount, asset, order_id, subject)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &event.id,
                event.observed_at.timestamp_millis(),
                event.kind.as_str(),
                amount,
                &event.asset,
                &event.order_id,
                &event.subject,
            ],
        )?;

        if changes == 0 {
            debug!(id = %event.id, "event already in ledger");
        }
        Ok(changes > 0)
    }

    /// Every stored id. Used to seed the in-memory dedup cache.
    pub fn known_ids(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id FROM events")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(ids)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = ?1)",
            [id],
            |row| row.get(0),
        )?;
        Ok(found != 0)
    }

    /// Events in `[start, end)`, ascending by observation time (ties by id).
    pub fn query_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM events
             WHERE observed_at_ms >= ?1 AND observed_at_ms < ?2
             ORDER BY observed_at_ms ASC, id ASC"
        ))?;

        let events = stmt
            .query_map(
                params![start.timestamp_millis(), end.timestamp_millis()],
                Self::row_to_event,
            )?
            .collect::<rusqlite::Result<Vec<Event>>>()?;
        Ok(events)
    }

    /// The `limit` most recent events, newest first.
    pub fn query_recent(&self, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM events
             ORDER BY observed_at_ms DESC, id ASC
             LIMIT ?1"
        ))?;

        let events = stmt
            .query_map([limit as i64], Self::row_to_event)?
            .collect::<rusqlite::Result<Vec<Event>>>()?;
        Ok(events)
    }

    /// Convert a database row to an Event
    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let id: String = row.get(0)?;
        let observed_at_ms: i64 = row.get(1)?;
        let kind_str: String = row.get(2)?;
        let amount_str: Option<String> = row.get(3)?;
        let asset: Option<String> = row.get(4)?;
        let order_id: Option<String> = row.get(5)?;
        let subject: String = row.get(6)?;

        let kind = EventKind::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown event kind '{kind_str}'").into(),
            )
        })?;

        let amount = amount_str
            .map(|s| Decimal::from_str(&s))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
            })?;

        let observed_at = DateTime::<Utc>::from_timestamp_millis(observed_at_ms).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(1, observed_at_ms)
        })?;

        Ok(Event {
            id,
            observed_at,
            kind,
            amount,
            asset,
            order_id,
            subject,
        })
    }

    /// Number of stored events
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn create_test_event(id: &str, observed_ms: i64) -> Event {
        Event {
            id: id.to_string(),
            observed_at: at(observed_ms),
            kind: EventKind::Deposit,
            amount: Some(Decimal::from_str("100.50").unwrap()),
            asset: Some("USDT".to_string()),
            order_id: None,
            subject: "Deposit Successful".to_string(),
        }
    }

    #[test]
    fn test_ledger_create() {
        let store = LedgerStore::new(":memory:").expect("Failed to create ledger");
        assert_eq!(store.len().unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = LedgerStore::new(":memory:").unwrap();
        let event = create_test_event("msg_1", 1_000);

        assert!(store.insert_if_absent(&event).unwrap());
        for _ in 0..5 {
            assert!(!store.insert_if_absent(&event).unwrap());
        }
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_id_keeps_first_version() {
        let store = LedgerStore::new(":memory:").unwrap();
        store.insert_if_absent(&create_test_event("msg_1", 1_000)).unwrap();

        let mut changed = create_test_event("msg_1", 9_000);
        changed.kind = EventKind::Withdrawal;
        assert!(!store.insert_if_absent(&changed).unwrap());

        let stored = store.query_recent(10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, EventKind::Deposit);
        assert_eq!(stored[0].observed_at, at(1_000));
    }

    #[test]
    fn test_round_trip_preserves_absent_amount() {
        let store = LedgerStore::new(":memory:").unwrap();
        let mut event = create_test_event("msg_1", 1_000);
        event.kind = EventKind::P2pPaymentCompleted;
        event.amount = None;
        event.asset = None;
        event.order_id = Some("65a1f0".to_string());
        store.insert_if_absent(&event).unwrap();

        let stored = &store.query_recent(1).unwrap()[0];
        assert_eq!(stored, &event);
    }

    #[test]
    fn test_range_is_half_open_and_ascending() {
        let store = LedgerStore::new(":memory:").unwrap();
        let t0 = at(1_700_000_000_000);
        let t1 = t0 + Duration::hours(1);

        // inserted out of order on purpose
        for (id, offset_ms) in [("c", 2_000), ("a", 0), ("end", 3_600_000), ("b", 1_000), ("before", -1)] {
            store
                .insert_if_absent(&create_test_event(id, t0.timestamp_millis() + offset_ms))
                .unwrap();
        }

        let ids: Vec<String> = store
            .query_range(t0, t1)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_recent_is_descending_with_limit() {
        let store = LedgerStore::new(":memory:").unwrap();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            store
                .insert_if_absent(&create_test_event(id, 1_000 * i as i64))
                .unwrap();
        }
        let ids: Vec<String> = store
            .query_recent(3)
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["d", "c", "b"]);
    }

    #[test]
    fn test_known_ids_matches_store() {
        let store = LedgerStore::new(":memory:").unwrap();
        store.insert_if_absent(&create_test_event("x", 1)).unwrap();
        store.insert_if_absent(&create_test_event("y", 2)).unwrap();
        store.insert_if_absent(&create_test_event("x", 3)).unwrap();

        let ids = store.known_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("x") && ids.contains("y"));
        assert!(store.contains("y").unwrap());
        assert!(!store.contains("z").unwrap());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap();

        {
            let store = LedgerStore::new(path).unwrap();
            store.insert_if_absent(&create_test_event("persist", 42)).unwrap();
        }

        let reopened = LedgerStore::new(path).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
        assert!(!reopened.insert_if_absent(&create_test_event("persist", 42)).unwrap());
    }
}
