//! Report windows in operator-local calendar days.
//!
//! `YYYY-MM-DD YYYY-MM-DD` selects `[start 00:00, day after end 00:00)` in a
//! fixed UTC offset. No argument selects today in that offset.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use crate::errors::{PipelineError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub first_day: NaiveDate,
    /// Inclusive.
    pub last_day: NaiveDate,
}

pub fn utc_offset(hours: i32) -> Result<FixedOffset> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| PipelineError::Configuration(format!("invalid UTC offset {hours}h")))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| PipelineError::Parse(format!("invalid date '{raw}', expected YYYY-MM-DD: {e}")))
}

fn local_midnight(day: NaiveDate, offset: FixedOffset) -> Result<DateTime<Utc>> {
    day.and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| PipelineError::Parse(format!("no local midnight for {day}")))
}

impl ReportWindow {
    pub fn from_days(first_day: NaiveDate, last_day: NaiveDate, offset: FixedOffset) -> Result<Self> {
        if last_day < first_day {
            return Err(PipelineError::Parse(format!(
                "end date {last_day} is before start date {first_day}"
            )));
        }
        let after_last = last_day
            .succ_opt()
            .ok_or_else(|| PipelineError::Parse(format!("date {last_day} out of range")))?;

        Ok(Self {
            start: local_midnight(first_day, offset)?,
            end: local_midnight(after_last, offset)?,
            first_day,
            last_day,
        })
    }

    /// The calendar day containing `now` in `offset`.
    pub fn today(offset: FixedOffset, now: DateTime<Utc>) -> Result<Self> {
        let today = now.with_timezone(&offset).date_naive();
        Self::from_days(today, today, offset)
    }

    /// Optional `from`/`to` pair as received from a query string. A lone
    /// `from` selects that single day.
    pub fn from_bounds(
        from: Option<&str>,
        to: Option<&str>,
        offset: FixedOffset,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        match (from, to) {
            (None, None) => Self::today(offset, now),
            (Some(from), None) => {
                let day = parse_date(from)?;
                Self::from_days(day, day, offset)
            }
            (Some(from), Some(to)) => Self::from_days(parse_date(from)?, parse_date(to)?, offset),
            (None, Some(_)) => Err(PipelineError::Parse(
                "an end date needs a start date".to_string(),
            )),
        }
    }

    /// Whitespace-separated command arguments: none, one or two dates.
    pub fn parse_args(args: &str, offset: FixedOffset, now: DateTime<Utc>) -> Result<Self> {
        let parts: Vec<&str> = args.split_whitespace().collect();
        match parts.as_slice() {
            [] => Self::from_bounds(None, None, offset, now),
            [from] => Self::from_bounds(Some(from), None, offset, now),
            [from, to] => Self::from_bounds(Some(from), Some(to), offset, now),
            _ => Err(PipelineError::Parse(format!(
                "expected 'YYYY-MM-DD YYYY-MM-DD', got '{args}'"
            ))),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
