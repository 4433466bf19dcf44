//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond
//! fraction and a `Z` suffix, so lexical order equals chronological order and
//! range predicates can compare the columns directly. UUIDs are stored as
//! hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, SecondsFormat, Utc};
use roster_core::{
  interval::{Interval, Resolution},
  status::EnrollmentStatus,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  Resolution::Store
    .truncate(dt)
    .to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EnrollmentStatus ────────────────────────────────────────────────────────

pub fn encode_status(status: EnrollmentStatus) -> String { status.as_ref().to_owned() }

pub fn decode_status(s: &str) -> Result<EnrollmentStatus> {
  EnrollmentStatus::from_str(s).map_err(|_| Error::UnknownStatus(s.to_owned()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawInterval::from_row`].
pub const INTERVAL_COLUMNS: &str = "interval_id, student_id, location_id, organization_id, \
   enrollment_status, start_date, end_date, order_id, created_at, updated_at";

/// Raw strings read directly from an `enrollment_status_history` row.
pub struct RawInterval {
  pub interval_id:     String,
  pub student_id:      String,
  pub location_id:     String,
  pub organization_id: String,
  pub status:          String,
  pub start_date:      String,
  pub end_date:        Option<String>,
  pub order_id:        Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawInterval {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      interval_id:     row.get(0)?,
      student_id:      row.get(1)?,
      location_id:     row.get(2)?,
      organization_id: row.get(3)?,
      status:          row.get(4)?,
      start_date:      row.get(5)?,
      end_date:        row.get(6)?,
      order_id:        row.get(7)?,
      created_at:      row.get(8)?,
      updated_at:      row.get(9)?,
    })
  }

  pub fn into_interval(self) -> Result<Interval> {
    Ok(Interval {
      interval_id:     decode_uuid(&self.interval_id)?,
      student_id:      self.student_id,
      location_id:     self.location_id,
      organization_id: self.organization_id,
      status:          decode_status(&self.status)?,
      start_date:      decode_dt(&self.start_date)?,
      end_date:        self.end_date.as_deref().map(decode_dt).transpose()?,
      order_id:        self.order_id,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

pub fn into_intervals(raws: Vec<RawInterval>) -> Result<Vec<Interval>> {
  raws.into_iter().map(RawInterval::into_interval).collect()
}

#[cfg(test)]
mod tests {
  use chrono::{TimeDelta, TimeZone as _};

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
    let b = a + TimeDelta::microseconds(1);
    let c = a + TimeDelta::seconds(1);
    assert!(encode_dt(a) < encode_dt(b));
    assert!(encode_dt(b) < encode_dt(c));
    assert_eq!(encode_dt(a), "2024-01-09T23:59:59.000000Z");
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn nanoseconds_are_dropped() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::nanoseconds(1_999);
    assert_eq!(decode_dt(&encode_dt(a)).unwrap(), a - TimeDelta::nanoseconds(999));
  }
}
