//! Enrollment status intervals — the unit of the status history.
//!
//! An interval records that a student held one status at one location over
//! `[start_date, end_date)`. Intervals are grouped per (student, location);
//! within a group they never overlap and at most one is current.

use chrono::{DateTime, SubsecRound as _, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::EnrollmentStatus;

// ─── Time resolution ─────────────────────────────────────────────────────────

/// The two granularities at which interval timestamps are compared.
///
/// Human edits are second-granular, so rule checks and deactivation offsets
/// use [`Resolution::User`]. Collision disambiguation must be finer than any
/// human could collide on, so it uses [`Resolution::Store`], the precision at
/// which timestamps are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
  User,
  Store,
}

impl Resolution {
  /// The smallest step at this resolution.
  pub fn unit(self) -> TimeDelta {
    match self {
      Self::User => TimeDelta::seconds(1),
      Self::Store => TimeDelta::microseconds(1),
    }
  }

  pub fn truncate(self, at: DateTime<Utc>) -> DateTime<Utc> {
    match self {
      Self::User => at.trunc_subsecs(0),
      Self::Store => at.trunc_subsecs(6),
    }
  }
}

// ─── Group ───────────────────────────────────────────────────────────────────

/// Identifies one timeline: a student at a location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
  pub student_id:  String,
  pub location_id: String,
}

impl GroupKey {
  pub fn new(student_id: impl Into<String>, location_id: impl Into<String>) -> Self {
    Self { student_id: student_id.into(), location_id: location_id.into() }
  }
}

impl std::fmt::Display for GroupKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}@{}", self.student_id, self.location_id)
  }
}

// ─── Interval ────────────────────────────────────────────────────────────────

/// A persisted enrollment status interval.
///
/// `(student_id, location_id, status, start_date)` is unique among
/// non-deleted rows. `interval_id` is a stable handle that survives the
/// in-place update of an upcoming interval, which changes that key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
  pub interval_id:     Uuid,
  pub student_id:      String,
  pub location_id:     String,
  pub organization_id: String,
  pub status:          EnrollmentStatus,
  /// Inclusive.
  pub start_date:      DateTime<Utc>,
  /// Exclusive; `None` means open-ended.
  pub end_date:        Option<DateTime<Utc>>,
  /// Set only when the interval originated from a commerce order.
  pub order_id:        Option<String>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

impl Interval {
  pub fn group(&self) -> GroupKey {
    GroupKey::new(self.student_id.clone(), self.location_id.clone())
  }

  /// `start_date <= now < end_date`, with an open end counting as infinite.
  pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
    self.start_date <= now && self.end_date.is_none_or(|end| now < end)
  }

  /// Whether the half-open ranges of `self` and `other` intersect.
  pub fn overlaps(&self, other: &Interval) -> bool {
    let self_before_other = self.end_date.is_some_and(|end| end <= other.start_date);
    let other_before_self = other.end_date.is_some_and(|end| end <= self.start_date);
    !self_before_other && !other_before_self
  }
}

/// Input to [`crate::store::IntervalStore::create`] and
/// [`crate::store::IntervalStore::update_window`]. Bookkeeping timestamps and
/// the id are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInterval {
  pub student_id:      String,
  pub location_id:     String,
  pub organization_id: String,
  pub status:          EnrollmentStatus,
  pub start_date:      DateTime<Utc>,
  pub end_date:        Option<DateTime<Utc>>,
  pub order_id:        Option<String>,
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// A proposed status change for one group, as submitted by a back-office edit
/// or derived from an order event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
  pub student_id:      String,
  pub location_id:     String,
  #[serde(default)]
  pub organization_id: String,
  pub status:          EnrollmentStatus,
  /// `None` marks a status-only edit; the change takes effect "now".
  #[serde(default)]
  pub start_date:      Option<DateTime<Utc>>,
  #[serde(default)]
  pub end_date:        Option<DateTime<Utc>>,
  #[serde(default)]
  pub order_id:        Option<String>,
}

impl StatusChange {
  pub fn group(&self) -> GroupKey {
    GroupKey::new(self.student_id.clone(), self.location_id.clone())
  }

  /// The instant the change takes effect, falling back to `now` when unset.
  pub fn effective_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    self.start_date.unwrap_or(now)
  }

  /// Materialise the row to persist, normalised to store precision.
  pub fn to_new_interval(&self, now: DateTime<Utc>) -> NewInterval {
    NewInterval {
      student_id:      self.student_id.clone(),
      location_id:     self.location_id.clone(),
      organization_id: self.organization_id.clone(),
      status:          self.status,
      start_date:      Resolution::Store.truncate(self.effective_start(now)),
      end_date:        self.end_date.map(|end| Resolution::Store.truncate(end)),
      order_id:        self.order_id.clone(),
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The two intervals of a group every decision is made against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSnapshot {
  /// The interval active "now", if any.
  pub current: Option<Interval>,
  /// The interval with the greatest start date, possibly future-dated.
  pub latest:  Option<Interval>,
}

impl GroupSnapshot {
  pub fn is_empty(&self) -> bool { self.current.is_none() && self.latest.is_none() }

  /// The interval transitions are judged against: the current one, or the
  /// latest when the whole group is future-dated.
  pub fn reference(&self) -> Option<&Interval> {
    self.current.as_ref().or(self.latest.as_ref())
  }

  /// The latest interval, falling back to the reference interval.
  pub fn latest_or_reference(&self) -> Option<&Interval> {
    self.latest.as_ref().or(self.current.as_ref())
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  fn interval(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Interval {
    Interval {
      interval_id:     Uuid::new_v4(),
      student_id:      "s1".into(),
      location_id:     "l1".into(),
      organization_id: "org".into(),
      status:          EnrollmentStatus::Enrolled,
      start_date:      start,
      end_date:        end,
      order_id:        None,
      created_at:      start,
      updated_at:      start,
    }
  }

  #[test]
  fn current_respects_half_open_range() {
    let i = interval(at(2024, 1, 1), Some(at(2024, 2, 1)));
    assert!(i.is_current_at(at(2024, 1, 1)));
    assert!(i.is_current_at(at(2024, 1, 31)));
    assert!(!i.is_current_at(at(2024, 2, 1)));
    assert!(!i.is_current_at(at(2023, 12, 31)));

    let open = interval(at(2024, 1, 1), None);
    assert!(open.is_current_at(at(2030, 1, 1)));
  }

  #[test]
  fn adjacent_intervals_do_not_overlap() {
    let a = interval(at(2024, 1, 1), Some(at(2024, 2, 1)));
    let b = interval(at(2024, 2, 1), None);
    let c = interval(at(2024, 1, 15), None);
    assert!(!a.overlaps(&b));
    assert!(!b.overlaps(&a));
    assert!(a.overlaps(&c));
    assert!(b.overlaps(&c));
  }

  #[test]
  fn resolutions_truncate_differently() {
    let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
      + TimeDelta::nanoseconds(123_456_789);
    assert_eq!(Resolution::User.truncate(t).timestamp_subsec_nanos(), 0);
    assert_eq!(Resolution::Store.truncate(t).timestamp_subsec_nanos(), 123_456_000);
    assert!(Resolution::Store.unit() < Resolution::User.unit());
  }

  #[test]
  fn unset_start_takes_effect_now() {
    let change = StatusChange {
      student_id:      "s1".into(),
      location_id:     "l1".into(),
      organization_id: "org".into(),
      status:          EnrollmentStatus::Withdrawn,
      start_date:      None,
      end_date:        None,
      order_id:        None,
    };
    let now = at(2024, 3, 1) + TimeDelta::nanoseconds(999);
    let row = change.to_new_interval(now);
    assert_eq!(row.start_date, at(2024, 3, 1));
  }
}
