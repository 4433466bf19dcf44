//! Start-date collision resolution.
//!
//! The identity of an interval includes its exact start date, so several
//! orders landing on the same instant would collide. A future-dated candidate
//! that shares its start second with existing intervals is moved just past the
//! latest of them, one [`Resolution::Store`] unit at a time, which keeps the
//! arrival order of the colliding changes. Re-submitting the same order is a
//! duplicate and is refused outright.

use chrono::{DateTime, Utc};

use crate::{
  error::{Error, Result},
  interval::{Interval, Resolution, StatusChange},
};

/// The start date to look up collisions for, when resolution applies at all.
///
/// Only candidates starting strictly after `now` are resolved.
pub fn collision_probe(candidate: &StatusChange, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
  candidate.start_date.filter(|start| *start > now)
}

/// Adjust `candidate` against the intervals sharing its start second.
///
/// `shared` is the result of
/// [`IntervalStore::shared_start_date_intervals`](crate::store::IntervalStore::shared_start_date_intervals)
/// for the probe returned by [`collision_probe`].
pub fn resolve(
  mut candidate: StatusChange,
  shared: &[Interval],
  now: DateTime<Utc>,
) -> Result<StatusChange> {
  let Some(start) = collision_probe(&candidate, now) else {
    return Ok(candidate);
  };
  if shared.is_empty() {
    return Ok(candidate);
  }

  if candidate.order_id.is_some() && shared.iter().any(|i| i.order_id == candidate.order_id) {
    return Err(Error::AlreadyExists {
      order_id:   candidate.order_id,
      start_date: start,
    });
  }

  let start = Resolution::Store.truncate(start);
  let Some(max_existing) = shared.iter().map(|i| i.start_date).max() else {
    return Ok(candidate);
  };
  if max_existing < start {
    return Ok(candidate);
  }

  candidate.start_date = Some(start + (max_existing - start) + Resolution::Store.unit());
  Ok(candidate)
}

#[cfg(test)]
mod tests {
  use chrono::{TimeDelta, TimeZone as _};
  use uuid::Uuid;

  use super::*;
  use crate::status::EnrollmentStatus;

  fn noon() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

  fn candidate(start: DateTime<Utc>, order_id: Option<&str>) -> StatusChange {
    StatusChange {
      student_id: "S".into(),
      location_id: "L".into(),
      organization_id: "org".into(),
      status: EnrollmentStatus::Enrolled,
      start_date: Some(start),
      end_date: None,
      order_id: order_id.map(str::to_owned),
    }
  }

  fn existing(start: DateTime<Utc>, order_id: Option<&str>) -> Interval {
    Interval {
      interval_id: Uuid::new_v4(),
      student_id: "S".into(),
      location_id: "L".into(),
      organization_id: "org".into(),
      status: EnrollmentStatus::Potential,
      start_date: start,
      end_date: None,
      order_id: order_id.map(str::to_owned),
      created_at: start,
      updated_at: start,
    }
  }

  #[test]
  fn past_candidates_are_left_alone() {
    let now = noon();
    let c = candidate(now - TimeDelta::hours(1), Some("O2"));
    let shared = [existing(now - TimeDelta::hours(1), Some("O2"))];
    assert_eq!(resolve(c.clone(), &shared, now).unwrap(), c);
  }

  #[test]
  fn no_collision_leaves_candidate_unchanged() {
    let now = noon();
    let c = candidate(now + TimeDelta::days(1), Some("O2"));
    assert_eq!(resolve(c.clone(), &[], now).unwrap(), c);
  }

  #[test]
  fn same_order_is_a_duplicate() {
    let now = noon();
    let start = now + TimeDelta::days(1);
    let err = resolve(candidate(start, Some("O1")), &[existing(start, Some("O1"))], now).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { order_id: Some(ref id), .. } if id == "O1"));
  }

  #[test]
  fn collision_shifts_one_store_unit_past_the_latest() {
    let now = noon();
    let start = now + TimeDelta::days(1);
    let shared = [
      existing(start, Some("O1")),
      existing(start + TimeDelta::microseconds(1), Some("O2")),
      existing(start + TimeDelta::microseconds(2), None),
    ];

    let resolved = resolve(candidate(start, Some("O3")), &shared, now).unwrap();
    let adjusted = resolved.start_date.unwrap();
    assert_eq!(adjusted, start + TimeDelta::microseconds(3));
    assert!(shared.iter().all(|i| adjusted > i.start_date));
  }

  #[test]
  fn shifted_start_never_precedes_the_collisions() {
    let now = noon();
    let start = now + TimeDelta::hours(2);
    for offset_us in [0_i64, 5, 999_999] {
      let shared = [existing(start + TimeDelta::microseconds(offset_us), Some("O1"))];
      let resolved = resolve(candidate(start, None), &shared, now).unwrap();
      assert!(resolved.start_date.unwrap() > shared[0].start_date);
      assert!(resolved.start_date.unwrap() >= start);
    }
  }
}
