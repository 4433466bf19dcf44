//! [`ActivationCascade`] — derives each student's account activation from
//! their enrollment intervals.
//!
//! A student is active while any of their current intervals, at any location,
//! carries a status other than `Temporary`. Otherwise the account is marked
//! deactivated as of the last transition that has already happened: the end
//! of an interval that has ended, or the start of one that is running. Future
//! intervals are ignored; with nothing started yet, the account is deactivated
//! as of now.

use chrono::{DateTime, Utc};
use roster_core::{
  Error, Result,
  interval::Interval,
  status::EnrollmentStatus,
  store::{IntervalStore, StudentDirectory},
};
use serde::Serialize;
use tracing::debug;

/// The activation value pushed to one student record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activation {
  pub student_id:     String,
  /// `None` when the student is active.
  pub deactivated_at: Option<DateTime<Utc>>,
}

impl Activation {
  pub fn is_active(&self) -> bool { self.deactivated_at.is_none() }
}

/// Compute the activation of `student_id` from their intervals.
pub fn derive_activation(
  student_id: &str,
  intervals: &[Interval],
  now: DateTime<Utc>,
) -> Activation {
  let mut active = false;
  let mut last_transition: Option<DateTime<Utc>> = None;
  for interval in intervals
    .iter()
    .filter(|i| i.student_id == student_id && i.start_date <= now)
  {
    if interval.status != EnrollmentStatus::Temporary && interval.is_current_at(now) {
      active = true;
    }
    let transition = match interval.end_date {
      Some(end) if end <= now => end,
      _ => interval.start_date,
    };
    last_transition = last_transition.max(Some(transition));
  }

  Activation {
    student_id:     student_id.to_owned(),
    deactivated_at: (!active).then(|| last_transition.unwrap_or(now)),
  }
}

pub struct ActivationCascade<'a, S> {
  store: &'a S,
  now:   DateTime<Utc>,
}

impl<'a, S> ActivationCascade<'a, S>
where
  S: IntervalStore + StudentDirectory,
{
  pub fn new(store: &'a S, now: DateTime<Utc>) -> Self { Self { store, now } }

  /// Re-derive and push the activation of every student in `student_ids`.
  pub async fn recompute(&self, student_ids: &[String]) -> Result<Vec<Activation>> {
    let intervals = self
      .store
      .intervals_by_student_ids(student_ids)
      .await
      .map_err(Error::store)?;

    let mut pushed = Vec::with_capacity(student_ids.len());
    for student_id in student_ids {
      let activation = derive_activation(student_id, &intervals, self.now);
      self
        .store
        .set_deactivated_at(student_id, activation.deactivated_at)
        .await
        .map_err(Error::store)?;
      debug!(%student_id, active = activation.is_active(), "pushed activation");
      pushed.push(activation);
    }
    Ok(pushed)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;
  use uuid::Uuid;

  use super::*;

  fn at(m: u32, d: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap() }

  fn interval(
    student: &str,
    status: EnrollmentStatus,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
  ) -> Interval {
    Interval {
      interval_id: Uuid::new_v4(),
      student_id: student.into(),
      location_id: "L".into(),
      organization_id: "org".into(),
      status,
      start_date: start,
      end_date: end,
      order_id: None,
      created_at: start,
      updated_at: start,
    }
  }

  #[test]
  fn any_current_non_temporary_interval_activates() {
    let intervals = [
      interval("S", EnrollmentStatus::Temporary, at(1, 1), None),
      interval("S", EnrollmentStatus::Enrolled, at(1, 1), None),
    ];
    assert!(derive_activation("S", &intervals, at(2, 1)).is_active());
  }

  #[test]
  fn only_temporary_intervals_deactivate_at_last_transition() {
    let intervals = [
      interval("S", EnrollmentStatus::Temporary, at(1, 1), Some(at(2, 1))),
      interval("S", EnrollmentStatus::Temporary, at(2, 1), None),
      interval("other", EnrollmentStatus::Enrolled, at(1, 1), None),
    ];
    let activation = derive_activation("S", &intervals, at(3, 1));
    assert_eq!(activation.deactivated_at, Some(at(2, 1)));
  }

  #[test]
  fn closed_or_future_intervals_do_not_count() {
    let intervals = [
      interval("S", EnrollmentStatus::Enrolled, at(1, 1), Some(at(2, 1))),
      interval("S", EnrollmentStatus::Enrolled, at(5, 1), None),
    ];
    let activation = derive_activation("S", &intervals, at(3, 1));
    assert_eq!(activation.deactivated_at, Some(at(2, 1)));
  }

  #[test]
  fn only_future_intervals_deactivate_now() {
    let intervals = [interval("S", EnrollmentStatus::Enrolled, at(5, 1), None)];
    let activation = derive_activation("S", &intervals, at(3, 1));
    assert_eq!(activation.deactivated_at, Some(at(3, 1)));
  }

  #[test]
  fn running_temporary_interval_deactivates_at_its_start() {
    let intervals = [
      interval("S", EnrollmentStatus::Enrolled, at(1, 1), Some(at(1, 20))),
      interval("S", EnrollmentStatus::Temporary, at(2, 1), Some(at(4, 1))),
    ];
    let activation = derive_activation("S", &intervals, at(3, 1));
    assert_eq!(activation.deactivated_at, Some(at(2, 1)));
  }

  #[test]
  fn no_intervals_deactivates_now() {
    assert_eq!(derive_activation("S", &[], at(3, 1)).deactivated_at, Some(at(3, 1)));
  }
}
