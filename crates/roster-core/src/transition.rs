//! Transition validation: may this candidate follow the group's current
//! interval?
//!
//! Two rule sets exist. [`FlowKind::Lms`] applies when back-office users own
//! enrollment statuses. [`FlowKind::Erp`] applies when the order pipeline owns
//! them and users may only create a restricted set of statuses by hand.
//!
//! All checks are pure; the ERP "already applied" short-circuit needs the
//! store and is performed by the engine before calling [`validate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  error::Rejection,
  interval::{Interval, Resolution, StatusChange},
  status::{EnrollmentStatus, ErpCreatableStatus},
};

/// Which upstream flow produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
  /// Manual edits with the full transition rule set.
  #[default]
  Lms,
  /// Manual edits while the order pipeline owns enrollment.
  Erp,
}

/// Checks that do not depend on the group's history: required fields, and the
/// creatable-status restriction of the ERP flow.
pub fn check_candidate(candidate: &StatusChange, flow: FlowKind) -> Result<(), Rejection> {
  if candidate.student_id.trim().is_empty() {
    return Err(Rejection::MissingField("student_id"));
  }
  if candidate.location_id.trim().is_empty() {
    return Err(Rejection::MissingField("location_id"));
  }
  if flow == FlowKind::Erp {
    ErpCreatableStatus::try_from(candidate.status)?;
  }
  Ok(())
}

/// Decide whether `candidate` may follow `current`.
///
/// `current` is the group's current interval, or its latest interval when the
/// group is entirely future-dated. `latest` is the interval with the greatest
/// start date.
pub fn validate(
  current: &Interval,
  candidate: &StatusChange,
  latest: &Interval,
  flow: FlowKind,
) -> Result<(), Rejection> {
  check_status_rule(current, candidate, latest, flow)?;

  let Some(candidate_start) = candidate.start_date else {
    return Ok(());
  };

  let current_start = Resolution::User.truncate(current.start_date);
  let candidate_start = Resolution::User.truncate(candidate_start);

  if candidate.status == current.status {
    if candidate_start != current_start {
      return Err(Rejection::StartDateMismatch {
        current:   current_start,
        candidate: candidate_start,
      });
    }
  } else {
    check_starts_after(current, candidate_start)?;
  }

  Ok(())
}

/// A change to a different status must start strictly after `current` does,
/// compared at [`Resolution::User`]. Both flows apply this rule.
pub fn check_starts_after(current: &Interval, start: DateTime<Utc>) -> Result<(), Rejection> {
  let current_start = Resolution::User.truncate(current.start_date);
  let candidate_start = Resolution::User.truncate(start);
  if candidate_start <= current_start {
    return Err(Rejection::StartDateNotAfterCurrent {
      current:   current_start,
      candidate: candidate_start,
    });
  }
  Ok(())
}

fn check_status_rule(
  current: &Interval,
  candidate: &StatusChange,
  latest: &Interval,
  flow: FlowKind,
) -> Result<(), Rejection> {
  match current.status {
    EnrollmentStatus::NonPotential if candidate.status != EnrollmentStatus::NonPotential => {
      Err(Rejection::IllegalTransition { from: current.status, to: candidate.status })
    }
    EnrollmentStatus::Temporary
      if candidate.status == EnrollmentStatus::Temporary && flow == FlowKind::Lms =>
    {
      // A same-status edit must not move the end of a window that a later
      // interval already builds on.
      let current_end = current.end_date.map(|end| Resolution::User.truncate(end));
      let candidate_end = candidate.end_date.map(|end| Resolution::User.truncate(end));
      if latest.status == EnrollmentStatus::Temporary || current_end == candidate_end {
        Ok(())
      } else {
        Err(Rejection::TemporaryWindowChanged {
          current:   current.end_date,
          candidate: candidate.end_date,
        })
      }
    }
    _ => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, TimeDelta, TimeZone as _, Utc};
  use strum::IntoEnumIterator as _;
  use uuid::Uuid;

  use super::*;

  fn at(m: u32, d: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap() }

  fn interval(
    status: EnrollmentStatus,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
  ) -> Interval {
    Interval {
      interval_id: Uuid::new_v4(),
      student_id: "S".into(),
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

  fn change(
    status: EnrollmentStatus,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
  ) -> StatusChange {
    StatusChange {
      student_id: "S".into(),
      location_id: "L".into(),
      organization_id: "org".into(),
      status,
      start_date: start,
      end_date: end,
      order_id: None,
    }
  }

  #[test]
  fn potential_may_become_anything() {
    let current = interval(EnrollmentStatus::Potential, at(1, 1), None);
    for to in EnrollmentStatus::iter().filter(|s| *s != EnrollmentStatus::Potential) {
      let candidate = change(to, Some(at(1, 2)), None);
      assert_eq!(validate(&current, &candidate, &current, FlowKind::Lms), Ok(()), "{to}");
    }
  }

  #[test]
  fn non_potential_is_a_sink() {
    let current = interval(EnrollmentStatus::NonPotential, at(1, 1), None);
    for to in EnrollmentStatus::iter() {
      let candidate = change(to, Some(at(2, 1)), None);
      let result = validate(&current, &candidate, &current, FlowKind::Lms);
      if to == EnrollmentStatus::NonPotential {
        // Same status with a different start date is a date mismatch, not an
        // illegal transition.
        assert!(matches!(result, Err(Rejection::StartDateMismatch { .. })));
      } else {
        assert_eq!(
          result,
          Err(Rejection::IllegalTransition { from: EnrollmentStatus::NonPotential, to })
        );
      }
    }
  }

  #[test]
  fn temporary_edit_with_different_end_is_rejected_when_future_status_exists() {
    let current = interval(EnrollmentStatus::Temporary, at(1, 1), Some(at(2, 1)));
    let latest = interval(EnrollmentStatus::Enrolled, at(2, 1), None);
    let candidate = change(EnrollmentStatus::Temporary, Some(at(1, 1)), Some(at(1, 15)));

    assert!(matches!(
      validate(&current, &candidate, &latest, FlowKind::Lms),
      Err(Rejection::TemporaryWindowChanged { .. })
    ));
  }

  #[test]
  fn temporary_edit_with_matching_end_is_allowed() {
    let current = interval(EnrollmentStatus::Temporary, at(1, 1), Some(at(2, 1)));
    let latest = interval(EnrollmentStatus::Enrolled, at(2, 1), None);
    // Sub-second noise is ignored.
    let end = at(2, 1) + TimeDelta::milliseconds(250);
    let candidate = change(EnrollmentStatus::Temporary, Some(at(1, 1)), Some(end));

    assert_eq!(validate(&current, &candidate, &latest, FlowKind::Lms), Ok(()));
  }

  #[test]
  fn temporary_edit_is_free_when_latest_is_temporary() {
    let current = interval(EnrollmentStatus::Temporary, at(1, 1), Some(at(2, 1)));
    let candidate = change(EnrollmentStatus::Temporary, Some(at(1, 1)), Some(at(3, 1)));

    assert_eq!(validate(&current, &candidate, &current, FlowKind::Lms), Ok(()));
  }

  #[test]
  fn erp_flow_skips_the_temporary_window_rule() {
    let current = interval(EnrollmentStatus::Temporary, at(1, 1), Some(at(2, 1)));
    let latest = interval(EnrollmentStatus::Enrolled, at(2, 1), None);
    let candidate = change(EnrollmentStatus::Temporary, Some(at(1, 1)), Some(at(1, 15)));

    assert_eq!(validate(&current, &candidate, &latest, FlowKind::Erp), Ok(()));
  }

  #[test]
  fn unset_start_skips_date_checks() {
    let current = interval(EnrollmentStatus::Enrolled, at(3, 1), None);
    let candidate = change(EnrollmentStatus::Withdrawn, None, None);
    assert_eq!(validate(&current, &candidate, &current, FlowKind::Lms), Ok(()));
  }

  #[test]
  fn same_status_requires_same_start_to_the_second() {
    let current = interval(EnrollmentStatus::Enrolled, at(1, 1), None);

    let same = change(EnrollmentStatus::Enrolled, Some(at(1, 1) + TimeDelta::milliseconds(900)), None);
    assert_eq!(validate(&current, &same, &current, FlowKind::Lms), Ok(()));

    let moved = change(EnrollmentStatus::Enrolled, Some(at(1, 1) + TimeDelta::seconds(1)), None);
    assert!(matches!(
      validate(&current, &moved, &current, FlowKind::Lms),
      Err(Rejection::StartDateMismatch { .. })
    ));
  }

  #[test]
  fn different_status_must_start_strictly_later() {
    let current = interval(EnrollmentStatus::Enrolled, at(1, 1), None);

    let same_instant = change(EnrollmentStatus::Withdrawn, Some(at(1, 1)), None);
    assert!(matches!(
      validate(&current, &same_instant, &current, FlowKind::Lms),
      Err(Rejection::StartDateNotAfterCurrent { .. })
    ));

    let earlier = change(EnrollmentStatus::Withdrawn, Some(at(1, 1) - TimeDelta::days(1)), None);
    assert!(validate(&current, &earlier, &current, FlowKind::Lms).is_err());

    let later = change(EnrollmentStatus::Withdrawn, Some(at(1, 2)), None);
    assert_eq!(validate(&current, &later, &current, FlowKind::Lms), Ok(()));
  }

  #[test]
  fn candidate_checks() {
    let mut candidate = change(EnrollmentStatus::Enrolled, None, None);
    assert_eq!(check_candidate(&candidate, FlowKind::Lms), Ok(()));
    assert_eq!(
      check_candidate(&candidate, FlowKind::Erp),
      Err(Rejection::StatusNotCreatable(EnrollmentStatus::Enrolled))
    );

    candidate.status = EnrollmentStatus::Temporary;
    assert_eq!(check_candidate(&candidate, FlowKind::Erp), Ok(()));

    candidate.location_id = "  ".into();
    assert_eq!(
      check_candidate(&candidate, FlowKind::Lms),
      Err(Rejection::MissingField("location_id"))
    );
  }

  #[test]
  fn starts_after_compares_whole_seconds() {
    let current = interval(EnrollmentStatus::Enrolled, at(1, 3), None);
    assert!(check_starts_after(&current, at(1, 2)).is_err());
    assert!(check_starts_after(&current, at(1, 3) + TimeDelta::milliseconds(900)).is_err());
    assert_eq!(check_starts_after(&current, at(1, 3) + TimeDelta::seconds(1)), Ok(()));
  }
}
