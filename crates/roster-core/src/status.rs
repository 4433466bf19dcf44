//! Enrollment statuses.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::Rejection;

/// The enrollment status a student holds at one location for one interval.
///
/// The string form (`as_ref`, `Display`, `FromStr`) is the value persisted by
/// storage backends.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnrollmentStatus {
  Potential,
  Temporary,
  NonPotential,
  Enrolled,
  Withdrawn,
  Graduated,
  LeaveOfAbsence,
}

impl EnrollmentStatus {
  /// Status assigned when a location is first attached to a student.
  pub const DEFAULT: Self = Self::Potential;
}

/// The statuses a back-office user may create directly while the order
/// pipeline owns enrollment. Everything else arrives through orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErpCreatableStatus {
  Potential,
  Temporary,
  NonPotential,
}

impl TryFrom<EnrollmentStatus> for ErpCreatableStatus {
  type Error = Rejection;

  fn try_from(status: EnrollmentStatus) -> Result<Self, Self::Error> {
    match status {
      EnrollmentStatus::Potential => Ok(Self::Potential),
      EnrollmentStatus::Temporary => Ok(Self::Temporary),
      EnrollmentStatus::NonPotential => Ok(Self::NonPotential),
      EnrollmentStatus::Enrolled
      | EnrollmentStatus::Withdrawn
      | EnrollmentStatus::Graduated
      | EnrollmentStatus::LeaveOfAbsence => Err(Rejection::StatusNotCreatable(status)),
    }
  }
}

impl From<ErpCreatableStatus> for EnrollmentStatus {
  fn from(status: ErpCreatableStatus) -> Self {
    match status {
      ErpCreatableStatus::Potential => Self::Potential,
      ErpCreatableStatus::Temporary => Self::Temporary,
      ErpCreatableStatus::NonPotential => Self::NonPotential,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn string_form_roundtrips_for_every_status() {
    for status in EnrollmentStatus::iter() {
      assert_eq!(EnrollmentStatus::from_str(status.as_ref()).unwrap(), status);
    }
    assert_eq!(EnrollmentStatus::LeaveOfAbsence.as_ref(), "leave_of_absence");
  }

  #[test]
  fn only_three_statuses_are_erp_creatable() {
    let creatable: Vec<_> = EnrollmentStatus::iter()
      .filter(|s| ErpCreatableStatus::try_from(*s).is_ok())
      .collect();
    assert_eq!(creatable, vec![
      EnrollmentStatus::Potential,
      EnrollmentStatus::Temporary,
      EnrollmentStatus::NonPotential,
    ]);
    assert_eq!(
      ErpCreatableStatus::try_from(EnrollmentStatus::Enrolled),
      Err(Rejection::StatusNotCreatable(EnrollmentStatus::Enrolled))
    );
  }
}
