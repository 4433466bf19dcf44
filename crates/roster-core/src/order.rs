//! Commerce order lifecycle events consumed by the order flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::{
  interval::{GroupKey, StatusChange},
  status::EnrollmentStatus,
};

/// The commercial meaning of an order; determines the status it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderType {
  New,
  Enrollment,
  Withdrawal,
  Graduate,
  LeaveOfAbsence,
  Resume,
}

impl OrderType {
  pub fn target_status(self) -> EnrollmentStatus {
    match self {
      Self::New => EnrollmentStatus::Potential,
      Self::Enrollment | Self::Resume => EnrollmentStatus::Enrolled,
      Self::Withdrawal => EnrollmentStatus::Withdrawn,
      Self::Graduate => EnrollmentStatus::Graduated,
      Self::LeaveOfAbsence => EnrollmentStatus::LeaveOfAbsence,
    }
  }
}

/// What happened to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderEventKind {
  /// An order attached a location to the student.
  Created,
  /// An order changed the student's status at a location.
  StatusChanged,
  /// A previously submitted order was cancelled.
  Voided,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
  pub order_id:        String,
  pub kind:            OrderEventKind,
  pub order_type:      OrderType,
  pub student_id:      String,
  pub location_id:     String,
  #[serde(default)]
  pub organization_id: String,
  pub start_date:      DateTime<Utc>,
  #[serde(default)]
  pub end_date:        Option<DateTime<Utc>>,
}

impl OrderEvent {
  pub fn group(&self) -> GroupKey {
    GroupKey::new(self.student_id.clone(), self.location_id.clone())
  }

  /// The candidate this order applies with the given status.
  pub fn status_change(&self, status: EnrollmentStatus) -> StatusChange {
    StatusChange {
      student_id: self.student_id.clone(),
      location_id: self.location_id.clone(),
      organization_id: self.organization_id.clone(),
      status,
      start_date: Some(self.start_date),
      end_date: self.end_date,
      order_id: Some(self.order_id.clone()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resume_and_enrollment_both_enroll() {
    assert_eq!(OrderType::Resume.target_status(), EnrollmentStatus::Enrolled);
    assert_eq!(OrderType::Enrollment.target_status(), EnrollmentStatus::Enrolled);
    assert_eq!(OrderType::New.target_status(), EnrollmentStatus::Potential);
  }

  #[test]
  fn event_deserialises_from_snake_case_json() {
    let event: OrderEvent = serde_json::from_str(
      r#"{
        "order_id": "O1",
        "kind": "voided",
        "order_type": "leave_of_absence",
        "student_id": "S",
        "location_id": "L",
        "start_date": "2024-01-01T00:00:00Z"
      }"#,
    )
    .unwrap();
    assert_eq!(event.kind, OrderEventKind::Voided);
    assert_eq!(event.order_type, OrderType::LeaveOfAbsence);
    assert!(event.end_date.is_none());
    assert_eq!(event.organization_id, "");

    let change = event.status_change(event.order_type.target_status());
    assert_eq!(change.order_id.as_deref(), Some("O1"));
    assert_eq!(change.status, EnrollmentStatus::LeaveOfAbsence);
  }
}
