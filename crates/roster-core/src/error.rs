//! Error types for `roster-core`.
//!
//! [`Rejection`] carries field-level detail for a change that failed
//! validation. [`Error`] is the taxonomy every engine entry point reports;
//! [`Error::is_retryable`] encodes which failures a message consumer should
//! redeliver.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::status::EnrollmentStatus;

/// Why a candidate status change was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
  #[error("field `{0}` must not be empty")]
  MissingField(&'static str),

  #[error("status `{0}` cannot be created by the order flow")]
  StatusNotCreatable(EnrollmentStatus),

  #[error("illegal transition from `{from}` to `{to}`")]
  IllegalTransition {
    from: EnrollmentStatus,
    to:   EnrollmentStatus,
  },

  #[error(
    "end_date {candidate:?} does not match the current temporary window \
     ending {current:?}"
  )]
  TemporaryWindowChanged {
    current:   Option<DateTime<Utc>>,
    candidate: Option<DateTime<Utc>>,
  },

  #[error("start_date {candidate} must equal the current start_date {current}")]
  StartDateMismatch {
    current:   DateTime<Utc>,
    candidate: DateTime<Utc>,
  },

  #[error("start_date {candidate} must be after the current start_date {current}")]
  StartDateNotAfterCurrent {
    current:   DateTime<Utc>,
    candidate: DateTime<Utc>,
  },
}

impl Rejection {
  /// The input field the rejection refers to.
  pub fn field(&self) -> &'static str {
    match self {
      Self::MissingField(field) => field,
      Self::StatusNotCreatable(_) | Self::IllegalTransition { .. } => "enrollment_status",
      Self::TemporaryWindowChanged { .. } => "end_date",
      Self::StartDateMismatch { .. } | Self::StartDateNotAfterCurrent { .. } => {
        "start_date"
      }
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("rejected: {0}")]
  Rejected(#[from] Rejection),

  #[error(
    "enrollment status history already exists for order {order_id:?} \
     starting {start_date}"
  )]
  AlreadyExists {
    order_id:   Option<String>,
    start_date: DateTime<Utc>,
  },

  #[error("precondition failed: {0}")]
  Precondition(String),

  #[error("deadline of {0:?} exceeded")]
  Timeout(std::time::Duration),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error.
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(err))
  }

  /// Whether redelivering the same request may succeed.
  ///
  /// Only transient store failures and deadline expiry qualify; rejections,
  /// duplicates and broken preconditions will fail the same way again.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Store(_) | Self::Timeout(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retryable_policy() {
    assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_retryable());
    assert!(Error::store(std::io::Error::other("gone")).is_retryable());
    assert!(!Error::Precondition("missing".into()).is_retryable());
    assert!(!Error::from(Rejection::MissingField("student_id")).is_retryable());
  }

  #[test]
  fn rejection_names_the_field() {
    let r = Rejection::IllegalTransition {
      from: EnrollmentStatus::NonPotential,
      to:   EnrollmentStatus::Enrolled,
    };
    assert_eq!(r.field(), "enrollment_status");
    assert_eq!(Rejection::MissingField("location_id").field(), "location_id");
  }
}
