//! Storage traits the engine calls through.
//!
//! Backends (e.g. `roster-store-sqlite`) implement [`TransactionalStore`],
//! whose transactions implement [`IntervalStore`] and [`StudentDirectory`].
//! Every engine decision runs against one transaction; the engine commits
//! it on success and rolls it back on any failure.
//!
//! All methods return `Send` futures so the traits can be driven from
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  interval::{GroupKey, Interval, NewInterval},
  status::EnrollmentStatus,
};

/// Shared error type for a storage backend.
pub trait Backend: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
}

/// Access to the enrollment status intervals. Soft-deleted rows are invisible
/// to every read.
pub trait IntervalStore: Backend {
  // ── Reads ─────────────────────────────────────────────────────────────

  /// The interval with `start_date <= now < end_date` (open end counts as
  /// infinite) for the group, if any.
  fn current_interval<'a>(
    &'a self,
    group: &'a GroupKey,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Interval>, Self::Error>> + Send + 'a;

  /// The interval with the greatest `start_date` for the group.
  fn latest_interval<'a>(
    &'a self,
    group: &'a GroupKey,
  ) -> impl Future<Output = Result<Option<Interval>, Self::Error>> + Send + 'a;

  /// Intervals matching the exact `(status, start_date, end_date)` window.
  fn intervals_by_exact_window<'a>(
    &'a self,
    group: &'a GroupKey,
    status: EnrollmentStatus,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<Interval>, Self::Error>> + Send + 'a;

  /// Intervals whose `start_date` falls within the same second as
  /// `start_date`, regardless of status.
  fn shared_start_date_intervals<'a>(
    &'a self,
    group: &'a GroupKey,
    start_date: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Interval>, Self::Error>> + Send + 'a;

  /// The `limit` intervals with the greatest start dates, newest first.
  fn recent_intervals<'a>(
    &'a self,
    group: &'a GroupKey,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Interval>, Self::Error>> + Send + 'a;

  /// The whole timeline of a group ordered by `start_date`.
  fn group_intervals<'a>(
    &'a self,
    group: &'a GroupKey,
  ) -> impl Future<Output = Result<Vec<Interval>, Self::Error>> + Send + 'a;

  /// Every interval of the given students, across all locations.
  fn intervals_by_student_ids<'a>(
    &'a self,
    student_ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<Interval>, Self::Error>> + Send + 'a;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new interval. Fails if the identity key is already taken.
  fn create(
    &self,
    input: NewInterval,
  ) -> impl Future<Output = Result<Interval, Self::Error>> + Send + '_;

  /// Overwrite `target`'s status, window and order reference with `values`,
  /// keeping its `interval_id`.
  fn update_window<'a>(
    &'a self,
    target: &'a Interval,
    values: NewInterval,
  ) -> impl Future<Output = Result<Interval, Self::Error>> + Send + 'a;

  /// Close `target` by setting its end date.
  fn deactivate<'a>(
    &'a self,
    target: &'a Interval,
    end_date: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Clear `target`'s end date, making it open-ended again.
  fn reopen<'a>(
    &'a self,
    target: &'a Interval,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Logically delete `target`.
  fn soft_delete<'a>(
    &'a self,
    target: &'a Interval,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// The student-record side effects of enrollment changes.
pub trait StudentDirectory: Backend {
  /// Set (or clear, with `None`) the moment the student's account became
  /// inactive.
  fn set_deactivated_at<'a>(
    &'a self,
    student_id: &'a str,
    deactivated_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Give the student an access path to the location. Idempotent.
  fn grant_location_access<'a>(
    &'a self,
    student_id: &'a str,
    location_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove the student's access path to the location. Idempotent.
  fn remove_location_access<'a>(
    &'a self,
    student_id: &'a str,
    location_id: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// One unit of work against the backend.
pub trait Transaction: IntervalStore + StudentDirectory + Sized {
  fn commit(self) -> impl Future<Output = Result<(), Self::Error>> + Send;

  fn rollback(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A backend that can open transactions.
pub trait TransactionalStore: Backend {
  type Tx: Transaction<Error = Self::Error>;

  /// Open a transaction. Backends serialise conflicting transactions; the
  /// future resolves once this one may proceed.
  fn begin(&self) -> impl Future<Output = Result<Self::Tx, Self::Error>> + Send + '_;
}
