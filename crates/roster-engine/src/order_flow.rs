//! [`OrderFlowCoordinator`] — applies commerce order events to the status
//! history.
//!
//! Each event is classified into an [`OrderFlowState`] against the group's
//! stored intervals and then handled by the matching step. Failures carry a
//! `retryable` flag so message consumers know whether to redeliver.

use chrono::{DateTime, Utc};
use roster_core::{
  Error, Result,
  interval::{GroupSnapshot, Interval},
  order::{OrderEvent, OrderEventKind},
  status::EnrollmentStatus,
  store::{IntervalStore, StudentDirectory},
  transition,
};
use serde::Serialize;
use strum::AsRefStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  activation::ActivationCascade,
  writer::{IntervalWriter, WriteOutcome},
};

/// How an order event relates to the group it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderFlowState {
  /// The student has no interval at the location yet.
  NewLocation,
  /// The order attaches a location the student already has history at.
  ExistingLocation,
  /// The order changes the student's status at the location.
  StatusUpdate,
  /// The order was cancelled and its interval must be unwound.
  Void,
}

impl OrderFlowState {
  pub fn classify(kind: OrderEventKind, snapshot: &GroupSnapshot) -> Self {
    match kind {
      OrderEventKind::Created if snapshot.is_empty() => Self::NewLocation,
      OrderEventKind::Created => Self::ExistingLocation,
      OrderEventKind::StatusChanged => Self::StatusUpdate,
      OrderEventKind::Voided => Self::Void,
    }
  }
}

/// The result of unwinding a voided order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoidOutcome {
  /// The soft-deleted interval.
  pub removed:        Interval,
  /// The previous interval, now open-ended again.
  pub reopened:       Option<Interval>,
  /// Whether the student lost access to the location.
  pub access_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OrderOutcome {
  Written { state: OrderFlowState, write: WriteOutcome },
  Unchanged { state: OrderFlowState },
  Voided(VoidOutcome),
}

impl OrderOutcome {
  pub fn is_change(&self) -> bool {
    match self {
      Self::Written { write, .. } => write.is_change(),
      Self::Unchanged { .. } => false,
      Self::Voided(_) => true,
    }
  }
}

/// A failed order event.
#[derive(Debug, Error)]
#[error("{error} (retryable: {retryable})")]
pub struct OrderFailure {
  pub retryable: bool,
  #[source]
  pub error:     Error,
}

impl OrderFailure {
  /// A failure in an ordinary step: retryable whenever the error is.
  pub fn step(error: Error) -> Self { Self { retryable: error.is_retryable(), error } }

  /// A failure in the terminal void-completion step.
  pub fn terminal(error: Error) -> Self { Self { retryable: false, error } }
}

impl From<Error> for OrderFailure {
  fn from(error: Error) -> Self { Self::step(error) }
}

pub struct OrderFlowCoordinator<'a, S> {
  store: &'a S,
  now:   DateTime<Utc>,
}

impl<'a, S> OrderFlowCoordinator<'a, S>
where
  S: IntervalStore + StudentDirectory,
{
  pub fn new(store: &'a S, now: DateTime<Utc>) -> Self { Self { store, now } }

  fn writer(&self) -> IntervalWriter<'a, S> { IntervalWriter::new(self.store, self.now) }

  pub async fn handle(&self, event: &OrderEvent) -> Result<OrderOutcome, OrderFailure> {
    let snapshot = self.writer().snapshot(&event.group()).await?;
    let state = OrderFlowState::classify(event.kind, &snapshot);
    debug!(order_id = %event.order_id, state = state.as_ref(), "classified order event");

    let outcome = match state {
      OrderFlowState::NewLocation => self.new_location(event, &snapshot).await?,
      OrderFlowState::ExistingLocation => self.existing_location(event, &snapshot).await?,
      OrderFlowState::StatusUpdate => self.status_update(event, &snapshot).await?,
      OrderFlowState::Void => return self.void(event).await,
    };

    if outcome.is_change() {
      ActivationCascade::new(self.store, self.now)
        .recompute(std::slice::from_ref(&event.student_id))
        .await?;
    }
    Ok(outcome)
  }

  async fn new_location(&self, event: &OrderEvent, snapshot: &GroupSnapshot) -> Result<OrderOutcome> {
    let writer = self.writer();
    let candidate = writer
      .resolve_start_date(event.status_change(EnrollmentStatus::DEFAULT))
      .await?;
    let write = writer.apply(snapshot, &candidate).await?;

    self
      .store
      .grant_location_access(&event.student_id, &event.location_id)
      .await
      .map_err(Error::store)?;

    Ok(OrderOutcome::Written { state: OrderFlowState::NewLocation, write })
  }

  async fn existing_location(
    &self,
    event: &OrderEvent,
    snapshot: &GroupSnapshot,
  ) -> Result<OrderOutcome> {
    let state = OrderFlowState::ExistingLocation;
    let Some(current) = snapshot.reference() else {
      return Err(no_current_interval(event));
    };
    if current.status != EnrollmentStatus::Temporary {
      return Ok(OrderOutcome::Unchanged { state });
    }
    transition::check_starts_after(current, event.start_date)?;

    // Goes through the writer so an upcoming interval is rewritten rather
    // than left overlapping the new one.
    let writer = self.writer();
    let candidate = writer
      .resolve_start_date(event.status_change(event.order_type.target_status()))
      .await?;
    let write = writer.apply(snapshot, &candidate).await?;
    Ok(OrderOutcome::Written { state, write })
  }

  async fn status_update(&self, event: &OrderEvent, snapshot: &GroupSnapshot) -> Result<OrderOutcome> {
    let state = OrderFlowState::StatusUpdate;
    let Some(current) = snapshot.reference() else {
      return Err(no_current_interval(event));
    };
    let target = event.order_type.target_status();
    if current.status == target {
      return Ok(OrderOutcome::Unchanged { state });
    }
    transition::check_starts_after(current, event.start_date)?;

    let writer = self.writer();
    let candidate = writer.resolve_start_date(event.status_change(target)).await?;
    let write = writer.apply(snapshot, &candidate).await?;
    Ok(OrderOutcome::Written { state, write })
  }

  /// Unwind the interval a voided order produced.
  ///
  /// Only the two most recent intervals are considered: the one being removed
  /// and the one it superseded.
  async fn void(&self, event: &OrderEvent) -> Result<OrderOutcome, OrderFailure> {
    let group = event.group();
    let recent = self
      .store
      .recent_intervals(&group, 2)
      .await
      .map_err(Error::store)?;

    let Some(first) = recent
      .first()
      .filter(|i| i.order_id.as_deref() == Some(event.order_id.as_str()))
    else {
      return Err(OrderFailure::step(Error::Precondition(format!(
        "no interval of order {} is the most recent at {group}",
        event.order_id
      ))));
    };

    self.store.soft_delete(first).await.map_err(Error::store)?;

    let access_removed = recent.len() == 1;
    if access_removed {
      self
        .store
        .remove_location_access(&event.student_id, &event.location_id)
        .await
        .map_err(Error::store)?;
    }

    let reopened = match recent.get(1) {
      Some(previous) => {
        self.store.reopen(previous).await.map_err(Error::store)?;
        Some(Interval { end_date: None, updated_at: self.now, ..previous.clone() })
      }
      None => None,
    };

    ActivationCascade::new(self.store, self.now)
      .recompute(std::slice::from_ref(&event.student_id))
      .await
      .map_err(OrderFailure::terminal)?;

    info!(
      order_id = %event.order_id,
      %group,
      access_removed,
      reopened = reopened.is_some(),
      "unwound voided order"
    );
    Ok(OrderOutcome::Voided(VoidOutcome { removed: first.clone(), reopened, access_removed }))
  }
}

fn no_current_interval(event: &OrderEvent) -> Error {
  Error::Precondition(format!(
    "no current interval for student {} at location {}",
    event.student_id, event.location_id
  ))
}
