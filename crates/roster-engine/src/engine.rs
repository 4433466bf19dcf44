//! [`Engine`] — the two entry points callers use, each running as one
//! transaction under a deadline.

use std::time::Duration;

use roster_core::{
  Error, Result,
  clock::{Clock, SystemClock},
  interval::{GroupKey, Interval, Resolution, StatusChange},
  order::OrderEvent,
  store::{IntervalStore, Transaction, TransactionalStore},
  transition::{self, FlowKind},
};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};
use tracing::{info, instrument, warn};

use crate::{
  activation::ActivationCascade,
  order_flow::{OrderFailure, OrderFlowCoordinator, OrderOutcome},
  writer::{IntervalWriter, WriteOutcome},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Budget for one change request, including waiting for the transaction.
  #[serde(with = "millis", rename = "deadline_ms")]
  pub deadline: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self { Self { deadline: Duration::from_secs(10) } }
}

mod millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer};

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_millis)
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What [`Engine::validate_and_apply`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApplyOutcome {
  /// The order flow already recorded this exact window; nothing was written.
  AlreadyApplied,
  Written { write: WriteOutcome },
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, C = SystemClock> {
  store:  S,
  clock:  C,
  config: EngineConfig,
}

impl<S: TransactionalStore> Engine<S> {
  pub fn new(store: S, config: EngineConfig) -> Self { Self::with_clock(store, SystemClock, config) }
}

impl<S: TransactionalStore, C: Clock> Engine<S, C> {
  pub fn with_clock(store: S, clock: C, config: EngineConfig) -> Self {
    Self { store, clock, config }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Validate a manual status change and apply it to its group.
  #[instrument(
    skip(self, candidate),
    fields(student_id = %candidate.student_id, location_id = %candidate.location_id, status = %candidate.status)
  )]
  pub async fn validate_and_apply(
    &self,
    candidate: StatusChange,
    flow: FlowKind,
  ) -> Result<ApplyOutcome> {
    let deadline = Instant::now() + self.config.deadline;
    let tx = self.begin(deadline).await?;
    let now = self.clock.now();

    let result = timeout_at(deadline, apply_change(&tx, candidate, flow, now))
      .await
      .unwrap_or(Err(Error::Timeout(self.config.deadline)));

    let outcome = finish(tx, result).await?;
    info!(?outcome, "applied status change");
    Ok(outcome)
  }

  /// Apply one commerce order event.
  #[instrument(
    skip(self, event),
    fields(order_id = %event.order_id, kind = %event.kind, student_id = %event.student_id)
  )]
  pub async fn handle_order_event(&self, event: &OrderEvent) -> Result<OrderOutcome, OrderFailure> {
    let deadline = Instant::now() + self.config.deadline;
    let tx = self.begin(deadline).await?;
    let now = self.clock.now();

    let result = timeout_at(deadline, OrderFlowCoordinator::new(&tx, now).handle(event))
      .await
      .unwrap_or(Err(OrderFailure::step(Error::Timeout(self.config.deadline))));

    match result {
      Ok(outcome) => {
        tx.commit().await.map_err(|e| OrderFailure::step(Error::store(e)))?;
        info!(?outcome, "applied order event");
        Ok(outcome)
      }
      Err(failure) => {
        rollback(tx).await;
        warn!(error = %failure.error, retryable = failure.retryable, "order event failed");
        Err(failure)
      }
    }
  }

  /// The full timeline of a group, oldest first.
  pub async fn timeline(&self, group: &GroupKey) -> Result<Vec<Interval>> {
    let tx = self.begin(Instant::now() + self.config.deadline).await?;
    let result = tx.group_intervals(group).await.map_err(Error::store);
    finish(tx, result).await
  }

  async fn begin(&self, deadline: Instant) -> Result<S::Tx> {
    timeout_at(deadline, self.store.begin())
      .await
      .map_err(|_| Error::Timeout(self.config.deadline))?
      .map_err(Error::store)
  }
}

async fn apply_change<T: Transaction>(
  tx: &T,
  candidate: StatusChange,
  flow: FlowKind,
  now: chrono::DateTime<chrono::Utc>,
) -> Result<ApplyOutcome> {
  transition::check_candidate(&candidate, flow)?;

  let group = candidate.group();
  if flow == FlowKind::Erp
    && let Some(start) = candidate.start_date
  {
    let existing = tx
      .intervals_by_exact_window(
        &group,
        candidate.status,
        Resolution::Store.truncate(start),
        candidate.end_date.map(|end| Resolution::Store.truncate(end)),
      )
      .await
      .map_err(Error::store)?;
    if !existing.is_empty() {
      return Ok(ApplyOutcome::AlreadyApplied);
    }
  }

  let writer = IntervalWriter::new(tx, now);
  let snapshot = writer.snapshot(&group).await?;
  if let (Some(current), Some(latest)) = (snapshot.reference(), snapshot.latest_or_reference()) {
    transition::validate(current, &candidate, latest, flow)?;
  }

  let candidate = writer.resolve_start_date(candidate).await?;
  let write = writer.apply(&snapshot, &candidate).await?;

  if write.is_change() {
    ActivationCascade::new(tx, now)
      .recompute(std::slice::from_ref(&candidate.student_id))
      .await?;
  }
  Ok(ApplyOutcome::Written { write })
}

/// Commit on success, roll back on failure.
async fn finish<T: Transaction, R>(tx: T, result: Result<R>) -> Result<R> {
  match result {
    Ok(value) => {
      tx.commit().await.map_err(Error::store)?;
      Ok(value)
    }
    Err(err) => {
      rollback(tx).await;
      Err(err)
    }
  }
}

async fn rollback<T: Transaction>(tx: T) {
  if let Err(e) = tx.rollback().await {
    warn!(error = %e, "rollback failed");
  }
}
