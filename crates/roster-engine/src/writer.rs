//! [`IntervalWriter`] — applies one validated status change to a group.
//!
//! The writer closes the interval being superseded and then either inserts
//! the candidate or, when an upcoming interval with a different status is
//! already scheduled, rewrites that upcoming interval in place.

use chrono::{DateTime, Utc};
use roster_core::{
  Error, Result,
  interval::{GroupKey, GroupSnapshot, Interval, Resolution, StatusChange},
  start_date,
  status::EnrollmentStatus,
  store::IntervalStore,
};
use serde::Serialize;
use tracing::debug;

/// What [`IntervalWriter::apply`] did to the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
  /// The group was empty; the candidate is its first interval.
  Created { interval: Interval },
  /// Same status as before; nothing to change.
  Unchanged,
  /// A temporary interval had its end date moved.
  WindowUpdated { interval: Interval },
  /// The current interval was closed and the candidate inserted after it.
  Superseded { closed: Interval, next: Interval },
  /// The current interval was closed and the already-scheduled upcoming
  /// interval was rewritten to become the candidate.
  UpcomingReplaced { closed: Interval, upcoming: Interval },
}

impl WriteOutcome {
  pub fn is_change(&self) -> bool { !matches!(self, Self::Unchanged) }
}

pub struct IntervalWriter<'a, S> {
  store: &'a S,
  now:   DateTime<Utc>,
}

impl<'a, S: IntervalStore> IntervalWriter<'a, S> {
  pub fn new(store: &'a S, now: DateTime<Utc>) -> Self { Self { store, now } }

  /// Read the current and latest intervals of `group`.
  pub async fn snapshot(&self, group: &GroupKey) -> Result<GroupSnapshot> {
    let current = self
      .store
      .current_interval(group, self.now)
      .await
      .map_err(Error::store)?;
    let latest = self.store.latest_interval(group).await.map_err(Error::store)?;
    Ok(GroupSnapshot { current, latest })
  }

  /// Move a future-dated candidate past any interval sharing its start
  /// second. Fails with [`Error::AlreadyExists`] when the same order already
  /// produced one of them.
  pub async fn resolve_start_date(&self, candidate: StatusChange) -> Result<StatusChange> {
    let Some(probe) = start_date::collision_probe(&candidate, self.now) else {
      return Ok(candidate);
    };
    let shared = self
      .store
      .shared_start_date_intervals(&candidate.group(), probe)
      .await
      .map_err(Error::store)?;

    let resolved = start_date::resolve(candidate, &shared, self.now)?;
    if resolved.start_date != Some(probe) {
      debug!(from = %probe, to = ?resolved.start_date, "shifted colliding start date");
    }
    Ok(resolved)
  }

  /// Apply `candidate` to the group described by `snapshot`.
  ///
  /// The candidate must already be validated and collision-resolved.
  pub async fn apply(
    &self,
    snapshot: &GroupSnapshot,
    candidate: &StatusChange,
  ) -> Result<WriteOutcome> {
    let Some(current) = snapshot.reference() else {
      let interval = self
        .store
        .create(candidate.to_new_interval(self.now))
        .await
        .map_err(Error::store)?;
      debug!(interval_id = %interval.interval_id, status = %interval.status, "created first interval");
      return Ok(WriteOutcome::Created { interval });
    };

    if current.status == candidate.status {
      if current.status != EnrollmentStatus::Temporary {
        return Ok(WriteOutcome::Unchanged);
      }
      let mut values = candidate.to_new_interval(self.now);
      values.status = current.status;
      values.start_date = current.start_date;
      values.order_id = current.order_id.clone();
      // The window never reaches into an interval scheduled after it.
      if let Some(upcoming) = snapshot
        .latest
        .as_ref()
        .filter(|latest| latest.interval_id != current.interval_id)
      {
        let limit = (upcoming.start_date - Resolution::User.unit()).max(current.start_date);
        values.end_date = Some(values.end_date.map_or(limit, |end| end.min(limit)));
      }
      let interval = self
        .store
        .update_window(current, values)
        .await
        .map_err(Error::store)?;
      debug!(interval_id = %interval.interval_id, end_date = ?interval.end_date, "moved temporary window");
      return Ok(WriteOutcome::WindowUpdated { interval });
    }

    let closed = self.close(current, candidate.effective_start(self.now)).await?;

    match snapshot.latest.as_ref() {
      // The user only wants to edit the upcoming interval.
      Some(latest) if latest.status != current.status => {
        let upcoming = self.replace_upcoming(latest, candidate).await?;
        Ok(WriteOutcome::UpcomingReplaced { closed, upcoming })
      }
      _ => {
        let next = self
          .store
          .create(candidate.to_new_interval(self.now))
          .await
          .map_err(Error::store)?;
        debug!(interval_id = %next.interval_id, status = %next.status, "inserted next interval");
        Ok(WriteOutcome::Superseded { closed, next })
      }
    }
  }

  /// Deactivate `current` one user-resolution unit before `next_start`.
  ///
  /// The end date never moves before `current` starts, nor past an end date
  /// it already has.
  pub async fn close(&self, current: &Interval, next_start: DateTime<Utc>) -> Result<Interval> {
    let mut end = Resolution::Store.truncate(next_start) - Resolution::User.unit();
    end = end.max(current.start_date);
    if let Some(existing) = current.end_date {
      end = end.min(existing);
    }

    self.store.deactivate(current, end).await.map_err(Error::store)?;
    debug!(interval_id = %current.interval_id, %end, "deactivated interval");

    Ok(Interval { end_date: Some(end), updated_at: self.now, ..current.clone() })
  }

  /// Rewrite the already-scheduled `latest` interval to become `candidate`.
  async fn replace_upcoming(&self, latest: &Interval, candidate: &StatusChange) -> Result<Interval> {
    let upcoming = self
      .store
      .update_window(latest, candidate.to_new_interval(self.now))
      .await
      .map_err(Error::store)?;
    debug!(
      interval_id = %upcoming.interval_id,
      from = %latest.status,
      to = %upcoming.status,
      "replaced upcoming interval in place"
    );
    Ok(upcoming)
  }
}
