//! [`SqliteStore`] — the SQLite implementation of the Roster store traits.

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use roster_core::{
  interval::{GroupKey, Interval, NewInterval, Resolution},
  status::EnrollmentStatus,
  store::{Backend, IntervalStore, StudentDirectory, Transaction, TransactionalStore},
};
use rusqlite::{OptionalExtension as _, types::Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    INTERVAL_COLUMNS, RawInterval, decode_dt, encode_dt, encode_status, encode_uuid,
    into_intervals,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Roster store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection and transaction gate are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
  gate: Arc<Mutex<()>>,
}

/// The student-record columns the engine maintains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
  pub student_id:     String,
  pub deactivated_at: Option<DateTime<Utc>>,
  /// Locations the student has an access path to, sorted.
  pub locations:      Vec<String>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, gate: Arc::new(Mutex::new(())) })
  }

  /// Read a student's activation and access paths. Returns `None` if the
  /// engine never touched the student.
  pub async fn student(&self, student_id: &str) -> Result<Option<StudentRecord>> {
    let id = student_id.to_owned();

    let (found, deactivated_at, locations): (bool, Option<String>, Vec<String>) = self
      .conn
      .call(move |conn| {
        let row: Option<Option<String>> = conn
          .query_row(
            "SELECT deactivated_at FROM students WHERE student_id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;

        let mut stmt = conn.prepare(
          "SELECT location_id FROM student_access_paths
           WHERE student_id = ?1 ORDER BY location_id",
        )?;
        let locations = stmt
          .query_map(rusqlite::params![id], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok((row.is_some() || !locations.is_empty(), row.flatten(), locations))
      })
      .await?;

    if !found {
      return Ok(None);
    }
    Ok(Some(StudentRecord {
      student_id: student_id.to_owned(),
      deactivated_at: deactivated_at.as_deref().map(decode_dt).transpose()?,
      locations,
    }))
  }
}

impl Backend for SqliteStore {
  type Error = Error;
}

impl TransactionalStore for SqliteStore {
  type Tx = SqliteTx;

  async fn begin(&self) -> Result<SqliteTx> {
    let gate = self.gate.clone().lock_owned().await;
    self
      .conn
      .call(|conn| {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
      })
      .await?;
    Ok(SqliteTx { conn: self.conn.clone(), gate: Some(gate) })
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// An open `BEGIN IMMEDIATE` transaction holding the store's gate.
///
/// Dropping it without [`Transaction::commit`] or [`Transaction::rollback`]
/// rolls back in the background.
pub struct SqliteTx {
  conn: tokio_rusqlite::Connection,
  gate: Option<OwnedMutexGuard<()>>,
}

impl SqliteTx {
  async fn finish(mut self, sql: &'static str) -> Result<()> {
    let gate = self.gate.take();
    let result = self
      .conn
      .call(move |conn| {
        if let Err(e) = conn.execute_batch(sql) {
          if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK").ok();
          }
          return Err(e.into());
        }
        Ok(())
      })
      .await;
    drop(gate);
    Ok(result?)
  }

  async fn select(&self, sql: String, params: Vec<Value>) -> Result<Vec<Interval>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawInterval::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    into_intervals(raws)
  }

  async fn select_one(&self, sql: String, params: Vec<Value>) -> Result<Option<Interval>> {
    Ok(self.select(sql, params).await?.into_iter().next())
  }

  /// Run an `UPDATE` against one live interval, failing if it is gone.
  async fn update_one(&self, interval_id: Uuid, sql: &'static str, params: Vec<Value>) -> Result<()> {
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params_from_iter(params.iter()))?))
      .await?;
    if changed == 0 {
      return Err(Error::IntervalNotFound(interval_id));
    }
    Ok(())
  }

  async fn execute(&self, sql: &'static str, params: Vec<Value>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(sql, rusqlite::params_from_iter(params.iter()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl Drop for SqliteTx {
  fn drop(&mut self) {
    let Some(gate) = self.gate.take() else {
      return;
    };
    let conn = self.conn.clone();
    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          let result = conn
            .call(|conn| {
              if !conn.is_autocommit() {
                conn.execute_batch("ROLLBACK")?;
              }
              Ok(())
            })
            .await;
          if let Err(e) = result {
            warn!(error = %e, "background rollback failed");
          }
          drop(gate);
        });
      }
      Err(_) => warn!("transaction dropped outside a runtime; left open"),
    }
  }
}

fn text(s: impl Into<String>) -> Value { Value::Text(s.into()) }

fn opt_text(s: Option<impl Into<String>>) -> Value { s.map_or(Value::Null, text) }

fn group_params(group: &GroupKey) -> Vec<Value> {
  vec![text(group.student_id.clone()), text(group.location_id.clone())]
}

fn select_group(filter: &str, order: &str) -> String {
  format!(
    "SELECT {INTERVAL_COLUMNS} FROM enrollment_status_history
     WHERE student_id = ?1 AND location_id = ?2 AND deleted_at IS NULL {filter}
     {order}"
  )
}

fn now() -> DateTime<Utc> { Resolution::Store.truncate(Utc::now()) }

impl Backend for SqliteTx {
  type Error = Error;
}

impl Transaction for SqliteTx {
  async fn commit(self) -> Result<()> { self.finish("COMMIT").await }

  async fn rollback(self) -> Result<()> { self.finish("ROLLBACK").await }
}

// ─── IntervalStore impl ──────────────────────────────────────────────────────

impl IntervalStore for SqliteTx {
  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn current_interval(
    &self,
    group: &GroupKey,
    now: DateTime<Utc>,
  ) -> Result<Option<Interval>> {
    let mut params = group_params(group);
    params.push(text(encode_dt(now)));
    let sql = select_group(
      "AND start_date <= ?3 AND (end_date IS NULL OR end_date > ?3)",
      "ORDER BY start_date DESC LIMIT 1",
    );
    self.select_one(sql, params).await
  }

  async fn latest_interval(&self, group: &GroupKey) -> Result<Option<Interval>> {
    let sql = select_group("", "ORDER BY start_date DESC LIMIT 1");
    self.select_one(sql, group_params(group)).await
  }

  async fn intervals_by_exact_window(
    &self,
    group: &GroupKey,
    status: EnrollmentStatus,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
  ) -> Result<Vec<Interval>> {
    let mut params = group_params(group);
    params.push(text(encode_status(status)));
    params.push(text(encode_dt(start_date)));
    params.push(opt_text(end_date.map(encode_dt)));
    let sql = select_group(
      "AND enrollment_status = ?3 AND start_date = ?4 AND end_date IS ?5",
      "ORDER BY start_date",
    );
    self.select(sql, params).await
  }

  async fn shared_start_date_intervals(
    &self,
    group: &GroupKey,
    start_date: DateTime<Utc>,
  ) -> Result<Vec<Interval>> {
    let second = Resolution::User.truncate(start_date);
    let mut params = group_params(group);
    params.push(text(encode_dt(second)));
    params.push(text(encode_dt(second + Resolution::User.unit())));
    let sql = select_group("AND start_date >= ?3 AND start_date < ?4", "ORDER BY start_date");
    self.select(sql, params).await
  }

  async fn recent_intervals(&self, group: &GroupKey, limit: usize) -> Result<Vec<Interval>> {
    let mut params = group_params(group);
    params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    let sql = select_group("", "ORDER BY start_date DESC LIMIT ?3");
    self.select(sql, params).await
  }

  async fn group_intervals(&self, group: &GroupKey) -> Result<Vec<Interval>> {
    let sql = select_group("", "ORDER BY start_date");
    self.select(sql, group_params(group)).await
  }

  async fn intervals_by_student_ids(&self, student_ids: &[String]) -> Result<Vec<Interval>> {
    if student_ids.is_empty() {
      return Ok(Vec::new());
    }
    let placeholders = vec!["?"; student_ids.len()].join(", ");
    let sql = format!(
      "SELECT {INTERVAL_COLUMNS} FROM enrollment_status_history
       WHERE student_id IN ({placeholders}) AND deleted_at IS NULL
       ORDER BY student_id, location_id, start_date"
    );
    let params = student_ids.iter().cloned().map(text).collect();
    self.select(sql, params).await
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create(&self, input: NewInterval) -> Result<Interval> {
    let now = now();
    let interval = Interval {
      interval_id:     Uuid::new_v4(),
      student_id:      input.student_id,
      location_id:     input.location_id,
      organization_id: input.organization_id,
      status:          input.status,
      start_date:      Resolution::Store.truncate(input.start_date),
      end_date:        input.end_date.map(|end| Resolution::Store.truncate(end)),
      order_id:        input.order_id,
      created_at:      now,
      updated_at:      now,
    };

    let params = vec![
      text(encode_uuid(interval.interval_id)),
      text(interval.student_id.clone()),
      text(interval.location_id.clone()),
      text(interval.organization_id.clone()),
      text(encode_status(interval.status)),
      text(encode_dt(interval.start_date)),
      opt_text(interval.end_date.map(encode_dt)),
      opt_text(interval.order_id.clone()),
      text(encode_dt(now)),
    ];
    self
      .execute(
        "INSERT INTO enrollment_status_history (
           interval_id, student_id, location_id, organization_id,
           enrollment_status, start_date, end_date, order_id,
           created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params,
      )
      .await?;

    Ok(interval)
  }

  async fn update_window(&self, target: &Interval, values: NewInterval) -> Result<Interval> {
    let now = now();
    let updated = Interval {
      interval_id:     target.interval_id,
      student_id:      target.student_id.clone(),
      location_id:     target.location_id.clone(),
      organization_id: values.organization_id,
      status:          values.status,
      start_date:      Resolution::Store.truncate(values.start_date),
      end_date:        values.end_date.map(|end| Resolution::Store.truncate(end)),
      order_id:        values.order_id,
      created_at:      target.created_at,
      updated_at:      now,
    };

    let params = vec![
      text(encode_uuid(updated.interval_id)),
      text(updated.organization_id.clone()),
      text(encode_status(updated.status)),
      text(encode_dt(updated.start_date)),
      opt_text(updated.end_date.map(encode_dt)),
      opt_text(updated.order_id.clone()),
      text(encode_dt(now)),
    ];
    self
      .update_one(
        target.interval_id,
        "UPDATE enrollment_status_history
         SET organization_id = ?2, enrollment_status = ?3, start_date = ?4,
             end_date = ?5, order_id = ?6, updated_at = ?7
         WHERE interval_id = ?1 AND deleted_at IS NULL",
        params,
      )
      .await?;

    Ok(updated)
  }

  async fn deactivate(&self, target: &Interval, end_date: DateTime<Utc>) -> Result<()> {
    let params = vec![
      text(encode_uuid(target.interval_id)),
      text(encode_dt(end_date)),
      text(encode_dt(now())),
    ];
    self
      .update_one(
        target.interval_id,
        "UPDATE enrollment_status_history SET end_date = ?2, updated_at = ?3
         WHERE interval_id = ?1 AND deleted_at IS NULL",
        params,
      )
      .await
  }

  async fn reopen(&self, target: &Interval) -> Result<()> {
    let params = vec![text(encode_uuid(target.interval_id)), text(encode_dt(now()))];
    self
      .update_one(
        target.interval_id,
        "UPDATE enrollment_status_history SET end_date = NULL, updated_at = ?2
         WHERE interval_id = ?1 AND deleted_at IS NULL",
        params,
      )
      .await
  }

  async fn soft_delete(&self, target: &Interval) -> Result<()> {
    let params = vec![text(encode_uuid(target.interval_id)), text(encode_dt(now()))];
    self
      .update_one(
        target.interval_id,
        "UPDATE enrollment_status_history SET deleted_at = ?2, updated_at = ?2
         WHERE interval_id = ?1 AND deleted_at IS NULL",
        params,
      )
      .await
  }
}

// ─── StudentDirectory impl ───────────────────────────────────────────────────

impl StudentDirectory for SqliteTx {
  async fn set_deactivated_at(
    &self,
    student_id: &str,
    deactivated_at: Option<DateTime<Utc>>,
  ) -> Result<()> {
    let params = vec![
      text(student_id),
      opt_text(deactivated_at.map(encode_dt)),
      text(encode_dt(now())),
    ];
    self
      .execute(
        "INSERT INTO students (student_id, deactivated_at, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (student_id) DO UPDATE
         SET deactivated_at = excluded.deactivated_at, updated_at = excluded.updated_at",
        params,
      )
      .await
  }

  async fn grant_location_access(&self, student_id: &str, location_id: &str) -> Result<()> {
    let params = vec![text(student_id), text(location_id), text(encode_dt(now()))];
    self
      .execute(
        "INSERT OR IGNORE INTO student_access_paths (student_id, location_id, created_at)
         VALUES (?1, ?2, ?3)",
        params,
      )
      .await
  }

  async fn remove_location_access(&self, student_id: &str, location_id: &str) -> Result<()> {
    let params = vec![text(student_id), text(location_id)];
    self
      .execute(
        "DELETE FROM student_access_paths WHERE student_id = ?1 AND location_id = ?2",
        params,
      )
      .await
  }
}
