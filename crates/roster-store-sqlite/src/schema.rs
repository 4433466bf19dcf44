//! SQL schema for the Roster SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Rows are never physically deleted; `deleted_at` marks a voided interval.
CREATE TABLE IF NOT EXISTS enrollment_status_history (
    interval_id       TEXT PRIMARY KEY,
    student_id        TEXT NOT NULL,
    location_id       TEXT NOT NULL,
    organization_id   TEXT NOT NULL,
    enrollment_status TEXT NOT NULL,
    start_date        TEXT NOT NULL,   -- RFC 3339, microsecond precision, UTC
    end_date          TEXT,            -- NULL = open-ended
    order_id          TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    deleted_at        TEXT
);

-- The identity of a live interval.
CREATE UNIQUE INDEX IF NOT EXISTS enrollment_status_history_identity
    ON enrollment_status_history (student_id, location_id, enrollment_status, start_date)
    WHERE deleted_at IS NULL;

CREATE INDEX IF NOT EXISTS enrollment_status_history_timeline_idx
    ON enrollment_status_history (student_id, location_id, start_date);

CREATE TABLE IF NOT EXISTS students (
    student_id     TEXT PRIMARY KEY,
    deactivated_at TEXT,
    updated_at     TEXT NOT NULL
);

-- The locations a student can be reached through.
CREATE TABLE IF NOT EXISTS student_access_paths (
    student_id  TEXT NOT NULL,
    location_id TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (student_id, location_id)
);

PRAGMA user_version = 1;
";
