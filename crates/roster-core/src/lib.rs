//! Core types and rules for the Roster enrollment status history.
//!
//! This crate is deliberately free of database and runtime dependencies. It
//! owns the interval model, the storage traits, and the two pure decision
//! components (transition validation and start-date collision resolution).
//! Orchestration lives in `roster-engine`; persistence in
//! `roster-store-sqlite`.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod error;
pub mod interval;
pub mod order;
pub mod start_date;
pub mod status;
pub mod store;
pub mod transition;

pub use error::{Error, Rejection, Result};
