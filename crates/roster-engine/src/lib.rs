//! The enrollment status history engine.
//!
//! Drives the rules in `roster-core` against any
//! [`TransactionalStore`](roster_core::store::TransactionalStore):
//!
//! - [`Engine::validate_and_apply`] for back-office edits,
//! - [`Engine::handle_order_event`] for the order pipeline.
//!
//! Each call runs in its own transaction under the configured deadline and
//! is rolled back entirely on failure.

pub mod activation;
pub mod engine;
pub mod order_flow;
pub mod writer;

pub use engine::{ApplyOutcome, Engine, EngineConfig};
pub use order_flow::{OrderFailure, OrderFlowState, OrderOutcome};
pub use writer::WriteOutcome;
