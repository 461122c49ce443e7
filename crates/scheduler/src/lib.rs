//! Admission control for resource-heavy tool executions.
//!
//! Each admitted execution may spin up a real browser process, so the gate
//! bounds concurrency to a small configured limit and serves waiters in
//! arrival order.

pub mod gate;
pub mod metrics;
pub mod model;

pub use gate::{AdmissionGate, ExecutionSlot};
pub use model::AdmissionConfig;
