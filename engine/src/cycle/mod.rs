//! Cycle Controller
//!
//! Drives the bounded OBSERVE→ORIENT→DECIDE→ACT state machine per objective.

pub mod controller;
pub mod types;

pub use controller::{CycleController, CycleLimits};
pub use types::{next_phase, ObjectiveHandle, PhaseResult};
