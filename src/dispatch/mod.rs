//! The dispatch engine: the delivery status state machine, nearest-driver
//! auto-assignment and the engine that commits and publishes both.

pub mod assignment;
pub mod engine;
pub mod state_machine;

pub use assignment::{Candidate, select_driver};
pub use engine::DispatchEngine;
