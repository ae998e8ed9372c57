//! Radiarch domain core.
//!
//! Pure value types and rules shared by every other crate: identifiers,
//! the job state machine, workflow definitions and their registry, plan
//! request validation, delivery simulation requests, and the
//! staged-progress constants used by the job runner. Has no internal
//! dependencies.

pub mod error;
pub mod job_state;
pub mod plan;
pub mod registry;
pub mod simulation;
pub mod stages;
pub mod types;
pub mod workflow;
