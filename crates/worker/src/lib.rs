//! Radiarch plan worker.
//!
//! Runs queued plan jobs through the dispatcher on a pool of tokio tasks,
//! reporting staged progress to the store. [`service::PlanService`] is the
//! entry point for submitting, cancelling and deleting plans;
//! [`simulation::SimulationService`] runs delivery simulations of finished
//! plans.

pub mod config;
pub mod context;
pub mod pool;
pub mod retry;
pub mod runner;
pub mod service;
pub mod simulation;
