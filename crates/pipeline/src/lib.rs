//! Plan execution pipeline.
//!
//! The [`Dispatcher`](dispatcher::Dispatcher) maps a plan's workflow to a
//! [`ComputeCapability`](capability::ComputeCapability), falls back to the
//! [`SyntheticGenerator`](synthetic::SyntheticGenerator) when the dose
//! engine is unavailable, and packages the QA summary as a JSON artifact.
//! [`DeliverySimulator`](simulation::DeliverySimulator) replays finished
//! plans under motion with the same fallback rules.

pub mod capability;
pub mod dispatcher;
pub mod dvh;
pub mod engine;
pub mod error;
pub mod qa;
pub mod simulation;
pub mod synthetic;
