//! Domain model structs and DTOs.
//!
//! The structs here are backend-neutral snapshots. The SQL backend decodes
//! into private row types in `repositories` and converts into these.

pub mod artifact;
pub mod job;
pub mod plan;
