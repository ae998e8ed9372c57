//! Repository layer for the durable backend.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&mut SqliteConnection` as the first argument, so callers can run
//! several of them inside one transaction.

pub mod artifact_repo;
pub mod job_repo;
pub mod plan_repo;

pub use artifact_repo::ArtifactRepo;
pub use job_repo::JobRepo;
pub use plan_repo::PlanRepo;

use crate::store::StoreError;

fn corrupt(table: &'static str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        table,
        reason: err.to_string(),
    }
}
