/// All entity identifiers (plans, jobs, artifacts) are random UUIDs.
pub type EntityId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh entity identifier.
pub fn new_id() -> EntityId {
    uuid::Uuid::new_v4()
}
