//! Repository for the `artifacts` table.

use radiarch_core::types::{EntityId, Timestamp};
use sqlx::{FromRow, SqliteConnection};

use crate::models::artifact::Artifact;
use crate::store::StoreError;

/// Column list for `artifacts` queries.
const COLUMNS: &str = "id, plan_id, file_path, content_type, file_name, created_at";

#[derive(Debug, FromRow)]
struct ArtifactRow {
    id: EntityId,
    plan_id: EntityId,
    file_path: String,
    content_type: String,
    file_name: String,
    created_at: Timestamp,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Artifact {
            id: row.id,
            plan_id: row.plan_id,
            file_path: row.file_path,
            content_type: row.content_type,
            file_name: row.file_name,
            created_at: row.created_at,
        }
    }
}

/// Provides persistence operations for plan artifacts.
pub struct ArtifactRepo;

impl ArtifactRepo {
    pub async fn insert(
        conn: &mut SqliteConnection,
        artifact: &Artifact,
    ) -> Result<(), StoreError> {
        let query = format!("INSERT INTO artifacts ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)");
        sqlx::query(&query)
            .bind(artifact.id)
            .bind(artifact.plan_id)
            .bind(&artifact.file_path)
            .bind(&artifact.content_type)
            .bind(&artifact.file_name)
            .bind(artifact.created_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut SqliteConnection,
        id: EntityId,
    ) -> Result<Option<Artifact>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM artifacts WHERE id = ?1");
        let row = sqlx::query_as::<_, ArtifactRow>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(Artifact::from))
    }

    /// Artifact ids of one plan in registration order.
    pub async fn ids_for_plan(
        conn: &mut SqliteConnection,
        plan_id: EntityId,
    ) -> Result<Vec<EntityId>, StoreError> {
        let ids = sqlx::query_scalar::<_, EntityId>(
            "SELECT id FROM artifacts WHERE plan_id = ?1 ORDER BY rowid",
        )
        .bind(plan_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(ids)
    }

    /// `(plan_id, artifact_id)` pairs for every artifact in registration order.
    pub async fn all_ids(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<(EntityId, EntityId)>, StoreError> {
        let pairs = sqlx::query_as::<_, (EntityId, EntityId)>(
            "SELECT plan_id, id FROM artifacts ORDER BY rowid",
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(pairs)
    }
}
