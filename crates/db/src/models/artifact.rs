//! Artifact entity: a persisted output file tied to a plan.

use std::path::Path;

use radiarch_core::types::{EntityId, Timestamp};
use serde::Serialize;

/// Content type of DICOM exports, used when none is given.
pub const CONTENT_TYPE_DICOM: &str = "application/dicom";

/// Content type of non-DICOM binary exports, such as the default dose grid
/// encoding.
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub id: EntityId,
    pub plan_id: EntityId,
    pub file_path: String,
    pub content_type: String,
    pub file_name: String,
    pub created_at: Timestamp,
}

/// DTO for registering an artifact against a plan.
#[derive(Debug, Clone)]
pub struct CreateArtifact {
    pub plan_id: EntityId,
    pub file_path: String,
    pub content_type: String,
    /// Defaults to the last component of `file_path`.
    pub file_name: Option<String>,
}

impl CreateArtifact {
    pub fn new(plan_id: EntityId, file_path: impl Into<String>, content_type: &str) -> Self {
        Self {
            plan_id,
            file_path: file_path.into(),
            content_type: content_type.to_string(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = Some(file_name.to_string());
        self
    }

    /// Resolved display name.
    pub fn resolved_file_name(&self) -> String {
        match self.file_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => Path::new(&self.file_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.file_path.clone()),
        }
    }

    pub fn into_artifact(self, id: EntityId, now: Timestamp) -> Artifact {
        let file_name = self.resolved_file_name();
        Artifact {
            id,
            plan_id: self.plan_id,
            file_path: self.file_path,
            content_type: self.content_type,
            file_name,
            created_at: now,
        }
    }
}
