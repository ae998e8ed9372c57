//! The data-access contract consumed by the dose pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Study-level metadata as returned by the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub study_instance_uid: String,
    pub patient_name: Option<String>,
    pub modalities: Vec<String>,
    /// Untouched archive response, for diagnostics.
    pub raw: serde_json::Value,
}

/// One labelled structure of a segmentation (RTSTRUCT ROI or SEG segment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentLabel {
    pub id: u32,
    pub name: String,
    pub color: Option<String>,
}

/// A segmentation with its structure labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    pub instance_uid: String,
    pub study_instance_uid: Option<String>,
    pub labels: Vec<SegmentLabel>,
}

impl Segmentation {
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Transport failure talking to the archive. "Not found" is never an error.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The archive returned a non-2xx status code.
    #[error("Archive returned HTTP {0}")]
    HttpStatus(u16),

    /// The archive answered with a body we could not interpret.
    #[error("Malformed archive response: {0}")]
    Malformed(String),
}

impl AccessError {
    /// Network failures and server-side (5xx, 429) statuses may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            AccessError::Request(_) => true,
            AccessError::HttpStatus(status) => *status >= 500 || *status == 429,
            AccessError::Malformed(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// DataAccess
// ---------------------------------------------------------------------------

/// Study/segmentation fetch and artifact upload.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Look up a study. `Ok(None)` if the archive does not have it.
    async fn get_study(&self, study_instance_uid: &str)
        -> Result<Option<StudyMetadata>, AccessError>;

    /// Look up a segmentation instance. `Ok(None)` if unknown.
    async fn get_segmentation(
        &self,
        instance_uid: &str,
    ) -> Result<Option<Segmentation>, AccessError>;

    /// Upload an artifact. Returns the archive id, or an empty string when
    /// the archive does not report one.
    async fn store_artifact(&self, bytes: Vec<u8>, content_type: &str)
        -> Result<String, AccessError>;
}
