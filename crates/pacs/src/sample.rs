//! Offline data access backed by a built-in phantom study.

use async_trait::async_trait;

use crate::access::{AccessError, DataAccess, SegmentLabel, Segmentation, StudyMetadata};

/// Study UID of the built-in CT phantom.
pub const SAMPLE_STUDY_UID: &str = "1.2.840.113619.2.55.3.604688321.783.1459769131.467";

/// Instance UID of the phantom's PTV/CTV structure set.
pub const SAMPLE_SEGMENTATION_UID: &str = "1.2.246.352.63.1.4648126406368983830.13435.202201120812";

/// Archive id returned for every stored artifact.
pub const SAMPLE_ARTIFACT_UID: &str = "mock-artifact-uid";

/// [`DataAccess`] serving the phantom study and discarding uploads.
#[derive(Debug, Default, Clone)]
pub struct SampleDataAccess;

impl SampleDataAccess {
    pub fn new() -> Self {
        Self
    }
}

fn sample_study() -> StudyMetadata {
    StudyMetadata {
        study_instance_uid: SAMPLE_STUDY_UID.to_string(),
        patient_name: Some("RADIARCH^PHANTOM".to_string()),
        modalities: vec!["CT".to_string()],
        raw: serde_json::json!({
            "StudyInstanceUID": SAMPLE_STUDY_UID,
            "PatientName": "RADIARCH^PHANTOM",
            "PatientID": "RADIARCH001",
            "ModalitiesInStudy": ["CT"],
            "NumberOfStudyRelatedSeries": 1,
            "NumberOfStudyRelatedInstances": 120,
            "series": [{
                "SeriesInstanceUID": "1.2.840.113619.2.55.3.604688321.783.1459769131.468",
                "Modality": "CT",
                "BodyPartExamined": "ABDOMEN",
                "SliceThickness": 1.25,
            }],
        }),
    }
}

fn sample_segmentation() -> Segmentation {
    Segmentation {
        instance_uid: SAMPLE_SEGMENTATION_UID.to_string(),
        study_instance_uid: Some(SAMPLE_STUDY_UID.to_string()),
        labels: vec![
            SegmentLabel {
                id: 1,
                name: "PTV".to_string(),
                color: Some("#ff5f5f".to_string()),
            },
            SegmentLabel {
                id: 2,
                name: "CTV".to_string(),
                color: Some("#5f87ff".to_string()),
            },
        ],
    }
}

#[async_trait]
impl DataAccess for SampleDataAccess {
    async fn get_study(
        &self,
        study_instance_uid: &str,
    ) -> Result<Option<StudyMetadata>, AccessError> {
        Ok((study_instance_uid == SAMPLE_STUDY_UID).then(sample_study))
    }

    async fn get_segmentation(
        &self,
        instance_uid: &str,
    ) -> Result<Option<Segmentation>, AccessError> {
        Ok((instance_uid == SAMPLE_SEGMENTATION_UID).then(sample_segmentation))
    }

    async fn store_artifact(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AccessError> {
        tracing::debug!(content_type, size = bytes.len(), "Discarding artifact in sample data access");
        Ok(SAMPLE_ARTIFACT_UID.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_phantom_study() {
        let access = SampleDataAccess::new();
        let study = access.get_study(SAMPLE_STUDY_UID).await.unwrap().unwrap();
        assert_eq!(study.modalities, vec!["CT"]);
        assert_eq!(study.raw["PatientID"], "RADIARCH001");
    }

    #[tokio::test]
    async fn unknown_uids_are_none() {
        let access = SampleDataAccess::new();
        assert!(access.get_study("1.2.3").await.unwrap().is_none());
        assert!(access.get_segmentation("1.2.3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn segmentation_has_target_labels() {
        let access = SampleDataAccess::new();
        let seg = access
            .get_segmentation(SAMPLE_SEGMENTATION_UID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seg.label_names(), vec!["PTV", "CTV"]);
    }

    #[tokio::test]
    async fn store_returns_fixed_uid() {
        let access = SampleDataAccess::new();
        let id = access
            .store_artifact(vec![1, 2, 3], "application/dicom")
            .await
            .unwrap();
        assert_eq!(id, SAMPLE_ARTIFACT_UID);
    }
}
