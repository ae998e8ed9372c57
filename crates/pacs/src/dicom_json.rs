//! Readers for the DICOM JSON model (PS3.18 Annex F) used by QIDO-RS,
//! WADO-RS metadata and STOW-RS responses.

use serde_json::Value;

use crate::access::{SegmentLabel, Segmentation, StudyMetadata};

pub const TAG_STUDY_INSTANCE_UID: &str = "0020000D";
pub const TAG_SERIES_INSTANCE_UID: &str = "0020000E";
pub const TAG_SOP_INSTANCE_UID: &str = "00080018";
pub const TAG_PATIENT_NAME: &str = "00100010";
pub const TAG_MODALITIES_IN_STUDY: &str = "00080061";
pub const TAG_REFERENCED_SOP_SEQUENCE: &str = "00081199";
pub const TAG_REFERENCED_SOP_INSTANCE_UID: &str = "00081155";
pub const TAG_SEGMENT_SEQUENCE: &str = "00620002";
pub const TAG_SEGMENT_NUMBER: &str = "00620004";
pub const TAG_SEGMENT_LABEL: &str = "00620005";
pub const TAG_STRUCTURE_SET_ROI_SEQUENCE: &str = "30060020";
pub const TAG_ROI_NUMBER: &str = "30060022";
pub const TAG_ROI_NAME: &str = "30060026";

fn values<'a>(dataset: &'a Value, tag: &str) -> impl Iterator<Item = &'a Value> {
    dataset
        .get(tag)
        .and_then(|attr| attr.get("Value"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// First string value of an attribute. Person names yield their
/// alphabetic component.
pub fn first_string(dataset: &Value, tag: &str) -> Option<String> {
    values(dataset, tag).next().and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(pn) => pn.get("Alphabetic").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })
}

/// All string values of a multi-valued attribute.
pub fn strings(dataset: &Value, tag: &str) -> Vec<String> {
    values(dataset, tag)
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

pub fn first_u32(dataset: &Value, tag: &str) -> Option<u32> {
    values(dataset, tag).next().and_then(|v| match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Items of a sequence attribute.
pub fn sequence<'a>(dataset: &'a Value, tag: &str) -> Vec<&'a Value> {
    values(dataset, tag).filter(|v| v.is_object()).collect()
}

/// Build study metadata from a QIDO-RS study match.
pub fn study_from_dataset(dataset: &Value) -> Option<StudyMetadata> {
    Some(StudyMetadata {
        study_instance_uid: first_string(dataset, TAG_STUDY_INSTANCE_UID)?,
        patient_name: first_string(dataset, TAG_PATIENT_NAME),
        modalities: strings(dataset, TAG_MODALITIES_IN_STUDY),
        raw: dataset.clone(),
    })
}

/// Build a segmentation from WADO-RS instance metadata.
///
/// SEG objects list segments in the Segment Sequence; RTSTRUCT objects list
/// ROIs in the Structure Set ROI Sequence. Both are read.
pub fn segmentation_from_dataset(instance_uid: &str, dataset: &Value) -> Segmentation {
    let segments = sequence(dataset, TAG_SEGMENT_SEQUENCE)
        .into_iter()
        .map(|item| (item, TAG_SEGMENT_NUMBER, TAG_SEGMENT_LABEL));
    let rois = sequence(dataset, TAG_STRUCTURE_SET_ROI_SEQUENCE)
        .into_iter()
        .map(|item| (item, TAG_ROI_NUMBER, TAG_ROI_NAME));

    let labels = segments
        .chain(rois)
        .enumerate()
        .filter_map(|(i, (item, number_tag, name_tag))| {
            let name = first_string(item, name_tag)?;
            let id = first_u32(item, number_tag).unwrap_or(i as u32 + 1);
            Some(SegmentLabel {
                id,
                name,
                color: None,
            })
        })
        .collect();

    Segmentation {
        instance_uid: instance_uid.to_string(),
        study_instance_uid: first_string(dataset, TAG_STUDY_INSTANCE_UID),
        labels,
    }
}

/// SOP Instance UID of the first stored instance in a STOW-RS response,
/// or an empty string.
pub fn stored_instance_uid(response: &Value) -> String {
    sequence(response, TAG_REFERENCED_SOP_SEQUENCE)
        .first()
        .and_then(|item| first_string(item, TAG_REFERENCED_SOP_INSTANCE_UID))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_study_match() {
        let dataset = json!({
            "0020000D": { "vr": "UI", "Value": ["1.2.3"] },
            "00100010": { "vr": "PN", "Value": [{ "Alphabetic": "DOE^JANE" }] },
            "00080061": { "vr": "CS", "Value": ["CT", "RTSTRUCT"] },
        });
        let study = study_from_dataset(&dataset).unwrap();
        assert_eq!(study.study_instance_uid, "1.2.3");
        assert_eq!(study.patient_name.as_deref(), Some("DOE^JANE"));
        assert_eq!(study.modalities, vec!["CT", "RTSTRUCT"]);
    }

    #[test]
    fn study_without_uid_is_rejected() {
        assert!(study_from_dataset(&json!({})).is_none());
    }

    #[test]
    fn reads_rtstruct_rois() {
        let dataset = json!({
            "0020000D": { "vr": "UI", "Value": ["1.2.3"] },
            "30060020": { "vr": "SQ", "Value": [
                { "30060022": { "vr": "IS", "Value": ["4"] },
                  "30060026": { "vr": "LO", "Value": ["Body"] } },
                { "30060022": { "vr": "IS", "Value": [7] },
                  "30060026": { "vr": "LO", "Value": ["PTV"] } },
            ]},
        });
        let seg = segmentation_from_dataset("9.9", &dataset);
        assert_eq!(seg.study_instance_uid.as_deref(), Some("1.2.3"));
        assert_eq!(seg.label_names(), vec!["Body", "PTV"]);
        assert_eq!(seg.labels[0].id, 4);
        assert_eq!(seg.labels[1].id, 7);
    }

    #[test]
    fn reads_seg_segments() {
        let dataset = json!({
            "00620002": { "vr": "SQ", "Value": [
                { "00620005": { "vr": "LO", "Value": ["GTV"] } },
            ]},
        });
        let seg = segmentation_from_dataset("9.9", &dataset);
        assert_eq!(seg.labels.len(), 1);
        assert_eq!(seg.labels[0].name, "GTV");
        assert_eq!(seg.labels[0].id, 1);
    }

    #[test]
    fn stow_response_uid() {
        let response = json!({
            "00081199": { "vr": "SQ", "Value": [
                { "00081155": { "vr": "UI", "Value": ["1.2.840.99"] } },
            ]},
        });
        assert_eq!(stored_instance_uid(&response), "1.2.840.99");
        assert_eq!(stored_instance_uid(&json!({})), "");
    }
}
