//! QA summary produced by a compute capability.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value};

/// Dose file written by an engine run, registered as a plan artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseExport {
    pub path: PathBuf,
    pub content_type: String,
    pub file_name: String,
}

/// JSON QA summary (camelCase keys) plus the dose export it refers to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QaSummary {
    fields: Map<String, Value>,
    dose_export: Option<DoseExport>,
}

impl QaSummary {
    /// A summary tagged with the engine that produced it.
    pub fn new(engine: &str) -> Self {
        let mut summary = Self::default();
        summary.set("engine", engine);
        summary
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Insert any serializable value.
    pub fn set_serialized(
        &mut self,
        key: &str,
        value: &impl Serialize,
    ) -> Result<&mut Self, serde_json::Error> {
        self.fields
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) -> &mut Self {
        self.set("notes", notes.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn engine(&self) -> Option<&str> {
        self.get("engine").and_then(Value::as_str)
    }

    pub fn notes(&self) -> Option<&str> {
        self.get("notes").and_then(Value::as_str)
    }

    pub fn dose_export(&self) -> Option<&DoseExport> {
        self.dose_export.as_ref()
    }

    pub fn with_dose_export(mut self, export: DoseExport) -> Self {
        self.dose_export = Some(export);
        self
    }

    /// Split into the JSON object and the dose export.
    pub fn into_parts(self) -> (Value, Option<DoseExport>) {
        (Value::Object(self.fields), self.dose_export)
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_object_with_engine_tag() {
        let mut qa = QaSummary::new("synthetic");
        qa.set("beamCount", 2).set_notes("hello");
        assert_eq!(qa.engine(), Some("synthetic"));
        assert_eq!(qa.notes(), Some("hello"));

        let (value, export) = qa.into_parts();
        assert_eq!(
            value,
            json!({ "engine": "synthetic", "beamCount": 2, "notes": "hello" })
        );
        assert!(export.is_none());
    }

    #[test]
    fn notes_overwrite() {
        let mut qa = QaSummary::new("opentps");
        qa.set_notes("first").set_notes("second");
        assert_eq!(qa.notes(), Some("second"));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.81234, 3), 0.812);
        assert_eq!(round_to(1.1235, 2), 1.12);
        assert_eq!(round_to(12.34567, 1), 12.3);
    }
}
