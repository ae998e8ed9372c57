//! Workflow identifiers and typed workflow definitions.
//!
//! A [`WorkflowId`] is the single canonical representation of a workflow
//! reference. It is syntax-checked once at construction; whether the id is
//! actually registered is decided by the
//! [`WorkflowRegistry`](crate::registry::WorkflowRegistry).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum length of a workflow id (matches the `plans.workflow_id` column).
const MAX_WORKFLOW_ID_LEN: usize = 64;

// ---------------------------------------------------------------------------
// WorkflowId
// ---------------------------------------------------------------------------

/// Validated workflow identifier, e.g. `proton-impt-basic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Parse and validate a workflow id.
    ///
    /// Rules:
    /// - Must not be empty.
    /// - Must not exceed `MAX_WORKFLOW_ID_LEN` characters.
    /// - Must contain only ASCII alphanumeric, hyphen, underscore, or dot characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(CoreError::Validation(
                "Workflow id must not be empty".to_string(),
            ));
        }
        if raw.len() > MAX_WORKFLOW_ID_LEN {
            return Err(CoreError::Validation(format!(
                "Workflow id must not exceed {MAX_WORKFLOW_ID_LEN} characters"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(CoreError::Validation(format!(
                "Workflow id \"{raw}\" may only contain alphanumeric, hyphen, underscore, or dot characters"
            )));
        }
        Ok(Self(raw))
    }

    /// Wrap a built-in id constant without re-validating it.
    pub(crate) fn from_static(raw: &'static str) -> Self {
        debug_assert!(Self::parse(raw).is_ok(), "invalid built-in workflow id {raw}");
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WorkflowId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<WorkflowId> for String {
    fn from(value: WorkflowId) -> Self {
        value.0
    }
}

impl std::borrow::Borrow<str> for WorkflowId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Definition metadata
// ---------------------------------------------------------------------------

/// Treatment modality a workflow plans for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Proton,
    Photon,
}

/// Broad kind of computation; drives the runner's compute stage label and ETA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowCategory {
    Dose,
    Optimization,
    Robust,
    Simulation,
}

/// Value type of a workflow parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Number,
    Integer,
    String,
    Boolean,
}

/// Default value of a workflow parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

/// Typed parameter definition with metadata for UI rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowParameter {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub default: Option<ParameterValue>,
    #[serde(default)]
    pub description: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub units: Option<String>,
}

impl WorkflowParameter {
    /// A floating-point parameter with a default and no bounds.
    pub fn number(name: &str, label: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            param_type: ParameterType::Number,
            default: Some(ParameterValue::Number(default)),
            description: String::new(),
            min_value: None,
            max_value: None,
            units: None,
        }
    }

    /// An integer parameter with a default and no bounds.
    pub fn integer(name: &str, label: &str, default: i64) -> Self {
        Self {
            param_type: ParameterType::Integer,
            default: Some(ParameterValue::Integer(default)),
            ..Self::number(name, label, 0.0)
        }
    }

    /// A free-text parameter with a default.
    pub fn string(name: &str, label: &str, default: &str) -> Self {
        Self {
            param_type: ParameterType::String,
            default: Some(ParameterValue::String(default.to_string())),
            ..Self::number(name, label, 0.0)
        }
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Workflow definition with typed metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub modality: Modality,
    /// Dose engine tag, e.g. `mcsquare` or `ccc`.
    pub engine: String,
    pub category: WorkflowCategory,
    pub default_parameters: Vec<WorkflowParameter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_accepts_builtin_style_ids() {
        for raw in ["proton-impt-basic", "photon-ccc", "bogus-workflow", "wf_v1.2"] {
            assert_eq!(WorkflowId::parse(raw).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn parse_rejects_empty() {
        assert_matches!(WorkflowId::parse(""), Err(CoreError::Validation(_)));
    }

    #[test]
    fn parse_rejects_too_long() {
        let raw = "a".repeat(MAX_WORKFLOW_ID_LEN + 1);
        assert_matches!(WorkflowId::parse(raw), Err(CoreError::Validation(_)));
    }

    #[test]
    fn parse_rejects_whitespace_and_slashes() {
        assert_matches!(WorkflowId::parse("proton basic"), Err(CoreError::Validation(_)));
        assert_matches!(WorkflowId::parse("../etc"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn deserialize_validates() {
        let ok: WorkflowId = serde_json::from_str("\"photon-ccc\"").unwrap();
        assert_eq!(ok.as_str(), "photon-ccc");
        assert!(serde_json::from_str::<WorkflowId>("\"\"").is_err());
    }

    #[test]
    fn parameter_serializes_type_field() {
        let param = WorkflowParameter::integer("max_iterations", "Max Iterations", 50)
            .with_bounds(Some(1.0), Some(500.0));
        let json = serde_json::to_value(&param).unwrap();
        assert_eq!(json["type"], "integer");
        assert_eq!(json["default"], 50);
        assert_eq!(json["max_value"], 500.0);
    }
}
