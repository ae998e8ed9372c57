//! DICOMweb client (QIDO-RS, WADO-RS, STOW-RS) and the [`DataAccess`]
//! implementation built on it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::access::{AccessError, DataAccess, Segmentation, StudyMetadata};
use crate::dicom_json;
use crate::stow::{StowBody, DICOM_JSON_MEDIA_TYPE};

/// HTTP request timeout for a single archive call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a DICOMweb endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomWebConfig {
    /// Service root, e.g. `http://localhost:8042/dicom-web`.
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DicomWebConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username;
        self.password = password;
        self
    }
}

// ---------------------------------------------------------------------------
// DicomWebClient
// ---------------------------------------------------------------------------

/// Thin DICOMweb client over `reqwest`.
#[derive(Debug, Clone)]
pub struct DicomWebClient {
    config: DicomWebConfig,
    http: reqwest::Client,
}

impl DicomWebClient {
    pub fn new(config: DicomWebConfig) -> Result<Self, AccessError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { config, http })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.username {
            Some(username) => request.basic_auth(username, self.config.password.as_deref()),
            None => request,
        }
    }

    /// GET a DICOM JSON array. `204 No Content` and `404` are empty results.
    async fn get_json_array(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<Value>, AccessError> {
        let request = self
            .http
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT, DICOM_JSON_MEDIA_TYPE);
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(AccessError::HttpStatus(status.as_u16()));
        }

        match response.json::<Value>().await? {
            Value::Array(items) => Ok(items),
            other => Err(AccessError::Malformed(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// QIDO-RS study search by Study Instance UID.
    pub async fn search_study(&self, study_instance_uid: &str) -> Result<Option<Value>, AccessError> {
        let url = format!("{}/studies", self.config.base_url);
        let matches = self
            .get_json_array(&url, &[("StudyInstanceUID", study_instance_uid)])
            .await?;
        Ok(matches.into_iter().next())
    }

    /// QIDO-RS instance search by SOP Instance UID.
    pub async fn search_instance(&self, sop_instance_uid: &str) -> Result<Option<Value>, AccessError> {
        let url = format!("{}/instances", self.config.base_url);
        let matches = self
            .get_json_array(&url, &[("SOPInstanceUID", sop_instance_uid)])
            .await?;
        Ok(matches.into_iter().next())
    }

    /// WADO-RS instance metadata.
    pub async fn instance_metadata(
        &self,
        study_uid: &str,
        series_uid: &str,
        instance_uid: &str,
    ) -> Result<Option<Value>, AccessError> {
        let url = format!(
            "{}/studies/{study_uid}/series/{series_uid}/instances/{instance_uid}/metadata",
            self.config.base_url
        );
        Ok(self.get_json_array(&url, &[]).await?.into_iter().next())
    }

    /// STOW-RS upload of a single instance. Returns the response body
    /// (`Value::Null` when the archive sends none).
    pub async fn store(&self, instance: &[u8], part_type: &str) -> Result<Value, AccessError> {
        let url = format!("{}/studies", self.config.base_url);
        let stow = StowBody::single(instance, part_type);
        let request = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, stow.content_type)
            .header(reqwest::header::ACCEPT, DICOM_JSON_MEDIA_TYPE)
            .body(stow.body);
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AccessError::HttpStatus(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| AccessError::Malformed(e.to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// DicomWebAccess
// ---------------------------------------------------------------------------

/// [`DataAccess`] against a live DICOMweb archive.
#[derive(Debug, Clone)]
pub struct DicomWebAccess {
    client: DicomWebClient,
}

impl DicomWebAccess {
    pub fn new(config: DicomWebConfig) -> Result<Self, AccessError> {
        Ok(Self {
            client: DicomWebClient::new(config)?,
        })
    }
}

#[async_trait]
impl DataAccess for DicomWebAccess {
    async fn get_study(
        &self,
        study_instance_uid: &str,
    ) -> Result<Option<StudyMetadata>, AccessError> {
        tracing::debug!(study_instance_uid, "Fetching study metadata");
        let Some(dataset) = self.client.search_study(study_instance_uid).await? else {
            return Ok(None);
        };
        dicom_json::study_from_dataset(&dataset).map(Some).ok_or_else(|| {
            AccessError::Malformed("study match without StudyInstanceUID".to_string())
        })
    }

    async fn get_segmentation(
        &self,
        instance_uid: &str,
    ) -> Result<Option<Segmentation>, AccessError> {
        tracing::debug!(instance_uid, "Fetching segmentation");
        let Some(found) = self.client.search_instance(instance_uid).await? else {
            return Ok(None);
        };
        let (Some(study_uid), Some(series_uid)) = (
            dicom_json::first_string(&found, dicom_json::TAG_STUDY_INSTANCE_UID),
            dicom_json::first_string(&found, dicom_json::TAG_SERIES_INSTANCE_UID),
        ) else {
            return Err(AccessError::Malformed(
                "instance match without study/series UIDs".to_string(),
            ));
        };

        let metadata = self
            .client
            .instance_metadata(&study_uid, &series_uid, instance_uid)
            .await?;
        Ok(metadata.map(|dataset| dicom_json::segmentation_from_dataset(instance_uid, &dataset)))
    }

    async fn store_artifact(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AccessError> {
        tracing::debug!(size = bytes.len(), content_type, "Storing artifact via STOW-RS");
        let response = self.client.store(&bytes, content_type).await?;
        Ok(dicom_json::stored_instance_uid(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_trims_trailing_slash() {
        let config = DicomWebConfig::new("http://pacs:8042/dicom-web/");
        assert_eq!(config.base_url, "http://pacs:8042/dicom-web");
    }

    #[test]
    fn new_does_not_fail() {
        let client = DicomWebClient::new(DicomWebConfig::new("http://localhost:8042")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8042");
    }
}
