//! Best-effort push of finished dose exports to a PACS.

use async_trait::async_trait;

use crate::dicomweb::{DicomWebClient, DicomWebConfig};
use crate::stow::DICOM_MEDIA_TYPE;

/// Artifact push. Implementations never fail; they log and return `false`.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn enabled(&self) -> bool;

    /// Push DICOM instance bytes. Returns `true` on success.
    async fn store_instances(&self, bytes: Vec<u8>) -> bool;
}

/// Notifier used when no push target is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    fn enabled(&self) -> bool {
        false
    }

    async fn store_instances(&self, _bytes: Vec<u8>) -> bool {
        false
    }
}

/// STOW-RS push to a DICOMweb endpoint.
#[derive(Debug, Clone)]
pub struct DicomWebNotifier {
    client: DicomWebClient,
}

impl DicomWebNotifier {
    pub fn new(config: DicomWebConfig) -> Result<Self, crate::access::AccessError> {
        Ok(Self {
            client: DicomWebClient::new(config)?,
        })
    }
}

#[async_trait]
impl Notifier for DicomWebNotifier {
    fn enabled(&self) -> bool {
        !self.client.base_url().is_empty()
    }

    async fn store_instances(&self, bytes: Vec<u8>) -> bool {
        if !self.enabled() {
            return false;
        }
        let url = self.client.base_url();
        tracing::info!(url, size = bytes.len(), "STOW-RS push");
        match self.client.store(&bytes, DICOM_MEDIA_TYPE).await {
            Ok(_) => {
                tracing::info!(url, "STOW-RS push succeeded");
                true
            }
            Err(e) => {
                tracing::error!(url, error = %e, "STOW-RS push failed (non-fatal)");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_never_pushes() {
        let notifier = DisabledNotifier;
        assert!(!notifier.enabled());
        assert!(!notifier.store_instances(vec![0; 4]).await);
    }

    #[test]
    fn empty_url_is_disabled() {
        let notifier = DicomWebNotifier::new(DicomWebConfig::new("")).unwrap();
        assert!(!notifier.enabled());
    }
}
