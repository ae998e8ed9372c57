//! STOW-RS request bodies.
//!
//! STOW-RS takes a `multipart/related` body whose parts are DICOM
//! instances. reqwest only builds `multipart/form-data`, so the body is
//! assembled here.

/// Media type of a single DICOM part.
pub const DICOM_MEDIA_TYPE: &str = "application/dicom";

/// Response media type requested from STOW-RS and QIDO-RS.
pub const DICOM_JSON_MEDIA_TYPE: &str = "application/dicom+json";

/// A ready-to-send STOW-RS body and its `Content-Type` header value.
#[derive(Debug, Clone)]
pub struct StowBody {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl StowBody {
    /// Wrap one instance in a `multipart/related` body with a fresh boundary.
    pub fn single(instance: &[u8], part_type: &str) -> Self {
        let boundary = format!("radiarch-{}", uuid::Uuid::new_v4().simple());
        Self::with_boundary(instance, part_type, &boundary)
    }

    pub fn with_boundary(instance: &[u8], part_type: &str, boundary: &str) -> Self {
        let mut body = Vec::with_capacity(instance.len() + 128);
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Type: {part_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(instance);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Self {
            content_type: format!("multipart/related; type=\"{part_type}\"; boundary={boundary}"),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_frames_instance() {
        let stow = StowBody::with_boundary(b"DICM", DICOM_MEDIA_TYPE, "b1");
        assert_eq!(
            stow.content_type,
            "multipart/related; type=\"application/dicom\"; boundary=b1"
        );
        assert_eq!(
            stow.body,
            b"--b1\r\nContent-Type: application/dicom\r\n\r\nDICM\r\n--b1--\r\n".to_vec()
        );
    }

    #[test]
    fn fresh_boundaries_differ() {
        let a = StowBody::single(b"x", DICOM_MEDIA_TYPE);
        let b = StowBody::single(b"x", DICOM_MEDIA_TYPE);
        assert_ne!(a.content_type, b.content_type);
    }
}
