//! Imaging-data access and artifact push.
//!
//! [`DataAccess`](access::DataAccess) loads studies and segmentations for
//! the dose pipeline; [`Notifier`](notifier::Notifier) forwards finished
//! dose exports to a PACS. Both have a built-in offline implementation and
//! a DICOMweb one.

pub mod access;
pub mod dicom_json;
pub mod dicomweb;
pub mod notifier;
pub mod sample;
pub mod stow;
