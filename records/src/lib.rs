//! Record types shared by every facet storage backend.
//!
//! A [`FaceRecord`] is one detected face with its geometry, attributes and
//! embedding. A [`PersonRecord`] is the identity a set of faces is grouped
//! under, keyed by the same [`GroupId`] the faces carry.

pub mod page;
pub mod patch;
pub mod types;

pub use page::{PageRequest, DEFAULT_PAGE_SIZE};
pub use patch::{FacePatch, PersonPatch};
pub use types::{
    person_name_from_image_path, BoundingBox, FaceAttributes, FaceRecord, GroupId, PersonRecord,
};

/// Errors raised while validating record-level inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("invalid page request: page {page}, page size {page_size} (both must be >= 1)")]
    InvalidPage { page: u32, page_size: u32 },
    #[error("face '{face_id}': {field} must be finite")]
    NonFinite { face_id: String, field: &'static str },
}
