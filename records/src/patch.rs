//! Partial updates.
//!
//! Each patch field is independently optional. Backends translate a patch into
//! a statement over a fixed set of columns, or apply it to an in-memory record.

use crate::types::{check_finite, BoundingBox, FaceAttributes, FaceRecord, GroupId, PersonRecord};
use crate::RecordError;

/// Fields of a [`FaceRecord`] to overwrite. `face_id` is immutable and has no
/// counterpart here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacePatch {
    pub face_path: Option<String>,
    pub image_path: Option<String>,
    pub bounding_box: Option<BoundingBox>,
    pub face_confidence: Option<f64>,
    pub attributes: Option<FaceAttributes>,
    /// `Some(None)` clears the grouping, `None` leaves it untouched.
    pub group_id: Option<Option<GroupId>>,
    pub embedding: Option<Vec<f64>>,
}

impl FacePatch {
    /// A patch that replaces every mutable field with the values of `record`.
    pub fn replacing(record: &FaceRecord) -> Self {
        Self {
            face_path: Some(record.face_path.clone()),
            image_path: Some(record.image_path.clone()),
            bounding_box: Some(record.bounding_box),
            face_confidence: Some(record.face_confidence),
            attributes: Some(record.attributes.clone()),
            group_id: Some(record.group_id),
            embedding: Some(record.embedding.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.face_path.is_none()
            && self.image_path.is_none()
            && self.bounding_box.is_none()
            && self.face_confidence.is_none()
            && self.attributes.is_none()
            && self.group_id.is_none()
            && self.embedding.is_none()
    }

    /// Reject NaN and infinite values among the set fields of a patch for
    /// the face `face_id`.
    pub fn validate(&self, face_id: &str) -> Result<(), RecordError> {
        if let Some(bounding_box) = self.bounding_box {
            check_finite(face_id, "bounding_box", bounding_box.values())?;
        }
        if let Some(face_confidence) = self.face_confidence {
            check_finite(face_id, "face_confidence", [face_confidence])?;
        }
        if let Some(ref attributes) = self.attributes {
            check_finite(
                face_id,
                "attributes.race_confidence",
                [attributes.race_confidence],
            )?;
        }
        if let Some(ref embedding) = self.embedding {
            check_finite(face_id, "embedding", embedding.iter().copied())?;
        }
        Ok(())
    }

    pub fn apply(&self, record: &mut FaceRecord) {
        if let Some(ref face_path) = self.face_path {
            record.face_path = face_path.clone();
        }
        if let Some(ref image_path) = self.image_path {
            record.image_path = image_path.clone();
        }
        if let Some(bounding_box) = self.bounding_box {
            record.bounding_box = bounding_box;
        }
        if let Some(face_confidence) = self.face_confidence {
            record.face_confidence = face_confidence;
        }
        if let Some(ref attributes) = self.attributes {
            record.attributes = attributes.clone();
        }
        if let Some(group_id) = self.group_id {
            record.group_id = group_id;
        }
        if let Some(ref embedding) = self.embedding {
            record.embedding = embedding.clone();
        }
    }
}

/// Fields of a [`PersonRecord`] to overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonPatch {
    pub person_name: Option<String>,
    pub face_ids: Option<Vec<String>>,
}

impl PersonPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            person_name: Some(name.into()),
            face_ids: None,
        }
    }

    pub fn replacing(record: &PersonRecord) -> Self {
        Self {
            person_name: Some(record.person_name.clone()),
            face_ids: Some(record.face_ids.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.person_name.is_none() && self.face_ids.is_none()
    }

    pub fn apply(&self, record: &mut PersonRecord) {
        if let Some(ref person_name) = self.person_name {
            record.person_name = person_name.clone();
        }
        if let Some(ref face_ids) = self.face_ids {
            record.face_ids = face_ids.clone();
        }
    }
}
