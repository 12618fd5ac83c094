use crate::RecordError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Identifier linking faces to the person they belong to.
///
/// A person's `person_id` is always the `group_id` its faces share, so both
/// use this one type.
pub type GroupId = i64;

/// Detection geometry of a face within its source image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Attribute bag attached to a detected face.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceAttributes {
    pub race: String,
    pub race_confidence: f64,
}

/// One detected face.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceRecord {
    /// Primary key. Immutable once the record exists.
    pub face_id: String,
    /// Path of the cropped face image. Not checked for existence.
    pub face_path: String,
    /// Path of the source image the face was cropped from.
    pub image_path: String,
    pub bounding_box: BoundingBox,
    /// Detector confidence, stored as given.
    pub face_confidence: f64,
    pub attributes: FaceAttributes,
    /// `None` means the face is ungrouped.
    pub group_id: Option<GroupId>,
    pub embedding: Vec<f64>,
}

impl FaceRecord {
    /// Reject NaN and infinite values, which have no JSON representation.
    pub fn validate(&self) -> Result<(), RecordError> {
        check_finite(&self.face_id, "bounding_box", self.bounding_box.values())?;
        check_finite(&self.face_id, "face_confidence", [self.face_confidence])?;
        check_finite(
            &self.face_id,
            "attributes.race_confidence",
            [self.attributes.race_confidence],
        )?;
        check_finite(&self.face_id, "embedding", self.embedding.iter().copied())
    }
}

impl BoundingBox {
    pub(crate) fn values(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

pub(crate) fn check_finite(
    face_id: &str,
    field: &'static str,
    values: impl IntoIterator<Item = f64>,
) -> Result<(), RecordError> {
    if values.into_iter().all(f64::is_finite) {
        Ok(())
    } else {
        Err(RecordError::NonFinite {
            face_id: face_id.to_string(),
            field,
        })
    }
}

/// An identity aggregating one or more faces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonRecord {
    pub person_id: GroupId,
    pub person_name: String,
    /// Denormalized keys of the faces grouped under this person.
    #[serde(default)]
    pub face_ids: Vec<String>,
}

impl PersonRecord {
    pub fn new(person_id: GroupId, person_name: impl Into<String>) -> Self {
        Self {
            person_id,
            person_name: person_name.into(),
            face_ids: Vec::new(),
        }
    }
}

/// Derive a display name from an image path: the name of the directory
/// directly containing the image.
///
/// `".../images/Jane_Doe/001.jpg"` yields `Some("Jane_Doe")`. A bare file
/// name has no containing directory and yields `None`.
pub fn person_name_from_image_path(image_path: &str) -> Option<String> {
    Path::new(image_path)
        .parent()
        .and_then(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}
