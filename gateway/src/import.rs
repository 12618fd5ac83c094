//! Bulk import of face metadata documents and person derivation.
//!
//! A metadata directory holds one JSON document per face, shaped like a
//! serialized [`FaceRecord`]. [`import_faces`] upserts every valid document;
//! [`derive_persons`] then groups the stored faces by `group_id` and writes
//! one [`PersonRecord`] per group. Both passes are idempotent, and a bad
//! document or a failed write is recorded in the report without stopping
//! the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::persistence::{FaceRepository, PersistenceError, PersonRepository};
use facet_records::{person_name_from_image_path, FaceRecord, GroupId, PersonRecord};

/// Prefix of the fallback name for a group with no usable image directory.
const FALLBACK_NAME_PREFIX: &str = "person_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of [`import_faces`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// `*.json` files found in the directory.
    pub scanned: usize,
    pub imported: usize,
    /// Documents without a `face_id`.
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivationFailure {
    pub group_id: GroupId,
    pub reason: String,
}

/// Outcome of [`derive_persons`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivationReport {
    pub groups: usize,
    pub persons_written: usize,
    /// Faces with no `group_id`; they belong to no person.
    pub ungrouped_faces: usize,
    pub failures: Vec<DerivationFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub faces: ImportReport,
    pub persons: DerivationReport,
}

impl ImportSummary {
    pub fn has_failures(&self) -> bool {
        !self.faces.failures.is_empty() || !self.persons.failures.is_empty()
    }
}

/// Parse one face document.
///
/// Returns `Ok(None)` for a document whose `face_id` is missing, `null` or
/// empty. Every other missing or mistyped field, a non-string `face_id`
/// included, is a [`PersistenceError::MalformedDocument`], as is a
/// non-finite number. `group_id` may be `null` but the key must be present.
pub fn parse_face_document(path: &Path, text: &str) -> Result<Option<FaceRecord>, PersistenceError> {
    let malformed = |reason: String| PersistenceError::MalformedDocument {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
    let Some(fields) = value.as_object() else {
        return Err(malformed("document is not a JSON object".to_string()));
    };

    match fields.get("face_id") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(id)) if id.is_empty() => return Ok(None),
        Some(Value::String(_)) => {}
        Some(other) => {
            return Err(malformed(format!("`face_id` is not a string: {other}")));
        }
    }
    if !fields.contains_key("group_id") {
        return Err(malformed("missing field `group_id`".to_string()));
    }

    let face: FaceRecord = serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;
    face.validate().map_err(|e| malformed(e.to_string()))?;
    Ok(Some(face))
}

/// `*.json` files directly inside `dir`, sorted by file name.
fn metadata_files(dir: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Upsert every valid face document in `dir` into `faces`.
///
/// Fails only if the directory itself cannot be listed.
pub async fn import_faces(
    faces: &impl FaceRepository,
    dir: &Path,
) -> Result<ImportReport, PersistenceError> {
    info!(dir = %dir.display(), "Starting face import");
    let files = metadata_files(dir)?;
    let mut report = ImportReport {
        scanned: files.len(),
        ..Default::default()
    };

    for path in files {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| PersistenceError::MalformedDocument {
                path: path.clone(),
                reason: e.to_string(),
            })
            .and_then(|text| parse_face_document(&path, &text));

        let face = match parsed {
            Ok(Some(face)) => face,
            Ok(None) => {
                warn!(path = %path.display(), "Skipping document without face_id");
                report.skipped.push(path);
                continue;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Rejected face document");
                report.failures.push(ImportFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match faces.upsert_face(&face).await {
            Ok(()) => report.imported += 1,
            Err(e) => {
                error!(path = %path.display(), face_id = %face.face_id, error = %e, "Failed to store face");
                report.failures.push(ImportFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        scanned = report.scanned,
        imported = report.imported,
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "Face import completed"
    );
    Ok(report)
}

/// Group stored faces by `group_id` and upsert one person per group.
///
/// The person's name is the image directory of the first face, in `face_id`
/// order, that has one. Fails only if the faces cannot be listed.
pub async fn derive_persons(
    faces: &impl FaceRepository,
    persons: &impl PersonRepository,
) -> Result<DerivationReport, PersistenceError> {
    let all = faces.list_faces(None).await?;
    let mut report = DerivationReport::default();

    let mut groups: BTreeMap<GroupId, Vec<&FaceRecord>> = BTreeMap::new();
    for face in &all {
        match face.group_id {
            Some(group_id) => groups.entry(group_id).or_default().push(face),
            None => report.ungrouped_faces += 1,
        }
    }
    report.groups = groups.len();
    info!(groups = report.groups, faces = all.len(), "Deriving persons");

    for (group_id, mut members) in groups {
        members.sort_by(|a, b| a.face_id.cmp(&b.face_id));
        let person = PersonRecord {
            person_id: group_id,
            person_name: members
                .iter()
                .find_map(|face| person_name_from_image_path(&face.image_path))
                .unwrap_or_else(|| format!("{FALLBACK_NAME_PREFIX}{group_id}")),
            face_ids: members.iter().map(|face| face.face_id.clone()).collect(),
        };

        match persons.upsert_person(&person).await {
            Ok(()) => {
                info!(
                    group_id,
                    person_name = %person.person_name,
                    faces = person.face_ids.len(),
                    "Person derived"
                );
                report.persons_written += 1;
            }
            Err(e) => {
                error!(group_id, error = %e, "Failed to store derived person");
                report.failures.push(DerivationFailure {
                    group_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// Import every face document in `dir`, then derive persons from the full
/// face collection.
pub async fn import_directory<G>(gateway: &G, dir: &Path) -> Result<ImportSummary, PersistenceError>
where
    G: FaceRepository + PersonRepository,
{
    let faces = import_faces(gateway, dir).await?;
    let persons = derive_persons(gateway, gateway).await?;
    Ok(ImportSummary { faces, persons })
}

/// Name persons from a text file holding one name per line.
///
/// `ids[i]` gets line `i`, trimmed. Ids beyond the end of the file get an
/// empty name. Existing persons keep their `face_ids`. Returns the number of
/// persons written.
pub async fn assign_person_names(
    persons: &impl PersonRepository,
    ids: &[GroupId],
    names_file: &Path,
) -> Result<usize, PersistenceError> {
    let text = std::fs::read_to_string(names_file)?;
    let mut names = text.lines().map(str::trim);

    for &person_id in ids {
        let person_name = names.next().unwrap_or_default();
        let face_ids = persons
            .load_person(person_id)
            .await?
            .map(|existing| existing.face_ids)
            .unwrap_or_default();
        persons
            .upsert_person(&PersonRecord {
                person_id,
                person_name: person_name.to_string(),
                face_ids,
            })
            .await?;
    }

    info!(count = ids.len(), file = %names_file.display(), "Person names assigned");
    Ok(ids.len())
}
