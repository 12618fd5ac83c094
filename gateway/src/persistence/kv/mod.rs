//! Key-value backend: each collection is one JSON file holding a
//! `{key: record}` mapping.

mod collection;

pub use collection::{KvCollection, KvRecord, FORMAT_VERSION};

use super::traits::{FaceRepository, PersonRepository};
use super::{Collection, PersistenceError};
use facet_records::{FacePatch, FaceRecord, GroupId, PageRequest, PersonPatch, PersonRecord};
use std::collections::BTreeSet;
use std::path::PathBuf;

impl KvRecord for FaceRecord {
    type Key = String;
    const COLLECTION: Collection = Collection::Faces;

    fn key(&self) -> String {
        self.face_id.clone()
    }
}

impl KvRecord for PersonRecord {
    type Key = GroupId;
    const COLLECTION: Collection = Collection::Persons;

    fn key(&self) -> GroupId {
        self.person_id
    }
}

fn page_of<T: Clone>(records: Vec<T>, page: Option<PageRequest>) -> Vec<T> {
    match page {
        None => records,
        Some(page) => page.paginate(&records).to_vec(),
    }
}

/// Face collection stored in a single key-value file.
pub struct KvFaceRepository {
    faces: KvCollection<FaceRecord>,
}

impl KvFaceRepository {
    pub fn open(path: PathBuf) -> Result<Self, PersistenceError> {
        Ok(Self {
            faces: KvCollection::open(path)?,
        })
    }
}

impl FaceRepository for KvFaceRepository {
    async fn create_face(&self, face: &FaceRecord) -> Result<(), PersistenceError> {
        face.validate()?;
        self.faces.create(face.clone())
    }

    async fn upsert_face(&self, face: &FaceRecord) -> Result<(), PersistenceError> {
        face.validate()?;
        self.faces.upsert(face.clone())
    }

    async fn load_face(&self, face_id: &str) -> Result<Option<FaceRecord>, PersistenceError> {
        self.faces.read(&face_id.to_string())
    }

    async fn list_faces(
        &self,
        page: Option<PageRequest>,
    ) -> Result<Vec<FaceRecord>, PersistenceError> {
        let all = self.faces.read_all()?.into_values().collect();
        Ok(page_of(all, page))
    }

    async fn count_faces(&self) -> Result<u64, PersistenceError> {
        Ok(self.faces.read_all()?.len() as u64)
    }

    async fn update_face(
        &self,
        face_id: &str,
        patch: &FacePatch,
    ) -> Result<FaceRecord, PersistenceError> {
        patch.validate(face_id)?;
        self.faces
            .update(&face_id.to_string(), |face| patch.apply(face))
    }

    async fn delete_face(&self, face_id: &str) -> Result<(), PersistenceError> {
        self.faces.delete(&face_id.to_string()).map(|_| ())
    }

    async fn find_faces_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<FaceRecord>, PersistenceError> {
        let found: Vec<FaceRecord> = self
            .faces
            .read_all()?
            .into_values()
            .filter(|face| face.group_id == Some(group_id))
            .collect();
        tracing::debug!(group_id, count = found.len(), "Faces found for group");
        Ok(found)
    }

    async fn group_ids(&self) -> Result<BTreeSet<GroupId>, PersistenceError> {
        Ok(self
            .faces
            .read_all()?
            .values()
            .filter_map(|face| face.group_id)
            .collect())
    }
}

/// Person collection stored in a single key-value file.
pub struct KvPersonRepository {
    persons: KvCollection<PersonRecord>,
}

impl KvPersonRepository {
    pub fn open(path: PathBuf) -> Result<Self, PersistenceError> {
        Ok(Self {
            persons: KvCollection::open(path)?,
        })
    }
}

impl PersonRepository for KvPersonRepository {
    async fn create_person(&self, person: &PersonRecord) -> Result<(), PersistenceError> {
        self.persons.create(person.clone())
    }

    async fn upsert_person(&self, person: &PersonRecord) -> Result<(), PersistenceError> {
        self.persons.upsert(person.clone())
    }

    async fn insert_named_person(
        &self,
        person_name: &str,
    ) -> Result<PersonRecord, PersistenceError> {
        self.persons.create_with(|existing| {
            let next = match existing.keys().next_back() {
                None => 0,
                Some(max) => max.checked_add(1).ok_or(PersistenceError::KeySpaceExhausted {
                    collection: Collection::Persons,
                })?,
            };
            Ok(PersonRecord::new(next, person_name))
        })
    }

    async fn load_person(
        &self,
        person_id: GroupId,
    ) -> Result<Option<PersonRecord>, PersistenceError> {
        self.persons.read(&person_id)
    }

    async fn list_persons(
        &self,
        page: Option<PageRequest>,
    ) -> Result<Vec<PersonRecord>, PersistenceError> {
        let all = self.persons.read_all()?.into_values().collect();
        Ok(page_of(all, page))
    }

    async fn count_persons(&self) -> Result<u64, PersistenceError> {
        Ok(self.persons.read_all()?.len() as u64)
    }

    async fn update_person(
        &self,
        person_id: GroupId,
        patch: &PersonPatch,
    ) -> Result<PersonRecord, PersistenceError> {
        self.persons.update(&person_id, |person| patch.apply(person))
    }

    async fn delete_person(&self, person_id: GroupId) -> Result<(), PersistenceError> {
        self.persons.delete(&person_id).map(|_| ())
    }

    async fn find_persons_by_name(
        &self,
        fragment: &str,
    ) -> Result<Vec<PersonRecord>, PersistenceError> {
        let needle = fragment.to_ascii_lowercase();
        Ok(self
            .persons
            .read_all()?
            .into_values()
            .filter(|person| person.person_name.to_ascii_lowercase().contains(&needle))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(id: &str, group_id: Option<GroupId>) -> FaceRecord {
        FaceRecord {
            face_id: id.to_string(),
            face_path: format!("faces/{id}.jpg"),
            image_path: format!("images/person/{id}.jpg"),
            bounding_box: facet_records::BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            face_confidence: 0.99,
            attributes: facet_records::FaceAttributes {
                race: "unknown".to_string(),
                race_confidence: 0.1,
            },
            group_id,
            embedding: vec![0.5; 4],
        }
    }

    #[tokio::test]
    async fn test_group_lookup_is_a_scan() {
        let dir = tempfile::tempdir().unwrap();
        let repo = KvFaceRepository::open(dir.path().join("faces.json")).unwrap();
        repo.create_face(&face("a", Some(1))).await.unwrap();
        repo.create_face(&face("b", Some(2))).await.unwrap();
        repo.create_face(&face("c", Some(1))).await.unwrap();
        repo.create_face(&face("d", None)).await.unwrap();

        let ids: Vec<String> = repo
            .find_faces_by_group(1)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.face_id)
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(
            repo.group_ids().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        {
            let repo = KvFaceRepository::open(path.clone()).unwrap();
            repo.create_face(&face("persisted", Some(3))).await.unwrap();
        }
        let reopened = KvFaceRepository::open(path).unwrap();
        assert_eq!(
            reopened.load_face("persisted").await.unwrap(),
            Some(face("persisted", Some(3)))
        );
    }

    #[tokio::test]
    async fn test_person_files_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let faces = KvFaceRepository::open(dir.path().join("faces.json")).unwrap();
        let persons = KvPersonRepository::open(dir.path().join("persons.json")).unwrap();
        faces.create_face(&face("x", Some(1))).await.unwrap();
        assert_eq!(persons.count_persons().await.unwrap(), 0);
        assert_eq!(faces.count_faces().await.unwrap(), 1);
    }
}
