//! Backend selection.

use std::collections::BTreeSet;

use super::kv::{KvFaceRepository, KvPersonRepository};
use super::sqlite::{Database, SqliteFaceRepository, SqlitePersonRepository};
use super::traits::{FaceRepository, PersonRepository};
use super::PersistenceError;
use crate::config::{Backend, GatewayConfig};
use facet_records::{FacePatch, FaceRecord, GroupId, PageRequest, PersonPatch, PersonRecord};

/// Face and person repositories of one backend.
///
/// The backend is fixed when the gateway is opened; every call dispatches to
/// it with a `match`.
pub enum Gateway {
    Kv {
        faces: KvFaceRepository,
        persons: KvPersonRepository,
    },
    Sqlite {
        db: Database,
        faces: SqliteFaceRepository,
        persons: SqlitePersonRepository,
    },
}

impl Gateway {
    /// Open the backend named in `config` and initialize its collections.
    ///
    /// An unreachable store location fails with
    /// [`PersistenceError::BackendUnavailable`].
    pub async fn open(config: &GatewayConfig) -> Result<Self, PersistenceError> {
        let gateway = match config.backend {
            Backend::Kv => {
                let faces = KvFaceRepository::open(config.faces_path.clone())?;
                let persons = KvPersonRepository::open(config.persons_path.clone())?;
                Self::Kv { faces, persons }
            }
            Backend::Sqlite => Self::open_sqlite(Database::open(&config.db_path).await?),
        };
        tracing::info!(backend = gateway.backend_name(), "Gateway opened");
        Ok(gateway)
    }

    pub fn open_sqlite(db: Database) -> Self {
        Self::Sqlite {
            faces: SqliteFaceRepository::new(db.pool().clone()),
            persons: SqlitePersonRepository::new(db.pool().clone()),
            db,
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Kv { .. } => Backend::Kv,
            Self::Sqlite { .. } => Backend::Sqlite,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend().as_str()
    }

    /// The underlying database, for the SQLite backend.
    pub fn database(&self) -> Option<&Database> {
        match self {
            Self::Kv { .. } => None,
            Self::Sqlite { db, .. } => Some(db),
        }
    }
}

impl FaceRepository for Gateway {
    async fn create_face(&self, face: &FaceRecord) -> Result<(), PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.create_face(face).await,
            Self::Sqlite { faces, .. } => faces.create_face(face).await,
        }
    }

    async fn upsert_face(&self, face: &FaceRecord) -> Result<(), PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.upsert_face(face).await,
            Self::Sqlite { faces, .. } => faces.upsert_face(face).await,
        }
    }

    async fn load_face(&self, face_id: &str) -> Result<Option<FaceRecord>, PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.load_face(face_id).await,
            Self::Sqlite { faces, .. } => faces.load_face(face_id).await,
        }
    }

    async fn list_faces(
        &self,
        page: Option<PageRequest>,
    ) -> Result<Vec<FaceRecord>, PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.list_faces(page).await,
            Self::Sqlite { faces, .. } => faces.list_faces(page).await,
        }
    }

    async fn count_faces(&self) -> Result<u64, PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.count_faces().await,
            Self::Sqlite { faces, .. } => faces.count_faces().await,
        }
    }

    async fn update_face(
        &self,
        face_id: &str,
        patch: &FacePatch,
    ) -> Result<FaceRecord, PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.update_face(face_id, patch).await,
            Self::Sqlite { faces, .. } => faces.update_face(face_id, patch).await,
        }
    }

    async fn delete_face(&self, face_id: &str) -> Result<(), PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.delete_face(face_id).await,
            Self::Sqlite { faces, .. } => faces.delete_face(face_id).await,
        }
    }

    async fn find_faces_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<FaceRecord>, PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.find_faces_by_group(group_id).await,
            Self::Sqlite { faces, .. } => faces.find_faces_by_group(group_id).await,
        }
    }

    async fn group_ids(&self) -> Result<BTreeSet<GroupId>, PersistenceError> {
        match self {
            Self::Kv { faces, .. } => faces.group_ids().await,
            Self::Sqlite { faces, .. } => faces.group_ids().await,
        }
    }
}

impl PersonRepository for Gateway {
    async fn create_person(&self, person: &PersonRecord) -> Result<(), PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.create_person(person).await,
            Self::Sqlite { persons, .. } => persons.create_person(person).await,
        }
    }

    async fn upsert_person(&self, person: &PersonRecord) -> Result<(), PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.upsert_person(person).await,
            Self::Sqlite { persons, .. } => persons.upsert_person(person).await,
        }
    }

    async fn insert_named_person(
        &self,
        person_name: &str,
    ) -> Result<PersonRecord, PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.insert_named_person(person_name).await,
            Self::Sqlite { persons, .. } => persons.insert_named_person(person_name).await,
        }
    }

    async fn load_person(
        &self,
        person_id: GroupId,
    ) -> Result<Option<PersonRecord>, PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.load_person(person_id).await,
            Self::Sqlite { persons, .. } => persons.load_person(person_id).await,
        }
    }

    async fn list_persons(
        &self,
        page: Option<PageRequest>,
    ) -> Result<Vec<PersonRecord>, PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.list_persons(page).await,
            Self::Sqlite { persons, .. } => persons.list_persons(page).await,
        }
    }

    async fn count_persons(&self) -> Result<u64, PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.count_persons().await,
            Self::Sqlite { persons, .. } => persons.count_persons().await,
        }
    }

    async fn update_person(
        &self,
        person_id: GroupId,
        patch: &PersonPatch,
    ) -> Result<PersonRecord, PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.update_person(person_id, patch).await,
            Self::Sqlite { persons, .. } => persons.update_person(person_id, patch).await,
        }
    }

    async fn delete_person(&self, person_id: GroupId) -> Result<(), PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.delete_person(person_id).await,
            Self::Sqlite { persons, .. } => persons.delete_person(person_id).await,
        }
    }

    async fn find_persons_by_name(
        &self,
        fragment: &str,
    ) -> Result<Vec<PersonRecord>, PersistenceError> {
        match self {
            Self::Kv { persons, .. } => persons.find_persons_by_name(fragment).await,
            Self::Sqlite { persons, .. } => persons.find_persons_by_name(fragment).await,
        }
    }
}
