//! Storage gateway for face and person records.
//!
//! Two interchangeable backends implement the repository traits in
//! [`traits`]:
//!
//! | Backend | Faces | Persons |
//! |---------|-------|---------|
//! | key-value (one JSON file per collection) | [`KvFaceRepository`] | [`KvPersonRepository`] |
//! | SQLite (one database, one table per collection) | [`SqliteFaceRepository`] | [`SqlitePersonRepository`] |
//!
//! [`Gateway`] binds one of them, chosen from configuration, for its whole
//! lifetime. Both backends share the same error semantics: creating an
//! existing key fails with [`PersistenceError::DuplicateKey`], and updating or
//! deleting a missing key fails with [`PersistenceError::NotFound`].

mod gateway;
pub mod kv;
pub mod sqlite;
pub mod traits;

pub use gateway::Gateway;
pub use kv::{KvCollection, KvFaceRepository, KvPersonRepository, KvRecord};
pub use sqlite::{Database, SqliteFaceRepository, SqlitePersonRepository};
pub use traits::{FaceRepository, PersonRepository};

use facet_records::RecordError;
use std::fmt;
use std::path::PathBuf;

/// The two record collections held by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Faces,
    Persons,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Faces => f.write_str("face"),
            Self::Persons => f.write_str("person"),
        }
    }
}

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("{collection} '{key}' already exists")]
    DuplicateKey { collection: Collection, key: String },
    #[error("{collection} '{key}' not found")]
    NotFound { collection: Collection, key: String },
    #[error("corrupt store {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },
    #[error("malformed document {}: {reason}", path.display())]
    MalformedDocument { path: PathBuf, reason: String },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("no {collection} key left to allocate")]
    KeySpaceExhausted { collection: Collection },
    #[error(transparent)]
    InvalidRecord(#[from] RecordError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(String),
}

impl PersistenceError {
    pub(crate) fn duplicate(collection: Collection, key: impl fmt::Display) -> Self {
        Self::DuplicateKey {
            collection,
            key: key.to_string(),
        }
    }

    pub(crate) fn not_found(collection: Collection, key: impl fmt::Display) -> Self {
        Self::NotFound {
            collection,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
