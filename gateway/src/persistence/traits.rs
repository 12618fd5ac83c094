//! Async repository trait definitions for the persistence layer.
//!
//! Each trait abstracts over one record collection, allowing the key-value
//! and SQLite backends to be used interchangeably via static dispatch.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so that
//! the futures are guaranteed `Send` and can be driven from `tokio::spawn`.

use super::PersistenceError;
use facet_records::{FacePatch, FaceRecord, GroupId, PageRequest, PersonPatch, PersonRecord};
use std::collections::BTreeSet;
use std::future::Future;

/// Repository for face records, keyed by `face_id`.
///
/// Listings are ordered by `face_id`. Passing `None` as the page returns the
/// whole collection.
pub trait FaceRepository: Send + Sync {
    /// Insert a new face. Fails with `DuplicateKey` if `face_id` exists.
    fn create_face(
        &self,
        face: &FaceRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Insert or replace a face (last write wins).
    fn upsert_face(
        &self,
        face: &FaceRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn load_face(
        &self,
        face_id: &str,
    ) -> impl Future<Output = Result<Option<FaceRecord>, PersistenceError>> + Send;
    fn list_faces(
        &self,
        page: Option<PageRequest>,
    ) -> impl Future<Output = Result<Vec<FaceRecord>, PersistenceError>> + Send;
    fn count_faces(&self) -> impl Future<Output = Result<u64, PersistenceError>> + Send;
    /// Apply `patch` to an existing face and return the updated record.
    /// Fails with `NotFound` if `face_id` does not exist.
    fn update_face(
        &self,
        face_id: &str,
        patch: &FacePatch,
    ) -> impl Future<Output = Result<FaceRecord, PersistenceError>> + Send;
    /// Fails with `NotFound` if `face_id` does not exist.
    fn delete_face(
        &self,
        face_id: &str,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn find_faces_by_group(
        &self,
        group_id: GroupId,
    ) -> impl Future<Output = Result<Vec<FaceRecord>, PersistenceError>> + Send;
    /// Distinct non-null group ids present in the collection.
    fn group_ids(
        &self,
    ) -> impl Future<Output = Result<BTreeSet<GroupId>, PersistenceError>> + Send;
}

/// Repository for person records, keyed by `person_id`.
///
/// Listings are ordered by `person_id`.
pub trait PersonRepository: Send + Sync {
    /// Insert a new person. Fails with `DuplicateKey` if `person_id` exists.
    fn create_person(
        &self,
        person: &PersonRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn upsert_person(
        &self,
        person: &PersonRecord,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Insert a person under the next free key (one past the highest, or 0
    /// for an empty collection).
    fn insert_named_person(
        &self,
        person_name: &str,
    ) -> impl Future<Output = Result<PersonRecord, PersistenceError>> + Send;
    fn load_person(
        &self,
        person_id: GroupId,
    ) -> impl Future<Output = Result<Option<PersonRecord>, PersistenceError>> + Send;
    fn list_persons(
        &self,
        page: Option<PageRequest>,
    ) -> impl Future<Output = Result<Vec<PersonRecord>, PersistenceError>> + Send;
    fn count_persons(&self) -> impl Future<Output = Result<u64, PersistenceError>> + Send;
    fn update_person(
        &self,
        person_id: GroupId,
        patch: &PersonPatch,
    ) -> impl Future<Output = Result<PersonRecord, PersistenceError>> + Send;
    fn delete_person(
        &self,
        person_id: GroupId,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    /// Persons whose name contains `fragment`, ignoring ASCII case.
    fn find_persons_by_name(
        &self,
        fragment: &str,
    ) -> impl Future<Output = Result<Vec<PersonRecord>, PersistenceError>> + Send;
}
