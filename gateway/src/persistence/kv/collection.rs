use super::super::{Collection, PersistenceError};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

/// On-disk format version written into every collection file.
pub const FORMAT_VERSION: u64 = 1;

/// Trait for types that can be persisted in a [`KvCollection`].
pub trait KvRecord: Serialize + DeserializeOwned + Clone {
    type Key: Ord + Clone + Display + Serialize + DeserializeOwned;

    const COLLECTION: Collection;

    fn key(&self) -> Self::Key;
}

#[derive(Serialize)]
struct EnvelopeRef<'a, K, V> {
    version: u64,
    records: &'a BTreeMap<K, V>,
}

/// A whole collection persisted as one serialized mapping in one file.
///
/// Every mutation reads the full mapping, modifies it in memory and rewrites
/// the file. Mutations are serialized by a per-collection lock, and each
/// rewrite goes to a temp file that is atomically renamed over the target,
/// so a crash never leaves a half-written collection behind.
pub struct KvCollection<T> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: KvRecord> KvCollection<T> {
    /// Bind to `path` and initialize it if missing.
    pub fn open(path: PathBuf) -> Result<Self, PersistenceError> {
        let collection = Self {
            path,
            write_lock: Mutex::new(()),
            _phantom: PhantomData,
        };
        collection.initialize()?;
        Ok(collection)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write an empty mapping if the backing file does not exist.
    pub fn initialize(&self) -> Result<(), PersistenceError> {
        let _guard = self.lock();
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.parent_dir() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::BackendUnavailable(format!(
                    "cannot create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        tracing::info!(path = %self.path.display(), collection = %T::COLLECTION, "Initializing key-value store");
        self.write(&BTreeMap::new())
    }

    /// Load a record by key. Returns None if not found.
    pub fn read(&self, key: &T::Key) -> Result<Option<T>, PersistenceError> {
        Ok(self.load()?.remove(key))
    }

    pub fn read_all(&self) -> Result<BTreeMap<T::Key, T>, PersistenceError> {
        self.load()
    }

    /// Insert a record whose key must not exist yet.
    pub fn create(&self, record: T) -> Result<(), PersistenceError> {
        let _guard = self.lock();
        let mut data = self.load()?;
        let key = record.key();
        if data.contains_key(&key) {
            tracing::warn!(collection = %T::COLLECTION, %key, "Key already exists, cannot create");
            return Err(PersistenceError::duplicate(T::COLLECTION, key));
        }
        data.insert(key.clone(), record);
        self.write(&data)?;
        tracing::info!(collection = %T::COLLECTION, %key, "Record created");
        Ok(())
    }

    /// Build a record from the current contents and insert it, all under
    /// one lock acquisition.
    pub fn create_with(
        &self,
        build: impl FnOnce(&BTreeMap<T::Key, T>) -> Result<T, PersistenceError>,
    ) -> Result<T, PersistenceError> {
        let _guard = self.lock();
        let mut data = self.load()?;
        let record = build(&data)?;
        let key = record.key();
        if data.contains_key(&key) {
            return Err(PersistenceError::duplicate(T::COLLECTION, key));
        }
        data.insert(key.clone(), record.clone());
        self.write(&data)?;
        tracing::info!(collection = %T::COLLECTION, %key, "Record created");
        Ok(record)
    }

    /// Insert or replace a record.
    pub fn upsert(&self, record: T) -> Result<(), PersistenceError> {
        self.upsert_many(std::iter::once(record)).map(|_| ())
    }

    /// Insert or replace several records with a single rewrite.
    pub fn upsert_many(
        &self,
        records: impl IntoIterator<Item = T>,
    ) -> Result<usize, PersistenceError> {
        let _guard = self.lock();
        let mut data = self.load()?;
        let mut written = 0;
        for record in records {
            data.insert(record.key(), record);
            written += 1;
        }
        self.write(&data)?;
        tracing::debug!(collection = %T::COLLECTION, written, "Records upserted");
        Ok(written)
    }

    /// Modify an existing record in place and return its new value.
    pub fn update(
        &self,
        key: &T::Key,
        modify: impl FnOnce(&mut T),
    ) -> Result<T, PersistenceError> {
        let _guard = self.lock();
        let mut data = self.load()?;
        let Some(record) = data.get_mut(key) else {
            tracing::warn!(collection = %T::COLLECTION, %key, "Key does not exist, cannot update");
            return Err(PersistenceError::not_found(T::COLLECTION, key));
        };
        modify(record);
        let updated = record.clone();
        self.write(&data)?;
        tracing::info!(collection = %T::COLLECTION, %key, "Record updated");
        Ok(updated)
    }

    /// Remove an existing record and return it.
    pub fn delete(&self, key: &T::Key) -> Result<T, PersistenceError> {
        let _guard = self.lock();
        let mut data = self.load()?;
        let Some(removed) = data.remove(key) else {
            tracing::warn!(collection = %T::COLLECTION, %key, "Key does not exist, cannot delete");
            return Err(PersistenceError::not_found(T::COLLECTION, key));
        };
        self.write(&data)?;
        tracing::info!(collection = %T::COLLECTION, %key, "Record deleted");
        Ok(removed)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    fn load(&self) -> Result<BTreeMap<T::Key, T>, PersistenceError> {
        tracing::debug!(path = %self.path.display(), "Reading key-value store");
        let contents = std::fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PersistenceError::BackendUnavailable(format!(
                    "store file {} is missing",
                    self.path.display()
                ))
            } else {
                PersistenceError::Io(e)
            }
        })?;

        let value: serde_json::Value =
            serde_json::from_slice(&contents).map_err(|e| self.corrupt(e.to_string()))?;
        let serde_json::Value::Object(mut envelope) = value else {
            return Err(self.corrupt("content is not a mapping"));
        };
        match envelope.get("version").and_then(serde_json::Value::as_u64) {
            Some(FORMAT_VERSION) => {}
            Some(other) => return Err(self.corrupt(format!("unsupported version {other}"))),
            None => return Err(self.corrupt("missing format version")),
        }
        let records = envelope
            .remove("records")
            .ok_or_else(|| self.corrupt("missing records mapping"))?;
        if !records.is_object() {
            return Err(self.corrupt("records is not a mapping"));
        }
        serde_json::from_value(records).map_err(|e| self.corrupt(e.to_string()))
    }

    fn write(&self, data: &BTreeMap<T::Key, T>) -> Result<(), PersistenceError> {
        let envelope = EnvelopeRef {
            version: FORMAT_VERSION,
            records: data,
        };
        let bytes = serde_json::to_vec(&envelope)?;

        let dir = self.parent_dir().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(path = %self.path.display(), records = data.len(), "Key-value store written");
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> PersistenceError {
        let reason = reason.into();
        tracing::error!(path = %self.path.display(), %reason, "Key-value store is corrupt");
        PersistenceError::CorruptStore {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Note {
        id: i64,
        text: String,
    }

    impl KvRecord for Note {
        type Key = i64;
        const COLLECTION: Collection = Collection::Persons;

        fn key(&self) -> i64 {
            self.id
        }
    }

    fn note(id: i64, text: &str) -> Note {
        Note {
            id,
            text: text.to_string(),
        }
    }

    fn open_in(dir: &tempfile::TempDir) -> KvCollection<Note> {
        KvCollection::open(dir.path().join("notes.json")).unwrap()
    }

    #[test]
    fn test_initialize_writes_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        assert!(store.path().exists());
        assert!(store.read_all().unwrap().is_empty());
        // Second initialize leaves the content alone.
        store.create(note(1, "a")).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_initialize_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("notes.json");
        let store = KvCollection::<Note>::open(path.clone()).unwrap();
        assert!(path.exists());
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_integer_keys_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        store.create(note(10, "ten")).unwrap();
        store.create(note(2, "two")).unwrap();
        let keys: Vec<i64> = store.read_all().unwrap().into_keys().collect();
        assert_eq!(keys, vec![2, 10]);
        assert_eq!(store.read(&10).unwrap(), Some(note(10, "ten")));
    }

    #[test]
    fn test_duplicate_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        store.create(note(1, "first")).unwrap();
        let err = store.create(note(1, "second")).unwrap_err();
        assert!(matches!(err, PersistenceError::DuplicateKey { .. }));
        assert_eq!(store.read(&1).unwrap(), Some(note(1, "first")));
    }

    #[test]
    fn test_update_and_delete_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        assert!(store.update(&5, |n| n.text.clear()).unwrap_err().is_not_found());
        assert!(store.delete(&5).unwrap_err().is_not_found());
    }

    #[test]
    fn test_not_a_mapping_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        std::fs::write(store.path(), "[1, 2, 3]").unwrap();
        let err = store.read_all().unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptStore { .. }));
    }

    #[test]
    fn test_records_not_a_mapping_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        std::fs::write(store.path(), r#"{"version": 1, "records": "nope"}"#).unwrap();
        assert!(matches!(
            store.read(&1).unwrap_err(),
            PersistenceError::CorruptStore { .. }
        ));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        std::fs::write(store.path(), r#"{"version": 99, "records": {}}"#).unwrap();
        assert!(matches!(
            store.read_all().unwrap_err(),
            PersistenceError::CorruptStore { .. }
        ));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        std::fs::remove_file(store.path()).unwrap();
        assert!(matches!(
            store.read_all().unwrap_err(),
            PersistenceError::BackendUnavailable(_)
        ));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        store.upsert_many((0..5).map(|i| note(i, "x"))).unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_concurrent_creates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(open_in(&dir));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.create(note(i, "t")).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.read_all().unwrap().len(), 8);
    }

    #[test]
    fn test_create_with_sees_current_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        store.create(note(4, "four")).unwrap();
        let created = store
            .create_with(|data| {
                let next = data.keys().next_back().map_or(0, |k| k + 1);
                Ok(note(next, "next"))
            })
            .unwrap();
        assert_eq!(created.id, 5);
    }

    #[test]
    fn test_create_with_build_error_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        let err = store
            .create_with(|_| {
                Err(PersistenceError::KeySpaceExhausted {
                    collection: Collection::Persons,
                })
            })
            .unwrap_err();
        assert!(matches!(err, PersistenceError::KeySpaceExhausted { .. }));
        assert!(store.read_all().unwrap().is_empty());
    }
}
