//! SQLite-backed repository for person records.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::helpers::{
    contains_pattern, decode_face_ids, encode_face_ids, is_unique_violation, limit_offset,
};
use crate::persistence::traits::PersonRepository;
use crate::persistence::{Collection, PersistenceError};
use facet_records::{GroupId, PageRequest, PersonPatch, PersonRecord};

type PersonRow = (i64, String, String);

fn person_from_row(row: PersonRow) -> Result<PersonRecord, PersistenceError> {
    let (person_id, person_name, face_ids) = row;
    Ok(PersonRecord {
        person_id,
        person_name,
        face_ids: decode_face_ids(&face_ids)?,
    })
}

fn persons_from_rows(rows: Vec<PersonRow>) -> Result<Vec<PersonRecord>, PersistenceError> {
    rows.into_iter().map(person_from_row).collect()
}

/// SQLite implementation of [`PersonRepository`].
pub struct SqlitePersonRepository {
    pool: SqlitePool,
}

impl SqlitePersonRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl PersonRepository for SqlitePersonRepository {
    async fn create_person(&self, person: &PersonRecord) -> Result<(), PersistenceError> {
        let face_ids = encode_face_ids(&person.face_ids)?;
        let result = sqlx::query(
            "INSERT INTO persons (person_id, person_name, face_ids) VALUES (?, ?, ?)",
        )
        .bind(person.person_id)
        .bind(&person.person_name)
        .bind(face_ids)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(person_id = person.person_id, "Person created");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(person_id = person.person_id, "Person already exists, cannot create");
                Err(PersistenceError::duplicate(
                    Collection::Persons,
                    person.person_id,
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_person(&self, person: &PersonRecord) -> Result<(), PersistenceError> {
        let face_ids = encode_face_ids(&person.face_ids)?;
        sqlx::query(
            r#"
            INSERT INTO persons (person_id, person_name, face_ids)
            VALUES (?, ?, ?)
            ON CONFLICT(person_id) DO UPDATE SET
                person_name = excluded.person_name,
                face_ids = excluded.face_ids
            "#,
        )
        .bind(person.person_id)
        .bind(&person.person_name)
        .bind(face_ids)
        .execute(&self.pool)
        .await?;

        tracing::debug!(person_id = person.person_id, "Person upserted");
        Ok(())
    }

    async fn insert_named_person(
        &self,
        person_name: &str,
    ) -> Result<PersonRecord, PersistenceError> {
        // Key allocation and insert are one statement, so concurrent callers
        // never observe the same MAX. No row is inserted once the highest
        // key is i64::MAX.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO persons (person_id, person_name, face_ids)
            SELECT next_id, ?, '[]'
            FROM (SELECT MAX(person_id) AS max_id, COALESCE(MAX(person_id) + 1, 0) AS next_id
                  FROM persons)
            WHERE max_id IS NULL OR max_id < ?
            RETURNING person_id
            "#,
        )
        .bind(person_name)
        .bind(GroupId::MAX)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            tracing::warn!(person_name, "No person key left to allocate");
            return Err(PersistenceError::KeySpaceExhausted {
                collection: Collection::Persons,
            });
        };

        tracing::info!(person_id = row.0, person_name, "Person created");
        Ok(PersonRecord::new(row.0, person_name))
    }

    async fn load_person(
        &self,
        person_id: GroupId,
    ) -> Result<Option<PersonRecord>, PersistenceError> {
        let row: Option<PersonRow> = sqlx::query_as(
            "SELECT person_id, person_name, face_ids FROM persons WHERE person_id = ?",
        )
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(person_from_row).transpose()
    }

    async fn list_persons(
        &self,
        page: Option<PageRequest>,
    ) -> Result<Vec<PersonRecord>, PersistenceError> {
        let (limit, offset) = limit_offset(page);
        let rows: Vec<PersonRow> = sqlx::query_as(
            r#"
            SELECT person_id, person_name, face_ids
            FROM persons
            ORDER BY person_id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        persons_from_rows(rows)
    }

    async fn count_persons(&self) -> Result<u64, PersistenceError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM persons")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    async fn update_person(
        &self,
        person_id: GroupId,
        patch: &PersonPatch,
    ) -> Result<PersonRecord, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        if !patch.is_empty() {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE persons SET ");
            let mut set = builder.separated(", ");
            if let Some(ref person_name) = patch.person_name {
                set.push("person_name = ")
                    .push_bind_unseparated(person_name.clone());
            }
            if let Some(ref face_ids) = patch.face_ids {
                set.push("face_ids = ")
                    .push_bind_unseparated(encode_face_ids(face_ids)?);
            }
            builder.push(" WHERE person_id = ").push_bind(person_id);

            let result = builder.build().execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                tracing::warn!(person_id, "Person does not exist, cannot update");
                return Err(PersistenceError::not_found(Collection::Persons, person_id));
            }
        }

        let row: Option<PersonRow> = sqlx::query_as(
            "SELECT person_id, person_name, face_ids FROM persons WHERE person_id = ?",
        )
        .bind(person_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(PersistenceError::not_found(Collection::Persons, person_id));
        };
        let updated = person_from_row(row)?;
        tx.commit().await?;

        tracing::info!(person_id, "Person updated");
        Ok(updated)
    }

    async fn delete_person(&self, person_id: GroupId) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM persons WHERE person_id = ?")
            .bind(person_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(person_id, "Person does not exist, cannot delete");
            return Err(PersistenceError::not_found(Collection::Persons, person_id));
        }
        tracing::info!(person_id, "Person deleted");
        Ok(())
    }

    async fn find_persons_by_name(
        &self,
        fragment: &str,
    ) -> Result<Vec<PersonRecord>, PersistenceError> {
        let rows: Vec<PersonRow> = sqlx::query_as(
            r#"
            SELECT person_id, person_name, face_ids
            FROM persons
            WHERE person_name LIKE ? ESCAPE '\'
            ORDER BY person_id
            "#,
        )
        .bind(contains_pattern(fragment))
        .fetch_all(&self.pool)
        .await?;

        persons_from_rows(rows)
    }
}
