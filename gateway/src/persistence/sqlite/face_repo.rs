//! SQLite-backed repository for face records.

use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::BTreeSet;

use super::helpers::{decode_embedding, encode_embedding, is_unique_violation, limit_offset};
use crate::persistence::traits::FaceRepository;
use crate::persistence::{Collection, PersistenceError};
use facet_records::{
    BoundingBox, FaceAttributes, FacePatch, FaceRecord, GroupId, PageRequest,
};

type FaceRow = (
    String,
    String,
    String,
    f64,
    f64,
    f64,
    f64,
    f64,
    String,
    f64,
    Option<i64>,
    String,
);

fn face_from_row(row: FaceRow) -> Result<FaceRecord, PersistenceError> {
    let (
        face_id,
        face_path,
        image_path,
        x,
        y,
        width,
        height,
        face_confidence,
        race,
        race_confidence,
        group_id,
        embedding,
    ) = row;
    Ok(FaceRecord {
        face_id,
        face_path,
        image_path,
        bounding_box: BoundingBox {
            x,
            y,
            width,
            height,
        },
        face_confidence,
        attributes: FaceAttributes {
            race,
            race_confidence,
        },
        group_id,
        embedding: decode_embedding(&embedding)?,
    })
}

fn faces_from_rows(rows: Vec<FaceRow>) -> Result<Vec<FaceRecord>, PersistenceError> {
    rows.into_iter().map(face_from_row).collect()
}

/// Bind every column of `face` in `faces` table order.
fn bind_face<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    face: &'q FaceRecord,
    embedding: String,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(&face.face_id)
        .bind(&face.face_path)
        .bind(&face.image_path)
        .bind(face.bounding_box.x)
        .bind(face.bounding_box.y)
        .bind(face.bounding_box.width)
        .bind(face.bounding_box.height)
        .bind(face.face_confidence)
        .bind(&face.attributes.race)
        .bind(face.attributes.race_confidence)
        .bind(face.group_id)
        .bind(embedding)
}

/// SQLite implementation of [`FaceRepository`].
pub struct SqliteFaceRepository {
    pool: SqlitePool,
}

impl SqliteFaceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl FaceRepository for SqliteFaceRepository {
    async fn create_face(&self, face: &FaceRecord) -> Result<(), PersistenceError> {
        face.validate()?;
        let embedding = encode_embedding(&face.embedding)?;
        let query = sqlx::query(
            r#"
            INSERT INTO faces
                (face_id, face_path, image_path, bbox_x, bbox_y, bbox_width, bbox_height,
                 face_confidence, race, race_confidence, group_id, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        );
        match bind_face(query, face, embedding).execute(&self.pool).await {
            Ok(_) => {
                tracing::info!(face_id = %face.face_id, "Face created");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::warn!(face_id = %face.face_id, "Face already exists, cannot create");
                Err(PersistenceError::duplicate(Collection::Faces, &face.face_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert_face(&self, face: &FaceRecord) -> Result<(), PersistenceError> {
        face.validate()?;
        let embedding = encode_embedding(&face.embedding)?;
        let query = sqlx::query(
            r#"
            INSERT INTO faces
                (face_id, face_path, image_path, bbox_x, bbox_y, bbox_width, bbox_height,
                 face_confidence, race, race_confidence, group_id, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(face_id) DO UPDATE SET
                face_path = excluded.face_path,
                image_path = excluded.image_path,
                bbox_x = excluded.bbox_x,
                bbox_y = excluded.bbox_y,
                bbox_width = excluded.bbox_width,
                bbox_height = excluded.bbox_height,
                face_confidence = excluded.face_confidence,
                race = excluded.race,
                race_confidence = excluded.race_confidence,
                group_id = excluded.group_id,
                embedding = excluded.embedding
            "#,
        );
        bind_face(query, face, embedding)
            .execute(&self.pool)
            .await?;

        tracing::debug!(face_id = %face.face_id, "Face upserted");
        Ok(())
    }

    async fn load_face(&self, face_id: &str) -> Result<Option<FaceRecord>, PersistenceError> {
        let row: Option<FaceRow> = sqlx::query_as(
            r#"
            SELECT face_id, face_path, image_path, bbox_x, bbox_y, bbox_width, bbox_height,
                   face_confidence, race, race_confidence, group_id, embedding
            FROM faces
            WHERE face_id = ?
            "#,
        )
        .bind(face_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(face_from_row).transpose()
    }

    async fn list_faces(
        &self,
        page: Option<PageRequest>,
    ) -> Result<Vec<FaceRecord>, PersistenceError> {
        let (limit, offset) = limit_offset(page);
        let rows: Vec<FaceRow> = sqlx::query_as(
            r#"
            SELECT face_id, face_path, image_path, bbox_x, bbox_y, bbox_width, bbox_height,
                   face_confidence, race, race_confidence, group_id, embedding
            FROM faces
            ORDER BY face_id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        faces_from_rows(rows)
    }

    async fn count_faces(&self) -> Result<u64, PersistenceError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM faces")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    async fn update_face(
        &self,
        face_id: &str,
        patch: &FacePatch,
    ) -> Result<FaceRecord, PersistenceError> {
        patch.validate(face_id)?;
        let mut tx = self.pool.begin().await?;

        if !patch.is_empty() {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE faces SET ");
            let mut set = builder.separated(", ");
            if let Some(ref face_path) = patch.face_path {
                set.push("face_path = ").push_bind_unseparated(face_path.clone());
            }
            if let Some(ref image_path) = patch.image_path {
                set.push("image_path = ").push_bind_unseparated(image_path.clone());
            }
            if let Some(bounding_box) = patch.bounding_box {
                set.push("bbox_x = ").push_bind_unseparated(bounding_box.x);
                set.push("bbox_y = ").push_bind_unseparated(bounding_box.y);
                set.push("bbox_width = ").push_bind_unseparated(bounding_box.width);
                set.push("bbox_height = ").push_bind_unseparated(bounding_box.height);
            }
            if let Some(face_confidence) = patch.face_confidence {
                set.push("face_confidence = ").push_bind_unseparated(face_confidence);
            }
            if let Some(ref attributes) = patch.attributes {
                set.push("race = ").push_bind_unseparated(attributes.race.clone());
                set.push("race_confidence = ")
                    .push_bind_unseparated(attributes.race_confidence);
            }
            if let Some(group_id) = patch.group_id {
                set.push("group_id = ").push_bind_unseparated(group_id);
            }
            if let Some(ref embedding) = patch.embedding {
                set.push("embedding = ")
                    .push_bind_unseparated(encode_embedding(embedding)?);
            }
            builder.push(" WHERE face_id = ").push_bind(face_id.to_string());

            let result = builder.build().execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                tracing::warn!(face_id, "Face does not exist, cannot update");
                return Err(PersistenceError::not_found(Collection::Faces, face_id));
            }
        }

        let row: Option<FaceRow> = sqlx::query_as(
            r#"
            SELECT face_id, face_path, image_path, bbox_x, bbox_y, bbox_width, bbox_height,
                   face_confidence, race, race_confidence, group_id, embedding
            FROM faces
            WHERE face_id = ?
            "#,
        )
        .bind(face_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(PersistenceError::not_found(Collection::Faces, face_id));
        };
        let updated = face_from_row(row)?;
        tx.commit().await?;

        tracing::info!(face_id, "Face updated");
        Ok(updated)
    }

    async fn delete_face(&self, face_id: &str) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM faces WHERE face_id = ?")
            .bind(face_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(face_id, "Face does not exist, cannot delete");
            return Err(PersistenceError::not_found(Collection::Faces, face_id));
        }
        tracing::info!(face_id, "Face deleted");
        Ok(())
    }

    async fn find_faces_by_group(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<FaceRecord>, PersistenceError> {
        let rows: Vec<FaceRow> = sqlx::query_as(
            r#"
            SELECT face_id, face_path, image_path, bbox_x, bbox_y, bbox_width, bbox_height,
                   face_confidence, race, race_confidence, group_id, embedding
            FROM faces
            WHERE group_id = ?
            ORDER BY face_id
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(group_id, count = rows.len(), "Faces found for group");
        faces_from_rows(rows)
    }

    async fn group_ids(&self) -> Result<BTreeSet<GroupId>, PersistenceError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT DISTINCT group_id FROM faces WHERE group_id IS NOT NULL ORDER BY group_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(group_id,)| group_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::Database;

    async fn test_db() -> (Database, SqliteFaceRepository) {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteFaceRepository::new(db.pool().clone());
        (db, repo)
    }

    fn sample_face(id: &str, group_id: Option<GroupId>) -> FaceRecord {
        FaceRecord {
            face_id: id.to_string(),
            face_path: format!("data/faces/{id}.jpg"),
            image_path: format!("data/images/Jane_Doe/{id}.jpg"),
            bounding_box: BoundingBox {
                x: 10.5,
                y: 20.0,
                width: 64.0,
                height: 72.0,
            },
            face_confidence: 0.97,
            attributes: FaceAttributes {
                race: "latino hispanic".to_string(),
                race_confidence: 0.61,
            },
            group_id,
            embedding: vec![0.25, -0.75, 0.1],
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let (_db, repo) = test_db().await;
        let face = sample_face("f1", Some(7));
        repo.create_face(&face).await.unwrap();
        assert_eq!(repo.load_face("f1").await.unwrap(), Some(face));
    }

    #[tokio::test]
    async fn test_null_group_roundtrip() {
        let (_db, repo) = test_db().await;
        let face = sample_face("ungrouped", None);
        repo.create_face(&face).await.unwrap();
        assert_eq!(repo.load_face("ungrouped").await.unwrap(), Some(face));
        assert!(repo.group_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_stored_as_json_text() {
        let (db, repo) = test_db().await;
        repo.create_face(&sample_face("f1", None)).await.unwrap();
        let row: (String,) = sqlx::query_as("SELECT embedding FROM faces WHERE face_id = 'f1'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, "[0.25,-0.75,0.1]");
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let (_db, repo) = test_db().await;
        let mut face = sample_face("f1", Some(1));
        repo.upsert_face(&face).await.unwrap();
        face.group_id = Some(2);
        face.embedding = vec![9.0];
        repo.upsert_face(&face).await.unwrap();
        assert_eq!(repo.load_face("f1").await.unwrap(), Some(face));
        assert_eq!(repo.count_faces().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partial_update_only_touches_set_columns() {
        let (_db, repo) = test_db().await;
        repo.create_face(&sample_face("f1", Some(1))).await.unwrap();
        let patch = FacePatch {
            image_path: Some("elsewhere/Ada/1.jpg".to_string()),
            group_id: Some(None),
            ..Default::default()
        };
        let updated = repo.update_face("f1", &patch).await.unwrap();
        assert_eq!(updated.image_path, "elsewhere/Ada/1.jpg");
        assert_eq!(updated.group_id, None);
        assert_eq!(updated.face_path, "data/faces/f1.jpg");
        assert_eq!(repo.load_face("f1").await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_non_finite_values_never_reach_the_table() {
        let (db, repo) = test_db().await;
        let mut face = sample_face("nan", Some(1));
        face.face_confidence = f64::NAN;
        let err = repo.create_face(&face).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidRecord(_)));

        repo.create_face(&sample_face("ok", Some(1))).await.unwrap();
        let patch = FacePatch {
            embedding: Some(vec![f64::INFINITY]),
            ..Default::default()
        };
        assert!(repo.update_face("ok", &patch).await.is_err());

        let row: (String,) = sqlx::query_as("SELECT embedding FROM faces WHERE face_id = 'ok'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, "[0.25,-0.75,0.1]");
        assert_eq!(repo.list_faces(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_patch_on_missing_face() {
        let (_db, repo) = test_db().await;
        let err = repo
            .update_face("ghost", &FacePatch::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_group_lookup_uses_index_column() {
        let (_db, repo) = test_db().await;
        for (id, group) in [("b", Some(3)), ("a", Some(3)), ("c", Some(4)), ("d", None)] {
            repo.create_face(&sample_face(id, group)).await.unwrap();
        }
        let ids: Vec<String> = repo
            .find_faces_by_group(3)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.face_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            repo.group_ids().await.unwrap(),
            BTreeSet::from([3, 4])
        );
    }
}
