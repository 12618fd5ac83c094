//! Shared encode/decode helpers for SQLite ↔ record conversions.
//!
//! SQLite has no vector or list type, so embeddings and person face lists
//! are stored as JSON text columns.

use crate::persistence::PersistenceError;

// ── JSON list columns ──────────────────────────────────────────────────

pub fn encode_embedding(embedding: &[f64]) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(embedding)?)
}

pub fn decode_embedding(text: &str) -> Result<Vec<f64>, PersistenceError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_face_ids(face_ids: &[String]) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(face_ids)?)
}

pub fn decode_face_ids(text: &str) -> Result<Vec<String>, PersistenceError> {
    Ok(serde_json::from_str(text)?)
}

// ── LIMIT / OFFSET ─────────────────────────────────────────────────────

/// `(limit, offset)` bind values for an optional page. SQLite treats a
/// negative limit as "no limit".
pub fn limit_offset(page: Option<facet_records::PageRequest>) -> (i64, i64) {
    match page {
        None => (-1, 0),
        Some(page) => (
            i64::from(page.page_size()),
            i64::try_from(page.offset()).unwrap_or(i64::MAX),
        ),
    }
}

// ── LIKE patterns ──────────────────────────────────────────────────────

/// Build a `%fragment%` pattern for `LIKE ... ESCAPE '\'`, escaping the
/// wildcard characters in `fragment` so they match literally.
pub fn contains_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// ── error mapping ──────────────────────────────────────────────────────

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_records::PageRequest;

    #[test]
    fn embedding_roundtrip_is_exact() {
        let embedding = vec![0.123456789012345_f64, -3.25, 1e-300, f64::MAX];
        let text = encode_embedding(&embedding).unwrap();
        assert_eq!(decode_embedding(&text).unwrap(), embedding);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_embedding("not json").is_err());
        assert!(decode_face_ids("{\"a\": 1}").is_err());
    }

    #[test]
    fn contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("Jane"), "%Jane%");
        assert_eq!(contains_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(contains_pattern(""), "%%");
    }

    #[test]
    fn limit_offset_for_pages() {
        assert_eq!(limit_offset(None), (-1, 0));
        assert_eq!(limit_offset(Some(PageRequest::new(3, 10).unwrap())), (10, 20));
    }
}
