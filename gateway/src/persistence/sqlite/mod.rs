//! SQLite backend.
//!
//! | Table | Key | List columns |
//! |-------|-----|--------------|
//! | `faces` | `face_id TEXT` | `embedding` (JSON array of floats) |
//! | `persons` | `person_id INTEGER` | `face_ids` (JSON array of strings) |
//!
//! `faces.group_id` and `persons.person_name` are indexed for the group and
//! name lookups.

mod database;
mod face_repo;
mod helpers;
mod person_repo;

pub use database::Database;
pub use face_repo::SqliteFaceRepository;
pub use person_repo::SqlitePersonRepository;
