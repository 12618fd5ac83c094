//! Configuration for the facet gateway.
//!
//! Every value has a compile-time default and can be overridden at runtime via
//! a dedicated environment variable. Store paths default to files inside the
//! data directory, so setting `FACET_DATA_DIR` alone relocates everything.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default backend when `FACET_BACKEND` is unset.
const DEFAULT_BACKEND: Backend = Backend::Kv;

/// Fallback data directory when no platform data directory is available.
const DEV_DATA_DIR: &str = "./data";

const FACES_FILE: &str = "faces.json";
const PERSONS_FILE: &str = "persons.json";
const DATABASE_FILE: &str = "faces.db";
const IMPORT_SUBDIR: &str = "metadata";

/// Default log filter when neither `RUST_LOG` nor `FACET_LOG_LEVEL` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown backend '{0}' (expected 'kv' or 'sqlite')")]
    UnknownBackend(String),
}

/// Which storage backend a [`crate::persistence::Gateway`] binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// One JSON file per collection.
    Kv,
    /// One SQLite database with a table per collection.
    Sqlite,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kv => "kv",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kv" => Ok(Self::Kv),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Resolved gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub faces_path: PathBuf,
    pub persons_path: PathBuf,
    pub db_path: PathBuf,
    pub import_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
}

impl GatewayConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = get_data_dir(&lookup);
        Ok(Self {
            backend: get_backend(&lookup)?,
            faces_path: path_or(&lookup, "FACET_FACES_PATH", &data_dir, FACES_FILE),
            persons_path: path_or(&lookup, "FACET_PERSONS_PATH", &data_dir, PERSONS_FILE),
            db_path: path_or(&lookup, "FACET_DB_PATH", &data_dir, DATABASE_FILE),
            import_dir: path_or(&lookup, "FACET_IMPORT_DIR", &data_dir, IMPORT_SUBDIR),
            log_dir: lookup("FACET_LOG_DIR").map(PathBuf::from),
            log_level: lookup("FACET_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            data_dir,
        })
    }

    /// Configuration rooted at `data_dir` with every other value defaulted.
    pub fn in_dir(backend: Backend, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            backend,
            faces_path: data_dir.join(FACES_FILE),
            persons_path: data_dir.join(PERSONS_FILE),
            db_path: data_dir.join(DATABASE_FILE),
            import_dir: data_dir.join(IMPORT_SUBDIR),
            log_dir: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            data_dir,
        }
    }
}

/// Get the storage backend.
///
/// Priority:
/// 1. `FACET_BACKEND` env variable if set (`kv` or `sqlite`)
/// 2. `kv` as fallback
fn get_backend(lookup: &impl Fn(&str) -> Option<String>) -> Result<Backend, ConfigError> {
    match lookup("FACET_BACKEND") {
        Some(value) => value.parse(),
        None => Ok(DEFAULT_BACKEND),
    }
}

/// Get the data directory for persistence.
///
/// Priority:
/// 1. `FACET_DATA_DIR` env variable if set
/// 2. The platform data directory for `facet`
/// 3. `./data` as fallback
fn get_data_dir(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = lookup("FACET_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "facet") {
        return dirs.data_dir().to_path_buf();
    }

    PathBuf::from(DEV_DATA_DIR)
}

fn path_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    data_dir: &Path,
    default_name: &str,
) -> PathBuf {
    lookup(key)
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join(default_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_paths_follow_data_dir() {
        let config = GatewayConfig::from_lookup(lookup_from(&[("FACET_DATA_DIR", "/srv/facet")]))
            .unwrap();
        assert_eq!(config.backend, Backend::Kv);
        assert_eq!(config.faces_path, PathBuf::from("/srv/facet/faces.json"));
        assert_eq!(config.persons_path, PathBuf::from("/srv/facet/persons.json"));
        assert_eq!(config.db_path, PathBuf::from("/srv/facet/faces.db"));
        assert_eq!(config.import_dir, PathBuf::from("/srv/facet/metadata"));
        assert_eq!(config.log_dir, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_explicit_paths_override() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("FACET_DATA_DIR", "/srv/facet"),
            ("FACET_BACKEND", "SQLite"),
            ("FACET_DB_PATH", "/tmp/other.db"),
            ("FACET_LOG_DIR", "/var/log/facet"),
        ]))
        .unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.faces_path, PathBuf::from("/srv/facet/faces.json"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/facet")));
    }

    #[test]
    fn test_unknown_backend() {
        let err = GatewayConfig::from_lookup(lookup_from(&[("FACET_BACKEND", "duckdb")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownBackend("duckdb".to_string()));
    }

    #[test]
    fn test_data_dir_fallback_is_never_empty() {
        let config = GatewayConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(!config.data_dir.as_os_str().is_empty());
        assert!(config.faces_path.starts_with(&config.data_dir));
    }

    #[test]
    fn test_in_dir_matches_lookup_defaults() {
        let from_lookup =
            GatewayConfig::from_lookup(lookup_from(&[("FACET_DATA_DIR", "store")])).unwrap();
        assert_eq!(GatewayConfig::in_dir(Backend::Kv, "store"), from_lookup);
    }
}
