//! Storage health probe.

use serde::Serialize;

use crate::config::GatewayConfig;
use crate::persistence::{FaceRepository, Gateway};

/// Result of probing a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy { backend: String, faces: u64 },
    Degraded { backend: String, reason: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Probe an open repository by reading its whole face collection.
pub async fn check(repo: &impl FaceRepository, backend: &str) -> HealthStatus {
    match repo.list_faces(None).await {
        Ok(faces) => {
            tracing::debug!(backend, faces = faces.len(), "Health check passed");
            HealthStatus::Healthy {
                backend: backend.to_string(),
                faces: faces.len() as u64,
            }
        }
        Err(e) => {
            tracing::warn!(backend, error = %e, "Health check failed");
            HealthStatus::Degraded {
                backend: backend.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Open the configured backend and probe it. A backend that cannot be opened
/// is reported as degraded.
pub async fn check_config(config: &GatewayConfig) -> HealthStatus {
    match Gateway::open(config).await {
        Ok(gateway) => check(&gateway, gateway.backend_name()).await,
        Err(e) => {
            tracing::warn!(backend = %config.backend, error = %e, "Backend could not be opened");
            HealthStatus::Degraded {
                backend: config.backend.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::persistence::KvFaceRepository;

    #[tokio::test]
    async fn test_fresh_empty_store_is_healthy() {
        for backend in [Backend::Kv, Backend::Sqlite] {
            let dir = tempfile::tempdir().unwrap();
            let status = check_config(&GatewayConfig::in_dir(backend, dir.path())).await;
            assert_eq!(
                status,
                HealthStatus::Healthy {
                    backend: backend.to_string(),
                    faces: 0
                }
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_path_is_degraded() {
        for backend in [Backend::Kv, Backend::Sqlite] {
            let dir = tempfile::tempdir().unwrap();
            let blocker = dir.path().join("plain-file");
            std::fs::write(&blocker, b"not a directory").unwrap();

            let status = check_config(&GatewayConfig::in_dir(backend, blocker.join("data"))).await;
            assert!(!status.is_healthy(), "backend {backend}: {status:?}");
        }
    }

    #[tokio::test]
    async fn test_store_removed_after_open_is_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faces.json");
        let repo = KvFaceRepository::open(path.clone()).unwrap();
        std::fs::remove_file(&path).unwrap();

        let status = check(&repo, "kv").await;
        assert!(matches!(status, HealthStatus::Degraded { .. }));
    }

    #[test]
    fn test_status_json_shape() {
        let status = HealthStatus::Degraded {
            backend: "kv".to_string(),
            reason: "gone".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            serde_json::json!({"status": "degraded", "backend": "kv", "reason": "gone"})
        );
    }
}
