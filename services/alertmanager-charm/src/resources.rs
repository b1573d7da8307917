//! OCI image resource handling.

use std::path::{Path, PathBuf};

use charm_framework::{Model, ModelError};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Registry coordinates of the workload image, as attached to the
/// `oci-image` resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageMeta {
    #[serde(rename = "registrypath")]
    pub image_path: String,
    pub username: String,
    pub password: String,
}

/// Why an image resource could not be used.
///
/// Every variant leaves the unit blocked until the operator attaches a
/// usable resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("{name}: Resource '{name}' does not exist: {source}")]
    Unavailable {
        name: String,
        #[source]
        source: ModelError,
    },

    #[error("{name}: Resource not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("{name}: Resource unreadable at {}", path.display())]
    Unreadable { name: String, path: PathBuf },

    #[error("{name}: Invalid YAML at {}: {reason}", path.display())]
    InvalidYaml {
        name: String,
        path: PathBuf,
        reason: String,
    },
}

/// Fetch and parse the image resource `name`.
pub async fn fetch_image_meta(model: &Model, name: &str) -> Result<ImageMeta, ResourceError> {
    let path = model
        .fetch_resource(name)
        .await
        .map_err(|source| ResourceError::Unavailable {
            name: name.to_string(),
            source,
        })?;
    debug!(resource = name, path = %path.display(), "Fetched resource");
    read_image_meta(name, &path).await
}

/// Parse an image resource file.
pub async fn read_image_meta(name: &str, path: &Path) -> Result<ImageMeta, ResourceError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ResourceError::NotFound {
                name: name.to_string(),
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ResourceError::Unreadable {
                name: name.to_string(),
                path: path.to_path_buf(),
            });
        }
    };

    if contents.trim().is_empty() {
        return Err(ResourceError::Unreadable {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
    }

    serde_yaml::from_str(&contents).map_err(|err| ResourceError::InvalidYaml {
        name: name.to_string(),
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const NAME: &str = "alertmanager-image";

    fn write(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("image.yaml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_read_image_meta() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "registrypath: registry.example.com/prom/alertmanager:v0.21.0\nusername: bot\npassword: hunter2\n",
        );
        let meta = read_image_meta(NAME, &path).await.unwrap();
        assert_eq!(
            meta,
            ImageMeta {
                image_path: "registry.example.com/prom/alertmanager:v0.21.0".to_string(),
                username: "bot".to_string(),
                password: "hunter2".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_image_meta(NAME, &dir.path().join("absent.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
        assert!(err.to_string().starts_with("alertmanager-image: Resource not found at "));
    }

    #[tokio::test]
    async fn test_empty_file_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "  \n");
        let err = read_image_meta(NAME, &path).await.unwrap_err();
        assert!(matches!(err, ResourceError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "registrypath: [unterminated\n");
        let err = read_image_meta(NAME, &path).await.unwrap_err();
        assert!(matches!(err, ResourceError::InvalidYaml { .. }));
        assert!(err.to_string().starts_with("alertmanager-image: Invalid YAML at "));
    }

    #[tokio::test]
    async fn test_missing_field_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "registrypath: alertmanager:latest\nusername: bot\n");
        let err = read_image_meta(NAME, &path).await.unwrap_err();
        match err {
            ResourceError::InvalidYaml { reason, .. } => assert!(reason.contains("password")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
