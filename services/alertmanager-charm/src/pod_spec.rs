//! Pod spec submitted to the platform for the Alertmanager workload.

use alertmanager_config::{AlertmanagerConfig, ConfigError};
use serde::Serialize;

use crate::resources::ImageMeta;

/// Port Alertmanager serves its API and UI on.
pub const ALERTMANAGER_PORT: u16 = 9093;

/// Directory the configuration file is mounted in.
pub const CONFIG_MOUNT_PATH: &str = "/etc/alertmanager";

/// Name of the configuration file inside [`CONFIG_MOUNT_PATH`].
pub const CONFIG_FILE_NAME: &str = "alertmanager.yml";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodSpec {
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image_details: ImageDetails,
    pub ports: Vec<ContainerPort>,
    pub readiness_probe: Probe,
    pub liveness_probe: Probe,
    pub files: Vec<FileSet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    pub image_path: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub container_port: u16,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub http_get: HttpGet,
    pub initial_delay_seconds: u32,
    pub timeout_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpGet {
    pub path: String,
    pub port: u16,
}

/// A set of files mounted into the container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSet {
    pub name: String,
    pub mount_path: String,
    pub files: std::collections::BTreeMap<String, String>,
}

impl PodSpec {
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

fn probe(path: &str, initial_delay_seconds: u32) -> Probe {
    Probe {
        http_get: HttpGet {
            path: path.to_string(),
            port: ALERTMANAGER_PORT,
        },
        initial_delay_seconds,
        timeout_seconds: 30,
    }
}

/// Pod spec running `image` with `config` mounted as its configuration file.
pub fn build_pod_spec(
    app_name: &str,
    image: &ImageMeta,
    config: &AlertmanagerConfig,
) -> Result<PodSpec, ConfigError> {
    let files = std::iter::once((CONFIG_FILE_NAME.to_string(), config.to_yaml()?)).collect();

    Ok(PodSpec {
        containers: vec![Container {
            name: app_name.to_string(),
            image_details: ImageDetails {
                image_path: image.image_path.clone(),
                username: image.username.clone(),
                password: image.password.clone(),
            },
            ports: vec![ContainerPort {
                container_port: ALERTMANAGER_PORT,
                protocol: "TCP".to_string(),
            }],
            readiness_probe: probe("/-/ready", 10),
            liveness_probe: probe("/-/healthy", 30),
            files: vec![FileSet {
                name: "config".to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                files,
            }],
        }],
    })
}
