//! Process-level configuration for the charm.
//!
//! Charm options (`alertmanager-config`, `alertmanager-secrets`) come from
//! the platform at hook time; this covers the knobs that do not.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Default in-cluster API server address.
pub const DEFAULT_API_SERVER_URL: &str = "https://kubernetes.default.svc";

/// Directory where Kubernetes mounts the pod's service account.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Charm configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Kubernetes API server base URL.
    pub api_server_url: String,

    /// Service account bearer token, re-read on every request.
    pub token_path: PathBuf,

    /// CA bundle used to verify the API server.
    pub ca_path: Option<PathBuf>,

    /// Delay between readiness polls.
    pub poll_interval: Duration,

    /// Name of the OCI image resource.
    pub image_resource: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Also write JSON records to stderr. Set when `RUST_LOG` is present;
    /// otherwise records only go to the platform log, which already
    /// captures stderr.
    pub log_json_stderr: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let api_server_url = var("ALERTMANAGER_CHARM_API_SERVER")
            .unwrap_or_else(|| DEFAULT_API_SERVER_URL.to_string());

        let token_path = var("ALERTMANAGER_CHARM_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(SERVICE_ACCOUNT_DIR).join("token"));

        // "none" disables CA pinning, for API servers with a public certificate
        let ca_path = match var("ALERTMANAGER_CHARM_CA_PATH") {
            Some(path) if path == "none" => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt")),
        };

        let poll_interval_ms = match var("ALERTMANAGER_CHARM_POLL_INTERVAL_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                anyhow::anyhow!("invalid ALERTMANAGER_CHARM_POLL_INTERVAL_MS {raw:?}: {e}")
            })?,
            None => 1000,
        };

        let image_resource = var("ALERTMANAGER_CHARM_IMAGE_RESOURCE")
            .unwrap_or_else(|| "alertmanager-image".to_string());

        let log_level = var("ALERTMANAGER_CHARM_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let log_json_stderr = var("RUST_LOG").is_some();

        Ok(Self {
            api_server_url,
            token_path,
            ca_path,
            poll_interval: Duration::from_millis(poll_interval_ms),
            image_resource,
            log_level,
            log_json_stderr,
        })
    }
}
