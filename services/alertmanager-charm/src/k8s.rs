//! Minimal Kubernetes API client.
//!
//! Only what the charm needs: listing the pods of an application with the
//! credentials of the service account the charm runs under.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use charm_reconcile::{PodList, PodStatus, PodStatusSource};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::Config;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum K8sError {
    #[error("failed to read {}: {source}", path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CA certificate at {}: {source}", path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Authenticated access to the API server.
///
/// The token is read on every request so that rotated service account
/// tokens are picked up without restarting.
pub struct ApiServer {
    client: reqwest::Client,
    base_url: String,
    token_path: PathBuf,
}

impl ApiServer {
    /// Build a client trusting the configured CA bundle.
    pub fn from_config(config: &Config) -> Result<Self, K8sError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(ca_path) = &config.ca_path {
            builder = builder.add_root_certificate(load_certificate(ca_path)?);
        }
        Ok(Self::with_client(
            builder.build()?,
            &config.api_server_url,
            &config.token_path,
        ))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, token_path: &Path) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_path: token_path.to_path_buf(),
        }
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, K8sError>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.token().await?;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Querying API server");

        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "API server request failed");
            return Err(K8sError::Status { status, body });
        }

        Ok(response.json().await?)
    }

    /// Pods in `namespace` labelled as belonging to `app_name`.
    pub async fn pod_list(&self, namespace: &str, app_name: &str) -> Result<PodList, K8sError> {
        let selector = format!("juju-app={app_name}");
        self.get_json(
            &format!("/api/v1/namespaces/{namespace}/pods"),
            &[("labelSelector", selector.as_str())],
        )
        .await
    }

    async fn token(&self) -> Result<String, K8sError> {
        let token = tokio::fs::read_to_string(&self.token_path)
            .await
            .map_err(|source| K8sError::Credentials {
                path: self.token_path.clone(),
                source,
            })?;
        Ok(token.trim().to_string())
    }
}

fn load_certificate(path: &Path) -> Result<reqwest::Certificate, K8sError> {
    let pem = std::fs::read(path).map_err(|source| K8sError::Credentials {
        path: path.to_path_buf(),
        source,
    })?;
    reqwest::Certificate::from_pem(&pem).map_err(|source| K8sError::Certificate {
        path: path.to_path_buf(),
        source,
    })
}

/// Observed status of this unit's pod, read from the API server.
pub struct PodStatusFetcher {
    api: ApiServer,
    namespace: String,
    app_name: String,
    unit_name: String,
}

impl PodStatusFetcher {
    pub fn new(
        api: ApiServer,
        namespace: impl Into<String>,
        app_name: impl Into<String>,
        unit_name: impl Into<String>,
    ) -> Self {
        Self {
            api,
            namespace: namespace.into(),
            app_name: app_name.into(),
            unit_name: unit_name.into(),
        }
    }
}

#[async_trait]
impl PodStatusSource for PodStatusFetcher {
    async fn pod_status(&self) -> anyhow::Result<PodStatus> {
        let pods = self.api.pod_list(&self.namespace, &self.app_name).await?;
        Ok(pods.status_for_unit(&self.unit_name))
    }
}
