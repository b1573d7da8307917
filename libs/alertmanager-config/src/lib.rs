//! Alertmanager configuration rendering.
//!
//! The rendered configuration is a base document (supplied by the operator,
//! or the bundled default) with a secrets document merged over it. Secrets
//! win every conflict, so credentials can be kept out of the base document.
//!
//! # Format
//!
//! Both inputs are base64-encoded YAML, as carried by the charm options
//! `alertmanager-config` and `alertmanager-secrets`. An empty or absent
//! value means "not supplied".

mod document;
mod merge;
mod prometheus;

use thiserror::Error;

pub use document::{build_alertmanager_config, AlertmanagerConfig, DEFAULT_CONFIG};
pub use merge::merge;
pub use prometheus::PrometheusAlertingConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Input is not valid base64.
    #[error("{field} is not valid base64: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    /// Input is not valid YAML.
    #[error("{field} is not valid YAML: {source}")]
    Yaml {
        field: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// Input parsed, but its top level is not a mapping.
    #[error("{field} must be a YAML mapping at the top level")]
    NotAMapping { field: &'static str },

    /// The merged document could not be serialized.
    #[error("failed to render configuration: {0}")]
    Render(#[source] serde_yaml::Error),
}
