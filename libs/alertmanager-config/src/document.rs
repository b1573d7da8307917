//! The rendered Alertmanager configuration document.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::{merge, ConfigError};

/// Configuration used when no base document is supplied.
pub const DEFAULT_CONFIG: &str = include_str!("../templates/alertmanager-config-default.yml");

/// A configuration document. See <https://prometheus.io/docs/alerting/configuration/>.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AlertmanagerConfig {
    doc: Mapping,
}

impl AlertmanagerConfig {
    pub fn new(doc: Mapping) -> Self {
        Self { doc }
    }

    /// The bundled default document.
    pub fn default_document() -> Result<Self, ConfigError> {
        parse_document("default configuration", DEFAULT_CONFIG.as_bytes()).map(Self::new)
    }

    /// Merge `overlay` over this document; the overlay wins conflicts.
    pub fn update(&mut self, overlay: Mapping) {
        merge(&mut self.doc, overlay);
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.doc
    }

    pub fn into_mapping(self) -> Mapping {
        self.doc
    }

    /// Render as YAML text.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.doc).map_err(ConfigError::Render)
    }
}

/// Build the configuration from base64 inputs.
///
/// Without a base document the bundled default is used. Without secrets the
/// base is returned unchanged.
pub fn build_alertmanager_config(
    base64_config: Option<&str>,
    base64_secrets: Option<&str>,
) -> Result<AlertmanagerConfig, ConfigError> {
    let mut config = match supplied(base64_config) {
        Some(encoded) => {
            debug!("Decoding alertmanager-config");
            let bytes = decode("alertmanager-config", encoded)?;
            AlertmanagerConfig::new(parse_document("alertmanager-config", &bytes)?)
        }
        None => {
            warn!(
                "alertmanager-config not provided, using the bundled default configuration; \
                 this is not recommended for production use"
            );
            AlertmanagerConfig::default_document()?
        }
    };

    match supplied(base64_secrets) {
        Some(encoded) => {
            debug!("Decoding alertmanager-secrets");
            let bytes = decode("alertmanager-secrets", encoded)?;
            let secrets = parse_document("alertmanager-secrets", &bytes)?;
            debug!(keys = secrets.len(), "Merging secrets into configuration");
            config.update(secrets);
        }
        None => info!("alertmanager-secrets not provided, ignoring"),
    }

    Ok(config)
}

fn supplied(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn decode(field: &'static str, encoded: &str) -> Result<Vec<u8>, ConfigError> {
    // Option values may be wrapped over several lines.
    let compact: String = encoded.split_ascii_whitespace().collect();
    STANDARD
        .decode(compact)
        .map_err(|source| ConfigError::Base64 { field, source })
}

fn parse_document(field: &'static str, bytes: &[u8]) -> Result<Mapping, ConfigError> {
    let value: Value =
        serde_yaml::from_slice(bytes).map_err(|source| ConfigError::Yaml { field, source })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(doc) => Ok(doc),
        _ => Err(ConfigError::NotAMapping { field }),
    }
}
