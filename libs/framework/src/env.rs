//! Runtime environment supplied by the platform for one invocation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading the runtime environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid relation id {0:?}")]
    InvalidRelationId(String),
}

/// Identifiers describing the current invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeEnv {
    /// Name of the unit this process runs for (`app/N`).
    pub unit_name: String,
    /// Model name, which doubles as the Kubernetes namespace.
    pub model_name: Option<String>,
    pub charm_dir: PathBuf,
    pub action_name: Option<String>,
    pub relation_name: Option<String>,
    pub relation_id: Option<u64>,
    pub remote_app: Option<String>,
    pub remote_unit: Option<String>,
    pub dispatch_path: Option<String>,
    pub debug: bool,
}

impl RuntimeEnv {
    /// Load the environment of the current process.
    pub fn from_env() -> Result<Self, EnvError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the environment from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values are treated as unset
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let unit_name = var("JUJU_UNIT_NAME").ok_or(EnvError::Missing("JUJU_UNIT_NAME"))?;

        let relation_id = var("JUJU_RELATION_ID")
            .map(|raw| parse_relation_id(&raw))
            .transpose()?;

        let charm_dir = var("JUJU_CHARM_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            unit_name,
            model_name: var("JUJU_MODEL_NAME"),
            charm_dir,
            action_name: var("JUJU_ACTION_NAME"),
            relation_name: var("JUJU_RELATION"),
            relation_id,
            remote_app: var("JUJU_REMOTE_APP"),
            remote_unit: var("JUJU_REMOTE_UNIT"),
            dispatch_path: var("JUJU_DISPATCH_PATH"),
            debug: lookup("JUJU_DEBUG").is_some(),
        })
    }
}

/// Relation ids come as `<name>:<id>`; the id is the part after the last `:`.
fn parse_relation_id(raw: &str) -> Result<u64, EnvError> {
    raw.rsplit(':')
        .next()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| EnvError::InvalidRelationId(raw.to_string()))
}
