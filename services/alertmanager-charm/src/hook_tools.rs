//! [`PlatformGateway`] backed by the platform's hook tool executables.
//!
//! Each operation runs one tool (`relation-get`, `status-set`, ...) as a
//! child process. Tools that produce data are asked for `--format=json`.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use charm_framework::{ModelError, PlatformGateway, Status};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::trace;

/// How long a leadership answer is trusted before asking again.
pub const LEADERSHIP_LEASE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct LeaderLease {
    is_leader: bool,
    checked_at: Instant,
}

/// Runs hook tools found on `PATH`, or in a fixed directory.
#[derive(Debug, Default)]
pub struct HookToolGateway {
    tools_dir: Option<PathBuf>,
    leader: Mutex<Option<LeaderLease>>,
}

impl HookToolGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve tools in `dir` instead of searching `PATH`.
    pub fn with_tools_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(dir.into()),
            leader: Mutex::new(None),
        }
    }

    fn command(&self, tool: &str) -> Command {
        match &self.tools_dir {
            Some(dir) => Command::new(dir.join(tool)),
            None => Command::new(tool),
        }
    }

    async fn run<I, S>(&self, tool: &str, args: I) -> Result<String, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        trace!(tool, "running hook tool");
        self.exec(tool, args).await
    }

    /// Run a tool without emitting any tracing events, for use by the log
    /// forwarder.
    async fn exec<I, S>(&self, tool: &str, args: I) -> Result<String, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = self.command(tool);
        command.args(args);

        let output = command.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ModelError::Backend(format!("{tool}: {stderr}")));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_json<T, I, S>(&self, tool: &str, args: I) -> Result<T, ModelError>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut args: Vec<String> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string_lossy().into_owned())
            .collect();
        args.push("--format=json".to_string());
        let stdout = self.run(tool, &args).await?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Map a failure on an established relation to `RelationNotFound`.
    fn relation_error(relation_id: u64, err: ModelError) -> ModelError {
        match err {
            ModelError::Backend(message) if message.contains("relation not found") => {
                ModelError::RelationNotFound { id: relation_id }
            }
            other => other,
        }
    }
}

fn app_flag(is_app: bool) -> String {
    format!("--app={is_app}")
}

fn parse_relation_id(raw: &str) -> Result<u64, ModelError> {
    raw.rsplit(':')
        .next()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ModelError::InvalidData(format!("invalid relation id {raw:?}")))
}

fn action_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl PlatformGateway for HookToolGateway {
    async fn is_leader(&self) -> Result<bool, ModelError> {
        let mut lease = self.leader.lock().await;
        if let Some(cached) = *lease {
            if cached.checked_at.elapsed() < LEADERSHIP_LEASE {
                return Ok(cached.is_leader);
            }
        }

        // The lease starts when we ask, not when the answer arrives.
        let checked_at = Instant::now();
        let is_leader: bool = self.run_json("is-leader", Vec::<String>::new()).await?;
        *lease = Some(LeaderLease {
            is_leader,
            checked_at,
        });
        Ok(is_leader)
    }

    async fn config_get(&self) -> Result<Map<String, Value>, ModelError> {
        let config: Option<Map<String, Value>> =
            self.run_json("config-get", Vec::<String>::new()).await?;
        Ok(config.unwrap_or_default())
    }

    async fn relation_ids(&self, name: &str) -> Result<Vec<u64>, ModelError> {
        let ids: Option<Vec<String>> = self.run_json("relation-ids", [name]).await?;
        ids.unwrap_or_default()
            .iter()
            .map(|raw| parse_relation_id(raw))
            .collect()
    }

    async fn relation_list(&self, relation_id: u64) -> Result<Vec<String>, ModelError> {
        let id = relation_id.to_string();
        let units: Option<Vec<String>> = self
            .run_json("relation-list", ["-r", id.as_str()])
            .await
            .map_err(|err| Self::relation_error(relation_id, err))?;
        Ok(units.unwrap_or_default())
    }

    async fn relation_get(
        &self,
        relation_id: u64,
        member: &str,
        is_app: bool,
    ) -> Result<BTreeMap<String, String>, ModelError> {
        let id = relation_id.to_string();
        let bag: Option<BTreeMap<String, String>> = self
            .run_json(
                "relation-get",
                ["-r", id.as_str(), "-", member, app_flag(is_app).as_str()],
            )
            .await
            .map_err(|err| Self::relation_error(relation_id, err))?;
        Ok(bag.unwrap_or_default())
    }

    async fn relation_set(
        &self,
        relation_id: u64,
        key: &str,
        value: &str,
        is_app: bool,
    ) -> Result<(), ModelError> {
        let id = relation_id.to_string();
        let pair = format!("{key}={value}");
        self.run(
            "relation-set",
            ["-r", id.as_str(), pair.as_str(), app_flag(is_app).as_str()],
        )
        .await
        .map_err(|err| Self::relation_error(relation_id, err))?;
        Ok(())
    }

    async fn resource_get(&self, name: &str) -> Result<PathBuf, ModelError> {
        let path = self.run("resource-get", [name]).await?;
        Ok(PathBuf::from(path.trim()))
    }

    async fn pod_spec_set(&self, spec: &Value) -> Result<(), ModelError> {
        // The file must outlive the tool invocation.
        let mut file = tempfile::Builder::new()
            .prefix("pod-spec-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(serde_json::to_string(spec)?.as_bytes())?;
        file.flush()?;

        let path: &Path = file.path();
        self.run("pod-spec-set", [OsStr::new("--file"), path.as_os_str()])
            .await?;
        Ok(())
    }

    async fn status_set(&self, status: &Status, is_app: bool) -> Result<(), ModelError> {
        let application = format!("--application={is_app}");
        self.run(
            "status-set",
            [application.as_str(), status.name(), status.message()],
        )
        .await?;
        Ok(())
    }

    async fn action_get(&self) -> Result<Map<String, Value>, ModelError> {
        let params: Option<Map<String, Value>> =
            self.run_json("action-get", Vec::<String>::new()).await?;
        Ok(params.unwrap_or_default())
    }

    async fn action_set(&self, results: &Map<String, Value>) -> Result<(), ModelError> {
        let pairs: Vec<String> = results
            .iter()
            .map(|(key, value)| format!("{key}={}", action_value(value)))
            .collect();
        self.run("action-set", &pairs).await?;
        Ok(())
    }

    async fn action_log(&self, message: &str) -> Result<(), ModelError> {
        self.run("action-log", [message]).await?;
        Ok(())
    }

    async fn action_fail(&self, message: &str) -> Result<(), ModelError> {
        self.run("action-fail", [message]).await?;
        Ok(())
    }

    async fn juju_log(&self, level: &str, message: &str) -> Result<(), ModelError> {
        self.exec("juju-log", ["--log-level", level, message]).await?;
        Ok(())
    }
}
