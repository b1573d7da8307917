//! # alertmanager-charm
//!
//! Operator for Prometheus Alertmanager on Kubernetes.
//!
//! Each hook invocation runs [`run`]: the framework is restored from the
//! unit's state file, deferred events are re-delivered, the invoking event
//! is emitted to [`AlertmanagerCharm`], and the state is committed.
//!
//! ## Behaviour
//!
//! - **start / upgrade-charm**: the leader renders `alertmanager.yml` from
//!   the charm options and submits a pod spec for the OCI image resource
//! - **config-changed**: as above, then polls the API server until this
//!   unit's pod is ready
//! - **update-status**: reports the pod's current state as unit status
//! - **prometheus relation**: the leader publishes the alerting
//!   configuration Prometheus needs to discover this Alertmanager

pub mod charm;
pub mod config;
pub mod hook_tools;
pub mod k8s;
pub mod log;
pub mod pod_spec;
pub mod prometheus;
pub mod resources;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use charm_framework::{
    CharmMeta, Dispatcher, EventStore, Framework, Model, PlatformGateway, RuntimeEnv,
    SourceRegistry, CHARM_STATE_FILE,
};
use charm_reconcile::ReadinessConfig;
use tracing::{debug, error};

pub use charm::{AlertmanagerCharm, CharmError, CharmSettings, CHARM_EMITTER, CHARM_HANDLE};
pub use config::Config;
pub use hook_tools::HookToolGateway;
pub use k8s::{ApiServer, K8sError, PodStatusFetcher};

/// Read `metadata.yaml` and the optional `actions.yaml` from the charm directory.
pub fn load_metadata(charm_dir: &Path) -> Result<CharmMeta> {
    let metadata_path = charm_dir.join("metadata.yaml");
    let metadata = std::fs::read_to_string(&metadata_path)
        .with_context(|| format!("failed to read {}", metadata_path.display()))?;

    let actions_path = charm_dir.join("actions.yaml");
    let actions = match std::fs::read_to_string(&actions_path) {
        Ok(actions) => Some(actions),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", actions_path.display()))
        }
    };

    Ok(CharmMeta::from_yaml(&metadata, actions.as_deref())?)
}

/// Handle one hook invocation. `exec_path` is the path the process was
/// invoked as.
pub async fn run(exec_path: &Path) -> Result<()> {
    let env = RuntimeEnv::from_env()?;
    let config = Config::from_env()?;

    let gateway: Arc<dyn PlatformGateway> = Arc::new(HookToolGateway::new());
    let (juju_log, forwarder) = log::juju_log_forwarder(gateway.clone());
    let log_guard = log::init(&config.log_level, env.debug, config.log_json_stderr, juju_log);

    let result = dispatch(exec_path, env, config, gateway).await;
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "Hook failed");
    }

    if let Err(err) = forwarder.finish().await {
        // juju-log is unusable; hook stderr still reaches the unit's log.
        eprintln!("failed to forward logs to juju-log: {err:#}");
    }
    drop(log_guard);
    result
}

async fn dispatch(
    exec_path: &Path,
    env: RuntimeEnv,
    config: Config,
    gateway: Arc<dyn PlatformGateway>,
) -> Result<()> {
    let meta = Arc::new(load_metadata(&env.charm_dir)?);
    let registry = SourceRegistry::for_charm(&meta, CHARM_EMITTER)?;
    let store = EventStore::open(env.charm_dir.join(CHARM_STATE_FILE))?;

    let model = Model::new(meta, env.clone(), gateway)?;

    let namespace = env
        .model_name
        .clone()
        .context("JUJU_MODEL_NAME is not set")?;
    let api = ApiServer::from_config(&config)?;
    let pod_status = Arc::new(PodStatusFetcher::new(
        api,
        namespace,
        model.app().name.clone(),
        model.unit().name.clone(),
    ));

    let settings = CharmSettings {
        image_resource: config.image_resource.clone(),
        readiness: ReadinessConfig {
            poll_interval: config.poll_interval,
        },
    };

    let mut framework = Framework::new(store, registry, model)?;
    Arc::new(AlertmanagerCharm::new(settings, pod_status)).register(&mut framework)?;

    let dispatcher = Dispatcher::new(exec_path, &env, CHARM_EMITTER);
    debug!(event = dispatcher.event_name(), "Dispatching");
    dispatcher.run(&mut framework).await?;
    Ok(())
}
