//! The Alertmanager charm: event handlers driving the workload.

use std::sync::Arc;

use alertmanager_config::{build_alertmanager_config, ConfigError, PrometheusAlertingConfig};
use async_trait::async_trait;
use charm_events::Event;
use charm_framework::{EventContext, Framework, FrameworkError, Model, ModelError, Observer, Status};
use charm_reconcile::{reconcile_once, wait_for_ready, PodStatusSource, ReadinessConfig, ReconcileError};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pod_spec::build_pod_spec;
use crate::prometheus::{PrometheusInterface, NEW_PROM_REL};
use crate::resources::{fetch_image_meta, ResourceError};

/// Handle path of the charm object.
pub const CHARM_HANDLE: &str = "AlertmanagerCharm";

/// Emitter path of the platform's events.
pub const CHARM_EMITTER: &str = "AlertmanagerCharm/on";

/// Relation Prometheus servers join to receive alerting configuration.
pub const PROMETHEUS_RELATION: &str = "prometheus";

/// Relation data key carrying the alerting configuration.
pub const ALERTING_CONFIG_KEY: &str = "alerting_config";

const CONFIG_OPTION: &str = "alertmanager-config";
const SECRETS_OPTION: &str = "alertmanager-secrets";

#[derive(Debug, Error)]
pub enum CharmError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model name is not known; cannot derive the namespace")]
    MissingModelName,

    #[error("AlertmanagerCharm has no handler {0}")]
    UnknownMethod(String),
}

impl CharmError {
    /// Status to report instead of failing the hook, if the error is one the
    /// operator can fix.
    pub fn unit_status(&self) -> Option<Status> {
        match self {
            CharmError::Resource(err) => Some(Status::blocked(err.to_string())),
            _ => None,
        }
    }
}

/// Settings for the charm object.
#[derive(Debug, Clone)]
pub struct CharmSettings {
    /// Name of the OCI image resource.
    pub image_resource: String,
    pub readiness: ReadinessConfig,
}

impl Default for CharmSettings {
    fn default() -> Self {
        Self {
            image_resource: "alertmanager-image".to_string(),
            readiness: ReadinessConfig::default(),
        }
    }
}

pub struct AlertmanagerCharm {
    settings: CharmSettings,
    pod_status: Arc<dyn PodStatusSource>,
}

impl AlertmanagerCharm {
    pub fn new(settings: CharmSettings, pod_status: Arc<dyn PodStatusSource>) -> Self {
        Self {
            settings,
            pod_status,
        }
    }

    /// Register the charm and its relation interface, and wire up every
    /// event the charm handles.
    pub fn register(self: Arc<Self>, framework: &mut Framework) -> Result<(), FrameworkError> {
        let prometheus = Arc::new(PrometheusInterface::new(CHARM_HANDLE, PROMETHEUS_RELATION));
        prometheus.clone().register(framework, CHARM_EMITTER)?;

        framework.register_observer(self);
        for (kind, method) in [
            ("start", "on_start"),
            ("upgrade_charm", "on_upgrade_charm"),
            ("config_changed", "on_config_changed"),
            ("update_status", "on_update_status"),
        ] {
            framework.observe(CHARM_EMITTER, kind, CHARM_HANDLE, method)?;
        }
        framework.observe(prometheus.emitter(), NEW_PROM_REL, CHARM_HANDLE, "on_new_prom_rel")
    }

    async fn handle(&self, method: &str, model: &Model) -> Result<(), CharmError> {
        match method {
            "on_start" | "on_upgrade_charm" => {
                self.configure_pod(model).await?;
            }
            "on_config_changed" => {
                self.configure_pod(model).await?;
                wait_for_ready(self.pod_status.as_ref(), model, &self.settings.readiness).await?;
            }
            "on_update_status" => {
                reconcile_once(self.pod_status.as_ref(), model).await?;
            }
            "on_new_prom_rel" => self.publish_alerting_config(model).await?,
            other => return Err(CharmError::UnknownMethod(other.to_string())),
        }
        Ok(())
    }

    /// Render the configuration and submit the pod spec. Leader only.
    async fn configure_pod(&self, model: &Model) -> Result<(), CharmError> {
        if !model.is_leader().await? {
            info!(unit = %model.unit().name, "Not leader, leaving the pod spec alone");
            return Ok(());
        }

        model
            .set_unit_status(&Status::maintenance("Configuring pod"))
            .await?;

        let options = model.config().await?;
        let config = build_alertmanager_config(
            option_str(&options, CONFIG_OPTION),
            option_str(&options, SECRETS_OPTION),
        )?;
        let image = fetch_image_meta(model, &self.settings.image_resource).await?;
        let spec = build_pod_spec(&model.app().name, &image, &config)?;

        model.set_pod_spec(&spec.to_value()?).await?;
        info!(image = %image.image_path, "Pod spec set");
        Ok(())
    }

    /// Tell every related Prometheus where to find this Alertmanager.
    async fn publish_alerting_config(&self, model: &Model) -> Result<(), CharmError> {
        if !model.is_leader().await? {
            debug!("Not leader, not publishing alerting config");
            return Ok(());
        }

        let namespace = model.name().ok_or(CharmError::MissingModelName)?;
        let alerting = PrometheusAlertingConfig::new(
            namespace,
            format!("juju-app={}", model.app().name),
        )
        .to_json()?;

        for relation in model.relations(PROMETHEUS_RELATION).await? {
            model
                .set_relation_data(&relation, ALERTING_CONFIG_KEY, &alerting, false)
                .await?;
            info!(relation_id = relation.id, "Published alerting config");
        }
        Ok(())
    }
}

fn option_str<'a>(options: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

#[async_trait]
impl Observer for AlertmanagerCharm {
    fn handle_path(&self) -> &str {
        CHARM_HANDLE
    }

    async fn notify(
        &self,
        method: &str,
        _event: &mut Event,
        ctx: &mut EventContext<'_>,
    ) -> anyhow::Result<()> {
        let model = ctx.model();
        match self.handle(method, model).await {
            Ok(()) => Ok(()),
            Err(err) => match err.unit_status() {
                Some(status) => {
                    warn!(error = %err, "Unit blocked");
                    model.set_unit_status(&status).await?;
                    Ok(())
                }
                None => Err(err.into()),
            },
        }
    }
}
