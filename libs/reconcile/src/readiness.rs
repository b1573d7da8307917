//! Readiness polling loop.

use std::time::Duration;

use async_trait::async_trait;
use charm_framework::{Model, Status};
use tracing::{debug, info};

use crate::{build_unit_status, PodStatus, ReconcileError};

/// Source of observed pod status for this unit.
#[async_trait]
pub trait PodStatusSource: Send + Sync {
    async fn pod_status(&self) -> anyhow::Result<PodStatus>;
}

/// Readiness loop configuration.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Delay between polls.
    pub poll_interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Fetch pod status once and publish the derived unit status.
pub async fn reconcile_once(
    source: &dyn PodStatusSource,
    model: &Model,
) -> Result<Status, ReconcileError> {
    let pod_status = source.pod_status().await.map_err(ReconcileError::Fetch)?;
    let status = build_unit_status(&pod_status);
    debug!(?pod_status, status = %status, "reconciled unit status");
    model.set_unit_status(&status).await?;
    Ok(status)
}

/// Poll until the unit becomes active.
///
/// There is no deadline: the loop runs until the pod is ready or an error
/// occurs. Fetch errors are not retried.
pub async fn wait_for_ready(
    source: &dyn PodStatusSource,
    model: &Model,
    config: &ReadinessConfig,
) -> Result<(), ReconcileError> {
    info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Waiting for pod to become ready"
    );

    let mut polls: u64 = 0;
    loop {
        polls += 1;
        let status = reconcile_once(source, model).await?;
        if status.is_active() {
            info!(polls, "Pod is ready");
            return Ok(());
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
